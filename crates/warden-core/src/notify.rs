//! External chat notifications.

use async_trait::async_trait;

use crate::error::Result;

/// Delivers lifecycle notices to an external chat channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Sends one notice.
    async fn notify(&self, message: &str) -> Result<()>;
}

/// Writes notices to the log instead of a chat channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, message: &str) -> Result<()> {
        tracing::info!(notice = %message, "notification");
        Ok(())
    }
}
