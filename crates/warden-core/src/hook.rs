//! Side effects run after an option change is persisted.

use async_trait::async_trait;
use warden_config::OptionChange;

use crate::error::Result;

/// Reacts to a persisted option change.
///
/// Hooks only see real changes: a write of the current value never
/// reaches them.
#[async_trait]
pub trait OptionHook: Send + Sync {
    /// Called once per persisted change.
    async fn option_changed(&self, change: &OptionChange) -> Result<()>;
}

/// Hook that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHook;

#[async_trait]
impl OptionHook for NoopHook {
    async fn option_changed(&self, _change: &OptionChange) -> Result<()> {
        Ok(())
    }
}
