//! Process manager abstraction.
//!
//! Instance state is never cached: every [`ServiceHandle`](crate::ServiceHandle)
//! query goes back to the process manager through this trait. The systemd
//! implementation lives in [`adapters`](crate::adapters); tests script a mock.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ActiveState, ExecStatus, ResourceUsage};

/// Unit-level operations of the external process supervisor.
#[async_trait]
pub trait ProcessManager: Send + Sync {
    /// Requests a start without waiting for it to finish.
    async fn start(&self, unit: &str) -> Result<()>;

    /// Requests a stop without waiting for it to finish.
    async fn stop(&self, unit: &str) -> Result<()>;

    /// Enables the unit for boot.
    async fn enable(&self, unit: &str) -> Result<()>;

    /// Disables the unit for boot.
    async fn disable(&self, unit: &str) -> Result<()>;

    /// Current activity of the unit.
    async fn active_state(&self, unit: &str) -> Result<ActiveState>;

    /// Returns true if the unit starts at boot.
    async fn is_enabled(&self, unit: &str) -> Result<bool>;

    /// Raw value of a unit property, empty if unset.
    async fn property(&self, unit: &str, name: &str) -> Result<String>;

    /// Last `lines` journal lines of the unit.
    async fn logs(&self, unit: &str, lines: usize) -> Result<String>;

    /// Memory and CPU sample of `pid`.
    async fn resource_usage(&self, pid: u32) -> Result<ResourceUsage>;

    /// Main process id, 0 when not running.
    async fn main_pid(&self, unit: &str) -> Result<u32> {
        Ok(self.property(unit, "MainPID").await?.trim().parse().unwrap_or(0))
    }

    /// Exit status of the last main process.
    async fn exec_main_status(&self, unit: &str) -> Result<i32> {
        Ok(self
            .property(unit, "ExecMainStatus")
            .await?
            .trim()
            .parse()
            .unwrap_or(0))
    }

    /// Parsed exec property (`ExecStart`, `ExecStartPre`).
    async fn exec_status(&self, unit: &str, property: &str) -> Result<Option<ExecStatus>> {
        Ok(ExecStatus::parse(&self.property(unit, property).await?))
    }
}
