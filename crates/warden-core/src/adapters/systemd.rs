//! systemd process manager.
//!
//! Drives units through `systemctl`, reads logs with `journalctl` and samples
//! resources with `ps`. `start` and `stop` are fired without waiting for the
//! job to finish; the lifecycle state machine polls afterwards.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::adapter::ProcessManager;
use crate::error::{Result, WardenError};
use crate::types::{ActiveState, ResourceUsage};

/// systemd-backed [`ProcessManager`].
#[derive(Debug, Clone, Default)]
pub struct SystemdManager {
    user_mode: bool,
}

impl SystemdManager {
    /// Manager for system units.
    #[must_use]
    pub const fn new() -> Self {
        Self { user_mode: false }
    }

    /// Manager for the calling user's units.
    #[must_use]
    pub const fn user() -> Self {
        Self { user_mode: true }
    }

    fn systemctl_cmd(&self) -> Command {
        let mut cmd = Command::new("systemctl");
        if self.user_mode {
            cmd.arg("--user");
        }
        cmd
    }

    fn journalctl_cmd(&self) -> Command {
        let mut cmd = Command::new("journalctl");
        if self.user_mode {
            cmd.arg("--user");
        }
        cmd
    }

    /// Fires `systemctl <verb> <unit>` in the background.
    fn fire(&self, verb: &str, unit: &str) -> Result<()> {
        let mut cmd = self.systemctl_cmd();
        cmd.arg(verb)
            .arg(unit)
            .stdin(Stdio::null())
            .stdout(Stdio::null());
        let child = cmd.spawn().map_err(|e| WardenError::spawn("systemctl", &e))?;
        tracing::info!(unit, verb, pid = ?child.id(), "requested unit job");
        // Reap in the background so the job does not hold the caller.
        tokio::spawn(async move {
            let mut child = child;
            let _ = child.wait().await;
        });
        Ok(())
    }

    async fn run(&self, mut cmd: Command, program: &str) -> Result<std::process::Output> {
        cmd.output().await.map_err(|e| WardenError::spawn(program, &e))
    }

    async fn checked(&self, verb: &str, unit: &str) -> Result<()> {
        let mut cmd = self.systemctl_cmd();
        cmd.arg(verb).arg(unit);
        let output = self.run(cmd, "systemctl").await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(WardenError::command(format!(
                "systemctl {verb} {unit} failed: {}",
                stderr.trim()
            )));
        }
        tracing::info!(unit, verb, "unit updated");
        Ok(())
    }

    async fn ps(&self, pid: u32, field: &str) -> Result<String> {
        let mut cmd = Command::new("ps");
        cmd.arg("h").arg("-p").arg(pid.to_string()).arg("-o").arg(field);
        let output = self.run(cmd, "ps").await?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl ProcessManager for SystemdManager {
    async fn start(&self, unit: &str) -> Result<()> {
        self.fire("start", unit)
    }

    async fn stop(&self, unit: &str) -> Result<()> {
        self.fire("stop", unit)
    }

    async fn enable(&self, unit: &str) -> Result<()> {
        self.checked("enable", unit).await
    }

    async fn disable(&self, unit: &str) -> Result<()> {
        self.checked("disable", unit).await
    }

    async fn active_state(&self, unit: &str) -> Result<ActiveState> {
        let mut cmd = self.systemctl_cmd();
        cmd.arg("is-active").arg(unit);
        // Non-zero exit just means "not active"; the answer is on stdout.
        let output = self.run(cmd, "systemctl").await?;
        Ok(ActiveState::parse(&String::from_utf8_lossy(&output.stdout)))
    }

    async fn is_enabled(&self, unit: &str) -> Result<bool> {
        let mut cmd = self.systemctl_cmd();
        cmd.arg("is-enabled").arg(unit);
        let output = self.run(cmd, "systemctl").await?;
        Ok(String::from_utf8_lossy(&output.stdout).trim() == "enabled")
    }

    async fn property(&self, unit: &str, name: &str) -> Result<String> {
        let mut cmd = self.systemctl_cmd();
        cmd.arg("show").arg("-p").arg(name).arg("--value").arg(unit);
        let output = self.run(cmd, "systemctl").await?;
        if !output.status.success() {
            tracing::debug!(unit, property = name, "systemctl show failed");
            return Ok(String::new());
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn logs(&self, unit: &str, lines: usize) -> Result<String> {
        let mut cmd = self.journalctl_cmd();
        cmd.arg("-qu")
            .arg(unit)
            .arg("-n")
            .arg(lines.to_string())
            .arg("--no-pager");
        let output = self.run(cmd, "journalctl").await?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn resource_usage(&self, pid: u32) -> Result<ResourceUsage> {
        if pid == 0 {
            return Ok(ResourceUsage::default());
        }
        let rss = self.ps(pid, "rss").await?;
        let cpu = self.ps(pid, "%cpu").await?;
        Ok(ResourceUsage::from_ps(&rss, &cpu))
    }
}
