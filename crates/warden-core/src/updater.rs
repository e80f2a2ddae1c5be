//! Version discovery and payload retrieval through an external helper.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use warden_config::Owner;

use crate::error::{Result, WardenError};

/// Branch name meaning "whatever the helper considers current".
pub const LATEST_BRANCH: &str = "latest";

/// Source of server payloads.
#[async_trait]
pub trait UpdateSource: Send + Sync {
    /// Latest version published on `branch`, `None` if the helper did not report one.
    async fn latest_version(&self, branch: &str) -> Result<Option<String>>;

    /// Returns true if `branch` has a version that is not yet downloaded.
    async fn is_update_available(&self, branch: &str) -> Result<bool>;

    /// Downloads and installs the latest payload of `branch`.
    async fn apply(&self, branch: &str) -> Result<()>;
}

/// Downloader program plus `unzip`, working on `<workdir>/<version>.zip`.
#[derive(Debug, Clone)]
pub struct CommandUpdater {
    program: PathBuf,
    workdir: PathBuf,
    owner_root: Option<PathBuf>,
}

impl CommandUpdater {
    /// Creates an updater running `program` inside `workdir`.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            workdir: workdir.into(),
            owner_root: None,
        }
    }

    /// After extraction, hand every installed file to the owner of `root`.
    #[must_use]
    pub fn with_owner_from(mut self, root: impl Into<PathBuf>) -> Self {
        self.owner_root = Some(root.into());
        self
    }

    /// Payload directory.
    #[must_use]
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn payload(&self, version: &str) -> PathBuf {
        self.workdir.join(format!("{version}.zip"))
    }

    fn helper(&self, branch: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        if branch != LATEST_BRANCH && !branch.is_empty() {
            cmd.arg("-patchline").arg(branch);
        }
        cmd.current_dir(&self.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }

    fn program_name(&self) -> String {
        self.program.display().to_string()
    }

    /// Runs the helper, echoing its output, and returns the first line matching `pattern`.
    ///
    /// Both pipes are read to the end so the helper never blocks on a full pipe.
    async fn stream(&self, mut cmd: Command, pattern: Option<&Regex>) -> Result<Option<String>> {
        let program = self.program_name();
        let mut child = cmd.spawn().map_err(|e| WardenError::spawn(&program, &e))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| WardenError::command(format!("{program} produced no stdout")))?;
        let stderr = child.stderr.take().map(|stderr| {
            let program = program.clone();
            tokio::spawn(async move {
                drain(stderr, |line| tracing::debug!(helper = %program, "{line}")).await;
            })
        });

        let mut found = None;
        drain(stdout, |line| {
            if found.is_none() && pattern.is_some_and(|re| re.is_match(line)) {
                found = Some(line.to_string());
            } else {
                // Helper prompts (e.g. device authentication) are passed through.
                tracing::info!(helper = %program, "{line}");
            }
        })
        .await;

        if let Some(task) = stderr {
            let _ = task.await;
        }
        let status = child.wait().await?;
        if !status.success() && found.is_none() {
            tracing::warn!(helper = %program, ?status, "update helper exited with failure");
        }
        Ok(found)
    }
}

/// Feeds every trimmed, non-empty line of `reader` to `on_line` until EOF or a read error.
async fn drain<R, F>(reader: R, mut on_line: F)
where
    R: AsyncRead + Unpin,
    F: FnMut(&str),
{
    let mut segments = BufReader::new(reader).split(b'\n');
    while let Ok(Some(segment)) = segments.next_segment().await {
        let line = String::from_utf8_lossy(&segment);
        let line = line.trim();
        if !line.is_empty() {
            on_line(line);
        }
    }
}

fn version_pattern() -> Result<Regex> {
    Regex::new(r"^\d+\.\d+\.\d+(-\w+)?$").map_err(|e| WardenError::command(format!("version pattern: {e}")))
}

#[async_trait]
impl UpdateSource for CommandUpdater {
    async fn latest_version(&self, branch: &str) -> Result<Option<String>> {
        let mut cmd = self.helper(branch);
        cmd.arg("-print-version");
        let pattern = version_pattern()?;
        let version = self.stream(cmd, Some(&pattern)).await?;
        tracing::debug!(branch, ?version, "latest version");
        Ok(version)
    }

    async fn is_update_available(&self, branch: &str) -> Result<bool> {
        let Some(version) = self.latest_version(branch).await? else {
            tracing::warn!(branch, "update helper reported no version");
            return Ok(false);
        };
        if self.payload(&version).exists() {
            tracing::info!(%version, "latest version is already downloaded");
            Ok(false)
        } else {
            tracing::info!(%version, "new version available");
            Ok(true)
        }
    }

    async fn apply(&self, branch: &str) -> Result<()> {
        let version = self
            .latest_version(branch)
            .await?
            .ok_or_else(|| WardenError::not_found(format!("no version published on {branch}")))?;
        let payload = self.payload(&version);
        if !payload.exists() {
            tracing::info!(%version, "downloading server package");
            self.stream(self.helper(branch), None).await?;
        }
        if !payload.exists() {
            return Err(WardenError::not_found(format!(
                "package {} missing after download",
                payload.display()
            )));
        }

        tracing::info!(package = %payload.display(), "extracting server package");
        let output = Command::new("unzip")
            .arg("-o")
            .arg(&payload)
            .arg("-d")
            .arg(&self.workdir)
            .stdout(Stdio::null())
            .output()
            .await
            .map_err(|e| WardenError::spawn("unzip", &e))?;
        if !output.status.success() {
            return Err(WardenError::command(format!(
                "unzip failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        if let Some(root) = &self.owner_root {
            Owner::of(root)?.apply_recursive(&self.workdir)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_pattern() {
        let re = version_pattern().unwrap();
        assert!(re.is_match("2026.1.14-abc123"));
        assert!(re.is_match("1.0.0"));
        assert!(!re.is_match("Please visit https://example.invalid/device"));
        assert!(!re.is_match("1.0"));
    }

    #[test]
    fn test_branch_argument() {
        let updater = CommandUpdater::new("/opt/dl", "/srv/game");
        let args = |branch: &str| -> Vec<String> {
            updater
                .helper(branch)
                .as_std()
                .get_args()
                .map(|a| a.to_string_lossy().into_owned())
                .collect()
        };
        assert!(args(LATEST_BRANCH).is_empty());
        assert_eq!(args("pre-release"), ["-patchline", "pre-release"]);
    }

    #[tokio::test]
    async fn test_missing_helper_is_tool_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let updater = CommandUpdater::new(dir.path().join("no-such-helper"), dir.path());
        let err = updater.latest_version("latest").await.unwrap_err();
        assert!(matches!(err, WardenError::ExternalToolUnavailable(_)));
    }

    #[cfg(unix)]
    fn script(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("helper.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_noisy_helper_does_not_block() {
        let dir = tempfile::tempdir().unwrap();
        let helper = script(
            dir.path(),
            "head -c 300000 /dev/zero | tr '\\0' 'e' >&2\n\
             echo 'Checking for updates'\n\
             echo 1.2.3\n\
             head -c 300000 /dev/zero | tr '\\0' 'o'",
        );
        let updater = CommandUpdater::new(helper, dir.path());

        let version = tokio::time::timeout(std::time::Duration::from_secs(30), updater.latest_version("latest"))
            .await
            .expect("helper output was not drained")
            .unwrap();
        assert_eq!(version.as_deref(), Some("1.2.3"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_downloaded_version_is_not_an_update() {
        let dir = tempfile::tempdir().unwrap();
        let helper = script(dir.path(), "echo 2026.1.14-abc123");
        let updater = CommandUpdater::new(helper, dir.path());
        assert!(updater.is_update_available("latest").await.unwrap());

        std::fs::write(dir.path().join("2026.1.14-abc123.zip"), b"").unwrap();
        assert!(!updater.is_update_available("latest").await.unwrap());
    }
}
