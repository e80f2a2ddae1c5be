//! Application-level query interface.
//!
//! Some game servers accept console commands on a systemd FIFO socket and
//! answer through their journal output. [`SocketQuery`] speaks that dialect;
//! the lifecycle code only relies on the [`QueryInterface`] trait.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;

use crate::error::{Result, WardenError};

/// Live command channel into a running instance.
#[async_trait]
pub trait QueryInterface: Send + Sync {
    /// Returns true if the instance currently accepts commands.
    async fn is_available(&self) -> bool;

    /// Connected players, or `None` when the interface is unavailable.
    async fn player_count(&self) -> Option<u32>;

    /// Broadcasts a chat message to connected players.
    async fn send_message(&self, message: &str) -> Result<()>;

    /// Forces a world save.
    async fn save_world(&self) -> Result<()>;
}

/// Command socket at `/var/run/<unit>.socket` with replies read from the journal.
#[derive(Debug, Clone)]
pub struct SocketQuery {
    unit: String,
    socket: PathBuf,
    world: String,
    listen: Duration,
}

impl SocketQuery {
    /// Creates a query for `unit` writing commands to `socket`.
    #[must_use]
    pub fn new(unit: impl Into<String>, socket: impl Into<PathBuf>) -> Self {
        Self {
            unit: unit.into(),
            socket: socket.into(),
            world: "default".to_string(),
            listen: Duration::from_secs(3),
        }
    }

    /// Sets the world name reported by `/who`.
    #[must_use]
    pub fn with_world(mut self, world: impl Into<String>) -> Self {
        self.world = world.into();
        self
    }

    /// Sets how long to follow the journal for a reply.
    #[must_use]
    pub const fn with_listen(mut self, listen: Duration) -> Self {
        self.listen = listen;
        self
    }

    /// Socket path.
    #[must_use]
    pub fn socket(&self) -> &Path {
        &self.socket
    }

    /// Writes one command line. Returns false if the socket is missing.
    async fn command(&self, command: &str) -> Result<bool> {
        if !self.socket.exists() {
            tracing::debug!(unit = %self.unit, "command socket not present");
            return Ok(false);
        }
        let mut socket = tokio::fs::OpenOptions::new()
            .write(true)
            .open(&self.socket)
            .await?;
        socket.write_all(format!("{command}\n").as_bytes()).await?;
        socket.flush().await?;
        tracing::debug!(unit = %self.unit, command, "sent console command");
        Ok(true)
    }

    /// Follows the journal until a `/who` reply arrives or the listen window closes.
    async fn read_player_reply(&self) -> Result<u32> {
        let mut child = Command::new("journalctl")
            .arg("-qfu")
            .arg(&self.unit)
            .arg("--no-pager")
            .stdout(Stdio::piped())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| WardenError::spawn("journalctl", &e))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| WardenError::command("journalctl produced no stdout"))?;
        let mut lines = BufReader::new(stdout).lines();

        let scan = async {
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(count) = parse_player_line(&line, &self.world) {
                    return Some(count);
                }
            }
            None
        };
        let players = tokio::time::timeout(self.listen, scan).await.ok().flatten();
        let _ = child.kill().await;
        Ok(players.unwrap_or(0))
    }
}

/// Parses `<timestamp>: <world> (<count>)` journal lines.
fn parse_player_line(line: &str, world: &str) -> Option<u32> {
    let (_, message) = line.trim().split_once(": ")?;
    let rest = message.trim().strip_prefix(world)?.strip_prefix(" (")?;
    let (count, _) = rest.split_once(')')?;
    count.trim().parse().ok()
}

#[async_trait]
impl QueryInterface for SocketQuery {
    async fn is_available(&self) -> bool {
        self.socket.exists()
    }

    async fn player_count(&self) -> Option<u32> {
        match self.command("/who").await {
            Ok(true) => {}
            Ok(false) => return None,
            Err(e) => {
                tracing::warn!(unit = %self.unit, error = %e, "player query failed");
                return None;
            }
        }
        match self.read_player_reply().await {
            Ok(count) => Some(count),
            Err(e) => {
                tracing::warn!(unit = %self.unit, error = %e, "could not read player reply");
                None
            }
        }
    }

    async fn send_message(&self, message: &str) -> Result<()> {
        self.command(&format!("/say {message}")).await.map(|_| ())
    }

    async fn save_world(&self) -> Result<()> {
        self.command("/world save").await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_player_line() {
        assert_eq!(
            parse_player_line("Jan 06 10:00:00 host java[42]: default (3): alice, bob, carol", "default"),
            Some(3)
        );
        assert_eq!(parse_player_line("host java[42]: default (0)", "default"), Some(0));
        assert_eq!(parse_player_line("host java[42]: lobby (2)", "default"), None);
        assert_eq!(parse_player_line("no separator here", "default"), None);
    }

    #[tokio::test]
    async fn test_missing_socket_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let query = SocketQuery::new("game", dir.path().join("game.socket"));
        assert!(!query.is_available().await);
        assert_eq!(query.player_count().await, None);
        query.send_message("hi").await.unwrap();
    }

    #[tokio::test]
    async fn test_commands_written_as_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("game.socket");
        std::fs::write(&path, "").unwrap();
        let query = SocketQuery::new("game", &path);
        query.send_message("Server restarting").await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "/say Server restarting\n");
    }
}
