//! Error types for warden-core.
//!
//! Every privileged, lifecycle or external-tool failure is reported as an
//! explicit variant; the CLI turns them into exit codes.

use warden_config::ConfigError;

/// Result type alias for service and orchestration operations.
pub type Result<T> = std::result::Result<T, WardenError>;

/// Error type for lifecycle and orchestration operations.
#[derive(Debug, thiserror::Error)]
pub enum WardenError {
    /// Service, option, archive or file not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The operation needs root privileges.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// A bounded wait ran out of attempts.
    #[error("timed out: {0}")]
    Timeout(String),

    /// An external program could not be executed.
    #[error("external tool unavailable: {0}")]
    ExternalToolUnavailable(String),

    /// The operation conflicts with current state (e.g. a live instance).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The unit reported a non-zero exit status while starting.
    #[error("{unit} failed to start, ExecMainStatus: {status}")]
    StartFailed {
        /// Unit name.
        unit: String,
        /// Last exit status.
        status: i32,
    },

    /// The unit's main process disappeared.
    #[error("{0}: process exited unexpectedly")]
    ProcessVanished(String),

    /// An external command ran but reported failure.
    #[error("command failed: {0}")]
    Command(String),

    /// The manager configuration file is invalid.
    #[error("invalid manager configuration: {0}")]
    InvalidConfig(String),

    /// Configuration error.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl WardenError {
    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Creates a permission error for an operation that requires root.
    #[must_use]
    pub fn permission_denied(operation: impl Into<String>) -> Self {
        Self::PermissionDenied(operation.into())
    }

    /// Creates a timeout error.
    #[must_use]
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Creates an external-tool error.
    #[must_use]
    pub fn tool_unavailable(tool: impl Into<String>) -> Self {
        Self::ExternalToolUnavailable(tool.into())
    }

    /// Creates a conflict error.
    #[must_use]
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Creates a command failure error.
    #[must_use]
    pub fn command(msg: impl Into<String>) -> Self {
        Self::Command(msg.into())
    }

    /// Creates a manager configuration error.
    #[must_use]
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Maps a process spawn failure, distinguishing a missing program.
    #[must_use]
    pub fn spawn(program: &str, err: &std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            Self::tool_unavailable(program)
        } else {
            Self::command(format!("{program}: {err}"))
        }
    }

    /// Returns true for not-found errors (including unknown options).
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Config(ConfigError::NotFound(_)))
    }

    /// Returns true if the operation was refused for lack of privileges.
    #[must_use]
    pub const fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied(_))
    }

    /// Returns true if the instance failed while starting.
    #[must_use]
    pub const fn is_start_failure(&self) -> bool {
        matches!(self, Self::StartFailed { .. } | Self::ProcessVanished(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = WardenError::StartFailed {
            unit: "hytale-server".to_string(),
            status: 1,
        };
        assert_eq!(err.to_string(), "hytale-server failed to start, ExecMainStatus: 1");
        assert!(err.is_start_failure());
    }

    #[test]
    fn test_spawn_not_found_maps_to_tool_unavailable() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        assert!(matches!(
            WardenError::spawn("ufw", &io),
            WardenError::ExternalToolUnavailable(tool) if tool == "ufw"
        ));
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert!(matches!(WardenError::spawn("ufw", &io), WardenError::Command(_)));
    }

    #[test]
    fn test_config_not_found_is_not_found() {
        let err: WardenError = ConfigError::not_found("Server Port").into();
        assert!(err.is_not_found());
        assert!(!err.is_permission_denied());
    }
}
