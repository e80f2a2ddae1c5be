//! Error types for warden-config.
//!
//! Unknown options and unparsable values are reported explicitly; callers
//! decide whether to degrade to a sentinel or fail the operation.

use std::path::PathBuf;

/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Error type for option registry and format backend operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Option name is not registered in any bound document.
    #[error("option not found: {0}")]
    NotFound(String),

    /// Value cannot be represented as the option's declared type.
    #[error("invalid value {value:?} for option {option}: expected {expected}")]
    InvalidValue {
        /// The option being written or read.
        option: String,
        /// The offending value.
        value: String,
        /// Declared type of the option.
        expected: &'static str,
    },

    /// Duplicate registration or otherwise conflicting definitions.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A config file exists but could not be parsed.
    #[error("failed to parse {path}: {message}")]
    Parse {
        /// File being parsed.
        path: PathBuf,
        /// Parser diagnostic.
        message: String,
    },

    /// The option definition table is malformed.
    #[error("invalid option definitions: {0}")]
    Definitions(String),

    /// Ownership could not be applied to a written file.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(option: impl Into<String>) -> Self {
        Self::NotFound(option.into())
    }

    /// Creates a conflict error.
    #[must_use]
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Creates a parse error for the given file.
    #[must_use]
    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates an option-definitions error.
    #[must_use]
    pub fn definitions(msg: impl Into<String>) -> Self {
        Self::Definitions(msg.into())
    }

    /// Returns true if the error only means the option is unknown.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
