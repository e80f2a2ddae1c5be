//! Error types for warden-backup.

use std::path::Path;

use warden_config::ConfigError;
use warden_core::WardenError;

/// Result type alias for backup operations.
pub type Result<T> = std::result::Result<T, BackupError>;

/// Error type for backup and restore.
#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    /// Archive or source missing.
    #[error("not found: {0}")]
    NotFound(String),

    /// Restore attempted while an instance is live.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Archive could not be written or read.
    #[error("archive {path}: {message}")]
    Archive {
        /// Archive path.
        path: String,
        /// Underlying failure.
        message: String,
    },

    /// Ownership could not be read or applied.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Lifecycle query failed.
    #[error(transparent)]
    Core(#[from] WardenError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BackupError {
    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Creates a conflict error.
    #[must_use]
    pub fn conflict(reason: impl Into<String>) -> Self {
        Self::Conflict(reason.into())
    }

    /// Creates an archive error for `path`.
    #[must_use]
    pub fn archive(path: &Path, err: &std::io::Error) -> Self {
        Self::Archive {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }

    /// Returns true if this is a not-found error.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns true if this is a conflict error.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_error_names_path() {
        let err = BackupError::archive(
            Path::new("/srv/backups/a.tar.gz"),
            &std::io::Error::other("corrupt deflate stream"),
        );
        assert_eq!(err.to_string(), "archive /srv/backups/a.tar.gz: corrupt deflate stream");
    }

    #[test]
    fn test_classification() {
        assert!(BackupError::not_found("x").is_not_found());
        assert!(BackupError::conflict("live").is_conflict());
        assert!(!BackupError::conflict("live").is_not_found());
    }
}
