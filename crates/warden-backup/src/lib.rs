// Allow unwrap/expect in tests for clear failure messages
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! # warden-backup
//!
//! Backup and restore of an application's config documents and save data.
//!
//! Archives are gzip tarballs named `<name>-backup-<YYYYMMDD-HHMMSS>.tar.gz`
//! with this layout:
//!
//! ```text
//! config/<file>      app-level config documents
//! <unit>/<file>      config documents of each instance
//! save/<entry>       save files and directories
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use warden_backup::BackupEngine;
//!
//! let engine = BackupEngine::new(&orchestrator);
//! let archive = engine.backup(5)?;
//! engine.restore(&archive).await?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod archive;
pub mod engine;
pub mod error;

pub use archive::{enforce_retention, list_archives, sanitize_name};
pub use engine::{BackupEngine, Staging};
pub use error::{BackupError, Result};
