// Allow unwrap/expect in tests
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! Warden: game server instance manager built on systemd.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use warden::prelude::*;
//!
//! let config = ManagerConfig::load("warden.toml")?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;

pub use warden_backup as backup;
pub use warden_config as config;
pub use warden_core as core;

/// Prelude module for common imports.
pub mod prelude {
    pub use warden_backup::{BackupEngine, BackupError};
    pub use warden_config::{ConfigDocument, ConfigStore, FormatKind, OptionDescriptor, OptionKind, OptionValue};
    pub use warden_core::{
        DelayedAction, ManagerConfig, ManagerContext, Orchestrator, ProcessManager, ServiceHandle,
        ServiceState, StartOutcome, SystemdManager, WardenError,
    };
}
