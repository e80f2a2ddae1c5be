// Allow unwrap/expect in tests for clear failure messages
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! # warden-core
//!
//! Lifecycle management for game-server instances supervised by systemd.
//!
//! - [`ProcessManager`] trait over the supervisor, with [`SystemdManager`]
//! - [`ServiceHandle`] for one instance: state, options, start/stop waits
//! - [`Orchestrator`] for the application and all of its instances
//! - [`delayed_fleet`] / [`delayed_single`] for warned stops, restarts and updates
//! - [`RetryPolicy`] for every bounded wait, so tests run in virtual time
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use warden_core::{ManagerConfig, ManagerContext, Orchestrator, SystemdManager};
//!
//! let config = ManagerConfig::load("/srv/game/warden.toml")?;
//! let ctx = ManagerContext::detect("/srv/game", config.timings.clone());
//! let app = Orchestrator::from_config(&config, ctx, Arc::new(SystemdManager::new()))?;
//! for service in app.services() {
//!     println!("{} {}", service.unit(), service.state().await?);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Read guards are taken per statement; the lint does not see that
#![allow(clippy::significant_drop_tightening)]

pub mod adapter;
pub mod adapters;
pub mod app;
pub mod context;
pub mod delayed;
pub mod error;
pub mod firewall;
pub mod hook;
pub mod keys;
pub mod notify;
pub mod orchestrator;
pub mod policy;
pub mod query;
pub mod service;
#[cfg(test)]
pub mod tests;
pub mod types;
pub mod updater;

pub use adapter::ProcessManager;
pub use adapters::SystemdManager;
pub use app::AppShared;
pub use context::{
    DocumentSpec, LifecycleTimings, ManagerConfig, ManagerContext, PortSpec, QuerySpec, ServiceSpec,
    UpdaterSpec,
};
pub use delayed::{DelayedAction, delayed_fleet, delayed_single};
pub use error::{Result, WardenError};
pub use firewall::{Firewall, FirewallKind, PortFirewallHook, Protocol, RuleRunner, SystemRunner, WatchedPort};
pub use hook::{NoopHook, OptionHook};
pub use notify::{LogNotifier, Notifier};
pub use orchestrator::{BackupManifestEntry, ManifestKind, Orchestrator};
pub use policy::{RetryPolicy, Tick};
pub use query::{QueryInterface, SocketQuery};
pub use service::{PortReport, ServiceHandle, ServiceInfo, ServiceMetrics, ServiceProfile, StartOutcome};
pub use types::{ActiveState, ExecStatus, ResourceUsage, ServiceState};
pub use updater::{CommandUpdater, LATEST_BRANCH, UpdateSource};
