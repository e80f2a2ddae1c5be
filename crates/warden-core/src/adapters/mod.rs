//! Process manager implementations.

pub mod systemd;

pub use systemd::SystemdManager;
