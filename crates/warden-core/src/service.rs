//! Lifecycle state machine of one managed instance.
//!
//! State is derived from the process manager on every query and never cached.
//! Long operations (`start`, `pre_stop`, `post_start`) are bounded tick loops
//! driven by [`RetryPolicy`](crate::RetryPolicy) values from the context.

use std::future::Future;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use serde::Serialize;
use warden_config::{ConfigStore, OptionInfo, OptionValue};

use crate::adapter::ProcessManager;
use crate::app::{AppShared, apply_change};
use crate::context::{ManagerContext, PortSpec};
use crate::error::{Result, WardenError};
use crate::firewall::Protocol;
use crate::keys;
use crate::policy::Tick;
use crate::query::QueryInterface;
use crate::types::{ExecStatus, ResourceUsage, ServiceState};

/// Journal lines surfaced when a start fails.
const FAILURE_LOG_LINES: usize = 20;

/// Result of a start request that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// The instance reported ready.
    Ready,
    /// Nothing to do, already running.
    AlreadyRunning,
    /// Nothing to do, already starting.
    AlreadyStarting,
    /// Restart requested on a stopped instance.
    NotRunning,
    /// The wait was interrupted; the instance keeps whatever state it reached.
    Cancelled,
}

/// Option names that give an instance its identity.
#[derive(Debug, Clone, Default)]
pub struct ServiceProfile {
    /// Option holding the display name.
    pub name_option: Option<String>,
    /// Option holding the player limit.
    pub max_players_option: Option<String>,
    /// Option holding the main port.
    pub port_option: Option<String>,
    /// Declared ports.
    pub ports: Vec<PortSpec>,
}

/// One entry of the port listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortReport {
    /// Port number (the option's current value for configurable ports).
    pub value: OptionValue,
    /// Option holding the port, `None` for fixed ports.
    pub config: Option<String>,
    /// Unit name.
    pub service: String,
    /// Protocol.
    pub protocol: Protocol,
    /// What the port is for.
    pub description: String,
}

/// Static facts about an instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceInfo {
    /// Unit name.
    pub service: String,
    /// Display name.
    pub name: String,
    /// Main port.
    pub port: Option<u16>,
    /// Starts at boot.
    pub enabled: bool,
    /// Player limit.
    pub max_players: Option<i64>,
}

/// Live snapshot of an instance.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceMetrics {
    /// Unit name.
    pub service: String,
    /// Display name.
    pub name: String,
    /// Main port.
    pub port: Option<u16>,
    /// Status word.
    pub status: &'static str,
    /// Starts at boot.
    pub enabled: bool,
    /// Connected player names, when the query interface can list them.
    pub players: Vec<String>,
    /// Connected players.
    pub player_count: Option<u32>,
    /// Player limit.
    pub max_players: Option<i64>,
    /// Formatted memory usage.
    pub memory_usage: String,
    /// Formatted CPU usage.
    pub cpu_usage: String,
    /// Game process id.
    pub game_pid: u32,
    /// Unit main process id.
    pub service_pid: u32,
    /// `ExecStartPre` record.
    pub pre_exec: Option<ExecStatus>,
    /// `ExecStart` record.
    pub start_exec: Option<ExecStatus>,
}

/// Handle to one managed instance.
pub struct ServiceHandle {
    unit: String,
    store: RwLock<ConfigStore>,
    profile: ServiceProfile,
    manager: Arc<dyn ProcessManager>,
    query: Option<Arc<dyn QueryInterface>>,
    app: Weak<AppShared>,
    ctx: Arc<ManagerContext>,
}

impl std::fmt::Debug for ServiceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceHandle")
            .field("unit", &self.unit)
            .field("profile", &self.profile)
            .field("has_query", &self.query.is_some())
            .finish_non_exhaustive()
    }
}

impl ServiceHandle {
    /// Creates a handle for `unit` with its own config store.
    #[must_use]
    pub fn new(
        unit: impl Into<String>,
        store: ConfigStore,
        manager: Arc<dyn ProcessManager>,
        ctx: Arc<ManagerContext>,
    ) -> Self {
        Self {
            unit: unit.into(),
            store: RwLock::new(store),
            profile: ServiceProfile::default(),
            manager,
            query: None,
            app: Weak::new(),
            ctx,
        }
    }

    /// Sets the identity options.
    #[must_use]
    pub fn with_profile(mut self, profile: ServiceProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Attaches a query interface.
    #[must_use]
    pub fn with_query(mut self, query: Arc<dyn QueryInterface>) -> Self {
        self.query = Some(query);
        self
    }

    /// Links the handle to its application.
    pub fn attach(&mut self, app: &Arc<AppShared>) {
        self.app = Arc::downgrade(app);
    }

    /// Unit name.
    #[must_use]
    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Identity options.
    #[must_use]
    pub const fn profile(&self) -> &ServiceProfile {
        &self.profile
    }

    /// Shared runtime context.
    #[must_use]
    pub fn context(&self) -> &ManagerContext {
        &self.ctx
    }

    pub(crate) fn app(&self) -> Option<Arc<AppShared>> {
        self.app.upgrade()
    }

    /// Query interface, if configured and currently accepting commands.
    async fn live_query(&self) -> Option<&dyn QueryInterface> {
        let query = self.query.as_deref()?;
        query.is_available().await.then_some(query)
    }

    // -------------------------------------------------------------------------
    // State
    // -------------------------------------------------------------------------

    /// Current lifecycle state.
    pub async fn state(&self) -> Result<ServiceState> {
        let active = self.manager.active_state(&self.unit).await?;
        let status = self.manager.exec_main_status(&self.unit).await?;
        Ok(ServiceState::from_active(&active, status))
    }

    async fn state_or_stopped(&self) -> ServiceState {
        match self.state().await {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(unit = %self.unit, error = %e, "could not query unit state");
                ServiceState::Stopped
            }
        }
    }

    /// Returns true if running.
    pub async fn is_running(&self) -> bool {
        self.state_or_stopped().await == ServiceState::Running
    }

    /// Returns true if starting.
    pub async fn is_starting(&self) -> bool {
        self.state_or_stopped().await == ServiceState::Starting
    }

    /// Returns true if stopping.
    pub async fn is_stopping(&self) -> bool {
        self.state_or_stopped().await == ServiceState::Stopping
    }

    /// Returns true if running, starting or stopping.
    pub async fn is_active(&self) -> bool {
        self.state_or_stopped().await.is_active()
    }

    /// Returns true if the unit starts at boot.
    pub async fn is_enabled(&self) -> bool {
        self.manager.is_enabled(&self.unit).await.unwrap_or_else(|e| {
            tracing::warn!(unit = %self.unit, error = %e, "could not query enablement");
            false
        })
    }

    /// Enables the unit for boot.
    pub async fn enable(&self) -> Result<()> {
        self.ctx.require_privileged("enable")?;
        self.manager.enable(&self.unit).await
    }

    /// Disables the unit for boot.
    pub async fn disable(&self) -> Result<()> {
        self.ctx.require_privileged("disable")?;
        self.manager.disable(&self.unit).await
    }

    /// Main process id, 0 when not running.
    pub async fn pid(&self) -> u32 {
        self.manager.main_pid(&self.unit).await.unwrap_or(0)
    }

    /// Exit status of the last main process.
    pub async fn exec_main_status(&self) -> i32 {
        self.manager.exec_main_status(&self.unit).await.unwrap_or(0)
    }

    /// Parsed `ExecStart` record.
    pub async fn exec_start_status(&self) -> Option<ExecStatus> {
        self.manager.exec_status(&self.unit, "ExecStart").await.ok().flatten()
    }

    /// Parsed `ExecStartPre` record.
    pub async fn exec_start_pre_status(&self) -> Option<ExecStatus> {
        self.manager.exec_status(&self.unit, "ExecStartPre").await.ok().flatten()
    }

    /// Last `lines` journal lines.
    pub async fn logs(&self, lines: usize) -> Result<String> {
        self.manager.logs(&self.unit, lines).await
    }

    async fn surface_logs(&self) {
        match self.logs(FAILURE_LOG_LINES).await {
            Ok(logs) => {
                for line in logs.lines() {
                    tracing::error!(unit = %self.unit, "{line}");
                }
            }
            Err(e) => tracing::warn!(unit = %self.unit, error = %e, "could not read logs"),
        }
    }

    /// Memory and CPU sample of the main process.
    pub async fn resource_usage(&self) -> ResourceUsage {
        let pid = self.pid().await;
        if pid == 0 {
            return ResourceUsage::default();
        }
        self.manager.resource_usage(pid).await.unwrap_or_default()
    }

    /// Formatted memory usage.
    pub async fn memory_usage(&self) -> String {
        self.resource_usage().await.memory_display()
    }

    /// Formatted CPU usage.
    pub async fn cpu_usage(&self) -> String {
        self.resource_usage().await.cpu_display()
    }

    // -------------------------------------------------------------------------
    // Options
    // -------------------------------------------------------------------------

    /// Typed instance option, `Empty` if unknown.
    #[must_use]
    pub fn get_option(&self, name: &str) -> OptionValue {
        self.store.read().get(name)
    }

    /// Typed instance option.
    pub fn try_get_option(&self, name: &str) -> Result<OptionValue> {
        Ok(self.store.read().try_get(name)?)
    }

    /// Persists `value`; runs the app hook if it changed.
    ///
    /// Returns true if a change was written.
    pub async fn set_option(&self, name: &str, value: &str) -> Result<bool> {
        let change = self.store.write().set_str(name, value)?;
        match self.app() {
            Some(app) => apply_change(&app.hook(), change).await,
            None => Ok(change.is_some()),
        }
    }

    /// Lists every instance option.
    #[must_use]
    pub fn describe_options(&self) -> Vec<OptionInfo> {
        self.store.read().describe()
    }

    /// Writes the default of `name` if it has no stored value.
    pub fn ensure_set(&self, name: &str) -> Result<bool> {
        Ok(self.store.write().ensure_set(name)?.is_some())
    }

    /// Paths of the instance config files.
    #[must_use]
    pub fn config_paths(&self) -> Vec<std::path::PathBuf> {
        self.store.read().paths().map(std::path::Path::to_path_buf).collect()
    }

    /// Display name: the name option, or the unit if unset.
    #[must_use]
    pub fn name(&self) -> String {
        let name = self
            .profile
            .name_option
            .as_deref()
            .map(|option| self.get_option(option).as_text())
            .unwrap_or_default();
        if name.is_empty() { self.unit.clone() } else { name }
    }

    /// Main port.
    #[must_use]
    pub fn port(&self) -> Option<u16> {
        if let Some(option) = &self.profile.port_option {
            return self
                .get_option(option)
                .as_int()
                .and_then(|port| u16::try_from(port).ok());
        }
        self.profile.ports.iter().find_map(|port| port.value)
    }

    /// Player limit.
    #[must_use]
    pub fn max_players(&self) -> Option<i64> {
        self.profile
            .max_players_option
            .as_deref()
            .and_then(|option| self.get_option(option).as_int())
    }

    /// Declared ports with their current values.
    #[must_use]
    pub fn port_definitions(&self) -> Vec<PortReport> {
        self.profile
            .ports
            .iter()
            .map(|port| PortReport {
                value: match (&port.option, port.value) {
                    (Some(option), _) => self.get_option(option),
                    (None, Some(value)) => OptionValue::Int(i64::from(value)),
                    (None, None) => OptionValue::Empty,
                },
                config: port.option.clone(),
                service: self.unit.clone(),
                protocol: port.protocol,
                description: port.description.clone(),
            })
            .collect()
    }

    // -------------------------------------------------------------------------
    // Query interface
    // -------------------------------------------------------------------------

    /// Connected players, `None` when unknown.
    pub async fn player_count(&self) -> Option<u32> {
        self.live_query().await?.player_count().await
    }

    /// Returns true if the query interface is accepting commands.
    pub async fn has_query(&self) -> bool {
        self.live_query().await.is_some()
    }

    /// Broadcasts a chat message; a no-op without a query interface.
    pub async fn send_message(&self, message: &str) -> Result<()> {
        match self.live_query().await {
            Some(query) => {
                tracing::info!(unit = %self.unit, %message, "sending player message");
                query.send_message(message).await
            }
            None => Ok(()),
        }
    }

    /// Forces a world save; a no-op without a query interface.
    pub async fn save_world(&self) -> Result<()> {
        match self.live_query().await {
            Some(query) => query.save_world().await,
            None => Ok(()),
        }
    }

    // -------------------------------------------------------------------------
    // Reports
    // -------------------------------------------------------------------------

    /// Static facts for the service listing.
    pub async fn info(&self) -> ServiceInfo {
        ServiceInfo {
            service: self.unit.clone(),
            name: self.name(),
            port: self.port(),
            enabled: self.is_enabled().await,
            max_players: self.max_players(),
        }
    }

    /// Live snapshot for the metrics listing.
    pub async fn metrics(&self) -> ServiceMetrics {
        let state = self.state_or_stopped().await;
        let pid = self.pid().await;
        let usage = if pid == 0 {
            ResourceUsage::default()
        } else {
            self.manager.resource_usage(pid).await.unwrap_or_default()
        };
        ServiceMetrics {
            service: self.unit.clone(),
            name: self.name(),
            port: self.port(),
            status: state.as_str(),
            enabled: self.is_enabled().await,
            players: Vec::new(),
            player_count: self.player_count().await,
            max_players: self.max_players(),
            memory_usage: usage.memory_display(),
            cpu_usage: usage.cpu_display(),
            game_pid: pid,
            service_pid: pid,
            pre_exec: self.exec_start_pre_status().await,
            start_exec: self.exec_start_status().await,
        }
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Starts the instance and waits for it to report ready.
    ///
    /// Ctrl-C cancels the wait only; the start request stands.
    pub async fn start(&self) -> Result<StartOutcome> {
        self.start_with_cancel(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
    }

    /// [`start`](Self::start) with a caller-supplied cancellation future.
    pub async fn start_with_cancel<C>(&self, cancel: C) -> Result<StartOutcome>
    where
        C: Future<Output = ()>,
    {
        match self.state_or_stopped().await {
            ServiceState::Running => {
                tracing::warn!(unit = %self.unit, "instance is already running");
                return Ok(StartOutcome::AlreadyRunning);
            }
            ServiceState::Starting => {
                tracing::warn!(unit = %self.unit, "instance is already starting");
                return Ok(StartOutcome::AlreadyStarting);
            }
            _ => {}
        }
        self.ctx.require_privileged("start")?;

        tracing::info!(unit = %self.unit, "starting instance");
        self.manager.start(&self.unit).await?;

        let timings = self.ctx.timings();
        let policy = timings.start_policy();
        let this = self;
        let wait = policy.run(move |attempt| async move {
            let status = match this.manager.exec_main_status(&this.unit).await {
                Ok(status) => status,
                Err(e) => return Tick::Abort(e),
            };
            if status != 0 {
                this.surface_logs().await;
                return Tick::Abort(WardenError::StartFailed {
                    unit: this.unit.clone(),
                    status,
                });
            }
            let pid = this.pid().await;
            if pid == 0 {
                this.surface_logs().await;
                return Tick::Abort(WardenError::ProcessVanished(this.unit.clone()));
            }

            let usage = this.manager.resource_usage(pid).await.unwrap_or_default();
            let elapsed = policy.elapsed_at(attempt);
            let (ready, query) = match this.live_query().await {
                Some(query) => {
                    let connected = query.player_count().await.is_some();
                    (connected, if connected { "connected" } else { "waiting" })
                }
                None => (elapsed >= timings.ready_without_query, "not enabled"),
            };
            tracing::info!(
                unit = %this.unit,
                elapsed = %humantime::format_duration(elapsed),
                pid,
                cpu = %usage.cpu_display(),
                memory = %usage.memory_display(),
                query,
                "waiting for instance"
            );
            if ready { Tick::Done(()) } else { Tick::Continue }
        });

        tokio::select! {
            result = wait => match result? {
                Some(()) => {
                    tracing::info!(unit = %self.unit, "instance started successfully");
                    tokio::time::sleep(timings.ready_settle).await;
                    Ok(StartOutcome::Ready)
                }
                None => Err(WardenError::timeout(format!(
                    "{} did not become ready within {}",
                    self.unit,
                    humantime::format_duration(policy.budget())
                ))),
            },
            () = cancel => {
                tracing::warn!(unit = %self.unit, "cancelled startup wait, instance is probably still starting");
                Ok(StartOutcome::Cancelled)
            }
        }
    }

    /// Requests a stop and waits briefly.
    pub async fn stop(&self) -> Result<()> {
        self.ctx.require_privileged("stop")?;
        tracing::info!(unit = %self.unit, "stopping instance");
        self.manager.stop(&self.unit).await?;
        tokio::time::sleep(self.ctx.timings().stop_settle).await;
        Ok(())
    }

    /// Requests a stop without the settle wait.
    pub async fn request_stop(&self) -> Result<()> {
        self.ctx.require_privileged("stop")?;
        tracing::info!(unit = %self.unit, "requesting stop");
        self.manager.stop(&self.unit).await
    }

    /// Stops then starts a running instance.
    pub async fn restart(&self) -> Result<StartOutcome> {
        if !self.is_running().await {
            tracing::warn!(unit = %self.unit, "instance is not currently running");
            return Ok(StartOutcome::NotRunning);
        }
        self.stop().await?;
        self.start().await
    }

    /// Pre-stop hook: notify, warn connected players, then save.
    pub async fn pre_stop(&self) -> Result<()> {
        let app = self.app();
        if let Some(app) = &app {
            app.notify_instance(keys::INSTANCE_STOPPING, &self.name()).await;
        }

        if let Some(query) = self.live_query().await {
            for (option, fallback, wait) in keys::SHUTDOWN_WARNINGS {
                match query.player_count().await {
                    Some(players) if players > 0 => {}
                    _ => break,
                }
                let message = app
                    .as_ref()
                    .map_or_else(|| fallback.to_string(), |app| app.text_or(option, fallback));
                tracing::info!(unit = %self.unit, %message, "players online, sending warning");
                query.send_message(&message).await?;
                if !wait.is_zero() {
                    tokio::time::sleep(wait).await;
                }
            }

            tracing::info!(unit = %self.unit, "forcing world save");
            query.save_world().await?;
            tokio::time::sleep(self.ctx.timings().save_settle).await;
        }
        Ok(())
    }

    /// Post-start hook: wait for the query interface, then notify.
    pub async fn post_start(&self) -> Result<()> {
        let Some(query) = self.live_query().await else {
            return Ok(());
        };
        let policy = self.ctx.timings().post_start_policy();
        let this = self;
        tracing::info!(unit = %self.unit, "waiting for query interface");
        let answered = policy
            .run(move |_| async move {
                if query.player_count().await.is_some() {
                    return Tick::Done(());
                }
                tracing::debug!(unit = %this.unit, "query interface not available yet");
                if this.pid().await == 0 {
                    return Tick::Abort(WardenError::ProcessVanished(this.unit.clone()));
                }
                Tick::Continue
            })
            .await?;

        match answered {
            Some(()) => {
                if let Some(app) = self.app() {
                    app.notify_instance(keys::INSTANCE_STARTED, &self.name()).await;
                }
                Ok(())
            }
            None => Err(WardenError::timeout(format!(
                "{} query interface did not reply within {}",
                self.unit,
                humantime::format_duration(policy.budget())
            ))),
        }
    }
}
