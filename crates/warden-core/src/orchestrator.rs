//! Application-wide coordination of every managed instance.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use warden_config::{ConfigStore, OptionInfo, OptionValue};

use crate::adapter::ProcessManager;
use crate::app::AppShared;
use crate::context::{DocumentSpec, ManagerConfig, ManagerContext, ServiceSpec};
use crate::error::{Result, WardenError};
use crate::firewall::{PortFirewallHook, WatchedPort};
use crate::keys;
use crate::policy::Tick;
use crate::query::SocketQuery;
use crate::service::{PortReport, ServiceHandle, ServiceInfo, ServiceMetrics, ServiceProfile};
use crate::updater::{CommandUpdater, UpdateSource};

/// Where a backed-up file comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ManifestKind {
    /// A config document.
    Config,
    /// A single save file.
    SaveFile,
    /// A save directory, copied recursively.
    SaveDirectory,
}

/// One file or directory covered by a backup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupManifestEntry {
    /// Absolute path on disk.
    pub source: PathBuf,
    /// Path inside the archive.
    pub destination: PathBuf,
    /// Entry kind.
    pub kind: ManifestKind,
}

/// Owns the app store and every [`ServiceHandle`].
pub struct Orchestrator {
    shared: Arc<AppShared>,
    services: Vec<ServiceHandle>,
    ctx: Arc<ManagerContext>,
    updater: Option<Arc<dyn UpdateSource>>,
    branch_option: String,
    save_directory: Option<PathBuf>,
    save_files: Vec<PathBuf>,
    backup_directory: PathBuf,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("shared", &self.shared)
            .field("services", &self.services)
            .field("has_updater", &self.updater.is_some())
            .finish_non_exhaustive()
    }
}

fn build_store(
    specs: &[DocumentSpec],
    definitions: &warden_config::OptionDefinitions,
    ctx: &ManagerContext,
) -> Result<ConfigStore> {
    let mut store = ConfigStore::new();
    for spec in specs {
        store.add_document(spec.build(definitions, ctx)?)?;
    }
    Ok(store)
}

fn build_service(
    spec: &ServiceSpec,
    definitions: &warden_config::OptionDefinitions,
    manager: &Arc<dyn ProcessManager>,
    ctx: &Arc<ManagerContext>,
) -> Result<ServiceHandle> {
    let mut store = build_store(&spec.documents, definitions, ctx)?;
    store.load()?;
    let profile = ServiceProfile {
        name_option: spec.name_option.clone(),
        max_players_option: spec.max_players_option.clone(),
        port_option: spec.port_option.clone(),
        ports: spec.ports.clone(),
    };
    let mut handle =
        ServiceHandle::new(&spec.unit, store, Arc::clone(manager), Arc::clone(ctx)).with_profile(profile);
    if let Some(query) = &spec.query {
        let socket = SocketQuery::new(&spec.unit, query.socket_path(&spec.unit))
            .with_world(&query.world)
            .with_listen(query.listen);
        handle = handle.with_query(Arc::new(socket));
    }
    Ok(handle)
}

impl Orchestrator {
    /// Creates an orchestrator around `shared` with no services.
    #[must_use]
    pub fn new(shared: AppShared, ctx: Arc<ManagerContext>) -> Self {
        Self {
            shared: Arc::new(shared),
            services: Vec::new(),
            ctx,
            updater: None,
            branch_option: keys::GAME_BRANCH.to_string(),
            save_directory: None,
            save_files: Vec::new(),
            backup_directory: PathBuf::from("backups"),
        }
    }

    /// Builds the orchestrator described by `config`.
    ///
    /// Loads option definitions, binds and loads every document, wires the
    /// query sockets and the port firewall hook.
    pub fn from_config(
        config: &ManagerConfig,
        ctx: ManagerContext,
        manager: Arc<dyn ProcessManager>,
    ) -> Result<Self> {
        let ctx = Arc::new(ctx);
        let definitions = config.load_definitions(&ctx)?;

        let mut store = build_store(&config.documents, &definitions, &ctx)?;
        if let Some(group) = config.documents.first().map(|doc| doc.group.clone()) {
            for descriptor in keys::builtin_options() {
                if !store.contains(descriptor.name()) {
                    store.register(&group, descriptor)?;
                }
            }
        }
        store.load()?;

        let watched: Vec<WatchedPort> = config
            .services
            .iter()
            .flat_map(|service| &service.ports)
            .filter_map(|port| {
                port.option.as_ref().map(|option| WatchedPort {
                    option: option.clone(),
                    protocol: port.protocol,
                    description: port.description.clone(),
                })
            })
            .collect();
        let shared = AppShared::new(&config.name, store)
            .with_description(&config.description)
            .with_hook(Arc::new(PortFirewallHook::new(watched)));

        let mut orchestrator = Self::new(shared, Arc::clone(&ctx));
        for spec in &config.services {
            orchestrator.add_service(build_service(spec, &definitions, &manager, &ctx)?);
        }

        if let Some(updater) = &config.updater {
            let workdir = updater
                .workdir
                .as_deref()
                .map_or_else(|| ctx.root().to_path_buf(), |dir| ctx.resolve(dir));
            let mut helper = CommandUpdater::new(ctx.resolve(&updater.command), workdir);
            if ctx.privileged() {
                helper = helper.with_owner_from(ctx.root());
            }
            orchestrator = orchestrator.with_updater(Arc::new(helper), &updater.branch_option);
        }

        orchestrator.save_directory = config.save_directory.as_deref().map(|dir| ctx.resolve(dir));
        orchestrator.save_files.clone_from(&config.save_files);
        orchestrator.backup_directory = ctx.resolve(&config.backup_directory);
        tracing::debug!(
            app = %config.name,
            services = orchestrator.services.len(),
            privileged = ctx.privileged(),
            "orchestrator ready"
        );
        Ok(orchestrator)
    }

    /// Adds a service and links it to the app.
    pub fn add_service(&mut self, mut service: ServiceHandle) {
        service.attach(&self.shared);
        self.services.push(service);
    }

    /// Uses `updater`, reading the branch from `branch_option`.
    #[must_use]
    pub fn with_updater(mut self, updater: Arc<dyn UpdateSource>, branch_option: &str) -> Self {
        self.updater = Some(updater);
        self.branch_option = branch_option.to_string();
        self
    }

    /// Sets the save directory and the entries of it that backups include.
    #[must_use]
    pub fn with_saves(mut self, directory: impl Into<PathBuf>, files: Vec<PathBuf>) -> Self {
        self.save_directory = Some(directory.into());
        self.save_files = files;
        self
    }

    /// Sets where backup archives are written.
    #[must_use]
    pub fn with_backup_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.backup_directory = directory.into();
        self
    }

    /// Shared app state.
    #[must_use]
    pub fn shared(&self) -> &Arc<AppShared> {
        &self.shared
    }

    /// Execution context.
    #[must_use]
    pub fn context(&self) -> &ManagerContext {
        &self.ctx
    }

    /// Application name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.shared.name()
    }

    /// Managed services in declaration order.
    #[must_use]
    pub fn services(&self) -> &[ServiceHandle] {
        &self.services
    }

    /// Service with unit name `unit`.
    pub fn service(&self, unit: &str) -> Result<&ServiceHandle> {
        self.services
            .iter()
            .find(|service| service.unit() == unit)
            .ok_or_else(|| WardenError::not_found(format!("service instance {unit}")))
    }

    /// Save directory, if any.
    #[must_use]
    pub fn save_directory(&self) -> Option<&Path> {
        self.save_directory.as_deref()
    }

    /// Backup archive directory.
    #[must_use]
    pub fn backup_directory(&self) -> &Path {
        &self.backup_directory
    }

    // -------------------------------------------------------------------------
    // Options
    // -------------------------------------------------------------------------

    /// Typed app option, `Empty` if unknown.
    #[must_use]
    pub fn get_option(&self, name: &str) -> OptionValue {
        self.shared.get_option(name)
    }

    /// Persists an app option; runs the hook if it changed.
    pub async fn set_option(&self, name: &str, value: &str) -> Result<bool> {
        self.shared.set_option(name, value).await
    }

    /// Lists every app option.
    #[must_use]
    pub fn describe_options(&self) -> Vec<OptionInfo> {
        self.shared.describe()
    }

    /// Writes the default of `name` if it has no stored value.
    pub fn ensure_set(&self, name: &str) -> Result<bool> {
        self.shared.ensure_set(name)
    }

    /// Sends a notice through the app notifier.
    pub async fn send_notice(&self, message: &str) {
        self.shared.notify(message).await;
    }

    // -------------------------------------------------------------------------
    // Fleet state
    // -------------------------------------------------------------------------

    /// Returns true if any service is running, starting or stopping.
    pub async fn is_active(&self) -> bool {
        for service in &self.services {
            if service.is_active().await {
                return true;
            }
        }
        false
    }

    /// Returns true if any service is running.
    pub async fn is_running(&self) -> bool {
        for service in &self.services {
            if service.is_running().await {
                return true;
            }
        }
        false
    }

    /// Returns true if any service has connected players.
    pub async fn has_players(&self) -> bool {
        for service in &self.services {
            if service.player_count().await.is_some_and(|players| players > 0) {
                return true;
            }
        }
        false
    }

    // -------------------------------------------------------------------------
    // Updates
    // -------------------------------------------------------------------------

    fn updater(&self) -> Result<&Arc<dyn UpdateSource>> {
        self.updater
            .as_ref()
            .ok_or_else(|| WardenError::tool_unavailable("no update helper configured"))
    }

    fn branch(&self) -> String {
        self.shared.text(&self.branch_option)
    }

    /// Returns true if the update helper reports a version not yet downloaded.
    pub async fn check_update_available(&self) -> Result<bool> {
        self.updater()?.is_update_available(&self.branch()).await
    }

    /// Stops the fleet, installs the latest payload and restarts what was running.
    pub async fn update(&self) -> Result<()> {
        self.ctx.require_privileged("update")?;
        let updater = self.updater()?;

        let mut previously_running = Vec::new();
        for service in &self.services {
            if service.is_running().await || service.is_starting().await {
                tracing::info!(unit = %service.unit(), "stopping instance for update");
                service.request_stop().await?;
                previously_running.push(service);
            }
        }

        if previously_running.is_empty() {
            tracing::info!("no running instances, proceeding with update");
        } else {
            self.wait_for_drain().await?;
        }

        updater.apply(&self.branch()).await?;
        tracing::info!(app = %self.name(), "update installed");
        self.start_all(previously_running).await
    }

    /// Waits until no service is active.
    pub(crate) async fn wait_for_drain(&self) -> Result<()> {
        let policy = self.ctx.timings().drain_policy();
        tracing::info!(
            budget = %humantime::format_duration(policy.budget()),
            "waiting for all instances to stop"
        );
        let this = self;
        let drained = policy
            .run(move |_| async move {
                if this.is_active().await { Tick::Continue } else { Tick::Done(()) }
            })
            .await?;
        drained.ok_or_else(|| WardenError::timeout("instances did not stop within the drain window"))
    }

    /// Starts each service, continuing past failures.
    pub(crate) async fn start_all(&self, services: Vec<&ServiceHandle>) -> Result<()> {
        let mut failed = Vec::new();
        for service in services {
            tracing::info!(unit = %service.unit(), "restarting instance");
            if let Err(e) = service.start().await {
                tracing::error!(unit = %service.unit(), error = %e, "instance failed to restart");
                failed.push(service.unit().to_string());
            }
        }
        if failed.is_empty() {
            Ok(())
        } else {
            Err(WardenError::command(format!("failed to restart: {}", failed.join(", "))))
        }
    }

    // -------------------------------------------------------------------------
    // Reports
    // -------------------------------------------------------------------------

    /// Files and directories a backup covers.
    ///
    /// App configs go to `config/`, instance configs to `<unit>/`, save
    /// entries to `save/`. Missing sources are listed too; the backup engine
    /// skips them.
    #[must_use]
    pub fn backup_manifest(&self) -> Vec<BackupManifestEntry> {
        let mut entries = Vec::new();
        let base = |path: &Path| path.file_name().map(PathBuf::from).unwrap_or_default();

        for path in self.shared.store().paths() {
            entries.push(BackupManifestEntry {
                source: path.to_path_buf(),
                destination: Path::new("config").join(base(path)),
                kind: ManifestKind::Config,
            });
        }
        for service in &self.services {
            for path in service.config_paths() {
                entries.push(BackupManifestEntry {
                    destination: Path::new(service.unit()).join(base(&path)),
                    source: path,
                    kind: ManifestKind::Config,
                });
            }
        }
        if let Some(save) = &self.save_directory {
            for file in &self.save_files {
                let source = save.join(file);
                let kind = if source.is_dir() {
                    ManifestKind::SaveDirectory
                } else {
                    ManifestKind::SaveFile
                };
                entries.push(BackupManifestEntry {
                    destination: Path::new("save").join(file),
                    source,
                    kind,
                });
            }
        }
        entries
    }

    /// Port listing of `services`.
    #[must_use]
    pub fn port_report(services: &[&ServiceHandle]) -> Vec<PortReport> {
        services.iter().flat_map(|service| service.port_definitions()).collect()
    }

    /// Service listing of `services`.
    pub async fn service_report(services: &[&ServiceHandle]) -> Vec<ServiceInfo> {
        let mut report = Vec::with_capacity(services.len());
        for service in services {
            report.push(service.info().await);
        }
        report
    }

    /// Metrics of `services`.
    pub async fn metrics(services: &[&ServiceHandle]) -> Vec<ServiceMetrics> {
        let mut report = Vec::with_capacity(services.len());
        for service in services {
            report.push(service.metrics().await);
        }
        report
    }
}
