//! Manager configuration and the shared execution context.
//!
//! `warden.toml` describes one installation: the app-level config documents,
//! each managed instance with its own documents and query socket, and the
//! directories that backups cover. It is validated when loaded.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use warden_config::{ConfigDocument, FormatKind, OptionDefinitions};

use crate::error::{Result, WardenError};
use crate::firewall::Protocol;
use crate::policy::RetryPolicy;

// =============================================================================
// Lifecycle timings
// =============================================================================

/// Waits and tick budgets of every lifecycle operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleTimings {
    /// Sleep after `systemctl start` before the first probe.
    #[serde(with = "humantime_serde")]
    pub start_grace: Duration,
    /// Delay between start probes.
    #[serde(with = "humantime_serde")]
    pub start_interval: Duration,
    /// Start probe budget.
    pub start_attempts: u32,
    /// Instances without a query interface count as ready after this long.
    #[serde(with = "humantime_serde")]
    pub ready_without_query: Duration,
    /// Sleep after readiness is detected.
    #[serde(with = "humantime_serde")]
    pub ready_settle: Duration,
    /// Sleep before the first post-start probe.
    #[serde(with = "humantime_serde")]
    pub post_start_delay: Duration,
    /// Delay between post-start probes.
    #[serde(with = "humantime_serde")]
    pub post_start_interval: Duration,
    /// Post-start probe budget.
    pub post_start_attempts: u32,
    /// Sleep after `systemctl stop`.
    #[serde(with = "humantime_serde")]
    pub stop_settle: Duration,
    /// Sleep after a forced world save.
    #[serde(with = "humantime_serde")]
    pub save_settle: Duration,
    /// Delay between drain checks during an update.
    #[serde(with = "humantime_serde")]
    pub drain_interval: Duration,
    /// Drain check budget during an update.
    pub drain_attempts: u32,
    /// Length of one delayed-action tick.
    #[serde(with = "humantime_serde")]
    pub delayed_tick: Duration,
    /// Delayed-action budget in ticks (minutes of warnings).
    pub delayed_ticks: u32,
}

impl Default for LifecycleTimings {
    fn default() -> Self {
        Self {
            start_grace: Duration::from_secs(10),
            start_interval: Duration::from_secs(1),
            start_attempts: 240,
            ready_without_query: Duration::from_secs(60),
            ready_settle: Duration::from_secs(5),
            post_start_delay: Duration::from_secs(15),
            post_start_interval: Duration::from_secs(10),
            post_start_attempts: 24,
            stop_settle: Duration::from_secs(10),
            save_settle: Duration::from_secs(5),
            drain_interval: Duration::from_secs(10),
            drain_attempts: 30,
            delayed_tick: Duration::from_secs(60),
            delayed_ticks: 55,
        }
    }
}

impl LifecycleTimings {
    /// Polling schedule of `start`.
    #[must_use]
    pub const fn start_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.start_interval, self.start_attempts).with_grace(self.start_grace)
    }

    /// Polling schedule of `post_start`.
    #[must_use]
    pub const fn post_start_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.post_start_interval, self.post_start_attempts)
            .with_grace(self.post_start_delay)
    }

    /// Schedule of the drain wait before an update.
    #[must_use]
    pub const fn drain_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.drain_interval, self.drain_attempts)
    }

    /// Validates the tick budgets.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("start_attempts", self.start_attempts),
            ("post_start_attempts", self.post_start_attempts),
            ("drain_attempts", self.drain_attempts),
            ("delayed_ticks", self.delayed_ticks),
        ] {
            if value == 0 {
                return Err(WardenError::invalid_config(format!(
                    "timings.{name} must be greater than 0"
                )));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Documents, ports and services
// =============================================================================

/// One config file and the definition group it holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DocumentSpec {
    /// Definition group name; also the synthetic section of spoofed files.
    pub group: String,
    /// File path, relative to the installation root.
    pub path: PathBuf,
    /// File format; inferred from the extension when omitted.
    #[serde(default)]
    pub format: Option<FormatKind>,
    /// Sectioned file without a header on disk.
    #[serde(default)]
    pub spoof_section: bool,
}

impl DocumentSpec {
    /// Format from the explicit setting or the file extension.
    #[must_use]
    pub fn format_kind(&self) -> FormatKind {
        self.format.unwrap_or_else(|| {
            match self.path.extension().and_then(|ext| ext.to_str()) {
                Some("json") => FormatKind::Document,
                Some("properties") => FormatKind::Flat,
                _ => FormatKind::Sectioned,
            }
        })
    }

    /// Builds the document with every definition of its group registered.
    pub fn build(&self, definitions: &OptionDefinitions, ctx: &ManagerContext) -> Result<ConfigDocument> {
        let path = ctx.resolve(&self.path);
        let document = if self.spoof_section {
            ConfigDocument::spoofed(&self.group, path)
        } else {
            ConfigDocument::new(&self.group, path, self.format_kind())
        };
        Ok(document
            .privileged(ctx.privileged())
            .with_options(definitions.group(&self.group).iter().cloned())?)
    }
}

/// A network port used by an instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PortSpec {
    /// Option that holds the port number.
    #[serde(default)]
    pub option: Option<String>,
    /// Fixed port number, for ports that cannot be configured.
    #[serde(default)]
    pub value: Option<u16>,
    /// Transport protocol.
    #[serde(default)]
    pub protocol: Protocol,
    /// What the port is for.
    #[serde(default)]
    pub description: String,
}

/// Connection to the instance's command socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuerySpec {
    /// Command socket; defaults to `/var/run/<unit>.socket`.
    #[serde(default)]
    pub socket: Option<PathBuf>,
    /// World name reported by the player listing.
    #[serde(default = "default_world")]
    pub world: String,
    /// How long to follow the journal for a command reply.
    #[serde(default = "default_listen", with = "humantime_serde")]
    pub listen: Duration,
}

fn default_world() -> String {
    "default".to_string()
}

fn default_listen() -> Duration {
    Duration::from_secs(3)
}

impl QuerySpec {
    /// Socket path for `unit`.
    #[must_use]
    pub fn socket_path(&self, unit: &str) -> PathBuf {
        self.socket
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("/var/run/{unit}.socket")))
    }
}

/// One managed instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceSpec {
    /// systemd unit name.
    pub unit: String,
    /// Instance config files.
    #[serde(default)]
    pub documents: Vec<DocumentSpec>,
    /// Option holding the display name.
    #[serde(default)]
    pub name_option: Option<String>,
    /// Option holding the player limit.
    #[serde(default)]
    pub max_players_option: Option<String>,
    /// Option holding the main game port.
    #[serde(default)]
    pub port_option: Option<String>,
    /// Ports reported by `--get-ports` and managed in the firewall.
    #[serde(default)]
    pub ports: Vec<PortSpec>,
    /// Query interface, if the instance has one.
    #[serde(default)]
    pub query: Option<QuerySpec>,
}

/// External update helper.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdaterSpec {
    /// Downloader program.
    pub command: PathBuf,
    /// Directory holding downloaded payloads; defaults to the installation root.
    #[serde(default)]
    pub workdir: Option<PathBuf>,
    /// App option selecting the release branch.
    #[serde(default = "default_branch_option")]
    pub branch_option: String,
}

fn default_branch_option() -> String {
    crate::keys::GAME_BRANCH.to_string()
}

// =============================================================================
// ManagerConfig
// =============================================================================

/// Contents of `warden.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManagerConfig {
    /// Application name, used for backup archive names.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Option definition file.
    #[serde(default)]
    pub definitions: Option<PathBuf>,
    /// App-level config files.
    #[serde(default)]
    pub documents: Vec<DocumentSpec>,
    /// Managed instances.
    #[serde(default)]
    pub services: Vec<ServiceSpec>,
    /// Save directory included in backups.
    #[serde(default)]
    pub save_directory: Option<PathBuf>,
    /// Individual save files included in backups.
    #[serde(default)]
    pub save_files: Vec<PathBuf>,
    /// Where archives are written.
    #[serde(default = "default_backup_directory")]
    pub backup_directory: PathBuf,
    /// Lifecycle waits.
    #[serde(default)]
    pub timings: LifecycleTimings,
    /// Update helper, if the game supports updates.
    #[serde(default)]
    pub updater: Option<UpdaterSpec>,
}

fn default_backup_directory() -> PathBuf {
    PathBuf::from("backups")
}

impl ManagerConfig {
    /// Creates a configuration with no documents or services.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            definitions: None,
            documents: Vec::new(),
            services: Vec::new(),
            save_directory: None,
            save_files: Vec::new(),
            backup_directory: default_backup_directory(),
            timings: LifecycleTimings::default(),
            updater: None,
        }
    }

    /// Parses and validates TOML content.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| WardenError::invalid_config(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            WardenError::invalid_config(format!("failed to read {}: {e}", path.as_ref().display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(WardenError::invalid_config("name cannot be empty"));
        }
        let mut units = std::collections::HashSet::new();
        for service in &self.services {
            if service.unit.trim().is_empty() {
                return Err(WardenError::invalid_config("service unit cannot be empty"));
            }
            if !units.insert(service.unit.as_str()) {
                return Err(WardenError::invalid_config(format!(
                    "service {} declared twice",
                    service.unit
                )));
            }
            for port in &service.ports {
                if port.option.is_none() == port.value.is_none() {
                    return Err(WardenError::invalid_config(format!(
                        "{}: a port needs exactly one of option or value",
                        service.unit
                    )));
                }
            }
        }
        for document in self.documents.iter().chain(self.services.iter().flat_map(|s| &s.documents)) {
            if document.group.trim().is_empty() {
                return Err(WardenError::invalid_config("document group cannot be empty"));
            }
        }
        self.timings.validate()
    }

    /// Loads the option definitions, or an empty table if none are configured.
    pub fn load_definitions(&self, ctx: &ManagerContext) -> Result<OptionDefinitions> {
        match &self.definitions {
            Some(path) => Ok(OptionDefinitions::load(ctx.resolve(path))?),
            None => Ok(OptionDefinitions::default()),
        }
    }
}

// =============================================================================
// ManagerContext
// =============================================================================

/// Installation root, privilege and timings, shared by every component.
#[derive(Debug, Clone)]
pub struct ManagerContext {
    root: PathBuf,
    privileged: bool,
    timings: LifecycleTimings,
}

impl ManagerContext {
    /// Creates a context, detecting privilege from the effective uid.
    #[must_use]
    pub fn detect(root: impl Into<PathBuf>, timings: LifecycleTimings) -> Self {
        Self {
            root: root.into(),
            privileged: is_root(),
            timings,
        }
    }

    /// Overrides the detected privilege.
    #[must_use]
    pub const fn with_privileged(mut self, privileged: bool) -> Self {
        self.privileged = privileged;
        self
    }

    /// Replaces the timings.
    #[must_use]
    pub fn with_timings(mut self, timings: LifecycleTimings) -> Self {
        self.timings = timings;
        self
    }

    /// Installation root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns true when running as root.
    #[must_use]
    pub const fn privileged(&self) -> bool {
        self.privileged
    }

    /// Lifecycle timings.
    #[must_use]
    pub const fn timings(&self) -> &LifecycleTimings {
        &self.timings
    }

    /// Resolves `path` against the installation root.
    #[must_use]
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// Fails with [`WardenError::PermissionDenied`] unless privileged.
    pub fn require_privileged(&self, operation: &str) -> Result<()> {
        if self.privileged {
            Ok(())
        } else {
            tracing::error!(operation, "operation requires root privileges");
            Err(WardenError::permission_denied(format!("{operation} requires root")))
        }
    }
}

#[cfg(unix)]
fn is_root() -> bool {
    nix::unistd::geteuid().is_root()
}

#[cfg(not(unix))]
const fn is_root() -> bool {
    false
}

/// Serde helper for humantime durations.
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
name = "Hytale"
definitions = "configs.toml"

[[documents]]
group = "manager"
path = ".settings.ini"

[[services]]
unit = "hytale-server"
name_option = "Server Name"
port_option = "Server Port"

[[services.documents]]
group = "server"
path = "Server/config.json"

[[services.ports]]
option = "Server Port"
protocol = "udp"
description = "Game port"

[services.query]
listen = "5s"

[timings]
start_grace = "2s"
"#;

    #[test]
    fn test_parse_sample() {
        let config = ManagerConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.name, "Hytale");
        assert_eq!(config.backup_directory, PathBuf::from("backups"));
        let service = &config.services[0];
        assert_eq!(service.documents[0].format_kind(), FormatKind::Document);
        assert_eq!(service.ports[0].protocol, Protocol::Udp);
        let query = service.query.as_ref().unwrap();
        assert_eq!(query.listen, Duration::from_secs(5));
        assert_eq!(query.world, "default");
        assert_eq!(
            query.socket_path("hytale-server"),
            PathBuf::from("/var/run/hytale-server.socket")
        );
        assert_eq!(config.timings.start_grace, Duration::from_secs(2));
        assert_eq!(config.timings.start_attempts, 240);
    }

    #[test]
    fn test_duplicate_unit_rejected() {
        let mut config = ManagerConfig::new("game");
        let service: ServiceSpec = toml::from_str("unit = \"a\"").unwrap();
        config.services = vec![service.clone(), service];
        assert!(matches!(config.validate(), Err(WardenError::InvalidConfig(_))));
    }

    #[test]
    fn test_port_needs_option_or_value() {
        let toml = "name = \"g\"\n[[services]]\nunit = \"a\"\n[[services.ports]]\ndescription = \"x\"\n";
        assert!(ManagerConfig::from_toml_str(toml).is_err());
    }

    #[test]
    fn test_zero_budget_rejected() {
        let mut config = ManagerConfig::new("game");
        config.timings.drain_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_format_inferred_from_extension() {
        let spec = |path: &str| DocumentSpec {
            group: "g".into(),
            path: path.into(),
            format: None,
            spoof_section: false,
        };
        assert_eq!(spec("a.properties").format_kind(), FormatKind::Flat);
        assert_eq!(spec("a.ini").format_kind(), FormatKind::Sectioned);
        assert_eq!(spec("a.cfg").format_kind(), FormatKind::Sectioned);
    }

    #[test]
    fn test_context_resolve_and_privilege() {
        let ctx = ManagerContext::detect("/srv/game", LifecycleTimings::default()).with_privileged(false);
        assert_eq!(ctx.resolve(Path::new("backups")), PathBuf::from("/srv/game/backups"));
        assert_eq!(ctx.resolve(Path::new("/tmp/x")), PathBuf::from("/tmp/x"));
        assert!(ctx.require_privileged("start").unwrap_err().is_permission_denied());
        assert!(ctx.with_privileged(true).require_privileged("start").is_ok());
    }
}
