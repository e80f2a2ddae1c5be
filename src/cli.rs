//! Command-line surface of the `warden` binary.
//!
//! Exactly one action flag is accepted per invocation. Queries print JSON on
//! stdout; everything else reports through the log on stderr. [`run`]
//! returns `Ok(false)` for a negative answer (`--is-running`,
//! `--has-players`, `--check-update`) and for refused operations.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{ArgGroup, Parser};
use serde_json::{Map, Value};
use warden_backup::BackupEngine;
use warden_core::{
    DelayedAction, ManagerConfig, ManagerContext, Orchestrator, ServiceHandle, SystemdManager,
    delayed_fleet, delayed_single,
};

/// `--service` value selecting every instance.
pub const ALL_SERVICES: &str = "ALL";

/// Manage game server instances supervised by systemd.
#[derive(Parser, Debug)]
#[command(name = "warden", version)]
#[command(group(ArgGroup::new("action").required(true).multiple(false)))]
pub struct Cli {
    /// Manager configuration file; relative paths inside it resolve against its directory.
    #[arg(long, default_value = "warden.toml", value_name = "PATH")]
    pub config: PathBuf,

    /// Enable debug logging output.
    #[arg(long)]
    pub debug: bool,

    /// Service instance to manage.
    #[arg(long, default_value = ALL_SERVICES, value_name = "SERVICE")]
    pub service: String,

    /// Start all enabled instances, or the one given with --service.
    #[arg(long, group = "action")]
    pub start: bool,

    /// Stop all instances, or the one given with --service.
    #[arg(long, group = "action")]
    pub stop: bool,

    /// Restart running instances.
    #[arg(long, group = "action")]
    pub restart: bool,

    /// Warn players for up to an hour, then stop.
    #[arg(long, group = "action")]
    pub delayed_stop: bool,

    /// Warn players for up to an hour, then restart.
    #[arg(long, group = "action")]
    pub delayed_restart: bool,

    /// Warn players for up to an hour, then update (all instances only).
    #[arg(long, group = "action")]
    pub delayed_update: bool,

    /// Update the game server to the latest version.
    #[arg(long, group = "action")]
    pub update: bool,

    /// Check for a game update (exit code 0 = available).
    #[arg(long, group = "action")]
    pub check_update: bool,

    /// Back up configs and save data.
    #[arg(long, group = "action")]
    pub backup: bool,

    /// Backups to keep when creating a new one (0 = unlimited).
    #[arg(long, default_value_t = 0, value_name = "N")]
    pub max_backups: usize,

    /// Restore configs and save data from an archive.
    #[arg(long, group = "action", value_name = "ARCHIVE")]
    pub restore: Option<PathBuf>,

    /// Warn players, notify and save the world (single instance, run by systemd).
    #[arg(long, group = "action")]
    pub pre_stop: bool,

    /// Wait for the query interface and notify (single instance, run by systemd).
    #[arg(long, group = "action")]
    pub post_start: bool,

    /// Exit code 0 if any selected instance is running.
    #[arg(long, group = "action")]
    pub is_running: bool,

    /// Exit code 0 if any selected instance has players connected.
    #[arg(long, group = "action")]
    pub has_players: bool,

    /// List instances (JSON).
    #[arg(long, group = "action")]
    pub get_services: bool,

    /// Live metrics of the selected instances (JSON).
    #[arg(long, group = "action")]
    pub get_metrics: bool,

    /// List options of the app, or of the instance given with --service (JSON).
    #[arg(long, group = "action")]
    pub get_configs: bool,

    /// Set an option of the app, or of the instance given with --service.
    #[arg(long, group = "action", num_args = 2, value_names = ["OPTION", "VALUE"])]
    pub set_config: Option<Vec<String>>,

    /// Network ports of the selected instances (JSON).
    #[arg(long, group = "action")]
    pub get_ports: bool,
}

/// The single action requested on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// `--start`
    Start,
    /// `--stop`
    Stop,
    /// `--restart`
    Restart,
    /// `--delayed-stop`, `--delayed-restart`, `--delayed-update`
    Delayed(DelayedAction),
    /// `--update`
    Update,
    /// `--check-update`
    CheckUpdate,
    /// `--backup`
    Backup,
    /// `--restore`
    Restore(PathBuf),
    /// `--pre-stop`
    PreStop,
    /// `--post-start`
    PostStart,
    /// `--is-running`
    IsRunning,
    /// `--has-players`
    HasPlayers,
    /// `--get-services`
    GetServices,
    /// `--get-metrics`
    GetMetrics,
    /// `--get-configs`
    GetConfigs,
    /// `--set-config`
    SetConfig {
        /// Option name.
        option: String,
        /// New value as text.
        value: String,
    },
    /// `--get-ports`
    GetPorts,
}

impl Cli {
    /// Returns true when every instance is selected.
    #[must_use]
    pub fn all_services(&self) -> bool {
        self.service == ALL_SERVICES
    }

    /// The requested action.
    ///
    /// Clap enforces exactly one action flag, so `None` only occurs for a
    /// `Cli` built by hand.
    #[must_use]
    pub fn action(&self) -> Option<Action> {
        let flags = [
            (self.start, Action::Start),
            (self.stop, Action::Stop),
            (self.restart, Action::Restart),
            (self.delayed_stop, Action::Delayed(DelayedAction::Stop)),
            (self.delayed_restart, Action::Delayed(DelayedAction::Restart)),
            (self.delayed_update, Action::Delayed(DelayedAction::Update)),
            (self.update, Action::Update),
            (self.check_update, Action::CheckUpdate),
            (self.backup, Action::Backup),
            (self.pre_stop, Action::PreStop),
            (self.post_start, Action::PostStart),
            (self.is_running, Action::IsRunning),
            (self.has_players, Action::HasPlayers),
            (self.get_services, Action::GetServices),
            (self.get_metrics, Action::GetMetrics),
            (self.get_configs, Action::GetConfigs),
            (self.get_ports, Action::GetPorts),
        ];
        if let Some((_, action)) = flags.into_iter().find(|(set, _)| *set) {
            return Some(action);
        }
        if let Some(path) = &self.restore {
            return Some(Action::Restore(path.clone()));
        }
        match self.set_config.as_deref() {
            Some([option, value]) => Some(Action::SetConfig {
                option: option.clone(),
                value: value.clone(),
            }),
            _ => None,
        }
    }
}

/// Directory the config file lives in, absolute.
fn install_root(config: &Path) -> anyhow::Result<PathBuf> {
    let dir = config
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::path::absolute(dir).with_context(|| format!("cannot resolve {}", dir.display()))
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

/// Keys `items` by unit name, preserving service order.
fn keyed<T: serde::Serialize>(items: Vec<(String, T)>) -> anyhow::Result<Map<String, Value>> {
    let mut map = Map::new();
    for (unit, item) in items {
        map.insert(unit, serde_json::to_value(item)?);
    }
    Ok(map)
}

fn single<'a>(targets: &[&'a ServiceHandle]) -> anyhow::Result<&'a ServiceHandle> {
    match targets {
        [service] => Ok(*service),
        _ => anyhow::bail!("this action needs exactly one service instance, use --service"),
    }
}

/// Builds the orchestrator from `cli.config` and runs the requested action.
pub async fn run(cli: &Cli) -> anyhow::Result<bool> {
    let action = cli.action().context("no action given")?;
    let config = ManagerConfig::load(&cli.config)?;
    let ctx = ManagerContext::detect(install_root(&cli.config)?, config.timings.clone());
    let app = Orchestrator::from_config(&config, ctx, Arc::new(SystemdManager::new()))?;

    let targets: Vec<&ServiceHandle> = if cli.all_services() {
        app.services().iter().collect()
    } else {
        vec![app.service(&cli.service)?]
    };

    match action {
        Action::PreStop => single(&targets)?.pre_stop().await?,
        Action::PostStart => single(&targets)?.post_start().await?,
        Action::Stop => {
            let mut ok = true;
            for service in &targets {
                if let Err(e) = service.stop().await {
                    tracing::error!(unit = %service.unit(), error = %e, "stop failed");
                    ok = false;
                }
            }
            return Ok(ok);
        }
        Action::Start => {
            let mut ok = true;
            for service in &targets {
                if targets.len() > 1 && !service.is_enabled().await {
                    tracing::info!(unit = %service.unit(), "skipping, not enabled for auto-start");
                    continue;
                }
                if let Err(e) = service.start().await {
                    tracing::error!(unit = %service.unit(), error = %e, "start failed");
                    ok = false;
                }
            }
            return Ok(ok);
        }
        Action::Restart => {
            for service in &targets {
                service.restart().await?;
            }
        }
        Action::Delayed(DelayedAction::Update) => {
            if !cli.all_services() {
                anyhow::bail!("--delayed-update can only be used when managing all service instances");
            }
            delayed_fleet(&app, DelayedAction::Update).await?;
        }
        Action::Delayed(delayed) => {
            if cli.all_services() && targets.len() != 1 {
                delayed_fleet(&app, delayed).await?;
            } else {
                delayed_single(single(&targets)?, delayed).await?;
            }
        }
        Action::Update => app.update().await?,
        Action::CheckUpdate => return Ok(app.check_update_available().await?),
        Action::Backup => {
            let archive = BackupEngine::new(&app).backup(cli.max_backups)?;
            tracing::info!(archive = %archive.display(), "backup complete");
        }
        Action::Restore(path) => {
            let restored = BackupEngine::new(&app).restore(&path).await?;
            tracing::info!(files = restored.len(), "restore complete");
        }
        Action::IsRunning => {
            for service in &targets {
                if service.is_running().await {
                    return Ok(true);
                }
            }
            return Ok(false);
        }
        Action::HasPlayers => {
            for service in &targets {
                if service.player_count().await.is_some_and(|players| players > 0) {
                    return Ok(true);
                }
            }
            return Ok(false);
        }
        Action::GetServices => {
            let report = Orchestrator::service_report(&targets).await;
            print_json(&keyed(report.into_iter().map(|info| (info.service.clone(), info)).collect())?)?;
        }
        Action::GetMetrics => {
            let report = Orchestrator::metrics(&targets).await;
            print_json(&keyed(report.into_iter().map(|m| (m.service.clone(), m)).collect())?)?;
        }
        Action::GetConfigs => {
            if cli.all_services() {
                print_json(&app.describe_options())?;
            } else {
                print_json(&single(&targets)?.describe_options())?;
            }
        }
        Action::SetConfig { option, value } => {
            if cli.all_services() {
                app.set_option(&option, &value).await?;
            } else {
                single(&targets)?.set_option(&option, &value).await?;
            }
        }
        Action::GetPorts => print_json(&Orchestrator::port_report(&targets))?,
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("warden").chain(args.iter().copied()))
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&["--is-running"]).unwrap();
        assert!(cli.all_services());
        assert_eq!(cli.config, PathBuf::from("warden.toml"));
        assert_eq!(cli.max_backups, 0);
        assert_eq!(cli.action(), Some(Action::IsRunning));
    }

    #[test]
    fn test_exactly_one_action() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["--start", "--stop"]).is_err());
        assert!(parse(&["--service", "hytale"]).is_err());
    }

    #[test]
    fn test_set_config_takes_two_values() {
        let cli = parse(&["--service", "hytale", "--set-config", "Server Port", "5521"]).unwrap();
        assert!(!cli.all_services());
        assert_eq!(
            cli.action(),
            Some(Action::SetConfig {
                option: "Server Port".to_string(),
                value: "5521".to_string(),
            })
        );
        assert!(parse(&["--set-config", "Server Port"]).is_err());
    }

    #[test]
    fn test_restore_and_delayed_actions() {
        let cli = parse(&["--restore", "/srv/backups/a.tar.gz"]).unwrap();
        assert_eq!(cli.action(), Some(Action::Restore(PathBuf::from("/srv/backups/a.tar.gz"))));

        let cli = parse(&["--delayed-update"]).unwrap();
        assert_eq!(cli.action(), Some(Action::Delayed(DelayedAction::Update)));

        let cli = parse(&["--backup", "--max-backups", "7"]).unwrap();
        assert_eq!(cli.action(), Some(Action::Backup));
        assert_eq!(cli.max_backups, 7);
    }

    #[test]
    fn test_install_root_is_config_directory() {
        let root = install_root(Path::new("/srv/game/warden.toml")).unwrap();
        assert_eq!(root, PathBuf::from("/srv/game"));
        assert!(install_root(Path::new("warden.toml")).unwrap().is_absolute());
    }

    #[test]
    fn test_keyed_preserves_service_order() {
        let map = keyed(vec![("zeta".to_string(), 1), ("alpha".to_string(), 2)]).unwrap();
        let keys: Vec<&String> = map.keys().collect();
        assert_eq!(keys, ["zeta", "alpha"]);
    }
}
