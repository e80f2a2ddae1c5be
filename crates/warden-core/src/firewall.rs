//! Host firewall rules for instance ports.
//!
//! Supports ufw, firewalld and iptables, detected in that order. Command
//! lines are built by pure functions so they can be checked without a
//! firewall on the test host.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::sync::OnceCell;
use warden_config::OptionChange;

use crate::error::{Result, WardenError};
use crate::hook::OptionHook;

/// Transport protocol of a port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// TCP
    #[default]
    Tcp,
    /// UDP
    Udp,
}

impl Protocol {
    /// Lowercase protocol name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supported firewall front-ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirewallKind {
    /// Uncomplicated Firewall.
    Ufw,
    /// firewalld via `firewall-cmd`.
    Firewalld,
    /// Plain iptables.
    Iptables,
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| (*p).to_string()).collect()
}

impl FirewallKind {
    /// Detection order.
    pub const ALL: [Self; 3] = [Self::Ufw, Self::Firewalld, Self::Iptables];

    /// Program probed during detection.
    #[must_use]
    pub const fn program(&self) -> &'static str {
        match self {
            Self::Ufw => "ufw",
            Self::Firewalld => "firewall-cmd",
            Self::Iptables => "iptables",
        }
    }

    /// Commands that open `port`.
    #[must_use]
    pub fn allow_commands(&self, port: u16, protocol: Protocol, comment: Option<&str>) -> Vec<Vec<String>> {
        let spec = format!("{port}/{protocol}");
        match self {
            Self::Ufw => {
                let mut cmd = argv(&["ufw", "allow", &spec]);
                if let Some(comment) = comment {
                    cmd.extend(argv(&["comment", comment]));
                }
                vec![cmd]
            }
            Self::Firewalld => vec![
                argv(&["firewall-cmd", "--permanent", "--add-port", &spec]),
                argv(&["firewall-cmd", "--reload"]),
            ],
            Self::Iptables => {
                let port = port.to_string();
                let mut cmd = argv(&[
                    "iptables", "-A", "INPUT", "-p", protocol.as_str(), "--dport", &port, "-j", "ACCEPT",
                ]);
                if let Some(comment) = comment {
                    cmd.extend(argv(&["-m", "comment", "--comment", comment]));
                }
                vec![cmd, argv(&["service", "iptables", "save"])]
            }
        }
    }

    /// Commands that close `port`.
    #[must_use]
    pub fn remove_commands(&self, port: u16, protocol: Protocol) -> Vec<Vec<String>> {
        let spec = format!("{port}/{protocol}");
        match self {
            Self::Ufw => vec![argv(&["ufw", "delete", "allow", &spec])],
            Self::Firewalld => vec![
                argv(&["firewall-cmd", "--permanent", "--remove-port", &spec]),
                argv(&["firewall-cmd", "--reload"]),
            ],
            Self::Iptables => {
                let port = port.to_string();
                vec![
                    argv(&[
                        "iptables", "-D", "INPUT", "-p", protocol.as_str(), "--dport", &port, "-j", "ACCEPT",
                    ]),
                    argv(&["service", "iptables", "save"]),
                ]
            }
        }
    }
}

/// Executes firewall command lines.
#[async_trait]
pub trait RuleRunner: Send + Sync + fmt::Debug {
    /// Runs `command` (program first) and fails on a non-zero exit.
    async fn run(&self, command: &[String]) -> Result<()>;
}

/// Runs rules as child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

#[async_trait]
impl RuleRunner for SystemRunner {
    async fn run(&self, command: &[String]) -> Result<()> {
        let Some((program, args)) = command.split_first() else {
            return Ok(());
        };
        let output = Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|e| WardenError::spawn(program, &e))?;
        if !output.status.success() {
            return Err(WardenError::command(format!(
                "{} failed: {}",
                command.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

/// The firewall found on this host.
#[derive(Debug, Clone)]
pub struct Firewall {
    kind: FirewallKind,
    runner: Arc<dyn RuleRunner>,
}

impl Firewall {
    /// Uses a specific front-end.
    #[must_use]
    pub fn new(kind: FirewallKind) -> Self {
        Self {
            kind,
            runner: Arc::new(SystemRunner),
        }
    }

    /// Sends rule commands to `runner` instead of spawning them.
    #[must_use]
    pub fn with_runner(mut self, runner: Arc<dyn RuleRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Probes each front-end with `--version`; `None` if none is installed.
    pub async fn detect() -> Option<Self> {
        for kind in FirewallKind::ALL {
            let probe = Command::new(kind.program()).arg("--version").output().await;
            if probe.is_ok() {
                tracing::debug!(firewall = kind.program(), "detected firewall");
                return Some(Self::new(kind));
            }
        }
        None
    }

    /// Front-end in use.
    #[must_use]
    pub const fn kind(&self) -> FirewallKind {
        self.kind
    }

    /// Opens `port`.
    pub async fn allow(&self, port: u16, protocol: Protocol, comment: Option<&str>) -> Result<()> {
        self.run_all(self.kind.allow_commands(port, protocol, comment)).await?;
        tracing::info!(port, %protocol, firewall = self.kind.program(), "port allowed");
        Ok(())
    }

    /// Closes `port`.
    pub async fn remove(&self, port: u16, protocol: Protocol) -> Result<()> {
        self.run_all(self.kind.remove_commands(port, protocol)).await?;
        tracing::info!(port, %protocol, firewall = self.kind.program(), "port removed");
        Ok(())
    }

    async fn run_all(&self, commands: Vec<Vec<String>>) -> Result<()> {
        for command in commands {
            self.runner.run(&command).await?;
        }
        Ok(())
    }
}

/// Port option watched by [`PortFirewallHook`].
#[derive(Debug, Clone)]
pub struct WatchedPort {
    /// Option holding the port.
    pub option: String,
    /// Protocol of the rule.
    pub protocol: Protocol,
    /// Rule comment.
    pub description: String,
}

/// Moves the firewall rule when a port-valued option changes.
#[derive(Debug, Default)]
pub struct PortFirewallHook {
    ports: Vec<WatchedPort>,
    firewall: OnceCell<Option<Firewall>>,
}

impl PortFirewallHook {
    /// Watches the given port options; the firewall is detected on first use.
    #[must_use]
    pub fn new(ports: Vec<WatchedPort>) -> Self {
        Self {
            ports,
            firewall: OnceCell::new(),
        }
    }

    /// Uses `firewall` instead of detecting one; `None` behaves as a host
    /// without a supported firewall.
    #[must_use]
    pub fn with_firewall(mut self, firewall: Option<Firewall>) -> Self {
        self.firewall = OnceCell::new_with(Some(firewall));
        self
    }

    async fn firewall(&self) -> Option<&Firewall> {
        self.firewall.get_or_init(Firewall::detect).await.as_ref()
    }
}

fn as_port(value: &warden_config::OptionValue) -> Option<u16> {
    value.as_int().and_then(|v| u16::try_from(v).ok()).filter(|p| *p != 0)
}

#[async_trait]
impl OptionHook for PortFirewallHook {
    async fn option_changed(&self, change: &OptionChange) -> Result<()> {
        let Some(watched) = self.ports.iter().find(|p| p.option == change.option) else {
            return Ok(());
        };
        // The option is already saved; a missing firewall only skips the rules.
        let Some(firewall) = self.firewall().await else {
            tracing::warn!(
                option = %change.option,
                "no supported firewall found (ufw, firewalld, iptables), port rules left unchanged"
            );
            return Ok(());
        };
        if let Some(port) = as_port(&change.previous) {
            // A rule for the old port may never have been added.
            if let Err(e) = firewall.remove(port, watched.protocol).await {
                tracing::warn!(port, error = %e, "could not remove previous port rule");
            }
        }
        if let Some(port) = as_port(&change.new) {
            let comment = (!watched.description.is_empty()).then_some(watched.description.as_str());
            firewall.allow(port, watched.protocol, comment).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::mocks::MockRuleRunner;
    use warden_config::OptionValue;

    fn port_hook() -> PortFirewallHook {
        PortFirewallHook::new(vec![WatchedPort {
            option: "Server Port".into(),
            protocol: Protocol::Udp,
            description: "Game port".into(),
        }])
    }

    fn port_change(previous: i64, new: i64) -> OptionChange {
        OptionChange {
            option: "Server Port".into(),
            previous: OptionValue::Int(previous),
            new: OptionValue::Int(new),
        }
    }

    #[test]
    fn test_ufw_commands() {
        assert_eq!(
            FirewallKind::Ufw.allow_commands(5520, Protocol::Udp, Some("Game port")),
            vec![argv(&["ufw", "allow", "5520/udp", "comment", "Game port"])]
        );
        assert_eq!(
            FirewallKind::Ufw.remove_commands(5520, Protocol::Udp),
            vec![argv(&["ufw", "delete", "allow", "5520/udp"])]
        );
    }

    #[test]
    fn test_firewalld_reloads() {
        let cmds = FirewallKind::Firewalld.allow_commands(25565, Protocol::Tcp, Some("ignored"));
        assert_eq!(cmds[0], argv(&["firewall-cmd", "--permanent", "--add-port", "25565/tcp"]));
        assert_eq!(cmds[1], argv(&["firewall-cmd", "--reload"]));
    }

    #[test]
    fn test_iptables_saves_rules() {
        let cmds = FirewallKind::Iptables.remove_commands(27015, Protocol::Udp);
        assert_eq!(
            cmds[0],
            argv(&["iptables", "-D", "INPUT", "-p", "udp", "--dport", "27015", "-j", "ACCEPT"])
        );
        assert_eq!(cmds[1], argv(&["service", "iptables", "save"]));
    }

    #[test]
    fn test_as_port_rejects_out_of_range() {
        assert_eq!(as_port(&OptionValue::Int(5520)), Some(5520));
        assert_eq!(as_port(&OptionValue::Int(70000)), None);
        assert_eq!(as_port(&OptionValue::Empty), None);
    }

    #[tokio::test]
    async fn test_hook_ignores_unwatched_options() {
        let hook = PortFirewallHook::new(vec![WatchedPort {
            option: "Server Port".into(),
            protocol: Protocol::Udp,
            description: String::new(),
        }]);
        let change = OptionChange {
            option: "Server Name".into(),
            previous: OptionValue::Str("a".into()),
            new: OptionValue::Str("b".into()),
        };
        hook.option_changed(&change).await.unwrap();
        assert!(hook.firewall.get().is_none());
    }

    #[tokio::test]
    async fn test_hook_allows_new_port_when_old_rule_is_missing() {
        let runner = Arc::new(MockRuleRunner::default());
        let firewall = Firewall::new(FirewallKind::Iptables).with_runner(Arc::clone(&runner) as Arc<dyn RuleRunner>);
        let hook = port_hook().with_firewall(Some(firewall));

        hook.option_changed(&port_change(5520, 5521)).await.unwrap();

        let calls = runner.calls();
        assert_eq!(
            calls,
            [
                "iptables -D INPUT -p udp --dport 5520 -j ACCEPT",
                "iptables -A INPUT -p udp --dport 5521 -j ACCEPT -m comment --comment Game port",
                "service iptables save",
            ]
        );
    }

    #[tokio::test]
    async fn test_hook_moves_ufw_rule() {
        let runner = Arc::new(MockRuleRunner::default());
        let firewall = Firewall::new(FirewallKind::Ufw).with_runner(Arc::clone(&runner) as Arc<dyn RuleRunner>);
        let hook = port_hook().with_firewall(Some(firewall));

        hook.option_changed(&port_change(5520, 5530)).await.unwrap();

        let calls = runner.calls();
        assert_eq!(calls, ["ufw delete allow 5520/udp", "ufw allow 5530/udp comment Game port"]);
    }

    #[tokio::test]
    async fn test_hook_without_firewall_succeeds() {
        let hook = port_hook().with_firewall(None);
        hook.option_changed(&port_change(5520, 5521)).await.unwrap();
    }
}
