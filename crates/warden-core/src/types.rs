//! Core types: unit states, exec status records and resource usage.

use std::fmt;

use chrono::{Local, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};

// =============================================================================
// ActiveState
// =============================================================================

/// Raw `systemctl is-active` answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActiveState {
    /// `active`
    Active,
    /// `reloading`
    Reloading,
    /// `inactive`
    Inactive,
    /// `failed`
    Failed,
    /// `activating`
    Activating,
    /// `deactivating`
    Deactivating,
    /// Anything else (e.g. `unknown` for a missing unit).
    Other(String),
}

impl ActiveState {
    /// Parses `is-active` output.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "active" => Self::Active,
            "reloading" => Self::Reloading,
            "inactive" => Self::Inactive,
            "failed" => Self::Failed,
            "activating" => Self::Activating,
            "deactivating" => Self::Deactivating,
            other => Self::Other(other.to_string()),
        }
    }
}

// =============================================================================
// ServiceState
// =============================================================================

/// Lifecycle state of a managed instance, derived on every query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    /// Not running, last exit clean.
    Stopped,
    /// Start requested, unit activating.
    Starting,
    /// Running.
    Running,
    /// Stop requested, unit deactivating.
    Stopping,
    /// Not running, last exit status non-zero.
    Failed(i32),
}

impl ServiceState {
    /// Maps a process-manager answer and the last exit status to a state.
    #[must_use]
    pub const fn from_active(active: &ActiveState, exec_main_status: i32) -> Self {
        match active {
            ActiveState::Active | ActiveState::Reloading => Self::Running,
            ActiveState::Activating => Self::Starting,
            ActiveState::Deactivating => Self::Stopping,
            ActiveState::Inactive | ActiveState::Failed | ActiveState::Other(_) => {
                if exec_main_status == 0 {
                    Self::Stopped
                } else {
                    Self::Failed(exec_main_status)
                }
            }
        }
    }

    /// Returns true for running, starting or stopping.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Starting | Self::Stopping)
    }

    /// Short status word used in metrics output.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(status) => write!(f, "failed ({status})"),
            other => f.write_str(other.as_str()),
        }
    }
}

// =============================================================================
// ExecStatus
// =============================================================================

/// Parsed `ExecStart` / `ExecStartPre` property of a unit.
///
/// Times are Unix timestamps in seconds, interpreted in local time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecStatus {
    /// Program path.
    pub path: String,
    /// Full argument vector as one string.
    pub arguments: String,
    /// Start time.
    pub start_time: Option<i64>,
    /// Stop time.
    pub stop_time: Option<i64>,
    /// Process id.
    pub pid: u32,
    /// Exit code word (`exited`, `killed`, ...), if any.
    pub code: Option<String>,
    /// Exit status.
    pub status: i32,
    /// Seconds between start and stop, 0 if either is unknown.
    pub runtime: i64,
}

const EXEC_TIME_FORMAT: &str = "%a %Y-%m-%d %H:%M:%S %Z";

fn parse_exec_time(raw: &str) -> Option<i64> {
    let raw = raw.trim().trim_start_matches('[').trim_end_matches(']');
    if raw == "n/a" || raw.is_empty() {
        return None;
    }
    let naive = NaiveDateTime::parse_from_str(raw, EXEC_TIME_FORMAT).ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.timestamp())
}

impl ExecStatus {
    /// Parses the value of an exec property.
    ///
    /// ```text
    /// { path=/usr/bin/java ; argv[]=/usr/bin/java -jar server.jar ; start_time=[Mon 2025-01-06 10:00:00 UTC] ; stop_time=[n/a] ; pid=4242 ; code=(null) ; status=0/0 }
    /// ```
    ///
    /// Returns `None` for an empty property (unit never started).
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        let inner = value.trim_start_matches('{').trim_end_matches('}');
        let mut status = Self::default();
        for part in inner.split(" ; ") {
            let Some((key, val)) = part.split_once('=') else {
                continue;
            };
            let val = val.trim();
            match key.trim() {
                "path" => status.path = val.to_string(),
                "argv[]" => status.arguments = val.to_string(),
                "start_time" => status.start_time = parse_exec_time(val),
                "stop_time" => status.stop_time = parse_exec_time(val),
                "pid" => status.pid = val.parse().unwrap_or(0),
                "code" if val == "(null)" => status.code = None,
                "code" => status.code = Some(val.to_string()),
                "status" => {
                    let number = val.split('/').next().unwrap_or(val);
                    status.status = number.trim().parse().unwrap_or(0);
                }
                _ => {}
            }
        }
        status.runtime = match (status.start_time, status.stop_time) {
            (Some(start), Some(stop)) => stop - start,
            _ => 0,
        };
        Some(status)
    }
}

// =============================================================================
// ResourceUsage
// =============================================================================

/// Memory and CPU sample of a process, as reported by `ps`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResourceUsage {
    /// Resident set size in KiB.
    pub rss_kib: Option<u64>,
    /// CPU usage percentage.
    pub cpu_percent: Option<f64>,
}

impl ResourceUsage {
    /// Builds a sample from raw `ps -o rss` and `ps -o %cpu` output.
    #[must_use]
    pub fn from_ps(rss: &str, cpu: &str) -> Self {
        let rss = rss.trim();
        let cpu = cpu.trim();
        Self {
            rss_kib: rss.parse().ok(),
            cpu_percent: cpu.parse().ok().filter(|v: &f64| *v >= 0.0),
        }
    }

    /// Memory as `"1.50 GB"` / `"512 MB"`, or `"N/A"`.
    #[must_use]
    pub fn memory_display(&self) -> String {
        match self.rss_kib {
            Some(kib) if kib >= 1024 * 1024 => format!("{:.2} GB", kib as f64 / (1024.0 * 1024.0)),
            Some(kib) => format!("{} MB", kib / 1024),
            None => "N/A".to_string(),
        }
    }

    /// CPU as `"12%"`, or `"N/A"`.
    #[must_use]
    pub fn cpu_display(&self) -> String {
        self.cpu_percent
            .map_or_else(|| "N/A".to_string(), |cpu| format!("{cpu:.0}%"))
    }
}
