//! Configuration loading.
//!
//! Settings are layered, lowest precedence first:
//!
//! 1. built-in defaults
//! 2. the YAML file (`config.yml` unless `--config` says otherwise)
//! 3. environment variables prefixed `PUSHGW_BOUNCER_`, with `__` between
//!    nested keys (`PUSHGW_BOUNCER_GLOBAL__PUSH_GW=http://retro:9091`)
//! 4. command-line flags
//!
//! Global settings must all be valid or loading fails. Monitors are checked
//! one at a time; a bad entry is set aside in [`Settings::rejected`] and the
//! rest still load.
//!
//! ```yaml
//! global:
//!   push_gw: http://retro:9091
//!   check_interval: 60s
//! monitors:
//!   - name: weewx
//!     type: lxd
//!     container_name: weewx
//!     label_name: instance
//!     label_value: weewx
//!     max_age: 120s
//!     restart_type: command
//!     restart_command: ["/bin/systemctl", "restart", "weewx"]
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bouncer_types::{parse_duration, BackendKind, DurationError, RestartKind, UnknownKind};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use thiserror::Error;

use crate::monitor::RestartAction;

/// Config file read when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "config.yml";

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "PUSHGW_BOUNCER";

const DEFAULT_CHECK_INTERVAL: &str = "60s";
const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:9090";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_FETCH_TIMEOUT: &str = "10s";
const DEFAULT_REMEDIATION_TIMEOUT: &str = "60s";

/// Errors that make the whole configuration unusable.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("no Pushgateway configured (set global.push_gw or --pushgw)")]
    MissingPushgateway,

    #[error("invalid {field} {value:?}: {source}")]
    InvalidDuration {
        field: &'static str,
        value: String,
        #[source]
        source: DurationError,
    },

    #[error("{field} must be greater than zero")]
    ZeroDuration { field: &'static str },
}

/// Why a single monitor entry was rejected.
#[derive(Debug, Clone, Error)]
pub enum MonitorConfigError {
    #[error("monitor {name}: invalid max_age {value:?}: {source}")]
    InvalidMaxAge {
        name: String,
        value: String,
        #[source]
        source: DurationError,
    },

    #[error("monitor {name}: {source}")]
    UnknownBackend {
        name: String,
        #[source]
        source: UnknownKind,
    },

    #[error("monitor {name}: {source}")]
    UnknownRestartType {
        name: String,
        #[source]
        source: UnknownKind,
    },

    #[error("monitor {name}: restart_type is command but restart_command is empty")]
    EmptyCommand { name: String },

    #[error("monitor {name}: duplicate name")]
    Duplicate { name: String },

    #[error("monitor {name}: {field} must not be empty")]
    MissingField { name: String, field: &'static str },
}

impl MonitorConfigError {
    /// The name of the offending monitor.
    pub fn monitor(&self) -> &str {
        match self {
            MonitorConfigError::InvalidMaxAge { name, .. }
            | MonitorConfigError::UnknownBackend { name, .. }
            | MonitorConfigError::UnknownRestartType { name, .. }
            | MonitorConfigError::EmptyCommand { name }
            | MonitorConfigError::Duplicate { name }
            | MonitorConfigError::MissingField { name, .. } => name,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// What to do with a monitor whose data cannot be evaluated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingDataPolicy {
    /// Leave it alone until data shows up.
    #[default]
    Skip,
    /// Treat it as stale.
    Remediate,
}

/// The file as written, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub global: GlobalSettings,
    pub monitors: Vec<MonitorEntry>,
}

/// The `global:` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GlobalSettings {
    pub push_gw: Option<String>,
    /// A duration string, or a bare integer number of seconds.
    pub check_interval: String,
    pub listen_addr: String,
    pub log_level: String,
    pub log_format: LogFormat,
    pub socket_lxd: PathBuf,
    pub socket_docker: PathBuf,
    pub fetch_timeout: String,
    pub remediation_timeout: String,
    pub on_missing_data: MissingDataPolicy,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            push_gw: None,
            check_interval: DEFAULT_CHECK_INTERVAL.to_string(),
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_format: LogFormat::default(),
            socket_lxd: PathBuf::from(bouncer_adapters::lxd::DEFAULT_SOCKET),
            socket_docker: PathBuf::from(bouncer_adapters::docker::DEFAULT_SOCKET),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT.to_string(),
            remediation_timeout: DEFAULT_REMEDIATION_TIMEOUT.to_string(),
            on_missing_data: MissingDataPolicy::default(),
        }
    }
}

/// One entry of the `monitors:` list.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MonitorEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub container_name: String,
    pub label_name: String,
    pub label_value: String,
    pub max_age: String,
    pub restart_type: String,
    pub restart_command: Vec<String>,
}

/// Values from the command line. `None` leaves the lower layers alone.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub pushgw: Option<String>,
    pub check_interval: Option<String>,
    pub listen_addr: Option<String>,
    pub log_level: Option<String>,
    pub socket_lxd: Option<PathBuf>,
    pub socket_docker: Option<PathBuf>,
    pub dry_run: bool,
}

/// A validated monitor definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorSpec {
    pub name: String,
    pub backend: BackendKind,
    /// Container the backend acts on.
    pub target: String,
    pub label_name: String,
    pub label_value: String,
    pub max_age: Duration,
    pub restart: RestartAction,
}

impl MonitorSpec {
    /// Validate a raw entry.
    pub fn from_entry(entry: &MonitorEntry) -> Result<Self, MonitorConfigError> {
        let name = entry.name.trim();
        if name.is_empty() {
            return Err(MonitorConfigError::MissingField {
                name: "<unnamed>".to_string(),
                field: "name",
            });
        }
        let name = name.to_string();

        for (field, value) in [
            ("label_name", &entry.label_name),
            ("label_value", &entry.label_value),
            ("container_name", &entry.container_name),
        ] {
            if value.trim().is_empty() {
                return Err(MonitorConfigError::MissingField { name, field });
            }
        }

        let max_age =
            parse_duration(&entry.max_age).map_err(|source| MonitorConfigError::InvalidMaxAge {
                name: name.clone(),
                value: entry.max_age.clone(),
                source,
            })?;

        let backend: BackendKind =
            entry
                .kind
                .parse()
                .map_err(|source| MonitorConfigError::UnknownBackend {
                    name: name.clone(),
                    source,
                })?;

        let restart_kind: RestartKind = entry.restart_type.parse().map_err(|source| {
            MonitorConfigError::UnknownRestartType {
                name: name.clone(),
                source,
            }
        })?;

        let restart = match restart_kind {
            RestartKind::Command if entry.restart_command.is_empty() => {
                return Err(MonitorConfigError::EmptyCommand { name });
            }
            RestartKind::Command => RestartAction::RunCommand(entry.restart_command.clone()),
            RestartKind::Container => RestartAction::RestartWhole,
        };

        Ok(MonitorSpec {
            name,
            backend,
            target: entry.container_name.clone(),
            label_name: entry.label_name.clone(),
            label_value: entry.label_value.clone(),
            max_age,
            restart,
        })
    }
}

/// Fully resolved runtime settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub push_gw: String,
    pub check_interval: Duration,
    pub listen_addr: String,
    pub log_level: String,
    pub log_format: LogFormat,
    pub socket_lxd: PathBuf,
    pub socket_docker: PathBuf,
    pub fetch_timeout: Duration,
    pub remediation_timeout: Duration,
    pub on_missing_data: MissingDataPolicy,
    pub dry_run: bool,
    /// Valid monitors, in file order.
    pub monitors: Vec<MonitorSpec>,
    /// Entries that failed validation.
    pub rejected: Vec<MonitorConfigError>,
}

impl Settings {
    /// Load from the file, the process environment and `overrides`.
    ///
    /// With no explicit path a missing `config.yml` is not an error; an
    /// explicit path must exist.
    pub fn load(path: Option<&Path>, overrides: &Overrides) -> Result<Self, ConfigError> {
        let file = read_sources(path, None)?;
        Self::resolve(file, overrides)
    }

    /// Merge overrides into a raw file config and validate the result.
    pub fn resolve(file: FileConfig, overrides: &Overrides) -> Result<Self, ConfigError> {
        let global = file.global;

        let push_gw = overrides
            .pushgw
            .clone()
            .or(global.push_gw)
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::MissingPushgateway)?;

        let interval = overrides
            .check_interval
            .clone()
            .unwrap_or(global.check_interval);

        let mut monitors = Vec::new();
        let mut rejected = Vec::new();
        let mut seen = HashSet::new();
        for entry in &file.monitors {
            match MonitorSpec::from_entry(entry) {
                Ok(spec) if !seen.insert(spec.name.clone()) => {
                    rejected.push(MonitorConfigError::Duplicate { name: spec.name });
                }
                Ok(spec) => monitors.push(spec),
                Err(e) => rejected.push(e),
            }
        }

        Ok(Settings {
            push_gw,
            check_interval: parse_interval(&interval)?,
            listen_addr: overrides.listen_addr.clone().unwrap_or(global.listen_addr),
            log_level: overrides.log_level.clone().unwrap_or(global.log_level),
            log_format: global.log_format,
            socket_lxd: overrides.socket_lxd.clone().unwrap_or(global.socket_lxd),
            socket_docker: overrides
                .socket_docker
                .clone()
                .unwrap_or(global.socket_docker),
            fetch_timeout: positive("fetch_timeout", &global.fetch_timeout)?,
            remediation_timeout: positive("remediation_timeout", &global.remediation_timeout)?,
            on_missing_data: global.on_missing_data,
            dry_run: overrides.dry_run,
            monitors,
            rejected,
        })
    }

    /// Backend kinds referenced by at least one valid monitor.
    pub fn backend_kinds(&self) -> Vec<BackendKind> {
        let mut kinds: Vec<BackendKind> = self.monitors.iter().map(|m| m.backend).collect();
        kinds.sort();
        kinds.dedup();
        kinds
    }
}

/// Build the file and environment layers.
///
/// `env` replaces the process environment when given.
pub fn read_sources(
    path: Option<&Path>,
    env: Option<config::Map<String, String>>,
) -> Result<FileConfig, ConfigError> {
    let (path, required) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
    };

    let config = Config::builder()
        .add_source(
            File::from(path)
                .format(FileFormat::Yaml)
                .required(required),
        )
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .source(env),
        )
        .build()?;

    Ok(config.try_deserialize()?)
}

// A bare integer is seconds, for configs written before duration strings.
fn parse_interval(value: &str) -> Result<Duration, ConfigError> {
    let trimmed = value.trim();
    if !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_digit()) {
        let secs: u64 = trimmed.parse().map_err(|_| ConfigError::InvalidDuration {
            field: "check_interval",
            value: value.to_string(),
            source: DurationError::InvalidNumber(value.to_string()),
        })?;
        if secs == 0 {
            return Err(ConfigError::ZeroDuration {
                field: "check_interval",
            });
        }
        return Ok(Duration::from_secs(secs));
    }

    positive("check_interval", value)
}

fn positive(field: &'static str, value: &str) -> Result<Duration, ConfigError> {
    let d = parse_duration(value).map_err(|source| ConfigError::InvalidDuration {
        field,
        value: value.to_string(),
        source,
    })?;
    if d.is_zero() {
        return Err(ConfigError::ZeroDuration { field });
    }
    Ok(d)
}
