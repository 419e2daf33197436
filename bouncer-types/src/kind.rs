//! Backend and restart selectors used by monitor configuration.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// The container runtime a monitor's remediation is sent through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum BackendKind {
    /// LXD instances, driven through the LXD REST API.
    Lxd,
    /// Docker containers, driven through the Docker Engine API.
    Docker,
    /// Log-only backend used for dry runs.
    #[cfg_attr(feature = "serde", serde(rename = "noop"))]
    NoOp,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Lxd => "lxd",
            BackendKind::Docker => "docker",
            BackendKind::NoOp => "noop",
        }
    }
}

/// What a monitor does to its target when remediating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum RestartKind {
    /// Run `restart_command` inside the target.
    Command,
    /// Restart the whole container.
    Container,
}

impl RestartKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RestartKind::Command => "command",
            RestartKind::Container => "container",
        }
    }
}

/// An unrecognised backend or restart selector.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {what} {value:?} (expected one of: {expected})")]
pub struct UnknownKind {
    pub what: &'static str,
    pub value: String,
    pub expected: &'static str,
}

impl FromStr for BackendKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lxd" => Ok(BackendKind::Lxd),
            "docker" => Ok(BackendKind::Docker),
            "noop" | "dry-run" | "dryrun" => Ok(BackendKind::NoOp),
            _ => Err(UnknownKind {
                what: "backend type",
                value: s.to_string(),
                expected: "lxd, docker, noop",
            }),
        }
    }
}

impl FromStr for RestartKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "command" => Ok(RestartKind::Command),
            "container" => Ok(RestartKind::Container),
            _ => Err(UnknownKind {
                what: "restart type",
                value: s.to_string(),
                expected: "command, container",
            }),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for RestartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
