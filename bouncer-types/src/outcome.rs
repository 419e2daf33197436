//! Outcome labels recorded per monitor, and a point-in-time copy of the
//! counters that hold them.

use std::collections::BTreeMap;

/// Result of pulling data for a monitor (or for all monitors at once).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateResult {
    Ok,
    Failed,
}

/// Result of a liveness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckResult {
    Healthy,
    Unhealthy,
}

/// Result of a remediation ("bounce") attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BounceResult {
    Ok,
    Failed,
    /// The cooldown was still active; no backend call was made.
    Ineligible,
}

impl UpdateResult {
    pub const fn as_str(&self) -> &'static str {
        match self {
            UpdateResult::Ok => "ok",
            UpdateResult::Failed => "failed",
        }
    }
}

impl CheckResult {
    pub const fn as_str(&self) -> &'static str {
        match self {
            CheckResult::Healthy => "healthy",
            CheckResult::Unhealthy => "unhealthy",
        }
    }

    pub const fn from_live(live: bool) -> Self {
        if live {
            CheckResult::Healthy
        } else {
            CheckResult::Unhealthy
        }
    }
}

impl BounceResult {
    pub const fn as_str(&self) -> &'static str {
        match self {
            BounceResult::Ok => "ok",
            BounceResult::Failed => "failed",
            BounceResult::Ineligible => "ineligible",
        }
    }
}

/// Counter values keyed by monitor name, then by result label.
pub type CounterSeries = BTreeMap<String, BTreeMap<String, u64>>;

/// A point-in-time copy of every outcome counter.
///
/// Produced by the metrics crate and rendered by the exposition server.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CounterSnapshot {
    /// The Pushgateway URL every series is labelled with.
    pub pushgateway: String,

    /// Number of monitors that passed validation.
    pub monitors_configured: u64,

    /// `monitor_updates` series.
    pub updates: CounterSeries,

    /// `monitor_checks` series.
    pub checks: CounterSeries,

    /// `monitor_bounces` series.
    pub bounces: CounterSeries,
}

impl CounterSnapshot {
    /// Value of `monitor_updates{monitor, result}`, zero if never recorded.
    pub fn update(&self, monitor: &str, result: UpdateResult) -> u64 {
        value(&self.updates, monitor, result.as_str())
    }

    /// Value of `monitor_checks{monitor, result}`, zero if never recorded.
    pub fn check(&self, monitor: &str, result: CheckResult) -> u64 {
        value(&self.checks, monitor, result.as_str())
    }

    /// Value of `monitor_bounces{monitor, result}`, zero if never recorded.
    pub fn bounce(&self, monitor: &str, result: BounceResult) -> u64 {
        value(&self.bounces, monitor, result.as_str())
    }
}

fn value(series: &CounterSeries, monitor: &str, result: &str) -> u64 {
    series
        .get(monitor)
        .and_then(|results| results.get(result))
        .copied()
        .unwrap_or(0)
}
