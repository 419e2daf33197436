//! Per-monitor handle for recording outcomes.

use std::sync::Arc;

use bouncer_types::{BounceResult, CheckResult, UpdateResult};

use crate::state::Counters;

/// A handle for recording the outcomes of a specific monitor.
///
/// Obtain one with [`Counters::register`]. Handles are cheap to clone and
/// can be used from any thread.
///
/// # Example
///
/// ```rust
/// use bouncer_metrics::{Counters, UpdateResult};
///
/// let counters = Counters::new("http://retro:9091");
/// let handle = counters.register("weewx");
///
/// handle.record_update(UpdateResult::Failed);
/// assert_eq!(counters.collect().update("weewx", UpdateResult::Failed), 1);
/// ```
#[derive(Clone)]
pub struct MonitorCounters {
    pub(crate) counters: Arc<Counters>,
    pub(crate) name: String,
}

impl MonitorCounters {
    /// Record whether this monitor's timestamp could be pulled from the
    /// snapshot.
    pub fn record_update(&self, result: UpdateResult) {
        self.counters.updates().inc(&self.name, result.as_str());
    }

    /// Record the outcome of a liveness check.
    pub fn record_check(&self, result: CheckResult) {
        self.counters.checks().inc(&self.name, result.as_str());
    }

    /// Record the outcome of a remediation attempt.
    pub fn record_bounce(&self, result: BounceResult) {
        self.counters.bounces().inc(&self.name, result.as_str());
    }

    /// Get the monitor name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for MonitorCounters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorCounters")
            .field("name", &self.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_each_family() {
        let counters = Counters::new("http://pgw:9091");
        let handle = counters.register("weewx");

        handle.record_update(UpdateResult::Ok);
        handle.record_check(CheckResult::Unhealthy);
        handle.record_bounce(BounceResult::Failed);
        handle.record_bounce(BounceResult::Failed);

        let snapshot = counters.collect();
        assert_eq!(snapshot.update("weewx", UpdateResult::Ok), 1);
        assert_eq!(snapshot.check("weewx", CheckResult::Unhealthy), 1);
        assert_eq!(snapshot.bounce("weewx", BounceResult::Failed), 2);
    }

    #[test]
    fn test_handles_do_not_leak_between_monitors() {
        let counters = Counters::new("http://pgw:9091");
        counters.register("a").record_check(CheckResult::Healthy);

        let snapshot = counters.collect();
        assert_eq!(snapshot.check("b", CheckResult::Healthy), 0);
        assert_eq!(counters.register("b").name(), "b");
    }
}
