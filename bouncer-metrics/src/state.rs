//! Internal state management for outcome counters.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bouncer_types::{CounterSeries, CounterSnapshot, UpdateResult, ALL_MONITORS};
use parking_lot::RwLock;

use crate::handle::MonitorCounters;

/// A counter family partitioned by `(monitor, result)`.
///
/// Series are created lazily the first time they are incremented.
#[derive(Debug, Default)]
pub struct CounterVec {
    series: RwLock<BTreeMap<String, BTreeMap<&'static str, Arc<AtomicU64>>>>,
}

impl CounterVec {
    /// Get or create the counter for a series.
    pub fn get_or_create(&self, monitor: &str, result: &'static str) -> Arc<AtomicU64> {
        // Fast path: check if it exists
        {
            let series = self.series.read();
            if let Some(counter) = series.get(monitor).and_then(|r| r.get(result)) {
                return counter.clone();
            }
        }

        // Slow path: create it
        let mut series = self.series.write();
        series
            .entry(monitor.to_string())
            .or_default()
            .entry(result)
            .or_insert_with(|| Arc::new(AtomicU64::new(0)))
            .clone()
    }

    /// Increment a series by one.
    pub fn inc(&self, monitor: &str, result: &'static str) {
        self.get_or_create(monitor, result)
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Current value of a series, zero if it was never created.
    pub fn get(&self, monitor: &str, result: &str) -> u64 {
        self.series
            .read()
            .get(monitor)
            .and_then(|r| r.get(result))
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Copy every series out.
    pub fn collect(&self) -> CounterSeries {
        self.series
            .read()
            .iter()
            .map(|(monitor, results)| {
                let values = results
                    .iter()
                    .map(|(result, c)| (result.to_string(), c.load(Ordering::Relaxed)))
                    .collect();
                (monitor.clone(), values)
            })
            .collect()
    }
}

/// All counters of one watchdog process.
///
/// Every series carries the Pushgateway URL as its `pushgateway` label, so
/// it is fixed at construction.
#[derive(Debug)]
pub struct Counters {
    pushgateway: String,
    monitors_configured: AtomicU64,
    updates: CounterVec,
    checks: CounterVec,
    bounces: CounterVec,
}

impl Counters {
    /// Create an empty counter set labelled with `pushgateway`.
    pub fn new(pushgateway: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            pushgateway: pushgateway.into(),
            monitors_configured: AtomicU64::new(0),
            updates: CounterVec::default(),
            checks: CounterVec::default(),
            bounces: CounterVec::default(),
        })
    }

    /// Get a handle for recording a single monitor's outcomes.
    pub fn register(self: &Arc<Self>, monitor: &str) -> MonitorCounters {
        MonitorCounters {
            counters: self.clone(),
            name: monitor.to_string(),
        }
    }

    /// The `pushgateway` label value.
    pub fn pushgateway(&self) -> &str {
        &self.pushgateway
    }

    /// Set the `monitors_configured` gauge.
    pub fn set_monitors_configured(&self, count: usize) {
        self.monitors_configured
            .store(count as u64, Ordering::Relaxed);
    }

    /// Record the outcome of fetching the whole snapshot.
    pub fn record_fetch(&self, result: UpdateResult) {
        self.updates.inc(ALL_MONITORS, result.as_str());
    }

    pub(crate) fn updates(&self) -> &CounterVec {
        &self.updates
    }

    pub(crate) fn checks(&self) -> &CounterVec {
        &self.checks
    }

    pub(crate) fn bounces(&self) -> &CounterVec {
        &self.bounces
    }

    /// Collect every counter into a snapshot.
    pub fn collect(&self) -> CounterSnapshot {
        CounterSnapshot {
            pushgateway: self.pushgateway.clone(),
            monitors_configured: self.monitors_configured.load(Ordering::Relaxed),
            updates: self.updates.collect(),
            checks: self.checks.collect(),
            bounces: self.bounces.collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bouncer_types::{BounceResult, CheckResult};

    #[test]
    fn get_or_create_returns_same_arc_on_second_call() {
        let vec = CounterVec::default();

        let c1 = vec.get_or_create("weewx", "ok");
        let c2 = vec.get_or_create("weewx", "ok");

        // Should be the same Arc (pointer equality)
        assert!(Arc::ptr_eq(&c1, &c2));

        c1.fetch_add(10, Ordering::Relaxed);
        assert_eq!(c2.load(Ordering::Relaxed), 10);
    }

    #[test]
    fn series_are_tracked_independently() {
        let vec = CounterVec::default();
        vec.inc("weewx", "ok");
        vec.inc("weewx", "ok");
        vec.inc("weewx", "failed");
        vec.inc("mqtt", "ok");

        assert_eq!(vec.get("weewx", "ok"), 2);
        assert_eq!(vec.get("weewx", "failed"), 1);
        assert_eq!(vec.get("mqtt", "ok"), 1);
        assert_eq!(vec.get("mqtt", "failed"), 0);
    }

    #[test]
    fn fetch_outcomes_use_all_label() {
        let counters = Counters::new("http://pgw:9091");
        counters.record_fetch(UpdateResult::Ok);
        counters.record_fetch(UpdateResult::Ok);
        counters.record_fetch(UpdateResult::Failed);

        let snapshot = counters.collect();
        assert_eq!(snapshot.update(ALL_MONITORS, UpdateResult::Ok), 2);
        assert_eq!(snapshot.update(ALL_MONITORS, UpdateResult::Failed), 1);
        assert_eq!(snapshot.pushgateway, "http://pgw:9091");
    }

    #[test]
    fn collect_reports_monitors_configured() {
        let counters = Counters::new("http://pgw:9091");
        counters.set_monitors_configured(3);
        assert_eq!(counters.collect().monitors_configured, 3);
    }

    #[test]
    fn handles_share_underlying_counters() {
        let counters = Counters::new("http://pgw:9091");
        let a = counters.register("weewx");
        let b = counters.register("weewx");

        a.record_check(CheckResult::Healthy);
        b.record_check(CheckResult::Healthy);
        b.record_bounce(BounceResult::Ineligible);

        let snapshot = counters.collect();
        assert_eq!(snapshot.check("weewx", CheckResult::Healthy), 2);
        assert_eq!(snapshot.bounce("weewx", BounceResult::Ineligible), 1);
    }

    #[test]
    fn concurrent_increments_are_thread_safe() {
        use std::thread;

        let counters = Counters::new("http://pgw:9091");

        let mut handles = vec![];
        for _ in 0..10 {
            let m = counters.register("weewx");
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    m.record_check(CheckResult::Unhealthy);
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }

        let snapshot = counters.collect();
        assert_eq!(snapshot.check("weewx", CheckResult::Unhealthy), 1000);
    }
}
