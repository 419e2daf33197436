//! The fetch, evaluate, remediate loop.

use std::sync::Arc;
use std::time::Duration;

use bouncer_adapters::SnapshotSource;
use bouncer_metrics::Counters;
use bouncer_types::{format_duration, UpdateResult};
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::MissingDataPolicy;
use crate::monitor::{Liveness, Monitor, RemediationError};

/// Outcome counts of a single tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// The snapshot could not be fetched; nothing was evaluated.
    pub fetch_failed: bool,
    pub live: usize,
    pub stale: usize,
    pub no_data: usize,
    pub remediated: usize,
    pub ineligible: usize,
    pub failed: usize,
}

impl TickReport {
    /// Monitors that were looked at this tick.
    pub fn evaluated(&self) -> usize {
        self.live + self.stale + self.no_data
    }
}

/// Drives every monitor on a fixed interval.
#[derive(Debug)]
pub struct Scheduler {
    source: Arc<dyn SnapshotSource>,
    monitors: Vec<Monitor>,
    counters: Arc<Counters>,
    interval: Duration,
    on_missing_data: MissingDataPolicy,
}

impl Scheduler {
    pub fn new(
        source: Arc<dyn SnapshotSource>,
        monitors: Vec<Monitor>,
        counters: Arc<Counters>,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            monitors,
            counters,
            interval,
            on_missing_data: MissingDataPolicy::default(),
        }
    }

    /// Set what happens to monitors whose data is missing or unreadable.
    pub fn with_missing_data_policy(mut self, policy: MissingDataPolicy) -> Self {
        self.on_missing_data = policy;
        self
    }

    pub fn monitors(&self) -> &[Monitor] {
        &self.monitors
    }

    /// Run one tick against the wall clock.
    pub async fn tick(&mut self) -> TickReport {
        self.tick_at(Utc::now()).await
    }

    /// Fetch once, then evaluate and remediate every monitor in order.
    pub async fn tick_at(&mut self, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::default();

        let snapshot = match self.source.fetch().await {
            Ok(snapshot) => {
                self.counters.record_fetch(UpdateResult::Ok);
                snapshot
            }
            Err(e) => {
                self.counters.record_fetch(UpdateResult::Failed);
                error!(source = %self.source.description(), error = %e, "Failed to fetch metrics, skipping tick");
                report.fetch_failed = true;
                return report;
            }
        };

        for monitor in &mut self.monitors {
            match monitor.evaluate_at(&snapshot, now) {
                Ok(Liveness::Live { age }) => {
                    debug!(monitor = %monitor.name(), age_secs = age.as_secs(), "Monitor is live");
                    report.live += 1;
                }
                Ok(Liveness::Stale { age }) => {
                    warn!(
                        monitor = %monitor.name(),
                        age_secs = age.as_secs(),
                        max_age_secs = monitor.max_age().as_secs(),
                        "Monitor is stale"
                    );
                    report.stale += 1;
                    remediate(monitor, now, &mut report).await;
                }
                Err(e) => {
                    warn!(monitor = %monitor.name(), error = %e, "Unable to evaluate monitor");
                    report.no_data += 1;
                    if self.on_missing_data == MissingDataPolicy::Remediate {
                        remediate(monitor, now, &mut report).await;
                    }
                }
            }
        }

        info!(
            live = report.live,
            stale = report.stale,
            no_data = report.no_data,
            remediated = report.remediated,
            ineligible = report.ineligible,
            failed = report.failed,
            "Check complete"
        );
        report
    }

    /// Tick until `stop` turns true or its sender goes away.
    ///
    /// The first tick runs immediately. A tick that overruns the interval
    /// pushes the next one back instead of bunching them up.
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval = %format_duration(self.interval),
            monitors = self.monitors.len(),
            "Scheduler started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Scheduler stopped");
    }
}

async fn remediate(monitor: &mut Monitor, now: DateTime<Utc>, report: &mut TickReport) {
    match monitor.remediate_at(now).await {
        Ok(()) => {
            info!(monitor = %monitor.name(), target = %monitor.target(), "Monitor bounced");
            report.remediated += 1;
        }
        Err(RemediationError::Ineligible) => {
            info!(monitor = %monitor.name(), "Bounced recently, waiting for cooldown");
            report.ineligible += 1;
        }
        Err(e) => {
            error!(monitor = %monitor.name(), target = %monitor.target(), error = %e, "Bounce failed");
            report.failed += 1;
        }
    }
}
