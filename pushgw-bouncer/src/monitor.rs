//! A single watch target and its remediation policy.
//!
//! A [`Monitor`] pulls its "last pushed" timestamp out of each snapshot,
//! decides whether the service is [`Liveness::Live`] or
//! [`Liveness::Stale`], and restarts it through its bound backend. Repeated
//! restarts are debounced: after a successful remediation the monitor waits
//! at least `max_age` before it will act again.
//!
//! Every operation has an `_at` form that takes the evaluation instant, so
//! the state machine can be driven without a real clock.

use std::sync::Arc;
use std::time::Duration;

use bouncer_adapters::{AdapterError, RemediationBackend};
use bouncer_metrics::MonitorCounters;
use bouncer_types::{
    BackendKind, BounceResult, CheckResult, LookupError, MetricsSnapshot, RestartKind,
    UpdateResult,
};
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::config::MonitorSpec;

/// Default upper bound on a single backend call.
pub const DEFAULT_REMEDIATION_TIMEOUT: Duration = Duration::from_secs(60);

/// What to do when a monitor is stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartAction {
    /// Run a command inside the target.
    RunCommand(Vec<String>),
    /// Restart the target as a whole.
    RestartWhole,
}

impl RestartAction {
    pub fn kind(&self) -> RestartKind {
        match self {
            RestartAction::RunCommand(_) => RestartKind::Command,
            RestartAction::RestartWhole => RestartKind::Container,
        }
    }
}

/// Result of a successful evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Live { age: Duration },
    Stale { age: Duration },
}

impl Liveness {
    pub fn is_live(&self) -> bool {
        matches!(self, Liveness::Live { .. })
    }

    /// Time since the service last pushed, in whole seconds.
    pub fn age(&self) -> Duration {
        match self {
            Liveness::Live { age } | Liveness::Stale { age } => *age,
        }
    }
}

/// Why a monitor could not be evaluated.
#[derive(Debug, Error)]
pub enum EvalError {
    /// The snapshot holds no usable record for the selector.
    #[error("no data: {0}")]
    NoData(#[from] LookupError),

    /// The record was found but its timestamp is not RFC 3339.
    #[error("unparseable timestamp {raw:?}: {source}")]
    BadTimestamp {
        raw: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// Why a remediation did not happen or did not succeed.
#[derive(Debug, Error)]
pub enum RemediationError {
    /// The monitor was remediated less than `max_age` ago.
    #[error("remediated too recently, waiting for the cooldown")]
    Ineligible,

    /// The backend reported an error.
    #[error("backend failure: {0}")]
    BackendFailure(#[source] AdapterError),

    /// The backend did not answer within the remediation timeout.
    #[error("remediation timed out after {0:?}")]
    TimedOut(Duration),
}

/// A named watch target bound to a remediation backend.
#[derive(Debug)]
pub struct Monitor {
    name: String,
    label_name: String,
    label_value: String,
    target: String,
    max_age: Duration,
    restart: RestartAction,
    backend: Arc<dyn RemediationBackend>,
    counters: MonitorCounters,
    remediation_timeout: Duration,
    last_seen_at: Option<DateTime<Utc>>,
    last_seen_raw: Option<String>,
    last_remediated_at: Option<DateTime<Utc>>,
}

impl Monitor {
    /// Bind a validated monitor definition to its backend and counters.
    pub fn new(
        spec: MonitorSpec,
        backend: Arc<dyn RemediationBackend>,
        counters: MonitorCounters,
    ) -> Self {
        Self {
            name: spec.name,
            label_name: spec.label_name,
            label_value: spec.label_value,
            target: spec.target,
            max_age: spec.max_age,
            restart: spec.restart,
            backend,
            counters,
            remediation_timeout: DEFAULT_REMEDIATION_TIMEOUT,
            last_seen_at: None,
            last_seen_raw: None,
            last_remediated_at: None,
        }
    }

    /// Set the upper bound on a single backend call.
    pub fn with_remediation_timeout(mut self, timeout: Duration) -> Self {
        self.remediation_timeout = timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    pub fn restart(&self) -> &RestartAction {
        &self.restart
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// Timestamp of the last successful evaluation.
    pub fn last_seen_at(&self) -> Option<DateTime<Utc>> {
        self.last_seen_at
    }

    /// The raw timestamp string last pulled from the snapshot.
    pub fn last_seen_raw(&self) -> Option<&str> {
        self.last_seen_raw.as_deref()
    }

    pub fn last_remediated_at(&self) -> Option<DateTime<Utc>> {
        self.last_remediated_at
    }

    /// Evaluate liveness against the wall clock.
    pub fn evaluate(&mut self, snapshot: &MetricsSnapshot) -> Result<Liveness, EvalError> {
        self.evaluate_at(snapshot, Utc::now())
    }

    /// Evaluate liveness as of `now`.
    ///
    /// A timestamp in the future (clock skew) counts as age zero.
    pub fn evaluate_at(
        &mut self,
        snapshot: &MetricsSnapshot,
        now: DateTime<Utc>,
    ) -> Result<Liveness, EvalError> {
        let raw = match snapshot.lookup(&self.label_name, &self.label_value) {
            Ok(raw) => {
                self.counters.record_update(UpdateResult::Ok);
                raw
            }
            Err(e) => {
                self.counters.record_update(UpdateResult::Failed);
                return Err(EvalError::NoData(e));
            }
        };
        self.last_seen_raw = Some(raw.to_string());

        let parsed = DateTime::parse_from_rfc3339(raw)
            .map_err(|source| EvalError::BadTimestamp {
                raw: raw.to_string(),
                source,
            })?
            .with_timezone(&Utc);
        self.last_seen_at = Some(parsed);

        let age = Duration::from_secs((now - parsed).num_seconds().max(0) as u64);
        let live = age <= self.max_age;
        self.counters.record_check(CheckResult::from_live(live));

        Ok(if live {
            Liveness::Live { age }
        } else {
            Liveness::Stale { age }
        })
    }

    /// Whether a remediation would be attempted right now.
    pub fn can_remediate(&self) -> bool {
        self.can_remediate_at(Utc::now())
    }

    /// Whether a remediation would be attempted at `now`.
    pub fn can_remediate_at(&self, now: DateTime<Utc>) -> bool {
        match self.last_remediated_at {
            None => true,
            // A negative elapsed time fails to convert and keeps the gate shut.
            Some(at) => (now - at)
                .to_std()
                .map(|elapsed| elapsed > self.max_age)
                .unwrap_or(false),
        }
    }

    /// Remediate through the bound backend, honouring the cooldown.
    pub async fn remediate(&mut self) -> Result<(), RemediationError> {
        self.remediate_at(Utc::now()).await
    }

    /// Remediate as of `now`; on success `now` becomes the last remediation
    /// time.
    pub async fn remediate_at(&mut self, now: DateTime<Utc>) -> Result<(), RemediationError> {
        if !self.can_remediate_at(now) {
            self.counters.record_bounce(BounceResult::Ineligible);
            return Err(RemediationError::Ineligible);
        }

        let outcome = tokio::time::timeout(self.remediation_timeout, self.dispatch()).await;

        match outcome {
            Ok(Ok(())) => {
                self.last_remediated_at = Some(now);
                self.counters.record_bounce(BounceResult::Ok);
                Ok(())
            }
            Ok(Err(e)) => {
                self.counters.record_bounce(BounceResult::Failed);
                Err(RemediationError::BackendFailure(e))
            }
            Err(_) => {
                self.counters.record_bounce(BounceResult::Failed);
                Err(RemediationError::TimedOut(self.remediation_timeout))
            }
        }
    }

    async fn dispatch(&self) -> Result<(), AdapterError> {
        match &self.restart {
            RestartAction::RunCommand(argv) => self.backend.run_command(&self.target, argv).await,
            RestartAction::RestartWhole => self.backend.restart_whole(&self.target).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{spec, Call, RecordingBackend};
    use bouncer_metrics::Counters;
    use chrono::TimeZone;

    #[test]
    fn test_lxd_wait_fits_inside_remediation_timeout() {
        use bouncer_adapters::lxd::{DEFAULT_OPERATION_WAIT, OPERATION_WAIT_SLACK};

        // LXD must answer its own wait before the monitor gives up.
        assert!(DEFAULT_OPERATION_WAIT + OPERATION_WAIT_SLACK < DEFAULT_REMEDIATION_TIMEOUT);
    }

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, h, m, s).unwrap()
    }

    fn weewx_snapshot() -> MetricsSnapshot {
        MetricsSnapshot::builder()
            .record(|r| {
                r.label("instance", "weewx")
                    .time_stamp("2024-01-01T00:00:00Z")
            })
            .build()
    }

    fn monitor(backend: Arc<RecordingBackend>) -> (Monitor, Arc<Counters>) {
        let counters = Counters::new("http://pgw:9091");
        let m = Monitor::new(spec("weewx"), backend, counters.register("weewx"));
        (m, counters)
    }

    #[test]
    fn fresh_record_is_live() {
        let (mut m, counters) = monitor(RecordingBackend::ok());

        let liveness = m.evaluate_at(&weewx_snapshot(), at(0, 1, 30)).unwrap();

        assert_eq!(
            liveness,
            Liveness::Live {
                age: Duration::from_secs(90)
            }
        );
        assert_eq!(m.last_seen_raw(), Some("2024-01-01T00:00:00Z"));
        assert_eq!(m.last_seen_at(), Some(at(0, 0, 0)));

        let snap = counters.collect();
        assert_eq!(snap.update("weewx", UpdateResult::Ok), 1);
        assert_eq!(snap.check("weewx", CheckResult::Healthy), 1);
    }

    #[test]
    fn age_equal_to_max_age_is_live() {
        let (mut m, _) = monitor(RecordingBackend::ok());
        let liveness = m.evaluate_at(&weewx_snapshot(), at(0, 2, 0)).unwrap();
        assert!(liveness.is_live());
    }

    #[test]
    fn old_record_is_stale() {
        let (mut m, counters) = monitor(RecordingBackend::ok());

        let liveness = m.evaluate_at(&weewx_snapshot(), at(0, 3, 0)).unwrap();

        assert_eq!(
            liveness,
            Liveness::Stale {
                age: Duration::from_secs(180)
            }
        );
        assert_eq!(
            counters.collect().check("weewx", CheckResult::Unhealthy),
            1
        );
    }

    #[test]
    fn future_timestamp_counts_as_zero_age() {
        let (mut m, _) = monitor(RecordingBackend::ok());

        let liveness = m.evaluate_at(&weewx_snapshot(), at(0, 0, 0) - chrono::Duration::minutes(5));

        assert_eq!(
            liveness.unwrap(),
            Liveness::Live {
                age: Duration::ZERO
            }
        );
    }

    #[test]
    fn missing_selector_is_no_data() {
        let counters = Counters::new("http://pgw:9091");
        let mut m = Monitor::new(
            spec("missing"),
            RecordingBackend::ok(),
            counters.register("missing"),
        );

        let err = m.evaluate_at(&weewx_snapshot(), at(0, 1, 0)).unwrap_err();

        assert!(matches!(err, EvalError::NoData(LookupError::NotFound { .. })));
        assert_eq!(counters.collect().update("missing", UpdateResult::Failed), 1);
        assert_eq!(counters.collect().check("missing", CheckResult::Healthy), 0);
        assert!(m.last_seen_at().is_none());
    }

    #[test]
    fn empty_snapshot_is_no_data() {
        let (mut m, _) = monitor(RecordingBackend::ok());
        let err = m
            .evaluate_at(&MetricsSnapshot::builder().build(), at(0, 1, 0))
            .unwrap_err();
        assert!(matches!(err, EvalError::NoData(_)));
    }

    #[test]
    fn record_without_timestamp_is_no_data() {
        let (mut m, _) = monitor(RecordingBackend::ok());
        let snapshot = MetricsSnapshot::builder()
            .record(|r| r.label("instance", "weewx"))
            .build();

        let err = m.evaluate_at(&snapshot, at(0, 1, 0)).unwrap_err();
        assert!(matches!(
            err,
            EvalError::NoData(LookupError::MissingTimestamp { .. })
        ));
    }

    #[test]
    fn garbage_timestamp_is_bad_timestamp() {
        let (mut m, counters) = monitor(RecordingBackend::ok());
        let snapshot = MetricsSnapshot::builder()
            .record(|r| r.label("instance", "weewx").time_stamp("yesterday"))
            .build();

        let err = m.evaluate_at(&snapshot, at(0, 1, 0)).unwrap_err();

        match err {
            EvalError::BadTimestamp { raw, .. } => assert_eq!(raw, "yesterday"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(m.last_seen_raw(), Some("yesterday"));
        assert_eq!(counters.collect().update("weewx", UpdateResult::Ok), 1);
    }

    #[test]
    fn never_remediated_is_eligible() {
        let (m, _) = monitor(RecordingBackend::ok());
        assert!(m.can_remediate_at(at(0, 0, 0)));
        assert!(m.can_remediate());
    }

    #[tokio::test]
    async fn remediate_runs_command_and_records_time() {
        let backend = RecordingBackend::ok();
        let (mut m, counters) = monitor(backend.clone());

        m.remediate_at(at(0, 3, 0)).await.unwrap();

        assert_eq!(m.last_remediated_at(), Some(at(0, 3, 0)));
        assert_eq!(
            backend.calls(),
            vec![Call::RunCommand {
                target: "weewx".to_string(),
                argv: vec![
                    "/bin/systemctl".to_string(),
                    "restart".to_string(),
                    "weewx".to_string()
                ],
            }]
        );
        assert_eq!(counters.collect().bounce("weewx", BounceResult::Ok), 1);
    }

    #[tokio::test]
    async fn restart_whole_dispatches_to_container_restart() {
        let backend = RecordingBackend::ok();
        let counters = Counters::new("http://pgw:9091");
        let mut s = spec("weewx");
        s.restart = RestartAction::RestartWhole;
        let mut m = Monitor::new(s, backend.clone(), counters.register("weewx"));

        m.remediate_at(at(0, 3, 0)).await.unwrap();

        assert_eq!(
            backend.calls(),
            vec![Call::RestartWhole {
                target: "weewx".to_string()
            }]
        );
        assert_eq!(m.restart().kind(), RestartKind::Container);
    }

    #[tokio::test]
    async fn second_remediation_within_max_age_is_ineligible() {
        let backend = RecordingBackend::ok();
        let (mut m, counters) = monitor(backend.clone());

        m.remediate_at(at(0, 3, 0)).await.unwrap();
        let err = m.remediate_at(at(0, 3, 1)).await.unwrap_err();

        assert!(matches!(err, RemediationError::Ineligible));
        assert_eq!(backend.calls().len(), 1);
        assert_eq!(m.last_remediated_at(), Some(at(0, 3, 0)));

        let snap = counters.collect();
        assert_eq!(snap.bounce("weewx", BounceResult::Ok), 1);
        assert_eq!(snap.bounce("weewx", BounceResult::Ineligible), 1);
    }

    #[tokio::test]
    async fn cooldown_ends_strictly_after_max_age() {
        let backend = RecordingBackend::ok();
        let (mut m, _) = monitor(backend.clone());

        m.remediate_at(at(0, 3, 0)).await.unwrap();

        assert!(!m.can_remediate_at(at(0, 5, 0)));
        assert!(m.can_remediate_at(at(0, 5, 1)));

        m.remediate_at(at(0, 5, 1)).await.unwrap();
        assert_eq!(backend.calls().len(), 2);
        assert_eq!(m.last_remediated_at(), Some(at(0, 5, 1)));
    }

    #[tokio::test]
    async fn clock_going_backwards_keeps_gate_shut() {
        let (mut m, _) = monitor(RecordingBackend::ok());
        m.remediate_at(at(0, 3, 0)).await.unwrap();

        assert!(!m.can_remediate_at(at(0, 0, 0)));
    }

    #[tokio::test]
    async fn backend_failure_is_counted_and_not_debounced() {
        let backend = RecordingBackend::failing();
        let (mut m, counters) = monitor(backend.clone());

        let err = m.remediate_at(at(0, 3, 0)).await.unwrap_err();

        assert!(matches!(
            err,
            RemediationError::BackendFailure(AdapterError::CommandFailed { code: 1 })
        ));
        assert!(m.last_remediated_at().is_none());
        assert!(m.can_remediate_at(at(0, 3, 1)));
        assert_eq!(counters.collect().bounce("weewx", BounceResult::Failed), 1);
    }

    #[tokio::test]
    async fn slow_backend_times_out() {
        let backend = RecordingBackend::slow(Duration::from_secs(5));
        let (m, counters) = monitor(backend);
        let mut m = m.with_remediation_timeout(Duration::from_millis(50));

        let err = m.remediate_at(at(0, 3, 0)).await.unwrap_err();

        assert!(matches!(err, RemediationError::TimedOut(_)));
        assert!(m.last_remediated_at().is_none());
        assert_eq!(counters.collect().bounce("weewx", BounceResult::Failed), 1);
    }

    #[tokio::test]
    async fn stale_then_remediate_then_ineligible() {
        let backend = RecordingBackend::ok();
        let (mut m, _) = monitor(backend.clone());
        let snapshot = weewx_snapshot();

        assert!(m.evaluate_at(&snapshot, at(0, 1, 30)).unwrap().is_live());

        let stale = m.evaluate_at(&snapshot, at(0, 3, 0)).unwrap();
        assert!(!stale.is_live());
        m.remediate_at(at(0, 3, 0)).await.unwrap();
        assert_eq!(m.last_remediated_at(), Some(at(0, 3, 0)));

        assert!(matches!(
            m.remediate_at(at(0, 3, 0)).await,
            Err(RemediationError::Ineligible)
        ));
        assert_eq!(backend.calls().len(), 1);
    }
}
