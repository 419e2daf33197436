//! MetricsSnapshot - a point-in-time view of the Pushgateway.

use std::collections::BTreeMap;

use thiserror::Error;

/// Status string the Pushgateway API reports for a successful response.
pub const STATUS_SUCCESS: &str = "success";

/// A point-in-time snapshot of every metric group pushed to a Pushgateway.
///
/// This mirrors the body of `GET /api/v1/metrics`. Records keep the order
/// the Pushgateway returned them in, which matters for [`lookup`]: when
/// more than one record matches a selector, the last one wins.
///
/// A snapshot is never mutated once built; every scheduler tick fetches a
/// fresh one.
///
/// [`lookup`]: MetricsSnapshot::lookup
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MetricsSnapshot {
    /// API status, `"success"` on a healthy response.
    #[cfg_attr(feature = "serde", serde(default))]
    pub status: String,

    /// Metric groups in API order.
    #[cfg_attr(feature = "serde", serde(default))]
    pub data: Vec<MetricRecord>,
}

/// One metric group: its grouping labels plus the time it was last pushed.
///
/// The Pushgateway also returns every pushed metric family as a sibling
/// key; those are ignored here since only the push time matters.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MetricRecord {
    /// Grouping labels (`job`, `instance`, ...).
    #[cfg_attr(feature = "serde", serde(default))]
    pub labels: BTreeMap<String, String>,

    /// The `push_time_seconds` family for this group.
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub push_time_seconds: Option<PushTime>,
}

impl MetricRecord {
    /// Returns true if `labels[label_name] == label_value`.
    pub fn matches(&self, label_name: &str, label_value: &str) -> bool {
        self.labels
            .get(label_name)
            .is_some_and(|value| value == label_value)
    }

    /// The raw RFC 3339 push timestamp, if the record carries one.
    pub fn time_stamp(&self) -> Option<&str> {
        self.push_time_seconds
            .as_ref()
            .and_then(|p| p.time_stamp.as_deref())
    }
}

/// The `push_time_seconds` metric family of a record.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PushTime {
    /// Last push time as an RFC 3339 string.
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub time_stamp: Option<String>,
}

/// Why a selector could not be resolved to a timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    /// No record carries the selector label with the wanted value.
    #[error("no metric group with {label_name}=\"{label_value}\"")]
    NotFound {
        label_name: String,
        label_value: String,
    },

    /// The matching record has no `push_time_seconds.time_stamp`.
    #[error("metric group with {label_name}=\"{label_value}\" has no push time")]
    MissingTimestamp {
        label_name: String,
        label_value: String,
    },
}

impl MetricsSnapshot {
    /// Create a builder for constructing snapshots.
    pub fn builder() -> MetricsSnapshotBuilder {
        MetricsSnapshotBuilder::new()
    }

    /// Check if the snapshot holds no records.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True when the API reported success.
    pub fn is_success(&self) -> bool {
        self.status == STATUS_SUCCESS
    }

    /// Iterate over the records in API order.
    pub fn iter(&self) -> impl Iterator<Item = &MetricRecord> {
        self.data.iter()
    }

    /// Find the push timestamp of the record selected by
    /// `label_name = label_value`.
    ///
    /// Records are scanned in order and the last match wins. If that record
    /// has no push time the lookup fails with
    /// [`LookupError::MissingTimestamp`], which is distinct from finding no
    /// match at all.
    pub fn lookup(&self, label_name: &str, label_value: &str) -> Result<&str, LookupError> {
        let record = self
            .data
            .iter()
            .rev()
            .find(|r| r.matches(label_name, label_value))
            .ok_or_else(|| LookupError::NotFound {
                label_name: label_name.to_string(),
                label_value: label_value.to_string(),
            })?;

        record
            .time_stamp()
            .ok_or_else(|| LookupError::MissingTimestamp {
                label_name: label_name.to_string(),
                label_value: label_value.to_string(),
            })
    }
}

/// Builder for constructing `MetricsSnapshot` instances.
#[derive(Debug, Default)]
pub struct MetricsSnapshotBuilder {
    status: Option<String>,
    data: Vec<MetricRecord>,
}

impl MetricsSnapshotBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the API status (defaults to `"success"`).
    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// Append a record built using a closure.
    pub fn record<F>(mut self, f: F) -> Self
    where
        F: FnOnce(MetricRecordBuilder) -> MetricRecordBuilder,
    {
        self.data.push(f(MetricRecordBuilder::default()).build());
        self
    }

    /// Append a pre-built record.
    pub fn push(mut self, record: MetricRecord) -> Self {
        self.data.push(record);
        self
    }

    /// Build the snapshot.
    pub fn build(self) -> MetricsSnapshot {
        MetricsSnapshot {
            status: self.status.unwrap_or_else(|| STATUS_SUCCESS.to_string()),
            data: self.data,
        }
    }
}

/// Builder for `MetricRecord`.
#[derive(Debug, Default)]
pub struct MetricRecordBuilder {
    labels: BTreeMap<String, String>,
    time_stamp: Option<String>,
}

impl MetricRecordBuilder {
    /// Add a grouping label.
    pub fn label(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(name.into(), value.into());
        self
    }

    /// Set the push timestamp.
    pub fn time_stamp(mut self, ts: impl Into<String>) -> Self {
        self.time_stamp = Some(ts.into());
        self
    }

    /// Build the record.
    pub fn build(self) -> MetricRecord {
        MetricRecord {
            labels: self.labels,
            push_time_seconds: self.time_stamp.map(|ts| PushTime {
                time_stamp: Some(ts),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weewx_snapshot() -> MetricsSnapshot {
        MetricsSnapshot::builder()
            .record(|r| {
                r.label("instance", "weewx")
                    .time_stamp("2024-01-01T00:00:00Z")
            })
            .build()
    }

    #[test]
    fn lookup_finds_matching_record() {
        let snapshot = weewx_snapshot();
        assert_eq!(
            snapshot.lookup("instance", "weewx"),
            Ok("2024-01-01T00:00:00Z")
        );
    }

    #[test]
    fn lookup_missing_selector_is_not_found() {
        let snapshot = weewx_snapshot();
        assert_eq!(
            snapshot.lookup("instance", "missing"),
            Err(LookupError::NotFound {
                label_name: "instance".to_string(),
                label_value: "missing".to_string(),
            })
        );
    }

    #[test]
    fn lookup_on_empty_snapshot_is_not_found() {
        let snapshot = MetricsSnapshot::default();
        assert!(matches!(
            snapshot.lookup("instance", "weewx"),
            Err(LookupError::NotFound { .. })
        ));
    }

    #[test]
    fn lookup_wrong_label_name_is_not_found() {
        let snapshot = weewx_snapshot();
        assert!(matches!(
            snapshot.lookup("job", "weewx"),
            Err(LookupError::NotFound { .. })
        ));
    }

    #[test]
    fn last_match_wins() {
        let snapshot = MetricsSnapshot::builder()
            .record(|r| {
                r.label("instance", "weewx")
                    .time_stamp("2024-01-01T00:00:00Z")
            })
            .record(|r| r.label("instance", "other").time_stamp("2023-01-01T00:00:00Z"))
            .record(|r| {
                r.label("instance", "weewx")
                    .time_stamp("2024-06-01T12:00:00Z")
            })
            .build();

        assert_eq!(
            snapshot.lookup("instance", "weewx"),
            Ok("2024-06-01T12:00:00Z")
        );
    }

    #[test]
    fn lookup_is_idempotent() {
        let snapshot = weewx_snapshot();
        let first = snapshot.lookup("instance", "weewx");
        let second = snapshot.lookup("instance", "weewx");
        assert_eq!(first, second);

        let first = snapshot.lookup("instance", "nope");
        let second = snapshot.lookup("instance", "nope");
        assert_eq!(first, second);
    }

    #[test]
    fn matching_record_without_push_time_is_distinct_error() {
        let snapshot = MetricsSnapshot::builder()
            .record(|r| r.label("instance", "weewx"))
            .build();

        assert!(matches!(
            snapshot.lookup("instance", "weewx"),
            Err(LookupError::MissingTimestamp { .. })
        ));
    }

    #[test]
    fn builder_defaults_to_success() {
        let snapshot = MetricsSnapshot::builder().build();
        assert!(snapshot.is_success());
        assert!(snapshot.is_empty());

        let failed = MetricsSnapshot::builder().status("error").build();
        assert!(!failed.is_success());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn decodes_pushgateway_api_body() {
        let body = r#"{
            "status": "success",
            "data": [
                {
                    "labels": { "instance": "weewx", "job": "weewx" },
                    "last_push_successful": true,
                    "push_time_seconds": {
                        "time_stamp": "2024-01-01T00:00:00.123456789Z",
                        "type": "GAUGE",
                        "help": "Last Unix time when changing this group in the Pushgateway succeeded.",
                        "metrics": [ { "labels": { "instance": "weewx", "job": "weewx" }, "value": "1.7040672e+09" } ]
                    },
                    "weewx_outTemp": {
                        "time_stamp": "2024-01-01T00:00:00.123456789Z",
                        "type": "GAUGE",
                        "metrics": []
                    }
                },
                {
                    "labels": { "job": "node" }
                }
            ]
        }"#;

        let snapshot: MetricsSnapshot = serde_json::from_str(body).unwrap();
        assert!(snapshot.is_success());
        assert_eq!(snapshot.len(), 2);
        assert_eq!(
            snapshot.lookup("instance", "weewx"),
            Ok("2024-01-01T00:00:00.123456789Z")
        );
        assert!(snapshot.data[1].push_time_seconds.is_none());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn malformed_body_fails_to_decode() {
        let body = r#"{ "status": "success", "data": { "not": "a list" } }"#;
        assert!(serde_json::from_str::<MetricsSnapshot>(body).is_err());
    }
}
