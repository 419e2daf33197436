//! Snapshot source abstraction.
//!
//! The scheduler pulls one [`MetricsSnapshot`] per tick from a
//! [`SnapshotSource`]. In production that is the
//! [`PushgatewayClient`](crate::pushgateway::PushgatewayClient); tests and
//! offline checks can hand in a fixed snapshot instead.

use std::fmt::Debug;

use async_trait::async_trait;
use bouncer_types::MetricsSnapshot;

use crate::AdapterError;

/// Trait for fetching metrics snapshots.
#[async_trait]
pub trait SnapshotSource: Send + Sync + Debug {
    /// Fetch a fresh snapshot.
    ///
    /// A failure means nothing could be evaluated this tick; partial
    /// snapshots are never returned.
    async fn fetch(&self) -> Result<MetricsSnapshot, AdapterError>;

    /// Returns a human-readable description of the source.
    ///
    /// Used as the `pushgateway` label and in log lines.
    fn description(&self) -> &str;
}

/// A source that returns the same snapshot every time.
#[derive(Debug, Clone)]
pub struct StaticSource {
    snapshot: MetricsSnapshot,
    description: String,
}

impl StaticSource {
    pub fn new(snapshot: MetricsSnapshot) -> Self {
        Self {
            snapshot,
            description: "static".to_string(),
        }
    }

    /// Set the description reported by the source.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[async_trait]
impl SnapshotSource for StaticSource {
    async fn fetch(&self) -> Result<MetricsSnapshot, AdapterError> {
        Ok(self.snapshot.clone())
    }

    fn description(&self) -> &str {
        &self.description
    }
}
