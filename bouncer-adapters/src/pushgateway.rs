//! Pushgateway client using the JSON HTTP API.
//!
//! `GET /api/v1/metrics` returns every pushed group together with its
//! `push_time_seconds` sample, which is all the watchdog needs to judge
//! whether a service is still reporting.
//!
//! ## Example
//!
//! ```rust,no_run
//! use bouncer_adapters::pushgateway::PushgatewayClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = PushgatewayClient::builder()
//!         .endpoint("http://retro:9091")
//!         .build()?;
//!
//!     let snapshot = client.collect().await?;
//!     println!("Collected {} metric groups", snapshot.len());
//!     println!("weewx last pushed at {}", snapshot.lookup("instance", "weewx")?);
//!     Ok(())
//! }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use bouncer_types::MetricsSnapshot;
use reqwest::Client;
use tracing::debug;

use crate::{AdapterError, SnapshotSource};

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const METRICS_PATH: &str = "/api/v1/metrics";

/// Pushgateway client for fetching metrics snapshots.
#[derive(Debug, Clone)]
pub struct PushgatewayClient {
    client: Client,
    endpoint: String,
}

impl PushgatewayClient {
    /// Create a new builder for configuring the client.
    pub fn builder() -> PushgatewayClientBuilder {
        PushgatewayClientBuilder::default()
    }

    /// The base URL of the Pushgateway.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Collect a snapshot of every pushed metric group.
    pub async fn collect(&self) -> Result<MetricsSnapshot, AdapterError> {
        let url = format!("{}{}", self.endpoint, METRICS_PATH);

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(AdapterError::Status { status, message });
        }

        let snapshot: MetricsSnapshot = response
            .json()
            .await
            .map_err(|e| AdapterError::Parse(e.to_string()))?;

        if !snapshot.is_success() {
            return Err(AdapterError::Http(format!(
                "Pushgateway reported status {:?}",
                snapshot.status
            )));
        }

        debug!(endpoint = %self.endpoint, groups = snapshot.len(), "Fetched Pushgateway metrics");
        Ok(snapshot)
    }
}

#[async_trait]
impl SnapshotSource for PushgatewayClient {
    async fn fetch(&self) -> Result<MetricsSnapshot, AdapterError> {
        self.collect().await
    }

    fn description(&self) -> &str {
        &self.endpoint
    }
}

/// Builder for PushgatewayClient.
#[derive(Debug, Default)]
pub struct PushgatewayClientBuilder {
    endpoint: Option<String>,
    timeout: Option<Duration>,
}

impl PushgatewayClientBuilder {
    /// Set the Pushgateway base URL (e.g., "http://retro:9091").
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the request timeout (default: 10 seconds).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<PushgatewayClient, AdapterError> {
        let client = Client::builder()
            .timeout(self.timeout.unwrap_or(DEFAULT_TIMEOUT))
            .build()?;

        let endpoint = self
            .endpoint
            .unwrap_or_else(|| "http://localhost:9091".to_string());

        Ok(PushgatewayClient {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }
}
