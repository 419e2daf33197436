//! # bouncer-adapters
//!
//! I/O adapters for pushgw-bouncer: the client that pulls metrics snapshots
//! from a Prometheus Pushgateway, and the backends that remediate a stale
//! service inside a container runtime.
//!
//! ## Supported Systems
//!
//! - **Pushgateway** (`pushgateway` feature) - Fetches `/api/v1/metrics`
//! - **LXD** (`lxd` feature) - Runs commands and restarts instances over the
//!   LXD unix socket
//! - **Docker** (`docker` feature) - Runs commands and restarts containers
//!   over the Docker Engine socket
//! - **NoOp** - Logs what would have been done, for dry runs
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bouncer_adapters::pushgateway::PushgatewayClient;
//! use bouncer_adapters::{NoOpBackend, RemediationBackend, SnapshotSource};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let source = PushgatewayClient::builder()
//!         .endpoint("http://retro:9091")
//!         .build()?;
//!     let backend = NoOpBackend::new();
//!
//!     let snapshot = source.fetch().await?;
//!     if snapshot.lookup("instance", "weewx").is_err() {
//!         backend.restart_whole("weewx").await?;
//!     }
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod error;
pub mod noop;
pub mod source;

#[cfg(feature = "unix-socket")]
pub mod unix;

#[cfg(feature = "pushgateway")]
pub mod pushgateway;

#[cfg(feature = "lxd")]
pub mod lxd;

#[cfg(feature = "docker")]
pub mod docker;

pub use backend::RemediationBackend;
pub use error::AdapterError;
pub use noop::NoOpBackend;
pub use source::{SnapshotSource, StaticSource};

// Re-export types for convenience
pub use bouncer_types::{BackendKind, MetricsSnapshot};
