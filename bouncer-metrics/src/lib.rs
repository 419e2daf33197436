//! # bouncer-metrics
//!
//! Thread-safe outcome counters for pushgw-bouncer, and (with the
//! `prometheus` feature) an HTTP endpoint that exposes them in the
//! Prometheus text format.
//!
//! ## Quick Start
//!
//! ```rust
//! use bouncer_metrics::Counters;
//! use bouncer_types::{BounceResult, CheckResult};
//!
//! let counters = Counters::new("http://retro:9091");
//! let weewx = counters.register("weewx");
//!
//! weewx.record_check(CheckResult::Unhealthy);
//! weewx.record_bounce(BounceResult::Ok);
//!
//! let snapshot = counters.collect();
//! assert_eq!(snapshot.bounce("weewx", BounceResult::Ok), 1);
//! ```
//!
//! The exposition server only ever reads the counters, so it can run on its
//! own task beside the scheduler without any further locking.

mod handle;
mod state;

#[cfg(feature = "prometheus")]
pub mod prometheus;

pub use handle::MonitorCounters;
pub use state::{CounterVec, Counters};

// Re-export types for convenience
pub use bouncer_types::{BounceResult, CheckResult, CounterSnapshot, UpdateResult};
