//! # bouncer-types
//!
//! Core types shared by the pushgw-bouncer crates. This crate defines the
//! shape of a Pushgateway metrics snapshot, the per-monitor outcome labels
//! recorded by the counters, and the small enums that bind a monitor to a
//! remediation backend.
//!
//! ## Features
//!
//! - `serde` (default): decode snapshots from the Pushgateway JSON API and
//!   serialize counter snapshots.
//!
//! ## Example
//!
//! ```rust
//! use bouncer_types::MetricsSnapshot;
//!
//! let snapshot = MetricsSnapshot::builder()
//!     .record(|r| {
//!         r.label("job", "weewx")
//!          .label("instance", "weewx")
//!          .time_stamp("2024-01-01T00:00:00Z")
//!     })
//!     .build();
//!
//! assert_eq!(
//!     snapshot.lookup("instance", "weewx").unwrap(),
//!     "2024-01-01T00:00:00Z"
//! );
//! ```

mod duration;
mod kind;
mod outcome;
mod snapshot;

pub use duration::*;
pub use kind::*;
pub use outcome::*;
pub use snapshot::*;

/// Label value used for counters that are not tied to a single monitor.
pub const ALL_MONITORS: &str = "all";
