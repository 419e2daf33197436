//! # pushgw-bouncer
//!
//! A liveness watchdog for services that report through a Prometheus
//! Pushgateway. Each monitor watches the `push_time_seconds` of one metric
//! group; when it goes stale the monitor restarts the service's container,
//! or runs a command inside it, through LXD or Docker.
//!
//! The pieces, in the order a tick uses them:
//!
//! - [`scheduler::Scheduler`] fetches one snapshot per interval
//! - [`monitor::Monitor`] decides live or stale and remediates with a cooldown
//! - [`context::AppContext`] holds the settings, counters and connected
//!   backends built at startup
//! - [`config`] loads and validates the YAML, environment and flags
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use pushgw_bouncer::config::{Overrides, Settings};
//! use pushgw_bouncer::context::AppContext;
//! use pushgw_bouncer::scheduler::Scheduler;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load(None, &Overrides::default())?;
//!     let ctx = AppContext::build(settings).await?;
//!
//!     let mut scheduler = Scheduler::new(
//!         Arc::new(ctx.pushgateway()?),
//!         ctx.monitors(),
//!         ctx.counters.clone(),
//!         ctx.settings.check_interval,
//!     );
//!     let report = scheduler.tick().await;
//!     println!("{} live, {} stale", report.live, report.stale);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod context;
pub mod monitor;
pub mod scheduler;
pub mod telemetry;

#[cfg(test)]
mod testing;
