//! Prometheus exposition format support.
//!
//! This module renders the watchdog's outcome counters in the Prometheus
//! text-based exposition format and serves them over HTTP so they can be
//! scraped alongside the services being watched.
//!
//! ## Example
//!
//! ```rust,no_run
//! use bouncer_metrics::Counters;
//! use bouncer_metrics::prometheus::{PrometheusConfig, PrometheusExporter};
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let counters = Counters::new("http://retro:9091");
//!     let config = PrometheusConfig::builder()
//!         .listen_addr("0.0.0.0:9090")
//!         .build();
//!
//!     let server = PrometheusExporter::new(config, counters).start_server().await?;
//!     println!("metrics on http://{}/metrics", server.local_addr());
//!     Ok(())
//! }
//! ```

use std::convert::Infallible;
use std::fmt::Write as _;
use std::net::SocketAddr;
use std::sync::Arc;

use bouncer_types::{CounterSeries, CounterSnapshot};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::state::Counters;

const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Configuration for Prometheus metrics endpoint.
#[derive(Debug, Clone)]
pub struct PrometheusConfig {
    /// Address to listen on (e.g., "0.0.0.0:9090")
    pub listen_addr: String,
    /// Path for metrics endpoint (e.g., "/metrics")
    pub metrics_path: String,
    /// Optional namespace prefix for all metrics
    pub namespace: Option<String>,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:9090".to_string(),
            metrics_path: "/metrics".to_string(),
            namespace: None,
        }
    }
}

impl PrometheusConfig {
    /// Create a new builder for PrometheusConfig.
    pub fn builder() -> PrometheusConfigBuilder {
        PrometheusConfigBuilder::default()
    }
}

/// Builder for PrometheusConfig.
#[derive(Debug, Default)]
pub struct PrometheusConfigBuilder {
    listen_addr: Option<String>,
    metrics_path: Option<String>,
    namespace: Option<String>,
}

impl PrometheusConfigBuilder {
    /// Set the listen address.
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.listen_addr = Some(addr.into());
        self
    }

    /// Set the metrics path.
    pub fn metrics_path(mut self, path: impl Into<String>) -> Self {
        self.metrics_path = Some(path.into());
        self
    }

    /// Set the namespace prefix for all metrics.
    pub fn namespace(mut self, ns: impl Into<String>) -> Self {
        self.namespace = Some(ns.into());
        self
    }

    /// Build the PrometheusConfig.
    pub fn build(self) -> PrometheusConfig {
        let defaults = PrometheusConfig::default();
        PrometheusConfig {
            listen_addr: self.listen_addr.unwrap_or(defaults.listen_addr),
            metrics_path: self.metrics_path.unwrap_or(defaults.metrics_path),
            namespace: self.namespace,
        }
    }
}

/// Serves the live counters over HTTP.
#[derive(Debug)]
pub struct PrometheusExporter {
    config: PrometheusConfig,
    counters: Arc<Counters>,
}

/// A running exposition server.
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    task: JoinHandle<()>,
}

impl ServerHandle {
    /// The address the server actually bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections.
    pub fn abort(&self) {
        self.task.abort();
    }
}

impl PrometheusExporter {
    /// Create a new Prometheus exporter over `counters`.
    pub fn new(config: PrometheusConfig, counters: Arc<Counters>) -> Self {
        Self { config, counters }
    }

    /// Get the configuration.
    pub fn config(&self) -> &PrometheusConfig {
        &self.config
    }

    /// Get the current metrics in Prometheus exposition format.
    pub fn render(&self) -> String {
        format_prometheus(&self.counters.collect(), self.config.namespace.as_deref())
    }

    /// Bind the listen address and serve metrics on a background task.
    ///
    /// Binding happens before this returns so an unusable address is
    /// reported to the caller. The server runs until the runtime shuts down
    /// or [`ServerHandle::abort`] is called.
    pub async fn start_server(&self) -> std::io::Result<ServerHandle> {
        let addr: SocketAddr = self.config.listen_addr.parse().map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid listen address {:?}: {}", self.config.listen_addr, e),
            )
        })?;
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, path = %self.config.metrics_path, "Serving Prometheus metrics");

        let metrics_path = self.config.metrics_path.clone();
        let namespace = self.config.namespace.clone();
        let counters = self.counters.clone();

        let task = tokio::spawn(async move {
            if let Err(e) = run_server(listener, metrics_path, namespace, counters).await {
                error!(error = %e, "Prometheus server stopped");
            }
        });

        Ok(ServerHandle { local_addr, task })
    }
}

async fn run_server(
    listener: TcpListener,
    metrics_path: String,
    namespace: Option<String>,
    counters: Arc<Counters>,
) -> std::io::Result<()> {
    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);

        let metrics_path = metrics_path.clone();
        let namespace = namespace.clone();
        let counters = counters.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                let metrics_path = metrics_path.clone();
                let namespace = namespace.clone();
                let counters = counters.clone();

                async move { handle_request(req, &metrics_path, namespace.as_deref(), &counters) }
            });

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                debug!(error = %e, "Prometheus connection error");
            }
        });
    }
}

fn handle_request(
    req: Request<hyper::body::Incoming>,
    metrics_path: &str,
    namespace: Option<&str>,
    counters: &Counters,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let path = req.uri().path();

    let (status, content_type, body) = if path == metrics_path {
        (
            StatusCode::OK,
            EXPOSITION_CONTENT_TYPE,
            format_prometheus(&counters.collect(), namespace),
        )
    } else if path == "/health" || path == "/healthz" {
        (StatusCode::OK, "text/plain", "OK".to_string())
    } else {
        (StatusCode::NOT_FOUND, "text/plain", "Not Found".to_string())
    };

    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    Ok(response)
}

/// Format a counter snapshot as Prometheus exposition format.
pub fn format_prometheus(snapshot: &CounterSnapshot, namespace: Option<&str>) -> String {
    let mut output = String::new();
    let prefix = namespace.map(|n| format!("{}_", n)).unwrap_or_default();
    let pushgateway = escape_label_value(&snapshot.pushgateway);

    let _ = writeln!(
        output,
        "# HELP {}monitors_configured Number of monitors configured for pushgw_bouncer",
        prefix
    );
    let _ = writeln!(output, "# TYPE {}monitors_configured gauge", prefix);
    let _ = writeln!(
        output,
        "{}monitors_configured{{pushgateway=\"{}\"}} {}",
        prefix, pushgateway, snapshot.monitors_configured
    );

    write_family(
        &mut output,
        &prefix,
        "monitor_updates",
        "Number of times the metrics from the pushgateway were retrieved",
        &pushgateway,
        &snapshot.updates,
    );
    write_family(
        &mut output,
        &prefix,
        "monitor_checks",
        "Number of times a service monitor check was performed",
        &pushgateway,
        &snapshot.checks,
    );
    write_family(
        &mut output,
        &prefix,
        "monitor_bounces",
        "Number of times a monitor was bounced",
        &pushgateway,
        &snapshot.bounces,
    );

    output
}

fn write_family(
    output: &mut String,
    prefix: &str,
    name: &str,
    help: &str,
    pushgateway: &str,
    series: &CounterSeries,
) {
    let _ = writeln!(output, "# HELP {}{} {}", prefix, name, help);
    let _ = writeln!(output, "# TYPE {}{} counter", prefix, name);

    for (monitor, results) in series {
        let monitor = escape_label_value(monitor);
        for (result, value) in results {
            let _ = writeln!(
                output,
                "{}{}{{pushgateway=\"{}\",monitor=\"{}\",result=\"{}\"}} {}",
                prefix,
                name,
                pushgateway,
                monitor,
                escape_label_value(result),
                value
            );
        }
    }
}

/// Escape a label value for Prometheus format.
/// Backslash, double-quote, and newline must be escaped.
fn escape_label_value(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
