//! LXD backend using the REST API on the local unix socket.
//!
//! Mutating calls are asynchronous in LXD: the daemon answers with an
//! operation URL, and this backend blocks on `<operation>/wait` until the
//! operation settles.
//!
//! ## Example
//!
//! ```rust,no_run
//! use bouncer_adapters::lxd::LxdBackend;
//! use bouncer_adapters::RemediationBackend;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut lxd = LxdBackend::builder()
//!         .socket("/var/snap/lxd/common/lxd/unix.socket")
//!         .build();
//!
//!     lxd.connect().await?;
//!     lxd.restart_whole("weewx").await?;
//!     Ok(())
//! }
//! ```

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use bouncer_types::BackendKind;
use hyper::Method;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::unix::{path_segment, UnixHttpClient, DEFAULT_REQUEST_TIMEOUT};
use crate::{AdapterError, RemediationBackend};

/// Default LXD socket of the snap package.
pub const DEFAULT_SOCKET: &str = "/var/snap/lxd/common/lxd/unix.socket";

/// Seconds LXD waits for a clean shutdown before forcing a restart.
const RESTART_TIMEOUT_SECS: u64 = 10;

/// How long LXD is asked to wait on an operation. Stays below the
/// monitor's remediation timeout.
pub const DEFAULT_OPERATION_WAIT: Duration = Duration::from_secs(50);

/// Extra time the daemon gets to answer its own wait timeout.
pub const OPERATION_WAIT_SLACK: Duration = Duration::from_secs(5);

// LXD operation status code for success.
const OPERATION_SUCCESS: u16 = 200;

/// LXD remediation backend.
#[derive(Debug, Clone)]
pub struct LxdBackend {
    client: UnixHttpClient,
    operation_wait: Duration,
}

impl LxdBackend {
    /// Create a new builder for configuring the backend.
    pub fn builder() -> LxdBackendBuilder {
        LxdBackendBuilder::default()
    }

    /// Path of the socket this backend talks to.
    pub fn socket(&self) -> &std::path::Path {
        self.client.socket()
    }

    async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<LxdResponse, AdapterError> {
        let response = self.client.request(method, path, body).await?;
        decode(response)
    }

    // Block until the operation settles and return its metadata.
    async fn wait(&self, operation: &str) -> Result<Operation, AdapterError> {
        if operation.is_empty() {
            return Err(AdapterError::Parse(
                "async response without an operation".to_string(),
            ));
        }

        let path = format!(
            "{}/wait?timeout={}",
            operation,
            self.operation_wait.as_secs()
        );
        let deadline = self.operation_wait + OPERATION_WAIT_SLACK;
        let response = self
            .client
            .request_with_timeout(Method::GET, &path, None, deadline)
            .await?;

        let envelope = decode(response)?;
        let op: Operation = serde_json::from_value(envelope.metadata)?;
        debug!(operation = %operation, status = %op.status, "LXD operation finished");

        if op.status_code != OPERATION_SUCCESS {
            let reason = if op.err.is_empty() {
                op.status.clone()
            } else {
                format!("{}: {}", op.status, op.err)
            };
            return Err(AdapterError::Operation(reason));
        }

        Ok(op)
    }
}

fn decode(response: crate::unix::UnixResponse) -> Result<LxdResponse, AdapterError> {
    let envelope: Result<LxdResponse, _> = response.json();

    match envelope {
        Ok(env) if env.kind != "error" && response.is_success() => Ok(env),
        Ok(env) => Err(AdapterError::Status {
            status: if env.error_code != 0 {
                env.error_code
            } else {
                response.status.as_u16()
            },
            message: env.error,
        }),
        Err(_) if !response.is_success() => Err(AdapterError::Status {
            status: response.status.as_u16(),
            message: response.text(),
        }),
        Err(e) => Err(e),
    }
}

#[async_trait]
impl RemediationBackend for LxdBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Lxd
    }

    async fn connect(&mut self) -> Result<(), AdapterError> {
        let envelope = self.call(Method::GET, "/1.0", None).await?;
        let server: ServerInfo = serde_json::from_value(envelope.metadata).unwrap_or_default();
        debug!(
            socket = %self.client.socket().display(),
            api_version = %server.api_version,
            auth = %server.auth,
            "Connected to LXD"
        );
        Ok(())
    }

    async fn run_command(&self, target: &str, argv: &[String]) -> Result<(), AdapterError> {
        debug!(container = %target, command = ?argv, "LXD: running restart command");

        let body = json!({
            "command": argv,
            "environment": {},
            "interactive": false,
            "wait-for-websocket": false,
            "record-output": false,
        });
        let path = format!("/1.0/instances/{}/exec", path_segment(target));
        let envelope = self.call(Method::POST, &path, Some(&body)).await?;

        let op = self.wait(&envelope.operation).await?;
        let ret = op
            .metadata
            .as_ref()
            .and_then(|m| m.get("return"))
            .and_then(|v| v.as_i64());
        match ret {
            Some(0) | None => Ok(()),
            Some(code) => Err(AdapterError::CommandFailed { code }),
        }
    }

    async fn restart_whole(&self, target: &str) -> Result<(), AdapterError> {
        debug!(container = %target, "LXD: restarting container");

        let body = json!({
            "action": "restart",
            "timeout": RESTART_TIMEOUT_SECS,
            "force": true,
        });
        let path = format!("/1.0/instances/{}/state", path_segment(target));
        let envelope = self.call(Method::PUT, &path, Some(&body)).await?;

        self.wait(&envelope.operation).await?;
        Ok(())
    }
}

/// Builder for LxdBackend.
#[derive(Debug, Default)]
pub struct LxdBackendBuilder {
    socket: Option<PathBuf>,
    timeout: Option<Duration>,
    operation_wait: Option<Duration>,
}

impl LxdBackendBuilder {
    /// Set the unix socket path (default: the snap socket).
    pub fn socket(mut self, socket: impl Into<PathBuf>) -> Self {
        self.socket = Some(socket.into());
        self
    }

    /// Set the per-request timeout (default: 30 seconds).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set how long to wait for an operation to settle (default: 50 seconds).
    pub fn operation_wait(mut self, wait: Duration) -> Self {
        self.operation_wait = Some(wait);
        self
    }

    /// Build the backend.
    pub fn build(self) -> LxdBackend {
        let socket = self.socket.unwrap_or_else(|| PathBuf::from(DEFAULT_SOCKET));
        LxdBackend {
            client: UnixHttpClient::new(socket)
                .with_timeout(self.timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT)),
            operation_wait: self.operation_wait.unwrap_or(DEFAULT_OPERATION_WAIT),
        }
    }
}

/// The standard LXD response envelope.
#[derive(Debug, Deserialize)]
struct LxdResponse {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_code: u16,
    #[serde(default)]
    operation: String,
    #[serde(default)]
    metadata: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct Operation {
    #[serde(default)]
    status: String,
    #[serde(default)]
    status_code: u16,
    #[serde(default)]
    err: String,
    // Null for state changes, only exec operations carry a `return`.
    #[serde(default)]
    metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerInfo {
    #[serde(default)]
    api_version: String,
    #[serde(default)]
    auth: String,
}
