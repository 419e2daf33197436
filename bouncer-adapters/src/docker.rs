//! Docker backend using the Engine API on the local unix socket.
//!
//! Commands are run with the exec API: create an exec instance, start it
//! attached so the call returns once the process exits, then inspect it for
//! the exit code.
//!
//! ## Example
//!
//! ```rust,no_run
//! use bouncer_adapters::docker::DockerBackend;
//! use bouncer_adapters::RemediationBackend;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut docker = DockerBackend::builder()
//!         .socket("/var/run/docker.sock")
//!         .build();
//!
//!     docker.connect().await?;
//!     docker
//!         .run_command("mqtt", &["/usr/sbin/service".into(), "mosquitto".into(), "restart".into()])
//!         .await?;
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
use tracing::{debug, trace};

use crate::unix::{path_segment, UnixHttpClient, UnixResponse, DEFAULT_REQUEST_TIMEOUT};
use crate::{AdapterError, RemediationBackend};

/// Default Docker Engine socket.
pub const DEFAULT_SOCKET: &str = "/var/run/docker.sock";

/// Seconds Docker waits for the container to stop before killing it.
const RESTART_GRACE_SECS: u64 = 10;

const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Docker remediation backend.
#[derive(Debug, Clone)]
pub struct DockerBackend {
    client: UnixHttpClient,
    command_timeout: Duration,
}

impl DockerBackend {
    /// Create a new builder for configuring the backend.
    pub fn builder() -> DockerBackendBuilder {
        DockerBackendBuilder::default()
    }

    /// Path of the socket this backend talks to.
    pub fn socket(&self) -> &std::path::Path {
        self.client.socket()
    }

    async fn create_exec(&self, target: &str, argv: &[String]) -> Result<String, AdapterError> {
        let body = json!({
            "AttachStdout": true,
            "AttachStderr": true,
            "Tty": false,
            "Cmd": argv,
        });
        let path = format!("/containers/{}/exec", path_segment(target));
        let response = check(self.client.request(Method::POST, &path, Some(&body)).await?)?;

        let created: IdResponse = response.json()?;
        Ok(created.id)
    }

    async fn start_exec(&self, id: &str) -> Result<Vec<u8>, AdapterError> {
        let body = json!({ "Detach": false, "Tty": false });
        let path = format!("/exec/{}/start", path_segment(id));
        let response = check(
            self.client
                .request_with_timeout(Method::POST, &path, Some(&body), self.command_timeout)
                .await?,
        )?;
        Ok(response.body.to_vec())
    }

    async fn inspect_exec(&self, id: &str) -> Result<ExecInspect, AdapterError> {
        let path = format!("/exec/{}/json", path_segment(id));
        let response = check(self.client.request(Method::GET, &path, None).await?)?;
        response.json()
    }
}

// Turn a non-2xx answer into a status error carrying Docker's message.
fn check(response: UnixResponse) -> Result<UnixResponse, AdapterError> {
    if response.is_success() {
        return Ok(response);
    }

    let message = response
        .json::<ErrorResponse>()
        .map(|e| e.message)
        .unwrap_or_else(|_| response.text());
    Err(AdapterError::Status {
        status: response.status.as_u16(),
        message,
    })
}

/// Split Docker's multiplexed attach stream into stdout and stderr.
///
/// Each frame is an 8-byte header (stream type, three padding bytes, a
/// big-endian u32 length) followed by the payload. Anything that does not
/// parse as a frame is treated as raw stdout.
pub fn demux_output(raw: &[u8]) -> (String, String) {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let mut rest = raw;

    while !rest.is_empty() {
        if rest.len() < 8 || rest[0] > 2 {
            stdout.extend_from_slice(rest);
            break;
        }

        let len = u32::from_be_bytes([rest[4], rest[5], rest[6], rest[7]]) as usize;
        let end = (8 + len).min(rest.len());
        let payload = &rest[8..end];
        match rest[0] {
            2 => stderr.extend_from_slice(payload),
            _ => stdout.extend_from_slice(payload),
        }
        rest = &rest[end..];
    }

    (
        String::from_utf8_lossy(&stdout).into_owned(),
        String::from_utf8_lossy(&stderr).into_owned(),
    )
}

#[async_trait]
impl RemediationBackend for DockerBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Docker
    }

    async fn connect(&mut self) -> Result<(), AdapterError> {
        check(self.client.request(Method::GET, "/_ping", None).await?)?;
        debug!(socket = %self.client.socket().display(), "Connected to Docker");
        Ok(())
    }

    async fn run_command(&self, target: &str, argv: &[String]) -> Result<(), AdapterError> {
        debug!(container = %target, command = ?argv, "Docker: running restart command");

        let id = self.create_exec(target, argv).await?;
        let raw = self.start_exec(&id).await?;

        let (stdout, stderr) = demux_output(&raw);
        trace!(
            container = %target,
            command = ?argv,
            stdout = %stdout,
            stderr = %stderr,
            "Restart command executed"
        );

        let inspect = self.inspect_exec(&id).await?;
        match inspect.exit_code {
            Some(0) => Ok(()),
            Some(code) => Err(AdapterError::CommandFailed { code }),
            None if inspect.running => Err(AdapterError::Operation(format!(
                "exec {} still running",
                id
            ))),
            None => Ok(()),
        }
    }

    async fn restart_whole(&self, target: &str) -> Result<(), AdapterError> {
        debug!(container = %target, "Docker: restarting container");

        let path = format!(
            "/containers/{}/restart?t={}",
            path_segment(target),
            RESTART_GRACE_SECS
        );
        check(self.client.request(Method::POST, &path, None).await?)?;
        Ok(())
    }
}

/// Builder for DockerBackend.
#[derive(Debug, Default)]
pub struct DockerBackendBuilder {
    socket: Option<PathBuf>,
    timeout: Option<Duration>,
    command_timeout: Option<Duration>,
}

impl DockerBackendBuilder {
    /// Set the unix socket path (default: /var/run/docker.sock).
    pub fn socket(mut self, socket: impl Into<PathBuf>) -> Self {
        self.socket = Some(socket.into());
        self
    }

    /// Set the per-request timeout (default: 30 seconds).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set how long a restart command may run (default: 5 seconds).
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }

    /// Build the backend.
    pub fn build(self) -> DockerBackend {
        let socket = self.socket.unwrap_or_else(|| PathBuf::from(DEFAULT_SOCKET));
        DockerBackend {
            client: UnixHttpClient::new(socket)
                .with_timeout(self.timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT)),
            command_timeout: self.command_timeout.unwrap_or(DEFAULT_COMMAND_TIMEOUT),
        }
    }
}

#[derive(Debug, Deserialize)]
struct IdResponse {
    #[serde(rename = "Id")]
    id: String,
}

#[derive(Debug, Deserialize)]
struct ExecInspect {
    #[serde(rename = "ExitCode", default)]
    exit_code: Option<i64>,
    #[serde(rename = "Running", default)]
    running: bool,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    message: String,
}
