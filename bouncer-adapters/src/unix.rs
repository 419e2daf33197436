//! Minimal HTTP/1.1 client over a unix domain socket.
//!
//! Both LXD and the Docker Engine expose their REST APIs on a local socket.
//! Each request opens a fresh connection, which keeps the client stateless
//! and lets a restarted daemon be picked up without reconnect logic.

use std::path::{Path, PathBuf};
use std::time::Duration;

use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::client::conn::http1;
use hyper::header::{CONTENT_TYPE, HOST};
use hyper::{Method, Request, StatusCode};
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use tokio::net::UnixStream;
use tracing::{debug, trace};

use crate::AdapterError;

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A buffered response from the daemon.
#[derive(Debug, Clone)]
pub struct UnixResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

impl UnixResponse {
    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, AdapterError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// The body as lossy UTF-8, for error messages.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Sends requests to an HTTP daemon listening on a unix socket.
#[derive(Debug, Clone)]
pub struct UnixHttpClient {
    socket: PathBuf,
    timeout: Duration,
}

impl UnixHttpClient {
    pub fn new(socket: impl Into<PathBuf>) -> Self {
        Self {
            socket: socket.into(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Set the default per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn socket(&self) -> &Path {
        &self.socket
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send a request with the default timeout.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<UnixResponse, AdapterError> {
        self.request_with_timeout(method, path, body, self.timeout)
            .await
    }

    /// Send a request, failing with [`AdapterError::Timeout`] if the whole
    /// exchange (connect, send, read body) takes longer than `timeout`.
    pub async fn request_with_timeout(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
        timeout: Duration,
    ) -> Result<UnixResponse, AdapterError> {
        let payload = match body {
            Some(value) => Bytes::from(serde_json::to_vec(value)?),
            None => Bytes::new(),
        };
        trace!(socket = %self.socket.display(), %method, path, "Unix socket request");

        tokio::time::timeout(timeout, self.send(method, path, payload)).await?
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        payload: Bytes,
    ) -> Result<UnixResponse, AdapterError> {
        let stream = UnixStream::connect(&self.socket).await.map_err(|e| {
            AdapterError::Connection(format!("{}: {}", self.socket.display(), e))
        })?;

        let (mut sender, conn) = http1::handshake(TokioIo::new(stream)).await?;
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, "Unix socket connection closed with error");
            }
        });

        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header(HOST, "localhost");
        if !payload.is_empty() {
            builder = builder.header(CONTENT_TYPE, "application/json");
        }
        let request = builder
            .body(Full::new(payload))
            .map_err(|e| AdapterError::Http(e.to_string()))?;

        let response = sender.send_request(request).await?;
        let status = response.status();
        let body = response.into_body().collect().await?.to_bytes();

        Ok(UnixResponse { status, body })
    }
}

// Percent-encode a container name for use as a path segment.
pub(crate) fn path_segment(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}
