//! Error types for adapters.

use thiserror::Error;

/// Errors that can occur when talking to the Pushgateway or a container
/// runtime.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Failed to parse response.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// Connection failed.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Timeout waiting for response.
    #[error("Request timed out")]
    Timeout,

    /// The remote side answered with a non-success status.
    #[error("API returned status {status}: {message}")]
    Status { status: u16, message: String },

    /// An asynchronous runtime operation finished unsuccessfully.
    #[error("Operation failed: {0}")]
    Operation(String),

    /// A command ran inside the target but exited non-zero.
    #[error("Command exited with code {code}")]
    CommandFailed { code: i64 },
}

#[cfg(feature = "pushgateway")]
impl From<reqwest::Error> for AdapterError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AdapterError::Timeout
        } else if err.is_connect() {
            AdapterError::Connection(err.to_string())
        } else if err.is_decode() {
            AdapterError::Parse(err.to_string())
        } else {
            AdapterError::Http(err.to_string())
        }
    }
}

#[cfg(feature = "unix-socket")]
impl From<hyper::Error> for AdapterError {
    fn from(err: hyper::Error) -> Self {
        AdapterError::Http(err.to_string())
    }
}

impl From<serde_json::Error> for AdapterError {
    fn from(err: serde_json::Error) -> Self {
        AdapterError::Parse(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for AdapterError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        AdapterError::Timeout
    }
}
