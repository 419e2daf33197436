//! The remediation backend abstraction.

use std::fmt::Debug;

use async_trait::async_trait;
use bouncer_types::BackendKind;

use crate::AdapterError;

/// Something that can bring a container's service back to life.
///
/// A backend is built from configuration, connected once at startup with
/// [`connect`](Self::connect), and then shared by every monitor bound to its
/// kind. Implementations must not retry internally; the caller decides what
/// a failure means.
///
/// # Example
///
/// ```rust
/// use bouncer_adapters::{AdapterError, NoOpBackend, RemediationBackend};
///
/// #[tokio::main]
/// async fn main() -> Result<(), AdapterError> {
///     let mut backend = NoOpBackend::new();
///     backend.connect().await?;
///
///     let argv = vec!["/bin/systemctl".to_string(), "restart".to_string(), "weewx".to_string()];
///     backend.run_command("weewx", &argv).await
/// }
/// ```
#[async_trait]
pub trait RemediationBackend: Send + Sync + Debug {
    /// Which runtime this backend talks to.
    fn kind(&self) -> BackendKind;

    /// Verify the runtime is reachable.
    async fn connect(&mut self) -> Result<(), AdapterError>;

    /// Run `argv` inside `target` and wait for it to finish.
    async fn run_command(&self, target: &str, argv: &[String]) -> Result<(), AdapterError>;

    /// Restart `target` as a whole.
    async fn restart_whole(&self, target: &str) -> Result<(), AdapterError>;
}
