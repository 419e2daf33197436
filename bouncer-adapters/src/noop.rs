//! Dry-run backend.

use async_trait::async_trait;
use bouncer_types::BackendKind;
use tracing::info;

use crate::{AdapterError, RemediationBackend};

/// Logs the action it would have taken and reports success.
#[derive(Debug, Default, Clone)]
pub struct NoOpBackend;

impl NoOpBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RemediationBackend for NoOpBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::NoOp
    }

    async fn connect(&mut self) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn run_command(&self, target: &str, argv: &[String]) -> Result<(), AdapterError> {
        info!(container = %target, command = ?argv, "Dry run: would run restart command");
        Ok(())
    }

    async fn restart_whole(&self, target: &str) -> Result<(), AdapterError> {
        info!(container = %target, "Dry run: would restart container");
        Ok(())
    }
}
