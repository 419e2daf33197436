//! Test doubles shared by the unit tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bouncer_adapters::{AdapterError, RemediationBackend};
use bouncer_types::BackendKind;

use crate::config::MonitorSpec;
use crate::monitor::RestartAction;

/// A monitor definition selecting `instance=<name>` with a 120s max age.
pub fn spec(name: &str) -> MonitorSpec {
    MonitorSpec {
        name: name.to_string(),
        backend: BackendKind::Lxd,
        target: name.to_string(),
        label_name: "instance".to_string(),
        label_value: name.to_string(),
        max_age: Duration::from_secs(120),
        restart: RestartAction::RunCommand(vec![
            "/bin/systemctl".to_string(),
            "restart".to_string(),
            name.to_string(),
        ]),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    RunCommand { target: String, argv: Vec<String> },
    RestartWhole { target: String },
}

#[derive(Debug, Clone, Copy)]
enum Behaviour {
    Succeed,
    Fail,
    Hang(Duration),
}

/// Records every call and answers according to its behaviour.
#[derive(Debug)]
pub struct RecordingBackend {
    behaviour: Behaviour,
    calls: Mutex<Vec<Call>>,
}

impl RecordingBackend {
    fn with(behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            behaviour,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn ok() -> Arc<Self> {
        Self::with(Behaviour::Succeed)
    }

    /// Every call fails with exit code 1.
    pub fn failing() -> Arc<Self> {
        Self::with(Behaviour::Fail)
    }

    /// Every call sleeps for `delay` before succeeding.
    pub fn slow(delay: Duration) -> Arc<Self> {
        Self::with(Behaviour::Hang(delay))
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    async fn answer(&self, call: Call) -> Result<(), AdapterError> {
        self.calls.lock().unwrap().push(call);
        match self.behaviour {
            Behaviour::Succeed => Ok(()),
            Behaviour::Fail => Err(AdapterError::CommandFailed { code: 1 }),
            Behaviour::Hang(delay) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl RemediationBackend for RecordingBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Lxd
    }

    async fn connect(&mut self) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn run_command(&self, target: &str, argv: &[String]) -> Result<(), AdapterError> {
        self.answer(Call::RunCommand {
            target: target.to_string(),
            argv: argv.to_vec(),
        })
        .await
    }

    async fn restart_whole(&self, target: &str) -> Result<(), AdapterError> {
        self.answer(Call::RestartWhole {
            target: target.to_string(),
        })
        .await
    }
}
