//! Application context built once at startup.
//!
//! The context owns everything the scheduler and the exposition server
//! share: resolved settings, the counters, and one connected backend per
//! runtime the monitors use.

use std::collections::BTreeMap;
use std::sync::Arc;

use bouncer_adapters::docker::DockerBackend;
use bouncer_adapters::lxd::LxdBackend;
use bouncer_adapters::pushgateway::PushgatewayClient;
use bouncer_adapters::{AdapterError, NoOpBackend, RemediationBackend};
use bouncer_metrics::Counters;
use bouncer_types::BackendKind;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::Settings;
use crate::monitor::Monitor;

/// A backend could not be reached at startup.
#[derive(Debug, Error)]
#[error("unable to connect {kind} backend at {endpoint}: {source}")]
pub struct ConnectError {
    pub kind: BackendKind,
    pub endpoint: String,
    #[source]
    pub source: AdapterError,
}

/// Connected backends keyed by kind.
#[derive(Debug, Default)]
pub struct BackendRegistry {
    backends: BTreeMap<BackendKind, Arc<dyn RemediationBackend>>,
    fallback: Option<Arc<dyn RemediationBackend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry that answers every kind with a [`NoOpBackend`].
    pub fn dry_run() -> Self {
        Self {
            backends: BTreeMap::new(),
            fallback: Some(Arc::new(NoOpBackend::new())),
        }
    }

    /// Register a backend under its own kind.
    pub fn insert(&mut self, backend: Arc<dyn RemediationBackend>) {
        self.backends.insert(backend.kind(), backend);
    }

    pub fn get(&self, kind: BackendKind) -> Option<Arc<dyn RemediationBackend>> {
        self.backends
            .get(&kind)
            .or(self.fallback.as_ref())
            .cloned()
    }

    pub fn is_dry_run(&self) -> bool {
        self.fallback.is_some()
    }
}

/// Build and connect the backends the monitors need.
///
/// Only kinds referenced by a valid monitor are contacted. Any failure is
/// returned immediately; the caller is expected to treat it as fatal.
pub async fn connect_backends(settings: &Settings) -> Result<BackendRegistry, ConnectError> {
    if settings.dry_run {
        info!("Dry run: remediation will only be logged");
        return Ok(BackendRegistry::dry_run());
    }

    let mut registry = BackendRegistry::new();
    for kind in settings.backend_kinds() {
        let (mut backend, endpoint): (Box<dyn RemediationBackend>, String) = match kind {
            BackendKind::Lxd => (
                Box::new(LxdBackend::builder().socket(&settings.socket_lxd).build()),
                settings.socket_lxd.display().to_string(),
            ),
            BackendKind::Docker => (
                Box::new(
                    DockerBackend::builder()
                        .socket(&settings.socket_docker)
                        .build(),
                ),
                settings.socket_docker.display().to_string(),
            ),
            BackendKind::NoOp => (Box::new(NoOpBackend::new()), "-".to_string()),
        };

        backend.connect().await.map_err(|source| ConnectError {
            kind,
            endpoint: endpoint.clone(),
            source,
        })?;
        info!(backend = %kind, endpoint = %endpoint, "Backend connected");

        registry.insert(Arc::from(backend));
    }

    Ok(registry)
}

/// Everything built at startup.
#[derive(Debug)]
pub struct AppContext {
    pub settings: Settings,
    pub counters: Arc<Counters>,
    pub backends: BackendRegistry,
}

impl AppContext {
    /// Connect backends and set up the counters.
    pub async fn build(settings: Settings) -> Result<Self, ConnectError> {
        let backends = connect_backends(&settings).await?;
        Ok(Self::with_backends(settings, backends))
    }

    /// Assemble a context around an existing registry.
    pub fn with_backends(settings: Settings, backends: BackendRegistry) -> Self {
        let counters = Counters::new(settings.push_gw.clone());
        counters.set_monitors_configured(settings.monitors.len());
        Self {
            settings,
            counters,
            backends,
        }
    }

    /// Bind every valid monitor definition to its backend.
    pub fn monitors(&self) -> Vec<Monitor> {
        self.settings
            .monitors
            .iter()
            .filter_map(|spec| match self.backends.get(spec.backend) {
                Some(backend) => Some(
                    Monitor::new(spec.clone(), backend, self.counters.register(&spec.name))
                        .with_remediation_timeout(self.settings.remediation_timeout),
                ),
                None => {
                    warn!(monitor = %spec.name, backend = %spec.backend, "No backend bound, monitor disabled");
                    None
                }
            })
            .collect()
    }

    /// The Pushgateway client described by the settings.
    pub fn pushgateway(&self) -> Result<PushgatewayClient, AdapterError> {
        PushgatewayClient::builder()
            .endpoint(self.settings.push_gw.clone())
            .timeout(self.settings.fetch_timeout)
            .build()
    }
}
