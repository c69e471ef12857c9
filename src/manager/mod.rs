// ABOUTME: The container manager: tracking state, wiring seams, sync/autostart.
// ABOUTME: Deploy steps live in pipeline.rs; supervision in supervisor.rs.

mod attachments;
mod autoroute;
mod error;
mod handlers;
mod lock;
mod logs;
mod pipeline;
mod planner;
pub mod resolver;
mod supervisor;

pub use autoroute::{AutoRouteError, AutoRouteResolver, BlobError, BlobStore, FsBlobStore};
pub use error::{
    ContainerErrorExt, DeployError, DeployErrorKind, ImageErrorExt, NetworkErrorExt,
    VolumeErrorExt,
};
pub use handlers::{
    ConfigReloadHandler, ImagePushedHandler, ManualDeployHandler, ManualReloadHandler,
};
pub use lock::{DeployGuard, DomainLocks};
pub use logs::LogCollector;
pub use supervisor::Supervisor;

use crate::config::Settings;
use crate::envfile::EnvLoader;
use crate::events::EventPublisher;
use crate::labels;
use crate::proxy::ProxyCacheInvalidator;
use crate::runtime::{ContainerFilters, ContainerState, PortBinding, Runtime};
use crate::routes::Route;
use crate::types::{ContainerId, Domain, ImageId};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Where a deploy originated. Internal deploys (triggered by the embedded
/// registry) pull through `localhost:<registry_port>` and always force a pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployOrigin {
    External,
    Internal,
}

impl DeployOrigin {
    pub fn is_internal(self) -> bool {
        matches!(self, DeployOrigin::Internal)
    }
}

/// A container the orchestrator owns, as tracked in memory.
#[derive(Debug, Clone)]
pub struct Container {
    pub id: ContainerId,
    pub name: String,
    /// Canonical reference used at create time.
    pub image: String,
    /// Content-addressed image ID after pull, when known.
    pub image_id: Option<ImageId>,
    pub state: ContainerState,
    pub exit_code: Option<i64>,
    pub ports: Vec<PortBinding>,
    pub labels: HashMap<String, String>,
    pub network: Option<String>,
}

impl Container {
    /// The `gordon.domain` label, present on every managed main container.
    pub fn domain_label(&self) -> Option<&str> {
        self.labels.get(labels::DOMAIN).map(String::as_str)
    }

    /// The `gordon.image` label: the reference as the user wrote it.
    pub fn image_label(&self) -> Option<&str> {
        self.labels.get(labels::IMAGE).map(String::as_str)
    }
}

fn state_from_str(state: &str) -> ContainerState {
    match state {
        "created" => ContainerState::Created,
        "running" | "up" => ContainerState::Running,
        "paused" => ContainerState::Paused,
        "restarting" => ContainerState::Restarting,
        "removing" => ContainerState::Removing,
        "dead" => ContainerState::Dead,
        _ => ContainerState::Exited,
    }
}

/// Owns the tracked container set and the deploy machinery around it.
pub struct ContainerManager {
    pub(crate) runtime: Arc<dyn Runtime>,
    config: RwLock<Settings>,
    containers: RwLock<HashMap<Domain, Container>>,
    attachments: RwLock<HashMap<Domain, Vec<ContainerId>>>,
    pub(crate) locks: DomainLocks,
    proxy: RwLock<Option<Arc<dyn ProxyCacheInvalidator>>>,
    publisher: RwLock<Option<Arc<dyn EventPublisher>>>,
    pub(crate) env_loader: Arc<dyn EnvLoader>,
    pub(crate) logs: LogCollector,
}

impl ContainerManager {
    pub fn new(
        runtime: Arc<dyn Runtime>,
        settings: Settings,
        env_loader: Arc<dyn EnvLoader>,
    ) -> Arc<Self> {
        Arc::new(Self {
            runtime,
            config: RwLock::new(settings),
            containers: RwLock::new(HashMap::new()),
            attachments: RwLock::new(HashMap::new()),
            locks: DomainLocks::new(),
            proxy: RwLock::new(None),
            publisher: RwLock::new(None),
            env_loader,
            logs: LogCollector::new(),
        })
    }

    /// Wire the proxy cache invalidator. Set once at startup; the pipeline
    /// tolerates its absence so tests may omit it.
    pub fn set_proxy_cache_invalidator(&self, invalidator: Arc<dyn ProxyCacheInvalidator>) {
        *self.proxy.write() = Some(invalidator);
    }

    pub fn set_event_publisher(&self, publisher: Arc<dyn EventPublisher>) {
        *self.publisher.write() = Some(publisher);
    }

    /// Swap in a new configuration snapshot.
    pub fn update_config(&self, settings: Settings) {
        *self.config.write() = settings;
    }

    /// Clone the current configuration snapshot. Never held across await points.
    pub fn config(&self) -> Settings {
        self.config.read().clone()
    }

    /// The tracked container for a domain, if any.
    pub fn get(&self, domain: &Domain) -> Option<Container> {
        self.containers.read().get(domain).cloned()
    }

    /// Snapshot of the whole tracking map.
    pub fn tracked(&self) -> HashMap<Domain, Container> {
        self.containers.read().clone()
    }

    /// Attachment container ids deployed for a domain.
    pub fn attachment_ids(&self, domain: &Domain) -> Vec<ContainerId> {
        self.attachments
            .read()
            .get(domain)
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn proxy_invalidator(&self) -> Option<Arc<dyn ProxyCacheInvalidator>> {
        self.proxy.read().clone()
    }

    pub(crate) fn event_publisher(&self) -> Option<Arc<dyn EventPublisher>> {
        self.publisher.read().clone()
    }

    /// The atomic swap: replace the tracked container for a domain.
    pub(crate) fn track(&self, domain: Domain, container: Container) {
        self.containers.write().insert(domain, container);
    }

    pub(crate) fn untrack(&self, domain: &Domain) {
        self.containers.write().remove(domain);
    }

    pub(crate) fn track_attachment(&self, domain: &Domain, id: ContainerId) {
        self.attachments
            .write()
            .entry(domain.clone())
            .or_default()
            .push(id);
    }

    pub(crate) fn untrack_attachment(&self, domain: &Domain, id: &ContainerId) {
        let mut attachments = self.attachments.write();
        if let Some(ids) = attachments.get_mut(domain) {
            ids.retain(|existing| existing != id);
            if ids.is_empty() {
                attachments.remove(domain);
            }
        }
    }

    pub(crate) fn untrack_attachments(&self, domain: &Domain) -> Vec<ContainerId> {
        self.attachments.write().remove(domain).unwrap_or_default()
    }

    /// Rebuild the tracking maps from what the runtime actually has.
    ///
    /// Lists containers labeled `gordon.managed=true`, keeps those carrying a
    /// domain label, and swaps both maps in one short critical section each.
    pub async fn sync(&self) -> Result<(), DeployError> {
        let filters = ContainerFilters::managed(labels::MANAGED, "true");
        let summaries = self
            .runtime
            .list_containers(&filters)
            .await
            .map_err(|e| DeployError::config_error(format!("sync failed: {e}")))?;

        let mut containers: HashMap<Domain, Container> = HashMap::new();
        let mut attachments: HashMap<Domain, Vec<ContainerId>> = HashMap::new();

        for summary in summaries {
            if summary.labels.get(labels::ATTACHMENT).map(String::as_str) == Some("true") {
                let Some(owner) = summary.labels.get(labels::ATTACHED_TO) else {
                    continue;
                };
                let Ok(owner) = Domain::new(owner) else {
                    continue;
                };
                attachments.entry(owner).or_default().push(summary.id);
                continue;
            }

            let Some(domain) = summary.labels.get(labels::DOMAIN) else {
                continue;
            };
            let Ok(domain) = Domain::new(domain) else {
                tracing::warn!(container = %summary.id, "ignoring container with invalid domain label");
                continue;
            };

            containers.insert(
                domain,
                Container {
                    id: summary.id,
                    name: summary.name,
                    image: summary.image,
                    image_id: None,
                    state: state_from_str(&summary.state),
                    exit_code: None,
                    ports: Vec::new(),
                    labels: summary.labels,
                    network: summary.networks.into_iter().next(),
                },
            );
        }

        *self.containers.write() = containers;
        *self.attachments.write() = attachments;

        Ok(())
    }

    /// Deploy every route that is not already tracked. Returns the number of
    /// failed deploys; individual failures are logged, not returned.
    pub async fn auto_start(&self, routes: &[Route], cancel: &CancellationToken) -> usize {
        let mut failures = 0;

        for route in routes {
            if self.get(&route.domain).is_some() {
                continue;
            }

            tracing::info!(domain = %route.domain, image = %route.image, "autostarting route");
            if let Err(e) = self.deploy(route, DeployOrigin::External, cancel).await {
                tracing::error!(domain = %route.domain, error = %e, "autostart deploy failed");
                failures += 1;
            }
        }

        failures
    }

    /// Stop log collection and leave containers running; the next boot
    /// reattaches to them via `sync`.
    pub async fn shutdown(&self) {
        self.logs.stop_all();
    }
}
