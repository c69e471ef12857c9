// ABOUTME: In-process fakes for the runtime, proxy, route store, and blob store.
// ABOUTME: Every externally visible call is recorded in a shared ordered log.

use async_trait::async_trait;
use bytes::Bytes;
use gordon::envfile::{EnvFileError, EnvFileExtractor, EnvLoader};
use gordon::manager::{BlobError, BlobStore, ContainerManager};
use gordon::proxy::ProxyCacheInvalidator;
use gordon::routes::{Route, RouteStore, RouteStoreError};
use gordon::runtime::{
    ContainerError, ContainerFilters, ContainerHealth, ContainerInfo, ContainerOps, ContainerSpec,
    ContainerState, ContainerSummary, HealthState, ImageError, ImageOps, ImageSummary, LogError,
    LogLine, LogOps, LogOptions, NetworkError, NetworkOps, NetworkSpec, VolumeError, VolumeOps,
};
use gordon::types::{normalize_for_match, ContainerId, Domain, ImageId, NetworkId};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Ordered log of externally visible calls, shared between the fake runtime
/// and the fake proxy invalidator so cross-component ordering is assertable.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: String) {
        self.0.lock().push(entry);
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }

    /// Index of the first entry starting with `prefix`.
    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.0.lock().iter().position(|e| e.starts_with(prefix))
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.0
            .lock()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .count()
    }

    pub fn contains(&self, prefix: &str) -> bool {
        self.position(prefix).is_some()
    }

    /// Assert that the first entry matching `a` comes before the first
    /// matching `b`.
    pub fn assert_order(&self, a: &str, b: &str) {
        let pa = self
            .position(a)
            .unwrap_or_else(|| panic!("no call matching '{a}' in {:?}", self.snapshot()));
        let pb = self
            .position(b)
            .unwrap_or_else(|| panic!("no call matching '{b}' in {:?}", self.snapshot()));
        assert!(
            pa < pb,
            "expected '{a}' (index {pa}) before '{b}' (index {pb}): {:?}",
            self.snapshot()
        );
    }
}

#[derive(Debug, Clone)]
pub struct FakeContainer {
    pub id: ContainerId,
    pub name: String,
    pub image: String,
    pub labels: HashMap<String, String>,
    pub state: ContainerState,
    pub exit_code: Option<i64>,
    pub network: Option<String>,
}

#[derive(Default)]
struct Inner {
    containers: HashMap<String, FakeContainer>,
    images: HashSet<String>,
    networks: HashSet<String>,
    volumes: HashSet<String>,
    image_env: HashMap<String, Vec<String>>,
    image_volumes: HashMap<String, Vec<String>>,
    image_ports: HashMap<String, Vec<u16>>,
    health: HashMap<String, ContainerHealth>,
    next_id: u64,
    // Failure knobs
    fail_pull: Option<String>,
    pull_refusals: u32,
    fail_start: bool,
    start_sets_running: bool,
    in_create: u32,
    create_overlap: bool,
}

/// A fake container runtime recording every operation.
pub struct FakeRuntime {
    inner: Mutex<Inner>,
    log: CallLog,
}

impl FakeRuntime {
    pub fn new(log: CallLog) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                start_sets_running: true,
                ..Default::default()
            }),
            log,
        })
    }

    pub fn add_image(&self, reference: &str) {
        self.inner.lock().images.insert(reference.to_string());
    }

    pub fn has_image(&self, reference: &str) -> bool {
        self.inner.lock().images.contains(reference)
    }

    pub fn set_image_ports(&self, reference: &str, ports: Vec<u16>) {
        self.inner
            .lock()
            .image_ports
            .insert(reference.to_string(), ports);
    }

    pub fn set_image_env(&self, reference: &str, env: Vec<String>) {
        self.inner
            .lock()
            .image_env
            .insert(reference.to_string(), env);
    }

    pub fn set_image_volumes(&self, reference: &str, paths: Vec<String>) {
        self.inner
            .lock()
            .image_volumes
            .insert(reference.to_string(), paths);
    }

    /// Seed a container as the runtime would report it.
    pub fn add_container(
        &self,
        name: &str,
        image: &str,
        labels: HashMap<String, String>,
        state: ContainerState,
    ) -> ContainerId {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = ContainerId::new(format!("c{:04}", inner.next_id));
        inner.containers.insert(
            id.as_str().to_string(),
            FakeContainer {
                id: id.clone(),
                name: name.to_string(),
                image: image.to_string(),
                labels,
                state,
                exit_code: None,
                network: None,
            },
        );
        id
    }

    pub fn set_state(&self, id: &ContainerId, state: ContainerState, exit_code: Option<i64>) {
        let mut inner = self.inner.lock();
        if let Some(c) = inner.containers.get_mut(id.as_str()) {
            c.state = state;
            c.exit_code = exit_code;
        }
    }

    pub fn set_health(&self, id: &ContainerId, state: HealthState, has_check: bool) {
        self.inner
            .lock()
            .health
            .insert(id.as_str().to_string(), ContainerHealth { state, has_check });
    }

    pub fn container(&self, id: &ContainerId) -> Option<FakeContainer> {
        self.inner.lock().containers.get(id.as_str()).cloned()
    }

    pub fn container_by_name(&self, name: &str) -> Option<FakeContainer> {
        self.inner
            .lock()
            .containers
            .values()
            .find(|c| c.name == name)
            .cloned()
    }

    pub fn container_count(&self) -> usize {
        self.inner.lock().containers.len()
    }

    pub fn fail_pull_with(&self, message: &str) {
        self.inner.lock().fail_pull = Some(message.to_string());
    }

    /// The next `times` pulls fail with a refused connection.
    pub fn refuse_pulls(&self, times: u32) {
        self.inner.lock().pull_refusals = times;
    }

    pub fn fail_start(&self) {
        self.inner.lock().fail_start = true;
    }

    /// Started containers stay in `created` instead of reaching `running`.
    pub fn start_leaves_stopped(&self) {
        self.inner.lock().start_sets_running = false;
    }

    /// Whether two create calls ever overlapped in wall time.
    pub fn create_overlapped(&self) -> bool {
        self.inner.lock().create_overlap
    }

    /// Drop a container without recording a call, as if something outside the
    /// orchestrator removed it.
    pub fn remove_container_silently(&self, id: &ContainerId) {
        self.inner.lock().containers.remove(id.as_str());
    }
}

#[async_trait]
impl ImageOps for FakeRuntime {
    async fn pull_image(
        &self,
        reference: &str,
        auth: Option<&gordon::runtime::RegistryAuth>,
    ) -> Result<(), ImageError> {
        match auth {
            Some(auth) => self
                .log
                .push(format!("pull_auth {} {}", auth.username, reference)),
            None => self.log.push(format!("pull {reference}")),
        }

        let mut inner = self.inner.lock();
        if inner.pull_refusals > 0 {
            inner.pull_refusals -= 1;
            return Err(ImageError::PullFailed(format!(
                "{reference}: connection refused"
            )));
        }
        if let Some(message) = &inner.fail_pull {
            return Err(ImageError::PullFailed(message.clone()));
        }
        inner.images.insert(reference.to_string());
        Ok(())
    }

    async fn tag_image(&self, source: &str, target: &str) -> Result<(), ImageError> {
        self.log.push(format!("tag {source} {target}"));
        let mut inner = self.inner.lock();
        if !inner.images.contains(source) {
            return Err(ImageError::NotFound(source.to_string()));
        }
        inner.images.insert(target.to_string());
        Ok(())
    }

    async fn untag_image(&self, reference: &str) -> Result<(), ImageError> {
        self.log.push(format!("untag {reference}"));
        self.inner.lock().images.remove(reference);
        Ok(())
    }

    async fn list_images(&self) -> Result<Vec<ImageSummary>, ImageError> {
        let inner = self.inner.lock();
        Ok(inner
            .images
            .iter()
            .map(|tag| ImageSummary {
                id: format!("sha256:fake-{tag}"),
                repo_tags: vec![tag.clone()],
            })
            .collect())
    }

    async fn image_id(&self, reference: &str) -> Result<ImageId, ImageError> {
        Ok(ImageId::new(format!("sha256:fake-{reference}")))
    }

    async fn inspect_image_env(&self, reference: &str) -> Result<Vec<String>, ImageError> {
        Ok(self
            .inner
            .lock()
            .image_env
            .get(reference)
            .cloned()
            .unwrap_or_default())
    }

    async fn inspect_image_volumes(&self, reference: &str) -> Result<Vec<String>, ImageError> {
        Ok(self
            .inner
            .lock()
            .image_volumes
            .get(reference)
            .cloned()
            .unwrap_or_default())
    }

    async fn image_exposed_ports(&self, reference: &str) -> Result<Vec<u16>, ImageError> {
        Ok(self
            .inner
            .lock()
            .image_ports
            .get(reference)
            .cloned()
            .unwrap_or_else(|| vec![8080]))
    }
}

#[async_trait]
impl ContainerOps for FakeRuntime {
    async fn create_container(&self, spec: &ContainerSpec) -> Result<ContainerId, ContainerError> {
        self.log.push(format!("create {}", spec.name));

        {
            let mut inner = self.inner.lock();
            inner.in_create += 1;
            if inner.in_create > 1 {
                inner.create_overlap = true;
            }
        }

        // Hold the create "in flight" briefly so overlapping creates are
        // observable in wall time.
        tokio::time::sleep(Duration::from_millis(5)).await;

        let mut inner = self.inner.lock();
        inner.in_create -= 1;
        inner.next_id += 1;
        let id = ContainerId::new(format!("c{:04}", inner.next_id));
        inner.containers.insert(
            id.as_str().to_string(),
            FakeContainer {
                id: id.clone(),
                name: spec.name.clone(),
                image: spec.image.clone(),
                labels: spec.labels.clone(),
                state: ContainerState::Created,
                exit_code: None,
                network: spec.network.clone(),
            },
        );
        Ok(id)
    }

    async fn start_container(&self, id: &ContainerId) -> Result<(), ContainerError> {
        self.log.push(format!("start {id}"));
        let mut inner = self.inner.lock();
        if inner.fail_start {
            return Err(ContainerError::Runtime("start failed".to_string()));
        }
        let sets_running = inner.start_sets_running;
        match inner.containers.get_mut(id.as_str()) {
            Some(c) => {
                if sets_running {
                    c.state = ContainerState::Running;
                    c.exit_code = None;
                }
                Ok(())
            }
            None => Err(ContainerError::NotFound(id.to_string())),
        }
    }

    async fn stop_container(
        &self,
        id: &ContainerId,
        _timeout: Duration,
    ) -> Result<(), ContainerError> {
        self.log.push(format!("stop {id}"));
        let mut inner = self.inner.lock();
        match inner.containers.get_mut(id.as_str()) {
            Some(c) => {
                c.state = ContainerState::Exited;
                c.exit_code = Some(0);
                Ok(())
            }
            None => Err(ContainerError::NotFound(id.to_string())),
        }
    }

    async fn restart_container(
        &self,
        id: &ContainerId,
        _timeout: Duration,
    ) -> Result<(), ContainerError> {
        self.log.push(format!("restart {id}"));
        let mut inner = self.inner.lock();
        match inner.containers.get_mut(id.as_str()) {
            Some(c) => {
                c.state = ContainerState::Running;
                c.exit_code = None;
                Ok(())
            }
            None => Err(ContainerError::NotFound(id.to_string())),
        }
    }

    async fn remove_container(&self, id: &ContainerId, _force: bool) -> Result<(), ContainerError> {
        self.log.push(format!("remove {id}"));
        let mut inner = self.inner.lock();
        match inner.containers.remove(id.as_str()) {
            Some(_) => Ok(()),
            None => Err(ContainerError::NotFound(id.to_string())),
        }
    }

    async fn rename_container(
        &self,
        id: &ContainerId,
        new_name: &str,
    ) -> Result<(), ContainerError> {
        self.log.push(format!("rename {id} {new_name}"));
        let mut inner = self.inner.lock();
        match inner.containers.get_mut(id.as_str()) {
            Some(c) => {
                c.name = new_name.to_string();
                Ok(())
            }
            None => Err(ContainerError::NotFound(id.to_string())),
        }
    }

    async fn inspect_container(&self, id: &ContainerId) -> Result<ContainerInfo, ContainerError> {
        let inner = self.inner.lock();
        let Some(c) = inner.containers.get(id.as_str()) else {
            return Err(ContainerError::NotFound(id.to_string()));
        };
        let health = inner.health.get(id.as_str()).map(|h| h.state);
        Ok(ContainerInfo {
            id: c.id.clone(),
            name: c.name.clone(),
            image: c.image.clone(),
            state: c.state,
            exit_code: c.exit_code,
            health,
            ports: Vec::new(),
            labels: c.labels.clone(),
            networks: c.network.iter().cloned().collect(),
        })
    }

    async fn is_container_running(&self, id: &ContainerId) -> Result<bool, ContainerError> {
        let inner = self.inner.lock();
        match inner.containers.get(id.as_str()) {
            Some(c) => Ok(c.state.is_running()),
            None => Err(ContainerError::NotFound(id.to_string())),
        }
    }

    async fn container_health(&self, id: &ContainerId) -> Result<ContainerHealth, ContainerError> {
        let inner = self.inner.lock();
        if !inner.containers.contains_key(id.as_str()) {
            return Err(ContainerError::NotFound(id.to_string()));
        }
        Ok(inner
            .health
            .get(id.as_str())
            .copied()
            .unwrap_or(ContainerHealth {
                state: HealthState::None,
                has_check: false,
            }))
    }

    async fn container_network(
        &self,
        id: &ContainerId,
    ) -> Result<Option<String>, ContainerError> {
        let inner = self.inner.lock();
        match inner.containers.get(id.as_str()) {
            Some(c) => Ok(c.network.clone()),
            None => Err(ContainerError::NotFound(id.to_string())),
        }
    }

    async fn list_containers(
        &self,
        filters: &ContainerFilters,
    ) -> Result<Vec<ContainerSummary>, ContainerError> {
        let inner = self.inner.lock();
        Ok(inner
            .containers
            .values()
            .filter(|c| filters.all || c.state.is_running())
            .filter(|c| {
                filters.labels.iter().all(|(key, value)| {
                    if value.is_empty() {
                        c.labels.contains_key(key)
                    } else {
                        c.labels.get(key) == Some(value)
                    }
                })
            })
            .filter(|c| {
                filters
                    .name
                    .as_ref()
                    .is_none_or(|name| c.name.contains(name.as_str()))
            })
            .map(|c| ContainerSummary {
                id: c.id.clone(),
                name: c.name.clone(),
                image: c.image.clone(),
                state: match c.state {
                    ContainerState::Running => "running".to_string(),
                    ContainerState::Created => "created".to_string(),
                    _ => "exited".to_string(),
                },
                labels: c.labels.clone(),
                networks: c.network.iter().cloned().collect(),
            })
            .collect())
    }
}

#[async_trait]
impl NetworkOps for FakeRuntime {
    async fn create_network(&self, spec: &NetworkSpec) -> Result<NetworkId, NetworkError> {
        self.log.push(format!("create_network {}", spec.name));
        self.inner.lock().networks.insert(spec.name.clone());
        Ok(NetworkId::new(format!("net-{}", spec.name)))
    }

    async fn remove_network(&self, name: &str) -> Result<(), NetworkError> {
        self.log.push(format!("remove_network {name}"));
        if self.inner.lock().networks.remove(name) {
            Ok(())
        } else {
            Err(NetworkError::NotFound(name.to_string()))
        }
    }

    async fn network_exists(&self, name: &str) -> Result<bool, NetworkError> {
        Ok(self.inner.lock().networks.contains(name))
    }

    async fn list_networks(&self) -> Result<Vec<String>, NetworkError> {
        Ok(self.inner.lock().networks.iter().cloned().collect())
    }
}

#[async_trait]
impl VolumeOps for FakeRuntime {
    async fn volume_exists(&self, name: &str) -> Result<bool, VolumeError> {
        Ok(self.inner.lock().volumes.contains(name))
    }

    async fn create_volume(&self, name: &str) -> Result<(), VolumeError> {
        self.log.push(format!("create_volume {name}"));
        self.inner.lock().volumes.insert(name.to_string());
        Ok(())
    }

    async fn remove_volume(&self, name: &str) -> Result<(), VolumeError> {
        self.log.push(format!("remove_volume {name}"));
        if self.inner.lock().volumes.remove(name) {
            Ok(())
        } else {
            Err(VolumeError::NotFound(name.to_string()))
        }
    }

    async fn list_volumes(&self) -> Result<Vec<String>, VolumeError> {
        Ok(self.inner.lock().volumes.iter().cloned().collect())
    }
}

#[async_trait]
impl LogOps for FakeRuntime {
    async fn container_logs(
        &self,
        _id: &ContainerId,
        _opts: &LogOptions,
    ) -> Result<Pin<Box<dyn futures::Stream<Item = Result<LogLine, LogError>> + Send>>, LogError>
    {
        Ok(Box::pin(futures::stream::empty()))
    }
}

/// Proxy invalidator recording each call together with the id the manager
/// tracks for the domain at invalidation time, so tests can assert the swap
/// happened first.
pub struct FakeInvalidator {
    log: CallLog,
    manager: Mutex<Option<Weak<ContainerManager>>>,
}

impl FakeInvalidator {
    pub fn new(log: CallLog) -> Arc<Self> {
        Arc::new(Self {
            log,
            manager: Mutex::new(None),
        })
    }

    pub fn attach(&self, manager: &Arc<ContainerManager>) {
        *self.manager.lock() = Some(Arc::downgrade(manager));
    }
}

#[async_trait]
impl ProxyCacheInvalidator for FakeInvalidator {
    async fn invalidate_target(&self, domain: &Domain) {
        let tracked = self
            .manager
            .lock()
            .as_ref()
            .and_then(Weak::upgrade)
            .and_then(|m| m.get(domain))
            .map(|c| c.id.to_string())
            .unwrap_or_else(|| "none".to_string());
        self.log.push(format!("invalidate {domain} tracked={tracked}"));
    }
}

/// Route store fake recording add/update calls.
pub struct FakeRouteStore {
    routes: Mutex<HashMap<Domain, String>>,
    auto_route: bool,
    registry_domain: Option<String>,
    log: CallLog,
}

impl FakeRouteStore {
    pub fn new(log: CallLog, auto_route: bool) -> Arc<Self> {
        Arc::new(Self {
            routes: Mutex::new(HashMap::new()),
            auto_route,
            registry_domain: None,
            log,
        })
    }

    pub fn with_registry_domain(log: CallLog, auto_route: bool, domain: &str) -> Arc<Self> {
        Arc::new(Self {
            routes: Mutex::new(HashMap::new()),
            auto_route,
            registry_domain: Some(domain.to_string()),
            log,
        })
    }

    pub fn insert(&self, domain: &str, image: &str) {
        self.routes
            .lock()
            .insert(Domain::new(domain).unwrap(), image.to_string());
    }

    pub fn image_of(&self, domain: &str) -> Option<String> {
        self.routes
            .lock()
            .get(&Domain::new(domain).unwrap())
            .cloned()
    }

    fn canonical(&self, reference: &str) -> String {
        let prefixed = match &self.registry_domain {
            Some(domain) if !gordon::types::has_explicit_registry(reference) => {
                format!("{domain}/{reference}")
            }
            _ => reference.to_string(),
        };
        normalize_for_match(&prefixed)
    }
}

#[async_trait]
impl RouteStore for FakeRouteStore {
    async fn routes(&self) -> Result<Vec<Route>, RouteStoreError> {
        Ok(self
            .routes
            .lock()
            .iter()
            .map(|(domain, image)| Route {
                domain: domain.clone(),
                image: image.clone(),
            })
            .collect())
    }

    async fn route(&self, domain: &Domain) -> Result<Option<Route>, RouteStoreError> {
        Ok(self.routes.lock().get(domain).map(|image| Route {
            domain: domain.clone(),
            image: image.clone(),
        }))
    }

    async fn find_by_image(&self, reference: &str) -> Result<Vec<Route>, RouteStoreError> {
        let wanted = self.canonical(reference);
        Ok(self
            .routes
            .lock()
            .iter()
            .filter(|(_, image)| self.canonical(image) == wanted)
            .map(|(domain, image)| Route {
                domain: domain.clone(),
                image: image.clone(),
            })
            .collect())
    }

    async fn add_route(&self, route: Route) -> Result<(), RouteStoreError> {
        self.log
            .push(format!("add_route {} {}", route.domain, route.image));
        self.routes.lock().insert(route.domain, route.image);
        Ok(())
    }

    async fn update_route(&self, domain: &Domain, image: String) -> Result<(), RouteStoreError> {
        self.log.push(format!("update_route {domain} {image}"));
        self.routes.lock().insert(domain.clone(), image);
        Ok(())
    }

    fn auto_route_enabled(&self) -> bool {
        self.auto_route
    }
}

/// Env loader serving from an in-memory map.
#[derive(Default)]
pub struct FakeEnvLoader {
    env: Mutex<HashMap<String, Vec<String>>>,
}

impl FakeEnvLoader {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set(&self, domain: &str, env: Vec<String>) {
        self.env.lock().insert(domain.to_string(), env);
    }
}

#[async_trait]
impl EnvLoader for FakeEnvLoader {
    async fn load_env(&self, domain: &Domain) -> Result<Vec<String>, EnvFileError> {
        Ok(self
            .env
            .lock()
            .get(domain.as_str())
            .cloned()
            .unwrap_or_default())
    }
}

/// Blob store serving from an in-memory map keyed by digest.
#[derive(Default)]
pub struct FakeBlobStore {
    blobs: Mutex<HashMap<String, Bytes>>,
}

impl FakeBlobStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, digest: &str, content: Bytes) {
        self.blobs.lock().insert(digest.to_string(), content);
    }
}

#[async_trait]
impl BlobStore for FakeBlobStore {
    async fn get_blob(&self, digest: &str) -> Result<Bytes, BlobError> {
        self.blobs
            .lock()
            .get(digest)
            .cloned()
            .ok_or_else(|| BlobError::NotFound(digest.to_string()))
    }
}

/// Env-file extractor serving from an in-memory map keyed by in-image path.
#[derive(Default)]
pub struct FakeEnvFileExtractor {
    files: Mutex<HashMap<String, Bytes>>,
}

impl FakeEnvFileExtractor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, path: &str, content: Bytes) {
        self.files.lock().insert(path.to_string(), content);
    }
}

#[async_trait]
impl EnvFileExtractor for FakeEnvFileExtractor {
    async fn extract_env_file(&self, _image: &str, path: &str) -> Result<Bytes, EnvFileError> {
        self.files.lock().get(path).cloned().ok_or_else(|| {
            EnvFileError::Io {
                path: path.into(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
            }
        })
    }
}
