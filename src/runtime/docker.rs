// ABOUTME: Bollard-based Docker runtime implementation.
// ABOUTME: Maps Docker Engine API responses onto the capability traits.

use crate::runtime::traits::{
    ContainerError, ContainerFilters, ContainerHealth, ContainerInfo, ContainerOps, ContainerSpec,
    ContainerState, ContainerSummary, HealthState, ImageError, ImageOps, ImageSummary, LogError,
    LogLine, LogOps, LogOptions, LogStream, NetworkError, NetworkOps, NetworkSpec, VolumeError,
    VolumeOps,
};
use crate::types::{ContainerId, ImageId, NetworkId};
use async_trait::async_trait;
use bollard::Docker;
use bollard::models::{ContainerCreateBody, HostConfig, Mount, MountTypeEnum, PortBinding};
use bollard::query_parameters::{
    CreateContainerOptions, CreateImageOptions, InspectContainerOptions, InspectNetworkOptions,
    ListContainersOptions, ListImagesOptions, ListNetworksOptions, ListVolumesOptions,
    LogsOptions, RemoveContainerOptions, RemoveImageOptions, RemoveVolumeOptions,
    RenameContainerOptions, RestartContainerOptions, StopContainerOptions, TagImageOptions,
};
use futures::StreamExt;
use std::collections::HashMap;
use std::pin::Pin;
use std::time::Duration;

// =============================================================================
// Error Mapping Helpers
// =============================================================================

fn map_image_pull_error(e: bollard::errors::Error, image_name: &str) -> ImageError {
    ImageError::PullFailed(format!("{}: {}", image_name, e))
}

fn map_image_not_found_error(e: bollard::errors::Error, image_name: &str) -> ImageError {
    match &e {
        bollard::errors::Error::DockerResponseServerError { status_code, .. }
            if *status_code == 404 =>
        {
            ImageError::NotFound(image_name.to_string())
        }
        _ => ImageError::Runtime(format!("{}: {}", image_name, e)),
    }
}

fn map_container_create_error(e: bollard::errors::Error) -> ContainerError {
    match &e {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 404 => ContainerError::MissingImage(message.clone()),
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 409 => ContainerError::NameTaken(message.clone()),
        _ => ContainerError::Runtime(e.to_string()),
    }
}

fn map_container_start_error(e: bollard::errors::Error) -> ContainerError {
    match &e {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 404 => ContainerError::NotFound(message.clone()),
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 304 => ContainerError::AlreadyStarted(message.clone()),
        _ => ContainerError::Runtime(e.to_string()),
    }
}

fn map_container_stop_error(e: bollard::errors::Error) -> ContainerError {
    match &e {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 404 => ContainerError::NotFound(message.clone()),
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 304 => ContainerError::NotRunning(message.clone()),
        _ => ContainerError::Runtime(e.to_string()),
    }
}

fn map_container_not_found_error(e: bollard::errors::Error) -> ContainerError {
    match &e {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 404 => ContainerError::NotFound(message.clone()),
        _ => ContainerError::Runtime(e.to_string()),
    }
}

fn map_container_rename_error(e: bollard::errors::Error) -> ContainerError {
    match &e {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 404 => ContainerError::NotFound(message.clone()),
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 409 => ContainerError::NameTaken(message.clone()),
        _ => ContainerError::Runtime(e.to_string()),
    }
}

fn map_network_create_error(e: bollard::errors::Error) -> NetworkError {
    match &e {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 409 => NetworkError::AlreadyExists(message.clone()),
        _ => NetworkError::Runtime(e.to_string()),
    }
}

fn map_network_remove_error(e: bollard::errors::Error) -> NetworkError {
    match &e {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 404 => NetworkError::NotFound(message.clone()),
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 403 => NetworkError::InUse(message.clone()),
        _ => NetworkError::Runtime(e.to_string()),
    }
}

fn map_volume_remove_error(e: bollard::errors::Error, name: &str) -> VolumeError {
    match &e {
        bollard::errors::Error::DockerResponseServerError { status_code, .. }
            if *status_code == 404 =>
        {
            VolumeError::NotFound(name.to_string())
        }
        bollard::errors::Error::DockerResponseServerError { status_code, .. }
            if *status_code == 409 =>
        {
            VolumeError::InUse(name.to_string())
        }
        _ => VolumeError::Runtime(e.to_string()),
    }
}

// =============================================================================
// DockerRuntime
// =============================================================================

/// Container runtime implementation backed by the local Docker daemon.
pub struct DockerRuntime {
    client: Docker,
}

impl DockerRuntime {
    /// Create a new DockerRuntime from a Docker client.
    pub fn new(client: Docker) -> Self {
        Self { client }
    }

    /// Connect to the local daemon via its default socket.
    pub fn connect() -> Result<Self, crate::error::Error> {
        let client = Docker::connect_with_local_defaults()
            .map_err(|e| crate::error::Error::RuntimeConnection(e.to_string()))?;
        Ok(Self::new(client))
    }

    /// Connect to a daemon on a specific unix socket path.
    pub fn connect_socket(socket_path: &str) -> Result<Self, crate::error::Error> {
        let client = Docker::connect_with_unix(socket_path, 120, bollard::API_DEFAULT_VERSION)
            .map_err(|e| crate::error::Error::RuntimeConnection(e.to_string()))?;
        Ok(Self::new(client))
    }

    async fn inspect_image_config(
        &self,
        reference: &str,
    ) -> Result<bollard::models::ImageInspect, ImageError> {
        self.client
            .inspect_image(reference)
            .await
            .map_err(|e| map_image_not_found_error(e, reference))
    }

    /// An env-file extractor sharing this runtime's daemon connection.
    pub fn env_file_extractor(&self) -> DockerEnvFileExtractor {
        DockerEnvFileExtractor {
            client: self.client.clone(),
        }
    }
}

/// Pulls single files out of images via the daemon's archive endpoint.
///
/// Docker has no image-level file read, so this creates a container from the
/// image without ever starting it, downloads the path as a tar archive, and
/// removes the container again.
pub struct DockerEnvFileExtractor {
    client: Docker,
}

impl DockerEnvFileExtractor {
    pub fn new(client: Docker) -> Self {
        Self { client }
    }

    async fn download_path(
        &self,
        container_id: &str,
        image: &str,
        path: &str,
    ) -> Result<bytes::Bytes, crate::envfile::EnvFileError> {
        let extraction_err = |message: String| crate::envfile::EnvFileError::Extraction {
            image: image.to_string(),
            path: path.to_string(),
            message,
        };

        let opts = bollard::query_parameters::DownloadFromContainerOptions {
            path: path.to_string(),
        };

        let mut archive = Vec::new();
        let mut stream = self.client.download_from_container(container_id, Some(opts));
        while let Some(chunk) = stream.next().await {
            archive.extend(chunk.map_err(|e| extraction_err(e.to_string()))?);
        }

        match first_file_in_tar(&archive) {
            Ok(Some(content)) => Ok(bytes::Bytes::from(content)),
            Ok(None) => Err(extraction_err("no regular file in archive".to_string())),
            Err(e) => Err(extraction_err(e.to_string())),
        }
    }
}

#[async_trait]
impl crate::envfile::EnvFileExtractor for DockerEnvFileExtractor {
    async fn extract_env_file(
        &self,
        image: &str,
        path: &str,
    ) -> Result<bytes::Bytes, crate::envfile::EnvFileError> {
        let extraction_err = |message: String| crate::envfile::EnvFileError::Extraction {
            image: image.to_string(),
            path: path.to_string(),
            message,
        };

        let body = ContainerCreateBody {
            image: Some(image.to_string()),
            // Never run; the filesystem alone is wanted.
            entrypoint: Some(vec!["true".to_string()]),
            ..Default::default()
        };

        let created = self
            .client
            .create_container(None::<CreateContainerOptions>, body)
            .await
            .map_err(|e| extraction_err(e.to_string()))?;

        let result = self.download_path(&created.id, image, path).await;

        let remove_opts = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        if let Err(e) = self
            .client
            .remove_container(&created.id, Some(remove_opts))
            .await
        {
            tracing::warn!(container = %created.id, error = %e, "failed to remove scratch container");
        }

        result
    }
}

/// The archive endpoint wraps the requested file in a tar stream; unwrap the
/// first regular file.
fn first_file_in_tar(raw: &[u8]) -> std::io::Result<Option<Vec<u8>>> {
    use std::io::Read;

    let mut archive = tar::Archive::new(raw);
    for entry in archive.entries()? {
        let mut entry = entry?;
        if entry.header().entry_type().is_file() {
            let mut content = Vec::new();
            entry.read_to_end(&mut content)?;
            return Ok(Some(content));
        }
    }
    Ok(None)
}

fn parse_container_state(
    state: Option<&bollard::models::ContainerState>,
) -> (ContainerState, Option<i64>) {
    let status = state
        .and_then(|s| s.status)
        .map(|s| match s {
            bollard::models::ContainerStateStatusEnum::CREATED => ContainerState::Created,
            bollard::models::ContainerStateStatusEnum::RUNNING => ContainerState::Running,
            bollard::models::ContainerStateStatusEnum::PAUSED => ContainerState::Paused,
            bollard::models::ContainerStateStatusEnum::RESTARTING => ContainerState::Restarting,
            bollard::models::ContainerStateStatusEnum::REMOVING => ContainerState::Removing,
            bollard::models::ContainerStateStatusEnum::EXITED => ContainerState::Exited,
            bollard::models::ContainerStateStatusEnum::DEAD => ContainerState::Dead,
            _ => ContainerState::Exited,
        })
        .unwrap_or(ContainerState::Exited);

    let exit_code = state.and_then(|s| s.exit_code);

    (status, exit_code)
}

/// Split a Docker port key like `8080/tcp` into its numeric port.
fn parse_port_key(key: &str) -> Option<u16> {
    key.split('/').next()?.parse().ok()
}

#[async_trait]
impl ImageOps for DockerRuntime {
    async fn pull_image(
        &self,
        reference: &str,
        auth: Option<&crate::runtime::traits::RegistryAuth>,
    ) -> Result<(), ImageError> {
        let opts = CreateImageOptions {
            from_image: Some(reference.to_string()),
            ..Default::default()
        };

        let credentials = auth.map(|a| bollard::auth::DockerCredentials {
            username: Some(a.username.clone()),
            password: Some(a.password.clone()),
            serveraddress: a.server.clone(),
            ..Default::default()
        });

        // Pull returns a stream of progress updates - consume it
        let mut stream = self.client.create_image(Some(opts), None, credentials);
        while let Some(result) = stream.next().await {
            result.map_err(|e| map_image_pull_error(e, reference))?;
        }

        Ok(())
    }

    async fn tag_image(&self, source: &str, target: &str) -> Result<(), ImageError> {
        // Docker wants the target split into repo and tag
        let (repo, tag) = match target.rsplit_once(':') {
            Some((before, after)) if !after.contains('/') => {
                (before.to_string(), Some(after.to_string()))
            }
            _ => (target.to_string(), None),
        };

        self.client
            .tag_image(
                source,
                Some(TagImageOptions {
                    repo: Some(repo),
                    tag,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| map_image_not_found_error(e, source))
    }

    async fn untag_image(&self, reference: &str) -> Result<(), ImageError> {
        let opts = RemoveImageOptions {
            noprune: true,
            ..Default::default()
        };

        self.client
            .remove_image(reference, Some(opts), None)
            .await
            .map_err(|e| map_image_not_found_error(e, reference))?;

        Ok(())
    }

    async fn list_images(&self) -> Result<Vec<ImageSummary>, ImageError> {
        let opts = ListImagesOptions {
            all: false,
            ..Default::default()
        };

        let images = self
            .client
            .list_images(Some(opts))
            .await
            .map_err(|e| ImageError::Runtime(e.to_string()))?;

        Ok(images
            .into_iter()
            .map(|i| ImageSummary {
                id: i.id,
                repo_tags: i.repo_tags,
            })
            .collect())
    }

    async fn image_id(&self, reference: &str) -> Result<ImageId, ImageError> {
        let details = self.inspect_image_config(reference).await?;
        Ok(ImageId::new(details.id.unwrap_or_default()))
    }

    async fn inspect_image_env(&self, reference: &str) -> Result<Vec<String>, ImageError> {
        let details = self.inspect_image_config(reference).await?;
        Ok(details
            .config
            .and_then(|c| c.env)
            .unwrap_or_default())
    }

    async fn inspect_image_volumes(&self, reference: &str) -> Result<Vec<String>, ImageError> {
        let details = self.inspect_image_config(reference).await?;
        Ok(details
            .config
            .and_then(|c| c.volumes)
            .unwrap_or_default())
    }

    async fn image_exposed_ports(&self, reference: &str) -> Result<Vec<u16>, ImageError> {
        let details = self.inspect_image_config(reference).await?;
        Ok(details
            .config
            .and_then(|c| c.exposed_ports)
            .unwrap_or_default()
            .iter()
            .filter_map(|key| parse_port_key(key))
            .collect())
    }
}

#[async_trait]
impl ContainerOps for DockerRuntime {
    async fn create_container(&self, spec: &ContainerSpec) -> Result<ContainerId, ContainerError> {
        let mut host_config = HostConfig::default();

        // Named volume mounts
        let mounts: Vec<Mount> = spec
            .volumes
            .iter()
            .map(|(path, volume)| Mount {
                source: Some(volume.clone()),
                target: Some(path.clone()),
                typ: Some(MountTypeEnum::VOLUME),
                read_only: Some(false),
                ..Default::default()
            })
            .collect();
        if !mounts.is_empty() {
            host_config.mounts = Some(mounts);
        }

        // Publish exposed ports on ephemeral host ports; the proxy discovers
        // the runtime-assigned bindings from inspect.
        let mut port_bindings: HashMap<String, Option<Vec<PortBinding>>> = HashMap::new();
        let mut exposed_ports: Vec<String> = Vec::new();
        for port in &spec.exposed_ports {
            let port_key = format!("{}/tcp", port);
            exposed_ports.push(port_key.clone());
            port_bindings.insert(
                port_key,
                Some(vec![PortBinding {
                    host_ip: None,
                    host_port: None,
                }]),
            );
        }
        if !port_bindings.is_empty() {
            host_config.port_bindings = Some(port_bindings);
            host_config.publish_all_ports = Some(true);
        }

        if let Some(ref network) = spec.network {
            host_config.network_mode = Some(network.clone());
        }

        let body = ContainerCreateBody {
            image: Some(spec.image.clone()),
            hostname: spec.hostname.clone(),
            env: if spec.env.is_empty() {
                None
            } else {
                Some(spec.env.clone())
            },
            labels: if spec.labels.is_empty() {
                None
            } else {
                Some(spec.labels.clone())
            },
            exposed_ports: if exposed_ports.is_empty() {
                None
            } else {
                Some(exposed_ports)
            },
            host_config: Some(host_config),
            ..Default::default()
        };

        let opts = CreateContainerOptions {
            name: Some(spec.name.clone()),
            ..Default::default()
        };

        let response = self
            .client
            .create_container(Some(opts), body)
            .await
            .map_err(map_container_create_error)?;

        Ok(ContainerId::new(response.id))
    }

    async fn start_container(&self, id: &ContainerId) -> Result<(), ContainerError> {
        self.client
            .start_container(
                id.as_str(),
                None::<bollard::query_parameters::StartContainerOptions>,
            )
            .await
            .map_err(map_container_start_error)
    }

    async fn stop_container(
        &self,
        id: &ContainerId,
        timeout: Duration,
    ) -> Result<(), ContainerError> {
        let opts = StopContainerOptions {
            t: Some(timeout.as_secs() as i32),
            signal: None,
        };

        self.client
            .stop_container(id.as_str(), Some(opts))
            .await
            .map_err(map_container_stop_error)
    }

    async fn restart_container(
        &self,
        id: &ContainerId,
        timeout: Duration,
    ) -> Result<(), ContainerError> {
        let opts = RestartContainerOptions {
            t: Some(timeout.as_secs() as i32),
            ..Default::default()
        };

        self.client
            .restart_container(id.as_str(), Some(opts))
            .await
            .map_err(map_container_not_found_error)
    }

    async fn remove_container(&self, id: &ContainerId, force: bool) -> Result<(), ContainerError> {
        let opts = RemoveContainerOptions {
            force,
            ..Default::default()
        };

        self.client
            .remove_container(id.as_str(), Some(opts))
            .await
            .map_err(map_container_not_found_error)?;

        Ok(())
    }

    async fn rename_container(
        &self,
        id: &ContainerId,
        new_name: &str,
    ) -> Result<(), ContainerError> {
        self.client
            .rename_container(
                id.as_str(),
                RenameContainerOptions {
                    name: new_name.to_string(),
                },
            )
            .await
            .map_err(map_container_rename_error)
    }

    async fn inspect_container(&self, id: &ContainerId) -> Result<ContainerInfo, ContainerError> {
        let details = self
            .client
            .inspect_container(id.as_str(), None::<InspectContainerOptions>)
            .await
            .map_err(map_container_not_found_error)?;

        let (state, exit_code) = parse_container_state(details.state.as_ref());

        let health = details
            .state
            .as_ref()
            .and_then(|s| s.health.as_ref())
            .and_then(|h| h.status)
            .map(|s| match s {
                bollard::models::HealthStatusEnum::STARTING => HealthState::Starting,
                bollard::models::HealthStatusEnum::HEALTHY => HealthState::Healthy,
                bollard::models::HealthStatusEnum::UNHEALTHY => HealthState::Unhealthy,
                _ => HealthState::None,
            });

        let mut ports = Vec::new();
        let mut networks = Vec::new();
        if let Some(ref network_settings) = details.network_settings {
            if let Some(ref port_map) = network_settings.ports {
                for (key, bindings) in port_map {
                    let Some(container_port) = parse_port_key(key) else {
                        continue;
                    };
                    let host_port = bindings
                        .as_ref()
                        .and_then(|b| b.first())
                        .and_then(|b| b.host_port.as_deref())
                        .and_then(|p| p.parse().ok());
                    ports.push(crate::runtime::traits::PortBinding {
                        container_port,
                        host_port,
                    });
                }
            }
            if let Some(ref nets) = network_settings.networks {
                networks.extend(nets.keys().cloned());
            }
        }

        Ok(ContainerInfo {
            id: id.clone(),
            name: details
                .name
                .unwrap_or_default()
                .trim_start_matches('/')
                .to_string(),
            image: details
                .config
                .as_ref()
                .and_then(|c| c.image.clone())
                .unwrap_or_default(),
            state,
            exit_code,
            health,
            ports,
            labels: details.config.and_then(|c| c.labels).unwrap_or_default(),
            networks,
        })
    }

    async fn is_container_running(&self, id: &ContainerId) -> Result<bool, ContainerError> {
        let info = self.inspect_container(id).await?;
        Ok(info.state.is_running())
    }

    async fn container_health(&self, id: &ContainerId) -> Result<ContainerHealth, ContainerError> {
        let details = self
            .client
            .inspect_container(id.as_str(), None::<InspectContainerOptions>)
            .await
            .map_err(map_container_not_found_error)?;

        let status = details
            .state
            .as_ref()
            .and_then(|s| s.health.as_ref())
            .and_then(|h| h.status);

        // NONE (or no health block) means the image declares no check.
        let (state, has_check) = match status {
            Some(bollard::models::HealthStatusEnum::STARTING) => (HealthState::Starting, true),
            Some(bollard::models::HealthStatusEnum::HEALTHY) => (HealthState::Healthy, true),
            Some(bollard::models::HealthStatusEnum::UNHEALTHY) => (HealthState::Unhealthy, true),
            _ => (HealthState::None, false),
        };

        Ok(ContainerHealth { state, has_check })
    }

    async fn container_network(
        &self,
        id: &ContainerId,
    ) -> Result<Option<String>, ContainerError> {
        let info = self.inspect_container(id).await?;
        Ok(info.networks.into_iter().next())
    }

    async fn list_containers(
        &self,
        filters: &ContainerFilters,
    ) -> Result<Vec<ContainerSummary>, ContainerError> {
        let mut filter_map: HashMap<String, Vec<String>> = HashMap::new();

        if let Some(ref name) = filters.name {
            filter_map.insert("name".to_string(), vec![name.clone()]);
        }

        for (key, value) in &filters.labels {
            let entry = if value.is_empty() {
                key.clone()
            } else {
                format!("{}={}", key, value)
            };
            filter_map
                .entry("label".to_string())
                .or_default()
                .push(entry);
        }

        let opts = ListContainersOptions {
            all: filters.all,
            filters: Some(filter_map),
            ..Default::default()
        };

        let containers = self
            .client
            .list_containers(Some(opts))
            .await
            .map_err(|e| ContainerError::Runtime(e.to_string()))?;

        Ok(containers
            .into_iter()
            .map(|c| {
                let id = c.id.unwrap_or_default();
                let names = c.names.unwrap_or_default();
                let name = names
                    .first()
                    .map(|n| n.trim_start_matches('/').to_string())
                    .unwrap_or_default();

                let state = c
                    .state
                    .map(|s| format!("{:?}", s).to_lowercase())
                    .unwrap_or_default();

                let networks = c
                    .network_settings
                    .and_then(|ns| ns.networks)
                    .map(|nets| nets.keys().cloned().collect())
                    .unwrap_or_default();

                ContainerSummary {
                    id: ContainerId::new(id),
                    name,
                    image: c.image.unwrap_or_default(),
                    state,
                    labels: c.labels.unwrap_or_default(),
                    networks,
                }
            })
            .collect())
    }
}

#[async_trait]
impl NetworkOps for DockerRuntime {
    async fn create_network(&self, spec: &NetworkSpec) -> Result<NetworkId, NetworkError> {
        let opts = bollard::models::NetworkCreateRequest {
            name: spec.name.clone(),
            driver: spec.driver.clone(),
            labels: if spec.labels.is_empty() {
                None
            } else {
                Some(spec.labels.clone())
            },
            ..Default::default()
        };

        let response = self
            .client
            .create_network(opts)
            .await
            .map_err(map_network_create_error)?;

        Ok(NetworkId::new(response.id))
    }

    async fn remove_network(&self, name: &str) -> Result<(), NetworkError> {
        self.client
            .remove_network(name)
            .await
            .map_err(map_network_remove_error)
    }

    async fn network_exists(&self, name: &str) -> Result<bool, NetworkError> {
        match self
            .client
            .inspect_network(name, None::<InspectNetworkOptions>)
            .await
        {
            Ok(_) => Ok(true),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(NetworkError::Runtime(e.to_string())),
        }
    }

    async fn list_networks(&self) -> Result<Vec<String>, NetworkError> {
        let networks = self
            .client
            .list_networks(None::<ListNetworksOptions>)
            .await
            .map_err(|e| NetworkError::Runtime(e.to_string()))?;

        Ok(networks.into_iter().filter_map(|n| n.name).collect())
    }
}

#[async_trait]
impl VolumeOps for DockerRuntime {
    async fn volume_exists(&self, name: &str) -> Result<bool, VolumeError> {
        match self.client.inspect_volume(name).await {
            Ok(_) => Ok(true),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(VolumeError::Runtime(e.to_string())),
        }
    }

    async fn create_volume(&self, name: &str) -> Result<(), VolumeError> {
        let opts = bollard::models::VolumeCreateRequest {
            name: Some(name.to_string()),
            ..Default::default()
        };

        self.client
            .create_volume(opts)
            .await
            .map_err(|e| VolumeError::Runtime(e.to_string()))?;

        Ok(())
    }

    async fn remove_volume(&self, name: &str) -> Result<(), VolumeError> {
        self.client
            .remove_volume(name, None::<RemoveVolumeOptions>)
            .await
            .map_err(|e| map_volume_remove_error(e, name))
    }

    async fn list_volumes(&self) -> Result<Vec<String>, VolumeError> {
        let response = self
            .client
            .list_volumes(None::<ListVolumesOptions>)
            .await
            .map_err(|e| VolumeError::Runtime(e.to_string()))?;

        Ok(response
            .volumes
            .unwrap_or_default()
            .into_iter()
            .map(|v| v.name)
            .collect())
    }
}

#[async_trait]
impl LogOps for DockerRuntime {
    async fn container_logs(
        &self,
        id: &ContainerId,
        opts: &LogOptions,
    ) -> Result<Pin<Box<dyn futures::Stream<Item = Result<LogLine, LogError>> + Send>>, LogError>
    {
        let log_opts = LogsOptions {
            stdout: opts.stdout,
            stderr: opts.stderr,
            follow: opts.follow,
            tail: opts
                .tail
                .map(|n| n.to_string())
                .unwrap_or_else(|| "all".to_string()),
            ..Default::default()
        };

        let stream = self.client.logs(id.as_str(), Some(log_opts));

        let mapped_stream = stream.map(|result| {
            result
                .map(|output| {
                    let (stream_type, data) = match output {
                        bollard::container::LogOutput::StdErr { message } => {
                            (LogStream::Stderr, message)
                        }
                        bollard::container::LogOutput::StdOut { message }
                        | bollard::container::LogOutput::StdIn { message }
                        | bollard::container::LogOutput::Console { message } => {
                            (LogStream::Stdout, message)
                        }
                    };

                    LogLine {
                        content: String::from_utf8_lossy(&data).to_string(),
                        stream: stream_type,
                    }
                })
                .map_err(|e| LogError::StreamError(e.to_string()))
        });

        Ok(Box::pin(mapped_stream))
    }
}
