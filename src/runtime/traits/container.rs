// ABOUTME: Container operations trait for container runtimes.
// ABOUTME: Create, start, stop, restart, remove, rename, inspect, and list.

use super::shared_types::{
    ContainerFilters, ContainerHealth, ContainerInfo, ContainerSpec, ContainerSummary,
};
use crate::types::ContainerId;
use async_trait::async_trait;
use std::time::Duration;

/// Container lifecycle operations.
#[async_trait]
pub trait ContainerOps: Send + Sync {
    /// Create a container from the given spec.
    async fn create_container(&self, spec: &ContainerSpec) -> Result<ContainerId, ContainerError>;

    /// Start a created container.
    async fn start_container(&self, id: &ContainerId) -> Result<(), ContainerError>;

    /// Stop a running container.
    async fn stop_container(&self, id: &ContainerId, timeout: Duration)
    -> Result<(), ContainerError>;

    /// Restart a container.
    async fn restart_container(
        &self,
        id: &ContainerId,
        timeout: Duration,
    ) -> Result<(), ContainerError>;

    /// Remove a container.
    async fn remove_container(&self, id: &ContainerId, force: bool) -> Result<(), ContainerError>;

    /// Rename a container.
    async fn rename_container(&self, id: &ContainerId, new_name: &str)
    -> Result<(), ContainerError>;

    /// Get detailed information about a container.
    async fn inspect_container(&self, id: &ContainerId) -> Result<ContainerInfo, ContainerError>;

    /// Whether the container is currently in the running state.
    async fn is_container_running(&self, id: &ContainerId) -> Result<bool, ContainerError>;

    /// Docker-style health status plus whether a check is declared at all.
    async fn container_health(&self, id: &ContainerId) -> Result<ContainerHealth, ContainerError>;

    /// The first network the container is attached to, if any.
    async fn container_network(&self, id: &ContainerId)
    -> Result<Option<String>, ContainerError>;

    /// List containers matching the given filters.
    async fn list_containers(
        &self,
        filters: &ContainerFilters,
    ) -> Result<Vec<ContainerSummary>, ContainerError>;
}

/// Errors from container operations.
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    /// The id or name resolves to nothing; deploys treat this as a signal to
    /// resync tracking before retrying.
    #[error("no container with id or name {0}")]
    NotFound(String),

    /// Create or rename collided with an existing container's name.
    #[error("container name already taken: {0}")]
    NameTaken(String),

    #[error("container {0} is not running")]
    NotRunning(String),

    #[error("container {0} was already started")]
    AlreadyStarted(String),

    /// Create referenced an image the daemon does not have.
    #[error("image missing for container: {0}")]
    MissingImage(String),

    #[error("container runtime failure: {0}")]
    Runtime(String),
}

impl ContainerError {
    /// Whether this error means the container does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ContainerError::NotFound(_))
    }
}
