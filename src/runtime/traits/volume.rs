// ABOUTME: Volume operations trait for container runtimes.
// ABOUTME: Create, remove, and query named volumes.

use async_trait::async_trait;

/// Volume operations: create, remove, query.
#[async_trait]
pub trait VolumeOps: Send + Sync {
    /// Check if a named volume exists.
    async fn volume_exists(&self, name: &str) -> Result<bool, VolumeError>;

    /// Create a named volume.
    async fn create_volume(&self, name: &str) -> Result<(), VolumeError>;

    /// Remove a named volume.
    async fn remove_volume(&self, name: &str) -> Result<(), VolumeError>;

    /// Names of all volumes.
    async fn list_volumes(&self) -> Result<Vec<String>, VolumeError>;
}

/// Errors from volume operations.
#[derive(Debug, thiserror::Error)]
pub enum VolumeError {
    #[error("volume not found: {0}")]
    NotFound(String),

    #[error("volume in use, cannot remove: {0}")]
    InUse(String),

    #[error("runtime error: {0}")]
    Runtime(String),
}
