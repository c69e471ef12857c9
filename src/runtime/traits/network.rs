// ABOUTME: Network operations trait for container runtimes.
// ABOUTME: Create, remove, and query container networks.

use super::shared_types::NetworkSpec;
use crate::types::NetworkId;
use async_trait::async_trait;

/// Network operations: create, remove, query.
#[async_trait]
pub trait NetworkOps: Send + Sync {
    /// Create a network.
    async fn create_network(&self, spec: &NetworkSpec) -> Result<NetworkId, NetworkError>;

    /// Remove a network by name.
    async fn remove_network(&self, name: &str) -> Result<(), NetworkError>;

    /// Check if a network exists.
    async fn network_exists(&self, name: &str) -> Result<bool, NetworkError>;

    /// Names of all networks.
    async fn list_networks(&self) -> Result<Vec<String>, NetworkError>;
}

/// Errors from network operations.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("network not found: {0}")]
    NotFound(String),

    #[error("network already exists: {0}")]
    AlreadyExists(String),

    #[error("network in use, cannot remove: {0}")]
    InUse(String),

    #[error("runtime error: {0}")]
    Runtime(String),
}
