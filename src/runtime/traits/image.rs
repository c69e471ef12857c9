// ABOUTME: Image operations trait for container runtimes.
// ABOUTME: Pull, tag, list, and inspect container images.

use super::shared_types::{ImageSummary, RegistryAuth};
use crate::types::ImageId;
use async_trait::async_trait;

/// Image operations: pull, tag, inspect.
#[async_trait]
pub trait ImageOps: Send + Sync {
    /// Pull an image from a registry, optionally authenticated.
    async fn pull_image(
        &self,
        reference: &str,
        auth: Option<&RegistryAuth>,
    ) -> Result<(), ImageError>;

    /// Apply an additional tag to a local image.
    async fn tag_image(&self, source: &str, target: &str) -> Result<(), ImageError>;

    /// Remove a tag from a local image (the underlying layers stay if another
    /// tag still references them).
    async fn untag_image(&self, reference: &str) -> Result<(), ImageError>;

    /// List local images with their repo tags.
    async fn list_images(&self) -> Result<Vec<ImageSummary>, ImageError>;

    /// Content-addressed ID of a local image.
    async fn image_id(&self, reference: &str) -> Result<ImageId, ImageError>;

    /// Environment entries baked into the image config.
    async fn inspect_image_env(&self, reference: &str) -> Result<Vec<String>, ImageError>;

    /// Mount paths the image declares as volumes.
    async fn inspect_image_volumes(&self, reference: &str) -> Result<Vec<String>, ImageError>;

    /// Ports the image declares as exposed.
    async fn image_exposed_ports(&self, reference: &str) -> Result<Vec<u16>, ImageError>;
}

/// Errors from image operations.
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("image not found: {0}")]
    NotFound(String),

    #[error("authentication failed for registry: {0}")]
    AuthenticationFailed(String),

    #[error("pull failed: {0}")]
    PullFailed(String),

    #[error("runtime error: {0}")]
    Runtime(String),
}

impl ImageError {
    /// Whether the underlying failure was a refused connection, which the
    /// resolver retries for internal registry pulls.
    pub fn is_connection_refused(&self) -> bool {
        match self {
            ImageError::PullFailed(msg) | ImageError::Runtime(msg) => {
                msg.contains("connection refused")
            }
            _ => false,
        }
    }
}
