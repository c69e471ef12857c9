// ABOUTME: Auto-route resolution from pushed image labels.
// ABOUTME: Upserts routes, triggers internal deploys, and seeds env files.

use crate::envfile::{self, EnvFileError, EnvFileExtractor};
use crate::events::HandlerError;
use crate::labels;
use crate::manager::{ContainerManager, DeployOrigin};
use crate::routes::{Route, RouteStore, RouteStoreError};
use crate::types::{has_explicit_registry, Domain};
use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Raw access to the registry's blob storage, used to read image configs.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn get_blob(&self, digest: &str) -> Result<Bytes, BlobError>;
}

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("blob not found: {0}")]
    NotFound(String),

    #[error("blob storage error: {0}")]
    Storage(String),
}

/// Blob store reading the registry's on-disk OCI layout:
/// `<root>/<algorithm>/<hex>`.
pub struct FsBlobStore {
    root: std::path::PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<std::path::PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn get_blob(&self, digest: &str) -> Result<Bytes, BlobError> {
        let Some((algorithm, hex)) = digest.split_once(':') else {
            return Err(BlobError::NotFound(digest.to_string()));
        };

        let path = self.root.join(algorithm).join(hex);
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BlobError::NotFound(digest.to_string()))
            }
            Err(e) => Err(BlobError::Storage(e.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum AutoRouteError {
    #[error("manifest parse failed: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error(transparent)]
    Blob(#[from] BlobError),

    #[error(transparent)]
    Store(#[from] RouteStoreError),

    #[error(transparent)]
    EnvFile(#[from] EnvFileError),

    #[error("invalid domain label '{value}': {reason}")]
    InvalidDomain { value: String, reason: String },
}

impl From<AutoRouteError> for HandlerError {
    fn from(e: AutoRouteError) -> Self {
        HandlerError::AutoRoute(e.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct Manifest {
    config: ManifestConfig,
}

#[derive(Debug, Deserialize)]
struct ManifestConfig {
    digest: String,
}

#[derive(Debug, Deserialize)]
struct ImageConfigBlob {
    config: Option<BlobConfig>,
}

#[derive(Debug, Deserialize)]
struct BlobConfig {
    #[serde(rename = "Labels")]
    labels: Option<HashMap<String, String>>,
}

/// The `gordon.*` labels read from an image config.
#[derive(Debug, Default)]
struct ImageLabels {
    domains: Vec<String>,
    health: Option<String>,
    port: Option<String>,
    env_file: Option<String>,
}

fn extract_labels(label_map: &HashMap<String, String>) -> ImageLabels {
    let mut domains = Vec::new();

    if let Some(primary) = label_map.get(labels::IMAGE_DOMAIN) {
        let primary = primary.trim();
        if !primary.is_empty() {
            domains.push(primary.to_string());
        }
    }

    if let Some(extra) = label_map.get(labels::IMAGE_DOMAINS) {
        for entry in extra.split(',') {
            let entry = entry.trim();
            if !entry.is_empty() && !domains.iter().any(|d| d == entry) {
                domains.push(entry.to_string());
            }
        }
    }

    ImageLabels {
        domains,
        health: label_map.get(labels::IMAGE_HEALTH).cloned(),
        port: label_map.get(labels::IMAGE_PORT).cloned(),
        env_file: label_map.get(labels::IMAGE_ENV_FILE).cloned(),
    }
}

/// Turns image labels on pushed manifests into routes and env files.
pub struct AutoRouteResolver {
    manager: Arc<ContainerManager>,
    store: Arc<dyn RouteStore>,
    blobs: Arc<dyn BlobStore>,
    extractor: Option<Arc<dyn EnvFileExtractor>>,
}

impl AutoRouteResolver {
    pub fn new(
        manager: Arc<ContainerManager>,
        store: Arc<dyn RouteStore>,
        blobs: Arc<dyn BlobStore>,
        extractor: Option<Arc<dyn EnvFileExtractor>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            manager,
            store,
            blobs,
            extractor,
        })
    }

    /// Process a pushed manifest. Returns the domains whose routes were added
    /// or updated (and therefore already had a deploy triggered), so the push
    /// handler can skip them in its own matching pass.
    pub async fn process_push(
        &self,
        name: &str,
        reference: &str,
        manifest: &Bytes,
        cancel: &CancellationToken,
    ) -> Result<Vec<Domain>, AutoRouteError> {
        let manifest: Manifest = serde_json::from_slice(manifest)?;
        let blob = self.blobs.get_blob(&manifest.config.digest).await?;
        let config: ImageConfigBlob = serde_json::from_slice(&blob)?;

        let Some(label_map) = config.config.and_then(|c| c.labels) else {
            return Ok(Vec::new());
        };
        let image_labels = extract_labels(&label_map);
        if image_labels.domains.is_empty() {
            return Ok(Vec::new());
        }

        if image_labels.health.is_some() || image_labels.port.is_some() {
            tracing::debug!(
                health = ?image_labels.health,
                port = ?image_labels.port,
                "image declares health/port hints"
            );
        }

        let image = self.image_reference(name, reference);
        let mut touched = Vec::new();

        for value in &image_labels.domains {
            let domain = Domain::new(value).map_err(|e| AutoRouteError::InvalidDomain {
                value: value.clone(),
                reason: e.to_string(),
            })?;

            match self.store.route(&domain).await? {
                Some(existing) if existing.image == image => {
                    tracing::debug!(domain = %domain, "route already up to date");
                    continue;
                }
                Some(_) => {
                    tracing::info!(domain = %domain, image = %image, "updating auto-route");
                    self.store.update_route(&domain, image.clone()).await?;
                }
                None => {
                    tracing::info!(domain = %domain, image = %image, "adding auto-route");
                    self.store
                        .add_route(Route {
                            domain: domain.clone(),
                            image: image.clone(),
                        })
                        .await?;
                }
            }

            let route = Route {
                domain: domain.clone(),
                image: image.clone(),
            };
            if let Err(e) = self
                .manager
                .deploy(&route, DeployOrigin::Internal, cancel)
                .await
            {
                tracing::error!(domain = %domain, error = %e, "auto-route deploy failed");
            }
            touched.push(domain);
        }

        if let Some(env_file) = &image_labels.env_file {
            self.seed_env_files(&image, env_file, &touched).await;
        }

        Ok(touched)
    }

    /// `name@digest` for digest references, `name:tag` otherwise, prefixed
    /// with the configured registry domain when the name is bare.
    fn image_reference(&self, name: &str, reference: &str) -> String {
        let image = if reference.starts_with("sha256:") {
            format!("{name}@{reference}")
        } else if reference.is_empty() {
            format!("{name}:latest")
        } else {
            format!("{name}:{reference}")
        };

        let settings = self.manager.config();
        match settings.registry.domain_trimmed() {
            Some(domain) if !has_explicit_registry(&image) => format!("{domain}/{image}"),
            _ => image,
        }
    }

    /// Extract the in-image env file and merge it under each domain's on-disk
    /// file. Existing values win; image values act as defaults. Best-effort:
    /// failures are logged, never fatal to the push.
    async fn seed_env_files(&self, image: &str, env_file_path: &str, domains: &[Domain]) {
        let Some(extractor) = &self.extractor else {
            return;
        };

        let raw = match extractor.extract_env_file(image, env_file_path).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(image = %image, path = %env_file_path, error = %e, "env file extraction failed");
                return;
            }
        };

        let image_entries = envfile::parse(&String::from_utf8_lossy(&raw));
        let env_dir = self.manager.config().env_dir;

        for domain in domains {
            let path = env_dir.join(domain.env_file_name());

            let existing = match tokio::fs::read_to_string(&path).await {
                Ok(content) => envfile::parse(&content),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "env file read failed");
                    continue;
                }
            };

            let merged = envfile::merge(&existing, &image_entries);
            let serialized = envfile::serialize(&merged);
            if let Err(e) = envfile::write_env_file(&path, &serialized).await {
                tracing::warn!(path = %path.display(), error = %e, "env file write failed");
            } else {
                tracing::info!(domain = %domain, path = %path.display(), "env file updated from image");
            }
        }
    }
}
