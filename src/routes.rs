// ABOUTME: Route definitions and the route store seam.
// ABOUTME: File-backed implementation with YAML write-back for auto-route upserts.

use crate::config::RegistrySettings;
use crate::types::{self, Domain};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

/// A declared mapping from a public hostname to a container image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub domain: Domain,
    /// The image reference exactly as the user wrote it.
    pub image: String,
}

#[derive(Debug, Error)]
pub enum RouteStoreError {
    #[error("I/O error for {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// The configuration store's route surface.
#[async_trait]
pub trait RouteStore: Send + Sync {
    /// All declared routes.
    async fn routes(&self) -> Result<Vec<Route>, RouteStoreError>;

    /// The route for a domain, if declared.
    async fn route(&self, domain: &Domain) -> Result<Option<Route>, RouteStoreError>;

    /// Routes whose image matches the given reference. Both sides are
    /// canonicalized against the configured registry domain before comparing.
    async fn find_by_image(&self, reference: &str) -> Result<Vec<Route>, RouteStoreError>;

    /// Declare a new route.
    async fn add_route(&self, route: Route) -> Result<(), RouteStoreError>;

    /// Point an existing route at a different image.
    async fn update_route(&self, domain: &Domain, image: String) -> Result<(), RouteStoreError>;

    /// Whether pushed images may create routes from their labels.
    fn auto_route_enabled(&self) -> bool;
}

/// The registry prefix used to normalize image references for matching.
/// Only relevant when registry auth is on, mirroring canonicalization at pull.
fn registry_domain_for_matching(registry: &RegistrySettings) -> Option<String> {
    if registry.auth_enabled {
        registry.domain_trimmed().map(str::to_string)
    } else {
        None
    }
}

/// Route store backed by a YAML file (a `domain: image` map).
///
/// Seeded from the settings file at startup; auto-route upserts are written
/// back so they survive restarts.
pub struct FileRouteStore {
    path: Option<PathBuf>,
    routes: RwLock<HashMap<Domain, String>>,
    registry_domain: Option<String>,
    auto_route: bool,
}

impl FileRouteStore {
    pub fn new(seed: HashMap<Domain, String>, registry: &RegistrySettings, auto_route: bool) -> Self {
        Self {
            path: None,
            routes: RwLock::new(seed),
            registry_domain: registry_domain_for_matching(registry),
            auto_route,
        }
    }

    /// Load routes from `path`, layered over the seed map (file wins), and
    /// remember the path for write-back.
    pub fn load(
        path: PathBuf,
        seed: HashMap<Domain, String>,
        registry: &RegistrySettings,
        auto_route: bool,
    ) -> Result<Self, RouteStoreError> {
        let mut routes = seed;

        match std::fs::read_to_string(&path) {
            Ok(content) => {
                let persisted: HashMap<Domain, String> = serde_yaml::from_str(&content)?;
                routes.extend(persisted);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(RouteStoreError::Io { path, source: e }),
        }

        Ok(Self {
            path: Some(path),
            routes: RwLock::new(routes),
            registry_domain: registry_domain_for_matching(registry),
            auto_route,
        })
    }

    /// Re-layer persisted routes over a fresh seed, e.g. after a settings
    /// file reload. Auto-route upserts in the write-back file survive.
    pub fn reload(&self, seed: HashMap<Domain, String>) -> Result<(), RouteStoreError> {
        let mut routes = seed;

        if let Some(path) = &self.path {
            match std::fs::read_to_string(path) {
                Ok(content) => {
                    let persisted: HashMap<Domain, String> = serde_yaml::from_str(&content)?;
                    routes.extend(persisted);
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(RouteStoreError::Io {
                        path: path.clone(),
                        source: e,
                    });
                }
            }
        }

        *self.routes.write() = routes;
        Ok(())
    }

    fn canonical(&self, reference: &str) -> String {
        let prefixed = match &self.registry_domain {
            Some(domain) if !types::has_explicit_registry(reference) => {
                format!("{domain}/{reference}")
            }
            _ => reference.to_string(),
        };
        types::normalize_for_match(&prefixed)
    }

    async fn persist(&self) -> Result<(), RouteStoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let snapshot: HashMap<String, String> = {
            let routes = self.routes.read();
            routes
                .iter()
                .map(|(d, i)| (d.to_string(), i.clone()))
                .collect()
        };

        let yaml = serde_yaml::to_string(&snapshot)?;
        tokio::fs::write(path, yaml)
            .await
            .map_err(|e| RouteStoreError::Io {
                path: path.clone(),
                source: e,
            })
    }
}

#[async_trait]
impl RouteStore for FileRouteStore {
    async fn routes(&self) -> Result<Vec<Route>, RouteStoreError> {
        let routes = self.routes.read();
        Ok(routes
            .iter()
            .map(|(domain, image)| Route {
                domain: domain.clone(),
                image: image.clone(),
            })
            .collect())
    }

    async fn route(&self, domain: &Domain) -> Result<Option<Route>, RouteStoreError> {
        let routes = self.routes.read();
        Ok(routes.get(domain).map(|image| Route {
            domain: domain.clone(),
            image: image.clone(),
        }))
    }

    async fn find_by_image(&self, reference: &str) -> Result<Vec<Route>, RouteStoreError> {
        let wanted = self.canonical(reference);
        let routes = self.routes.read();
        Ok(routes
            .iter()
            .filter(|(_, image)| self.canonical(image) == wanted)
            .map(|(domain, image)| Route {
                domain: domain.clone(),
                image: image.clone(),
            })
            .collect())
    }

    async fn add_route(&self, route: Route) -> Result<(), RouteStoreError> {
        {
            let mut routes = self.routes.write();
            routes.insert(route.domain, route.image);
        }
        self.persist().await
    }

    async fn update_route(&self, domain: &Domain, image: String) -> Result<(), RouteStoreError> {
        {
            let mut routes = self.routes.write();
            routes.insert(domain.clone(), image);
        }
        self.persist().await
    }

    fn auto_route_enabled(&self) -> bool {
        self.auto_route
    }
}
