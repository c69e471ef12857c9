// ABOUTME: Event handlers fanning external stimuli into pipeline operations.
// ABOUTME: Image-pushed, config-reload, manual-reload, and manual-deploy.

use crate::events::{Event, EventHandler, EventKind, HandlerError};
use crate::manager::{AutoRouteResolver, Container, ContainerManager, DeployError, DeployOrigin};
use crate::routes::{Route, RouteStore};
use crate::types::Domain;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Reacts to manifest uploads on the embedded registry: resolves auto-routes
/// from image labels, then redeploys every route already pointing at the
/// pushed image. Individual deploy failures are logged so one broken route
/// does not block the others.
pub struct ImagePushedHandler {
    manager: Arc<ContainerManager>,
    store: Arc<dyn RouteStore>,
    autoroute: Option<Arc<AutoRouteResolver>>,
}

impl ImagePushedHandler {
    pub fn new(
        manager: Arc<ContainerManager>,
        store: Arc<dyn RouteStore>,
        autoroute: Option<Arc<AutoRouteResolver>>,
    ) -> Self {
        Self {
            manager,
            store,
            autoroute,
        }
    }
}

#[async_trait]
impl EventHandler for ImagePushedHandler {
    fn name(&self) -> &'static str {
        "image-pushed"
    }

    fn can_handle(&self, kind: EventKind) -> bool {
        kind == EventKind::ImagePushed
    }

    async fn handle(&self, event: Event, cancel: CancellationToken) -> Result<(), HandlerError> {
        let Event::ImagePushed {
            name,
            reference,
            manifest,
        } = event
        else {
            return Ok(());
        };

        let tag = if reference.is_empty() {
            "latest"
        } else {
            reference.as_str()
        };
        let full_image_name = format!("{name}:{tag}");
        tracing::info!(image = %full_image_name, "image pushed");

        // Auto-route first so label-declared domains exist before matching.
        let mut already_deployed: HashSet<Domain> = HashSet::new();
        if self.store.auto_route_enabled()
            && let Some(autoroute) = &self.autoroute
        {
            match autoroute
                .process_push(&name, &reference, &manifest, &cancel)
                .await
            {
                Ok(domains) => already_deployed.extend(domains),
                Err(e) => {
                    tracing::warn!(image = %full_image_name, error = %e, "auto-route resolution failed");
                }
            }
        }

        let matches = self.store.find_by_image(&full_image_name).await?;
        let remaining: Vec<Route> = matches
            .into_iter()
            .filter(|route| !already_deployed.contains(&route.domain))
            .collect();

        // Fan out across routes; deploys for distinct domains run concurrently.
        let mut tasks = Vec::with_capacity(remaining.len());
        for route in remaining {
            let manager = Arc::clone(&self.manager);
            let cancel = cancel.clone();
            tasks.push(tokio::spawn(async move {
                if let Err(e) = manager
                    .deploy(&route, DeployOrigin::Internal, &cancel)
                    .await
                {
                    tracing::error!(domain = %route.domain, error = %e, "push-triggered deploy failed");
                }
            }));
        }
        for task in tasks {
            let _ = task.await;
        }

        Ok(())
    }
}

/// Reconciles the running fleet against the configured route list after a
/// configuration reload.
pub struct ConfigReloadHandler {
    manager: Arc<ContainerManager>,
    store: Arc<dyn RouteStore>,
}

impl ConfigReloadHandler {
    pub fn new(manager: Arc<ContainerManager>, store: Arc<dyn RouteStore>) -> Self {
        Self { manager, store }
    }
}

#[async_trait]
impl EventHandler for ConfigReloadHandler {
    fn name(&self) -> &'static str {
        "config-reload"
    }

    fn can_handle(&self, kind: EventKind) -> bool {
        kind == EventKind::ConfigReload
    }

    async fn handle(&self, _event: Event, cancel: CancellationToken) -> Result<(), HandlerError> {
        self.manager.sync().await?;

        let mut active: HashMap<Domain, Container> = self
            .manager
            .tracked()
            .into_iter()
            .filter(|(_, container)| container.domain_label().is_some())
            .collect();

        for route in self.store.routes().await? {
            match active.remove(&route.domain) {
                Some(container) => {
                    let current_image = container.image_label().unwrap_or_default();
                    if current_image != route.image {
                        tracing::info!(
                            domain = %route.domain,
                            from = %current_image,
                            to = %route.image,
                            "route image changed, redeploying"
                        );
                        if let Err(e) = self
                            .manager
                            .deploy(&route, DeployOrigin::External, &cancel)
                            .await
                        {
                            tracing::error!(domain = %route.domain, error = %e, "redeploy failed");
                        }
                    }
                }
                None => {
                    tracing::info!(domain = %route.domain, "new route, deploying");
                    if let Err(e) = self
                        .manager
                        .deploy(&route, DeployOrigin::External, &cancel)
                        .await
                    {
                        tracing::error!(domain = %route.domain, error = %e, "deploy failed");
                    }
                }
            }
        }

        // Whatever is left no longer has a route: tear it down.
        for (domain, container) in active {
            tracing::info!(domain = %domain, container = %container.id, "route removed, stopping container");
            if let Err(e) = self.manager.stop(&container.id).await {
                tracing::warn!(container = %container.id, error = %e, "stop failed");
            }
            if let Err(e) = self.manager.remove(&container.id, true).await {
                tracing::warn!(container = %container.id, error = %e, "remove failed");
            }
        }

        Ok(())
    }
}

/// Deploys missing routes without ever touching a healthy container.
pub struct ManualReloadHandler {
    manager: Arc<ContainerManager>,
    store: Arc<dyn RouteStore>,
}

impl ManualReloadHandler {
    pub fn new(manager: Arc<ContainerManager>, store: Arc<dyn RouteStore>) -> Self {
        Self { manager, store }
    }
}

#[async_trait]
impl EventHandler for ManualReloadHandler {
    fn name(&self) -> &'static str {
        "manual-reload"
    }

    fn can_handle(&self, kind: EventKind) -> bool {
        kind == EventKind::ManualReload
    }

    async fn handle(&self, _event: Event, cancel: CancellationToken) -> Result<(), HandlerError> {
        self.manager.sync().await?;

        let routes = self.store.routes().await?;
        let total = routes.len();
        let mut failed = 0;

        for route in routes {
            if self.manager.get(&route.domain).is_some() {
                tracing::debug!(domain = %route.domain, "already running, skipping");
                continue;
            }

            if let Err(e) = self
                .manager
                .deploy(&route, DeployOrigin::External, &cancel)
                .await
            {
                tracing::error!(domain = %route.domain, error = %e, "reload deploy failed");
                failed += 1;
            }
        }

        if failed > 0 {
            return Err(HandlerError::Partial { failed, total });
        }
        Ok(())
    }
}

/// Deploys one domain on operator request.
pub struct ManualDeployHandler {
    manager: Arc<ContainerManager>,
    store: Arc<dyn RouteStore>,
}

impl ManualDeployHandler {
    pub fn new(manager: Arc<ContainerManager>, store: Arc<dyn RouteStore>) -> Self {
        Self { manager, store }
    }
}

#[async_trait]
impl EventHandler for ManualDeployHandler {
    fn name(&self) -> &'static str {
        "manual-deploy"
    }

    fn can_handle(&self, kind: EventKind) -> bool {
        kind == EventKind::ManualDeploy
    }

    async fn handle(&self, event: Event, cancel: CancellationToken) -> Result<(), HandlerError> {
        let Event::ManualDeploy { domain } = event else {
            return Ok(());
        };

        let route = self
            .store
            .route(&domain)
            .await?
            .ok_or_else(|| DeployError::route_not_found(domain.as_str()))?;

        self.manager
            .deploy(&route, DeployOrigin::Internal, &cancel)
            .await?;
        Ok(())
    }
}
