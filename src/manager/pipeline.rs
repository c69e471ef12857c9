// ABOUTME: The deploy pipeline: zero-downtime replacement of a domain's container.
// ABOUTME: Also restart/stop/remove and orphan cleanup around the tracked id.

use crate::config::Settings;
use crate::events::Event;
use crate::labels;
use crate::manager::error::{ContainerErrorExt, DeployError};
use crate::manager::{planner, resolver, Container, ContainerManager, DeployOrigin};
use crate::routes::Route;
use crate::runtime::{ContainerFilters, ContainerSpec};
use crate::types::{ContainerId, Domain};
use chrono::Utc;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const STOP_TIMEOUT: Duration = Duration::from_secs(10);
const RESTART_TIMEOUT: Duration = Duration::from_secs(10);
const READINESS_POLL: Duration = Duration::from_secs(1);
const READINESS_TIMEOUT: Duration = Duration::from_secs(30);
const RECOVERY_WINDOW: Duration = Duration::from_secs(30);

/// Canonical container name for a domain.
pub(crate) fn canonical_name(domain: &Domain) -> String {
    format!("gordon-{domain}")
}

/// Pick the name for the replacement container. Alternating `-new`/`-next`
/// suffixes keep names collision-free even when a restart interrupts a deploy
/// before the final rename.
pub(crate) fn next_container_name(existing: Option<&str>, domain: &Domain) -> String {
    let canonical = canonical_name(domain);
    match existing {
        None => canonical,
        Some(name) if name.ends_with("-new") => format!("{canonical}-next"),
        Some(name) if name.ends_with("-next") => format!("{canonical}-new"),
        Some(_) => format!("{canonical}-new"),
    }
}

/// Sleep unless cancelled first. Returns false when interrupted.
async fn sleep_cancellable(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        _ = cancel.cancelled() => false,
    }
}

impl ContainerManager {
    /// Deploy (or replace) the container serving a route.
    ///
    /// Holds the domain's deploy lock for the whole pipeline. Tracking points
    /// at the old container until the new one is ready; the swap, proxy cache
    /// invalidation, and old-container stop happen strictly in that order so
    /// some container serves the domain at every instant.
    ///
    /// # Errors
    ///
    /// Pull, network, attachment, create, start, and readiness failures are
    /// fatal and leave tracking untouched. Failures after the swap are logged
    /// but not returned.
    pub async fn deploy(
        &self,
        route: &Route,
        origin: DeployOrigin,
        cancel: &CancellationToken,
    ) -> Result<Container, DeployError> {
        let _guard = self.locks.acquire(route.domain.as_str(), cancel).await?;

        let settings = self.config();
        let existing = self.get(&route.domain);

        self.cleanup_orphans(&route.domain, existing.as_ref().map(|c| &c.id))
            .await?;

        let actual_ref = resolver::ensure_image(
            self.runtime.as_ref(),
            &settings,
            &route.image,
            origin,
            cancel,
        )
        .await?;

        let network =
            planner::ensure_network(self.runtime.as_ref(), &settings, &route.domain).await?;

        self.deploy_attachments(&route.domain, network.as_deref(), cancel)
            .await?;

        let exposed_ports = planner::exposed_ports(self.runtime.as_ref(), &actual_ref).await;
        let env = planner::merged_env(
            self.runtime.as_ref(),
            self.env_loader.as_ref(),
            &route.domain,
            &actual_ref,
        )
        .await?;
        let volumes =
            planner::plan_volumes(self.runtime.as_ref(), &settings, &route.domain, &actual_ref)
                .await?;

        let name = next_container_name(existing.as_ref().map(|c| c.name.as_str()), &route.domain);

        let mut container_labels = HashMap::new();
        container_labels.insert(labels::MANAGED.to_string(), "true".to_string());
        container_labels.insert(labels::DOMAIN.to_string(), route.domain.to_string());
        container_labels.insert(labels::IMAGE.to_string(), route.image.clone());
        container_labels.insert(labels::ROUTE.to_string(), route.domain.to_string());

        let spec = ContainerSpec {
            name: name.clone(),
            image: actual_ref.clone(),
            hostname: Some(route.domain.to_string()),
            env,
            labels: container_labels,
            exposed_ports,
            volumes,
            network: network.clone(),
        };

        tracing::info!(domain = %route.domain, container = %name, image = %actual_ref, "creating container");
        let id = self
            .runtime
            .create_container(&spec)
            .await
            .context_container_create()?;

        if let Err(e) = self.runtime.start_container(&id).await {
            let _ = self.runtime.remove_container(&id, true).await;
            return Err(DeployError::container_start_failed(e.to_string()));
        }

        if let Err(e) = self.wait_ready(&route.domain, &id, &settings, cancel).await {
            let _ = self.runtime.stop_container(&id, STOP_TIMEOUT).await;
            let _ = self.runtime.remove_container(&id, true).await;
            return Err(e);
        }

        // Capture runtime-assigned ports and status.
        let info = self
            .runtime
            .inspect_container(&id)
            .await
            .map_err(|e| DeployError::runtime_error(format!("inspect after start: {e}")))?;
        let image_id = self.runtime.image_id(&actual_ref).await.ok();

        let mut container = Container {
            id: id.clone(),
            name: info.name,
            image: actual_ref,
            image_id,
            state: info.state,
            exit_code: info.exit_code,
            ports: info.ports,
            labels: info.labels,
            network: info.networks.into_iter().next().or(network),
        };

        // The atomic swap: from here on the domain resolves to the new container.
        self.track(route.domain.clone(), container.clone());

        if let Some(publisher) = self.event_publisher() {
            let event = Event::ContainerDeployed {
                container_id: id.clone(),
                domain: route.domain.clone(),
                at: Utc::now(),
            };
            if let Err(e) = publisher.publish(event).await {
                tracing::warn!(domain = %route.domain, error = %e, "failed to publish deploy event");
            }
        }

        // Synchronous: the proxy's next request must target the new container.
        if let Some(proxy) = self.proxy_invalidator() {
            proxy.invalidate_target(&route.domain).await;
        }

        if let Some(old) = &existing {
            // Let requests already dispatched to the old container finish.
            if !sleep_cancellable(settings.drain_delay, cancel).await {
                tracing::debug!(domain = %route.domain, "drain delay interrupted");
            }

            self.logs.stop(&old.id);
            if let Err(e) = self.runtime.stop_container(&old.id, STOP_TIMEOUT).await {
                tracing::warn!(container = %old.id, error = %e, "failed to stop old container");
            }
            if let Err(e) = self.runtime.remove_container(&old.id, true).await {
                tracing::warn!(container = %old.id, error = %e, "failed to remove old container");
            }
        }

        let canonical = canonical_name(&route.domain);
        if container.name != canonical {
            match self.runtime.rename_container(&id, &canonical).await {
                Ok(()) => {
                    container.name = canonical;
                    self.track(route.domain.clone(), container.clone());
                }
                Err(e) => {
                    tracing::warn!(container = %id, error = %e, "failed to rename new container");
                }
            }
        }

        self.logs
            .start(self.runtime.clone(), id, route.domain.clone());

        tracing::info!(domain = %route.domain, container = %container.id, "deploy complete");
        Ok(container)
    }

    /// Remove debris from interrupted deploys: any container whose name is the
    /// canonical or a temporary name for this domain but whose id is not the
    /// tracked one. `skip_id` is the single line between a zero-downtime
    /// replacement and an outage; never infer it from map state here.
    pub(crate) async fn cleanup_orphans(
        &self,
        domain: &Domain,
        skip_id: Option<&ContainerId>,
    ) -> Result<(), DeployError> {
        let canonical = canonical_name(domain);
        let candidates = [
            canonical.clone(),
            format!("{canonical}-new"),
            format!("{canonical}-next"),
        ];

        let all = self
            .runtime
            .list_containers(&ContainerFilters::everything())
            .await
            .map_err(|e| DeployError::runtime_error(format!("orphan scan failed: {e}")))?;

        for summary in all {
            if !candidates.contains(&summary.name) {
                continue;
            }
            if Some(&summary.id) == skip_id {
                continue;
            }

            tracing::warn!(container = %summary.name, id = %summary.id, "removing orphan container");
            let _ = self.runtime.stop_container(&summary.id, STOP_TIMEOUT).await;
            if let Err(e) = self.runtime.remove_container(&summary.id, true).await {
                tracing::warn!(container = %summary.id, error = %e, "orphan remove failed");
            }
        }

        Ok(())
    }

    /// Wait until the new container is running and has survived the readiness
    /// delay, tolerating one transient flap inside a recovery window.
    async fn wait_ready(
        &self,
        domain: &Domain,
        id: &ContainerId,
        settings: &Settings,
        cancel: &CancellationToken,
    ) -> Result<(), DeployError> {
        let deadline = Instant::now() + READINESS_TIMEOUT;
        loop {
            if self.runtime.is_container_running(id).await.unwrap_or(false) {
                break;
            }
            if Instant::now() >= deadline {
                break;
            }
            if !sleep_cancellable(READINESS_POLL, cancel).await {
                return Err(DeployError::cancelled(format!("waiting for {domain}")));
            }
        }

        if !sleep_cancellable(settings.readiness_delay, cancel).await {
            return Err(DeployError::cancelled(format!("readiness delay for {domain}")));
        }

        if self.runtime.is_container_running(id).await.unwrap_or(false) {
            return Ok(());
        }

        // The container may be flapping; give it a recovery window.
        tracing::warn!(domain = %domain, container = %id, "container not running after readiness delay, entering recovery window");
        let deadline = Instant::now() + RECOVERY_WINDOW;
        while Instant::now() < deadline {
            if !sleep_cancellable(READINESS_POLL, cancel).await {
                return Err(DeployError::cancelled(format!("recovery wait for {domain}")));
            }
            if self.runtime.is_container_running(id).await.unwrap_or(false) {
                return Ok(());
            }
        }

        Err(DeployError::readiness_timeout(
            domain.as_str(),
            (READINESS_TIMEOUT + settings.readiness_delay + RECOVERY_WINDOW).as_secs(),
        ))
    }

    /// Restart a domain's container, refreshing tracking once if the runtime
    /// no longer knows the tracked id.
    pub async fn restart(&self, domain: &Domain, with_attachments: bool) -> Result<(), DeployError> {
        let tracked = match self.get(domain) {
            Some(tracked) => tracked,
            None => {
                self.sync().await?;
                self.get(domain)
                    .ok_or_else(|| DeployError::container_not_found(domain.as_str()))?
            }
        };

        match self
            .runtime
            .restart_container(&tracked.id, RESTART_TIMEOUT)
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                // The container may have been replaced under us; resync and retry once.
                self.sync().await?;
                let fresh = self
                    .get(domain)
                    .ok_or_else(|| DeployError::container_not_found(domain.as_str()))?;
                self.runtime
                    .restart_container(&fresh.id, RESTART_TIMEOUT)
                    .await
                    .map_err(|e| {
                        if e.is_not_found() {
                            DeployError::container_not_found(domain.as_str())
                        } else {
                            DeployError::runtime_error(e.to_string())
                        }
                    })?;
            }
            Err(e) => return Err(DeployError::runtime_error(e.to_string())),
        }

        if with_attachments {
            for id in self.attachment_ids(domain) {
                if let Err(e) = self.runtime.restart_container(&id, RESTART_TIMEOUT).await {
                    tracing::warn!(container = %id, error = %e, "attachment restart failed");
                }
            }
        }

        Ok(())
    }

    /// Stop a container, ending its log collection first.
    pub async fn stop(&self, id: &ContainerId) -> Result<(), DeployError> {
        self.logs.stop(id);
        self.runtime
            .stop_container(id, STOP_TIMEOUT)
            .await
            .context_container_stop()
    }

    /// Remove a container and everything that belongs to its domain:
    /// attachments, tracking entries, auto-created volumes (unless preserved),
    /// and its network when isolation is on and nothing else uses it.
    /// The per-domain lock entry is deliberately retained.
    pub async fn remove(&self, id: &ContainerId, force: bool) -> Result<(), DeployError> {
        self.logs.stop(id);

        let domain = self
            .tracked()
            .into_iter()
            .find(|(_, c)| &c.id == id)
            .map(|(d, _)| d);
        let attachment_ids = domain
            .as_ref()
            .map(|d| self.attachment_ids(d))
            .unwrap_or_default();

        self.runtime
            .remove_container(id, force)
            .await
            .context_container_remove()?;

        for attachment in &attachment_ids {
            let _ = self.runtime.stop_container(attachment, STOP_TIMEOUT).await;
            if let Err(e) = self.runtime.remove_container(attachment, true).await {
                tracing::warn!(container = %attachment, error = %e, "attachment remove failed");
            }
        }

        let Some(domain) = domain else {
            return Ok(());
        };

        let settings = self.config();

        if !settings.volumes.preserve {
            self.cleanup_volumes(&settings, &domain).await;
        }

        self.untrack(&domain);
        self.untrack_attachments(&domain);

        if settings.network.isolation {
            self.cleanup_network_if_empty(&settings, &domain).await;
        }

        Ok(())
    }

    async fn cleanup_volumes(&self, settings: &Settings, domain: &Domain) {
        let prefix = format!("{}-{}-", settings.volumes.prefix, domain.sanitized());
        let volumes = match self.runtime.list_volumes().await {
            Ok(volumes) => volumes,
            Err(e) => {
                tracing::warn!(error = %e, "volume cleanup skipped, list failed");
                return;
            }
        };

        for volume in volumes.iter().filter(|v| v.starts_with(&prefix)) {
            if let Err(e) = self.runtime.remove_volume(volume).await {
                tracing::warn!(volume = %volume, error = %e, "volume remove failed");
            }
        }
    }

    async fn cleanup_network_if_empty(&self, settings: &Settings, domain: &Domain) {
        let Some(name) = planner::network_name(settings, domain) else {
            return;
        };

        let in_use = match self
            .runtime
            .list_containers(&ContainerFilters::everything())
            .await
        {
            Ok(containers) => containers
                .iter()
                .any(|c| c.networks.iter().any(|n| n == &name)),
            Err(e) => {
                tracing::warn!(error = %e, "network cleanup skipped, list failed");
                return;
            }
        };

        if in_use {
            return;
        }

        match self.runtime.remove_network(&name).await {
            Ok(()) => tracing::info!(network = %name, "removed empty network"),
            Err(e) => tracing::warn!(network = %name, error = %e, "network remove failed"),
        }
    }
}
