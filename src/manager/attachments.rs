// ABOUTME: Attachment (side-car) deployment for a domain: databases, caches.
// ABOUTME: Idempotent per container, with rollback of this attempt on failure.

use crate::config::Settings;
use crate::labels;
use crate::manager::error::{ContainerErrorExt, DeployError};
use crate::manager::{planner, resolver, ContainerManager, DeployOrigin};
use crate::runtime::{ContainerFilters, ContainerSpec};
use crate::types::{ContainerId, Domain, ImageRef};
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const ATTACHMENT_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// The attachment images declared for a domain: its own list plus its network
/// group's, deduplicated preserving first-seen order.
pub(crate) fn attachment_images(settings: &Settings, domain: &Domain) -> Vec<String> {
    let mut images = Vec::new();

    let mut push_all = |key: &str| {
        if let Some(declared) = settings.attachments.get(key) {
            for image in declared {
                if !images.contains(image) {
                    images.push(image.clone());
                }
            }
        }
    };

    push_all(domain.as_str());
    if let Some(group) = settings.group_of(domain) {
        push_all(group);
    }

    images
}

pub(crate) fn attachment_name(owner: &Domain, service: &str) -> String {
    format!("gordon-{}-{}", owner.sanitized(), service)
}

fn legacy_attachment_name(owner: &Domain, service: &str) -> String {
    format!("gordon-{}-{}", owner.sanitized_legacy(), service)
}

struct AttachmentOutcome {
    id: ContainerId,
    created: bool,
}

impl ContainerManager {
    /// Deploy every declared attachment for `domain` onto `network`.
    ///
    /// All-or-nothing per attempt: a failure stops and removes the attachments
    /// this call created, deregisters them, and surfaces an `Attachment` error
    /// so the main deploy aborts before creating its container.
    pub(crate) async fn deploy_attachments(
        &self,
        domain: &Domain,
        network: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<(), DeployError> {
        let settings = self.config();
        let images = attachment_images(&settings, domain);
        if images.is_empty() {
            return Ok(());
        }

        let mut deployed_this_call: Vec<ContainerId> = Vec::new();

        for image in &images {
            match self
                .deploy_attachment(&settings, domain, image, network, cancel)
                .await
            {
                Ok(outcome) => {
                    if !self.attachment_ids(domain).contains(&outcome.id) {
                        self.track_attachment(domain, outcome.id.clone());
                    }
                    if outcome.created {
                        deployed_this_call.push(outcome.id);
                    }
                }
                Err(e) => {
                    tracing::error!(
                        domain = %domain,
                        image = %image,
                        error = %e,
                        "attachment deploy failed, rolling back this attempt"
                    );
                    self.rollback_attachments(domain, &deployed_this_call).await;
                    return Err(DeployError::attachment_failed(
                        domain.as_str(),
                        image.as_str(),
                        e.to_string(),
                    ));
                }
            }
        }

        Ok(())
    }

    async fn deploy_attachment(
        &self,
        settings: &Settings,
        owner: &Domain,
        image: &str,
        network: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<AttachmentOutcome, DeployError> {
        let parsed = ImageRef::parse(image).map_err(|e| {
            DeployError::config_error(format!("invalid attachment image '{image}': {e}"))
        })?;
        let service = parsed.service_name();
        let name = attachment_name(owner, &service);
        let legacy_name = legacy_attachment_name(owner, &service);

        let existing = self
            .runtime
            .list_containers(&ContainerFilters::everything())
            .await
            .context_container_create()?;

        // One-release migration: adopt containers created under the legacy
        // domain sanitization by recreating them under the new name.
        if legacy_name != name
            && let Some(legacy) = existing.iter().find(|c| c.name == legacy_name)
        {
            tracing::info!(container = %legacy_name, "migrating legacy attachment container");
            let _ = self
                .runtime
                .stop_container(&legacy.id, ATTACHMENT_STOP_TIMEOUT)
                .await;
            self.runtime
                .remove_container(&legacy.id, true)
                .await
                .context_container_remove()?;
        }

        if let Some(current) = existing.iter().find(|c| c.name == name) {
            if current.state == "running" {
                tracing::debug!(container = %name, "attachment already running");
                return Ok(AttachmentOutcome {
                    id: current.id.clone(),
                    created: false,
                });
            }
            tracing::info!(container = %name, "recreating stopped attachment");
            self.runtime
                .remove_container(&current.id, true)
                .await
                .context_container_remove()?;
        }

        let actual_ref = resolver::ensure_image(
            self.runtime.as_ref(),
            settings,
            image,
            DeployOrigin::External,
            cancel,
        )
        .await?;

        let exposed_ports = planner::exposed_ports(self.runtime.as_ref(), &actual_ref).await;
        let env =
            planner::merged_env(self.runtime.as_ref(), self.env_loader.as_ref(), owner, &actual_ref)
                .await?;
        let volumes =
            planner::plan_volumes(self.runtime.as_ref(), settings, owner, &actual_ref).await?;

        let mut attachment_labels = HashMap::new();
        attachment_labels.insert(labels::MANAGED.to_string(), "true".to_string());
        attachment_labels.insert(labels::ATTACHMENT.to_string(), "true".to_string());
        attachment_labels.insert(labels::ATTACHED_TO.to_string(), owner.to_string());
        attachment_labels.insert(labels::IMAGE.to_string(), image.to_string());

        let spec = ContainerSpec {
            name: name.clone(),
            image: actual_ref,
            // Peers reach the attachment by its service name: postgres, redis, ...
            hostname: Some(service.clone()),
            env,
            labels: attachment_labels,
            exposed_ports,
            volumes,
            network: network.map(str::to_string),
        };

        let id = self
            .runtime
            .create_container(&spec)
            .await
            .context_container_create()?;

        if let Err(e) = self.runtime.start_container(&id).await {
            let _ = self.runtime.remove_container(&id, true).await;
            return Err(DeployError::container_start_failed(e.to_string()));
        }

        tracing::info!(container = %name, owner = %owner, "attachment deployed");
        Ok(AttachmentOutcome { id, created: true })
    }

    /// Stop, remove, and deregister the given attachment containers.
    pub(crate) async fn rollback_attachments(&self, domain: &Domain, ids: &[ContainerId]) {
        for id in ids {
            let _ = self
                .runtime
                .stop_container(id, ATTACHMENT_STOP_TIMEOUT)
                .await;
            if let Err(e) = self.runtime.remove_container(id, true).await {
                tracing::warn!(container = %id, error = %e, "attachment rollback remove failed");
            }
            self.untrack_attachment(domain, id);
        }
    }
}
