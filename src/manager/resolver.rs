// ABOUTME: Image reference canonicalization and pull strategy.
// ABOUTME: Internal deploys pull via localhost and retag to the canonical ref.

use crate::config::{PullPolicy, Settings};
use crate::manager::error::{DeployError, ImageErrorExt};
use crate::manager::DeployOrigin;
use crate::runtime::{RegistryAuth, Runtime};
use crate::types::{has_explicit_registry, is_digest_ref, refs_match};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const INTERNAL_PULL_ATTEMPTS: u32 = 3;

/// Canonical reference for storage and container creation: prefix the
/// configured registry domain when auth is on and the user wrote a bare
/// reference. Idempotent, and the identity for explicit-registry references.
pub fn build_image_ref(user_ref: &str, settings: &Settings) -> String {
    if settings.registry.auth_enabled
        && let Some(domain) = settings.registry.domain_trimmed()
        && !has_explicit_registry(user_ref)
    {
        return format!("{domain}/{user_ref}");
    }
    user_ref.to_string()
}

/// Pull reference for internal deploys: the same image path addressed through
/// the embedded registry's local port. Strips any prior `localhost:<port>/`
/// or configured-domain prefix to avoid double-prefixing.
pub fn build_pull_ref(reference: &str, settings: &Settings) -> String {
    let mut path = strip_localhost_prefix(reference);

    if let Some(domain) = settings.registry.domain_trimmed()
        && let Some(rest) = path.strip_prefix(&format!("{domain}/"))
    {
        path = rest;
    }

    format!("localhost:{}/{}", settings.registry.port, path)
}

fn strip_localhost_prefix(reference: &str) -> &str {
    if let Some(rest) = reference.strip_prefix("localhost:")
        && let Some((port, path)) = rest.split_once('/')
        && port.chars().all(|c| c.is_ascii_digit())
    {
        return path;
    }
    reference
}

/// Make sure the image for `user_ref` is present locally and return the
/// reference downstream steps should use.
///
/// # Errors
///
/// Returns an `ImagePull` kind on any unrecoverable pull failure, and a
/// `Config` kind when required credentials are missing.
pub async fn ensure_image(
    runtime: &dyn Runtime,
    settings: &Settings,
    user_ref: &str,
    origin: DeployOrigin,
    cancel: &CancellationToken,
) -> Result<String, DeployError> {
    let canonical = build_image_ref(user_ref, settings);
    let pull_ref = if origin.is_internal() {
        build_pull_ref(&canonical, settings)
    } else {
        canonical.clone()
    };

    if !must_pull(&canonical, origin, settings.pull_policy) {
        if let Some(found) = find_local(runtime, &canonical, &pull_ref).await {
            // Present already; a pull-ref-only hit is retagged to the
            // canonical name so create and presence checks agree.
            if found == LocalMatch::PullRefOnly && !is_digest_ref(&canonical) {
                runtime
                    .tag_image(&pull_ref, &canonical)
                    .await
                    .context_image_pull()?;
            }
            tracing::debug!(image = %canonical, "image already present, skipping pull");
            return Ok(canonical);
        }
    }

    let auth = pull_credentials(settings, origin)?;
    pull_with_retry(runtime, &pull_ref, auth.as_ref(), origin, cancel).await?;

    // Digests cannot be retagged; downstream keeps the pull reference.
    if is_digest_ref(&pull_ref) {
        return Ok(pull_ref);
    }

    if pull_ref != canonical {
        runtime
            .tag_image(&pull_ref, &canonical)
            .await
            .context_image_pull()?;
        if let Err(e) = runtime.untag_image(&pull_ref).await {
            tracing::warn!(image = %pull_ref, error = %e, "failed to untag pull reference");
        }
    }

    Ok(canonical)
}

fn must_pull(canonical: &str, origin: DeployOrigin, policy: PullPolicy) -> bool {
    if origin.is_internal() {
        // The tag may point at new content in the embedded registry.
        return true;
    }
    match policy {
        PullPolicy::Always => true,
        PullPolicy::IfTagChanged => !is_digest_ref(canonical),
        PullPolicy::IfNotPresent => false,
    }
}

#[derive(Debug, PartialEq, Eq)]
enum LocalMatch {
    Canonical,
    PullRefOnly,
}

async fn find_local(
    runtime: &dyn Runtime,
    canonical: &str,
    pull_ref: &str,
) -> Option<LocalMatch> {
    let images = match runtime.list_images().await {
        Ok(images) => images,
        Err(e) => {
            tracing::warn!(error = %e, "failed to list local images, pulling instead");
            return None;
        }
    };

    let mut pull_ref_hit = false;
    for image in &images {
        for tag in &image.repo_tags {
            if refs_match(tag, canonical) {
                return Some(LocalMatch::Canonical);
            }
            if refs_match(tag, pull_ref) {
                pull_ref_hit = true;
            }
        }
    }

    pull_ref_hit.then_some(LocalMatch::PullRefOnly)
}

fn pull_credentials(
    settings: &Settings,
    origin: DeployOrigin,
) -> Result<Option<RegistryAuth>, DeployError> {
    if !settings.registry.auth_enabled {
        return Ok(None);
    }

    if origin.is_internal() {
        let (Some(username), Some(password)) = (
            settings.registry.internal_username.clone(),
            settings.registry.internal_password.clone(),
        ) else {
            return Err(DeployError::config_error(
                "internal registry credentials required for internal deploys",
            ));
        };
        return Ok(Some(RegistryAuth {
            username,
            password,
            server: None,
        }));
    }

    let (Some(username), Some(password)) = (
        settings.registry.service_token_username.clone(),
        settings.registry.service_token.clone(),
    ) else {
        return Err(DeployError::config_error(
            "service token credentials required when registry auth is enabled",
        ));
    };
    Ok(Some(RegistryAuth {
        username,
        password,
        server: settings.registry.domain_trimmed().map(str::to_string),
    }))
}

/// Pull, retrying refused connections for internal deploys: the embedded
/// registry may still be coming up when a push event arrives.
async fn pull_with_retry(
    runtime: &dyn Runtime,
    reference: &str,
    auth: Option<&RegistryAuth>,
    origin: DeployOrigin,
    cancel: &CancellationToken,
) -> Result<(), DeployError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match runtime.pull_image(reference, auth).await {
            Ok(()) => return Ok(()),
            Err(e)
                if origin.is_internal()
                    && e.is_connection_refused()
                    && attempt < INTERNAL_PULL_ATTEMPTS =>
            {
                let backoff = Duration::from_secs(u64::from(attempt));
                tracing::warn!(
                    image = %reference,
                    attempt,
                    "registry connection refused, retrying in {}s",
                    backoff.as_secs()
                );
                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {}
                    _ = cancel.cancelled() => {
                        return Err(DeployError::cancelled(format!("pulling {reference}")));
                    }
                }
            }
            Err(e) => return Err(e).context_image_pull(),
        }
    }
}
