// ABOUTME: Resource planning for a deploy: ports, env, volumes, network.
// ABOUTME: Pure policy over runtime inspection; creation happens on demand.

use crate::config::Settings;
use crate::envfile::EnvLoader;
use crate::manager::error::{DeployError, NetworkErrorExt, VolumeErrorExt};
use crate::runtime::{NetworkSpec, Runtime};
use crate::types::Domain;
use std::collections::HashMap;

/// Ports assumed exposed when the image cannot be inspected.
const FALLBACK_PORTS: [u16; 3] = [80, 8080, 3000];

/// Ports the container should expose, falling back to common HTTP ports when
/// the runtime cannot tell us.
pub(crate) async fn exposed_ports(runtime: &dyn Runtime, image: &str) -> Vec<u16> {
    match runtime.image_exposed_ports(image).await {
        Ok(ports) if !ports.is_empty() => ports,
        Ok(_) => FALLBACK_PORTS.to_vec(),
        Err(e) => {
            tracing::warn!(image = %image, error = %e, "could not inspect exposed ports, using defaults");
            FALLBACK_PORTS.to_vec()
        }
    }
}

/// Merge environment lists with last-write-wins per key, preserving
/// first-seen key order.
pub(crate) fn merge_env(image_env: &[String], user_env: &[String]) -> Vec<String> {
    let mut order: Vec<String> = Vec::new();
    let mut values: HashMap<String, String> = HashMap::new();

    for entry in image_env.iter().chain(user_env) {
        let Some((key, value)) = entry.split_once('=') else {
            continue;
        };
        if !values.contains_key(key) {
            order.push(key.to_string());
        }
        values.insert(key.to_string(), value.to_string());
    }

    order
        .into_iter()
        .map(|key| {
            let value = &values[&key];
            format!("{key}={value}")
        })
        .collect()
}

/// The container's merged environment: user entries override image entries.
pub(crate) async fn merged_env(
    runtime: &dyn Runtime,
    env_loader: &dyn EnvLoader,
    domain: &Domain,
    image: &str,
) -> Result<Vec<String>, DeployError> {
    let image_env = match runtime.inspect_image_env(image).await {
        Ok(env) => env,
        Err(e) => {
            tracing::warn!(image = %image, error = %e, "could not inspect image env");
            Vec::new()
        }
    };

    let user_env = env_loader
        .load_env(domain)
        .await
        .map_err(|e| DeployError::config_error(format!("env load failed for {domain}: {e}")))?;

    Ok(merge_env(&image_env, &user_env))
}

/// Volume name for a declared mount path.
pub(crate) fn volume_name(settings: &Settings, domain: &Domain, path: &str) -> String {
    let path_part = path.trim_matches('/').replace('/', "-");
    format!(
        "{}-{}-{}",
        settings.volumes.prefix,
        domain.sanitized(),
        path_part
    )
}

/// Volumes for the image's declared mount paths, created when absent.
/// Disabled unless `volumes.auto_create` is set.
pub(crate) async fn plan_volumes(
    runtime: &dyn Runtime,
    settings: &Settings,
    domain: &Domain,
    image: &str,
) -> Result<HashMap<String, String>, DeployError> {
    if !settings.volumes.auto_create {
        return Ok(HashMap::new());
    }

    let paths = match runtime.inspect_image_volumes(image).await {
        Ok(paths) => paths,
        Err(e) => {
            tracing::warn!(image = %image, error = %e, "could not inspect image volumes");
            return Ok(HashMap::new());
        }
    };

    let mut volumes = HashMap::new();
    for path in paths {
        let name = volume_name(settings, domain, &path);
        if !runtime.volume_exists(&name).await.context_volume()? {
            tracing::info!(volume = %name, "creating volume");
            runtime.create_volume(&name).await.context_volume()?;
        }
        volumes.insert(path, name);
    }

    Ok(volumes)
}

/// The network a domain's containers belong to. `None` means the runtime's
/// default bridge (isolation disabled).
pub(crate) fn network_name(settings: &Settings, domain: &Domain) -> Option<String> {
    if !settings.network.isolation {
        return None;
    }

    let member = match settings.group_of(domain) {
        Some(group) => group.replace(['.', ':'], "-"),
        None => domain.sanitized(),
    };

    Some(format!("{}-{}", settings.network.prefix, member))
}

/// Resolve and create (if needed) the target network for a domain.
pub(crate) async fn ensure_network(
    runtime: &dyn Runtime,
    settings: &Settings,
    domain: &Domain,
) -> Result<Option<String>, DeployError> {
    let Some(name) = network_name(settings, domain) else {
        return Ok(None);
    };

    if !runtime.network_exists(&name).await.context_network()? {
        tracing::info!(network = %name, "creating network");
        runtime
            .create_network(&NetworkSpec::bridge(&name))
            .await
            .context_network()?;
    }

    Ok(Some(name))
}
