// ABOUTME: Shared types used across runtime trait definitions.
// ABOUTME: ContainerSpec, ContainerInfo, NetworkSpec, RegistryAuth, etc.

use crate::types::ContainerId;
use std::collections::HashMap;

/// Configuration for creating a container.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    /// Name for the container.
    pub name: String,
    /// Image reference to run (already pulled).
    pub image: String,
    /// Hostname inside the container's network.
    pub hostname: Option<String>,
    /// Environment as `KEY=VALUE` entries.
    pub env: Vec<String>,
    /// Labels to apply.
    pub labels: HashMap<String, String>,
    /// Container ports to expose.
    pub exposed_ports: Vec<u16>,
    /// Mount path to named volume.
    pub volumes: HashMap<String, String>,
    /// Network to attach to; `None` means the runtime's default bridge.
    pub network: Option<String>,
}

/// A container port and its runtime-assigned host binding, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortBinding {
    pub container_port: u16,
    pub host_port: Option<u16>,
}

/// Container state as reported by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Created,
    Running,
    Paused,
    Restarting,
    Removing,
    Exited,
    Dead,
}

impl ContainerState {
    pub fn is_running(self) -> bool {
        matches!(self, ContainerState::Running)
    }

    pub fn is_exited(self) -> bool {
        matches!(self, ContainerState::Exited | ContainerState::Dead)
    }
}

/// Health state of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Starting,
    Healthy,
    Unhealthy,
    None,
}

/// Health probe result: the state plus whether the image declares a check at
/// all. A container without a declared check is treated as healthy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerHealth {
    pub state: HealthState,
    pub has_check: bool,
}

/// Information about a container from inspect.
#[derive(Debug, Clone)]
pub struct ContainerInfo {
    pub id: ContainerId,
    pub name: String,
    pub image: String,
    pub state: ContainerState,
    pub exit_code: Option<i64>,
    pub health: Option<HealthState>,
    pub ports: Vec<PortBinding>,
    pub labels: HashMap<String, String>,
    /// Networks the container is attached to.
    pub networks: Vec<String>,
}

/// Summary information about a container from list.
#[derive(Debug, Clone)]
pub struct ContainerSummary {
    pub id: ContainerId,
    pub name: String,
    pub image: String,
    pub state: String,
    pub labels: HashMap<String, String>,
    pub networks: Vec<String>,
}

/// Filters for listing containers.
#[derive(Debug, Clone, Default)]
pub struct ContainerFilters {
    /// Filter by label (key=value); a key with an empty value matches presence.
    pub labels: HashMap<String, String>,
    /// Filter by name (supports partial match).
    pub name: Option<String>,
    /// Include stopped containers.
    pub all: bool,
}

impl ContainerFilters {
    /// All containers, running or not.
    pub fn everything() -> Self {
        Self {
            all: true,
            ..Default::default()
        }
    }

    /// Containers carrying a managed label value, including stopped ones.
    pub fn managed(label: &str, value: &str) -> Self {
        let mut labels = HashMap::new();
        labels.insert(label.to_string(), value.to_string());
        Self {
            labels,
            name: None,
            all: true,
        }
    }
}

/// A locally present image.
#[derive(Debug, Clone)]
pub struct ImageSummary {
    pub id: String,
    pub repo_tags: Vec<String>,
}

/// Configuration for creating a network.
#[derive(Debug, Clone)]
pub struct NetworkSpec {
    pub name: String,
    pub driver: Option<String>,
    pub labels: HashMap<String, String>,
}

impl NetworkSpec {
    pub fn bridge(name: &str) -> Self {
        Self {
            name: name.to_string(),
            driver: Some("bridge".to_string()),
            labels: HashMap::new(),
        }
    }
}

/// Registry authentication credentials.
#[derive(Debug, Clone)]
pub struct RegistryAuth {
    pub username: String,
    pub password: String,
    /// Registry server (e.g., "reg.example.com").
    pub server: Option<String>,
}
