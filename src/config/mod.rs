// ABOUTME: Configuration types and parsing for gordon.yml.
// ABOUTME: Registry credentials, pull policy, volumes, networks, attachments, delays.

use crate::error::{Error, Result};
use crate::types::Domain;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILENAME: &str = "gordon.yml";
pub const CONFIG_FILENAME_ALT: &str = "gordon.yaml";

/// How aggressively images are pulled before a deploy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PullPolicy {
    /// Pull on every deploy.
    Always,
    /// Pull only when no matching image exists locally.
    #[default]
    IfNotPresent,
    /// Pull tagged references (the tag may have moved); skip digests.
    IfTagChanged,
}

/// Registry and credential settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistrySettings {
    #[serde(default)]
    pub auth_enabled: bool,

    /// Public domain of the embedded registry, e.g. `reg.example.com`.
    #[serde(default)]
    pub domain: Option<String>,

    /// Local port the embedded registry listens on.
    #[serde(default = "default_registry_port")]
    pub port: u16,

    #[serde(default)]
    pub internal_username: Option<String>,

    #[serde(default)]
    pub internal_password: Option<String>,

    #[serde(default)]
    pub service_token_username: Option<String>,

    #[serde(default)]
    pub service_token: Option<String>,

    /// Blob store directory of the embedded registry (OCI layout). Needed for
    /// auto-route label extraction.
    #[serde(default)]
    pub blob_dir: Option<PathBuf>,

    /// Honor `gordon.env-file` labels on pushed images by extracting the
    /// named file and seeding per-domain env files.
    #[serde(default = "default_env_file_extraction")]
    pub env_file_extraction: bool,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            auth_enabled: false,
            domain: None,
            port: default_registry_port(),
            internal_username: None,
            internal_password: None,
            service_token_username: None,
            service_token: None,
            blob_dir: None,
            env_file_extraction: default_env_file_extraction(),
        }
    }
}

fn default_registry_port() -> u16 {
    5000
}

fn default_env_file_extraction() -> bool {
    true
}

impl RegistrySettings {
    /// Configured registry domain with any trailing slash trimmed.
    pub fn domain_trimmed(&self) -> Option<&str> {
        self.domain
            .as_deref()
            .map(|d| d.trim_end_matches('/'))
            .filter(|d| !d.is_empty())
    }
}

/// Volume handling policy.
#[derive(Debug, Clone, Deserialize)]
pub struct VolumeSettings {
    /// Create volumes for image-declared mount paths.
    #[serde(default)]
    pub auto_create: bool,

    #[serde(default = "default_volume_prefix")]
    pub prefix: String,

    /// Keep volumes when a domain's containers are removed.
    #[serde(default)]
    pub preserve: bool,
}

impl Default for VolumeSettings {
    fn default() -> Self {
        Self {
            auto_create: false,
            prefix: default_volume_prefix(),
            preserve: false,
        }
    }
}

fn default_volume_prefix() -> String {
    "gordon".to_string()
}

/// Network placement policy.
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkSettings {
    /// Give each domain (or group) its own network instead of the default bridge.
    #[serde(default)]
    pub isolation: bool,

    #[serde(default = "default_network_prefix")]
    pub prefix: String,

    /// Group name to member domains; grouped domains share one network.
    #[serde(default)]
    pub groups: HashMap<String, Vec<Domain>>,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            isolation: false,
            prefix: default_network_prefix(),
            groups: HashMap::new(),
        }
    }
}

fn default_network_prefix() -> String {
    "gordon".to_string()
}

/// Supervisor tuning. The defaults match production behavior; tests shrink them.
#[derive(Debug, Clone, Deserialize)]
pub struct SupervisorSettings {
    #[serde(default = "default_tick", with = "humantime_serde")]
    pub tick: Duration,

    #[serde(default = "default_crash_loop_threshold")]
    pub crash_loop_threshold: usize,

    #[serde(default = "default_crash_loop_window", with = "humantime_serde")]
    pub crash_loop_window: Duration,

    #[serde(default = "default_backoff_cap", with = "humantime_serde")]
    pub backoff_cap: Duration,

    #[serde(default = "default_stable_running", with = "humantime_serde")]
    pub stable_running_duration: Duration,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            tick: default_tick(),
            crash_loop_threshold: default_crash_loop_threshold(),
            crash_loop_window: default_crash_loop_window(),
            backoff_cap: default_backoff_cap(),
            stable_running_duration: default_stable_running(),
        }
    }
}

fn default_tick() -> Duration {
    Duration::from_secs(15)
}

fn default_crash_loop_threshold() -> usize {
    3
}

fn default_crash_loop_window() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_backoff_cap() -> Duration {
    Duration::from_secs(15 * 60)
}

fn default_stable_running() -> Duration {
    Duration::from_secs(5 * 60)
}

/// A read-only snapshot of everything the orchestrator consumes from its
/// configuration file. Route definitions live in the same file but are served
/// through the route store so auto-route upserts persist.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub registry: RegistrySettings,

    #[serde(default)]
    pub pull_policy: PullPolicy,

    #[serde(default)]
    pub volumes: VolumeSettings,

    #[serde(default)]
    pub network: NetworkSettings,

    /// Domain or group name to attachment image references.
    #[serde(default)]
    pub attachments: HashMap<String, Vec<String>>,

    #[serde(default = "default_readiness_delay", with = "humantime_serde")]
    pub readiness_delay: Duration,

    #[serde(default = "default_drain_delay", with = "humantime_serde")]
    pub drain_delay: Duration,

    /// Directory holding per-domain `.env` files.
    #[serde(default = "default_env_dir")]
    pub env_dir: PathBuf,

    /// Create routes automatically from pushed image labels.
    #[serde(default)]
    pub auto_route: bool,

    #[serde(default)]
    pub supervisor: SupervisorSettings,

    /// Declared routes, domain to image reference.
    #[serde(default)]
    pub routes: HashMap<Domain, String>,
}

fn default_readiness_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_drain_delay() -> Duration {
    Duration::from_secs(2)
}

fn default_env_dir() -> PathBuf {
    PathBuf::from("/etc/gordon/env")
}

impl Settings {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let settings: Settings = serde_yaml::from_str(yaml)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [dir.join(CONFIG_FILENAME), dir.join(CONFIG_FILENAME_ALT)];

        for path in &candidates {
            if path.exists() {
                return Self::load(path);
            }
        }

        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    fn validate(&self) -> Result<()> {
        if self.registry.auth_enabled {
            let has_internal = self.registry.internal_username.is_some()
                && self.registry.internal_password.is_some();
            if !has_internal {
                tracing::warn!(
                    "registry auth enabled without internal credentials; internal deploys will fail"
                );
            }
        }

        for (group, members) in &self.network.groups {
            if members.is_empty() {
                return Err(Error::InvalidConfig(format!(
                    "network group '{group}' has no members"
                )));
            }
        }

        Ok(())
    }

    /// The network group a domain belongs to, if any.
    pub fn group_of(&self, domain: &Domain) -> Option<&str> {
        self.network
            .groups
            .iter()
            .find(|(_, members)| members.contains(domain))
            .map(|(name, _)| name.as_str())
    }
}
