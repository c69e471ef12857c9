// ABOUTME: Error types for deploy operations using SNAFU with ErrorKind pattern.
// ABOUTME: Provides opaque errors with kind() accessor for stable API.

use snafu::Snafu;

use crate::runtime::{ContainerError, ImageError, NetworkError, VolumeError};

/// Categories of deploy errors.
///
/// Use `DeployError::kind()` to get this value for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum DeployErrorKind {
    ImagePull,
    ContainerCreate,
    ContainerStart,
    ContainerStop,
    ContainerRemove,
    Network,
    Volume,
    Attachment,
    Readiness,
    ContainerNotFound,
    RouteNotFound,
    Config,
    Runtime,
    Cancelled,
}

/// Errors that can occur during deploy pipeline operations.
///
/// This is an opaque error type. Use `kind()` to determine the error category.
#[derive(Debug)]
pub struct DeployError(InnerDeployError);

impl std::fmt::Display for DeployError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for DeployError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

impl DeployError {
    /// Returns the kind of this error for programmatic handling.
    pub fn kind(&self) -> DeployErrorKind {
        match &self.0 {
            InnerDeployError::ImagePullFailed { .. }
            | InnerDeployError::ImagePullFailedMsg { .. } => DeployErrorKind::ImagePull,
            InnerDeployError::ContainerCreateFailed { .. } => DeployErrorKind::ContainerCreate,
            InnerDeployError::ContainerStartFailed { .. }
            | InnerDeployError::ContainerStartFailedMsg { .. } => DeployErrorKind::ContainerStart,
            InnerDeployError::ContainerStopFailed { .. } => DeployErrorKind::ContainerStop,
            InnerDeployError::ContainerRemoveFailed { .. } => DeployErrorKind::ContainerRemove,
            InnerDeployError::NetworkFailed { .. }
            | InnerDeployError::NetworkFailedMsg { .. } => DeployErrorKind::Network,
            InnerDeployError::VolumeFailed { .. } => DeployErrorKind::Volume,
            InnerDeployError::AttachmentFailed { .. } => DeployErrorKind::Attachment,
            InnerDeployError::ReadinessTimeout { .. } => DeployErrorKind::Readiness,
            InnerDeployError::ContainerNotFound { .. } => DeployErrorKind::ContainerNotFound,
            InnerDeployError::RouteNotFound { .. } => DeployErrorKind::RouteNotFound,
            InnerDeployError::ConfigError { .. } => DeployErrorKind::Config,
            InnerDeployError::RuntimeFailed { .. } => DeployErrorKind::Runtime,
            InnerDeployError::Cancelled { .. } => DeployErrorKind::Cancelled,
        }
    }

    /// Returns the domain if this is a `RouteNotFound` error.
    pub fn missing_route(&self) -> Option<&str> {
        match &self.0 {
            InnerDeployError::RouteNotFound { domain } => Some(domain),
            _ => None,
        }
    }
}

/// Internal error type with full context - not exposed in public API.
#[derive(Debug, Snafu)]
enum InnerDeployError {
    // Source-preserving variants (used via context extensions)
    #[snafu(display("failed to pull image: {source}"))]
    ImagePullFailed { source: ImageError },

    #[snafu(display("failed to create container: {source}"))]
    ContainerCreateFailed { source: ContainerError },

    #[snafu(display("failed to start container: {source}"))]
    ContainerStartFailed { source: ContainerError },

    #[snafu(display("failed to stop container: {source}"))]
    ContainerStopFailed { source: ContainerError },

    #[snafu(display("failed to remove container: {source}"))]
    ContainerRemoveFailed { source: ContainerError },

    #[snafu(display("network operation failed: {source}"))]
    NetworkFailed { source: NetworkError },

    #[snafu(display("volume operation failed: {source}"))]
    VolumeFailed { source: VolumeError },

    // Message-based variants (used via factory methods)
    #[snafu(display("failed to pull image: {message}"))]
    ImagePullFailedMsg { message: String },

    #[snafu(display("failed to start container: {message}"))]
    ContainerStartFailedMsg { message: String },

    #[snafu(display("network operation failed: {message}"))]
    NetworkFailedMsg { message: String },

    #[snafu(display("attachment {image} failed for {domain}: {message}"))]
    AttachmentFailed {
        domain: String,
        image: String,
        message: String,
    },

    #[snafu(display("container for {domain} not running after {seconds}s"))]
    ReadinessTimeout { domain: String, seconds: u64 },

    #[snafu(display("container not found: {what}"))]
    ContainerNotFound { what: String },

    #[snafu(display("no route configured for domain {domain}"))]
    RouteNotFound { domain: String },

    #[snafu(display("configuration error: {message}"))]
    ConfigError { message: String },

    #[snafu(display("runtime error: {message}"))]
    RuntimeFailed { message: String },

    #[snafu(display("operation cancelled while {during}"))]
    Cancelled { during: String },
}

// Context selectors for converting errors at call sites with proper categorization
use snafu::ResultExt;

pub trait ImageErrorExt<T> {
    fn context_image_pull(self) -> Result<T, DeployError>;
}

impl<T> ImageErrorExt<T> for Result<T, ImageError> {
    fn context_image_pull(self) -> Result<T, DeployError> {
        self.context(ImagePullFailedSnafu).map_err(DeployError)
    }
}

pub trait ContainerErrorExt<T> {
    fn context_container_create(self) -> Result<T, DeployError>;
    fn context_container_start(self) -> Result<T, DeployError>;
    fn context_container_stop(self) -> Result<T, DeployError>;
    fn context_container_remove(self) -> Result<T, DeployError>;
}

impl<T> ContainerErrorExt<T> for Result<T, ContainerError> {
    fn context_container_create(self) -> Result<T, DeployError> {
        self.context(ContainerCreateFailedSnafu).map_err(DeployError)
    }

    fn context_container_start(self) -> Result<T, DeployError> {
        self.context(ContainerStartFailedSnafu).map_err(DeployError)
    }

    fn context_container_stop(self) -> Result<T, DeployError> {
        self.context(ContainerStopFailedSnafu).map_err(DeployError)
    }

    fn context_container_remove(self) -> Result<T, DeployError> {
        self.context(ContainerRemoveFailedSnafu).map_err(DeployError)
    }
}

pub trait NetworkErrorExt<T> {
    fn context_network(self) -> Result<T, DeployError>;
}

impl<T> NetworkErrorExt<T> for Result<T, NetworkError> {
    fn context_network(self) -> Result<T, DeployError> {
        self.context(NetworkFailedSnafu).map_err(DeployError)
    }
}

pub trait VolumeErrorExt<T> {
    fn context_volume(self) -> Result<T, DeployError>;
}

impl<T> VolumeErrorExt<T> for Result<T, VolumeError> {
    fn context_volume(self) -> Result<T, DeployError> {
        self.context(VolumeFailedSnafu).map_err(DeployError)
    }
}

// Factory functions for errors without source
impl DeployError {
    pub fn image_pull_failed(message: impl Into<String>) -> Self {
        DeployError(InnerDeployError::ImagePullFailedMsg {
            message: message.into(),
        })
    }

    pub fn container_start_failed(message: impl Into<String>) -> Self {
        DeployError(InnerDeployError::ContainerStartFailedMsg {
            message: message.into(),
        })
    }

    pub fn network_failed(message: impl Into<String>) -> Self {
        DeployError(InnerDeployError::NetworkFailedMsg {
            message: message.into(),
        })
    }

    pub fn attachment_failed(
        domain: impl Into<String>,
        image: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        DeployError(InnerDeployError::AttachmentFailed {
            domain: domain.into(),
            image: image.into(),
            message: message.into(),
        })
    }

    pub fn readiness_timeout(domain: impl Into<String>, seconds: u64) -> Self {
        DeployError(InnerDeployError::ReadinessTimeout {
            domain: domain.into(),
            seconds,
        })
    }

    pub fn container_not_found(what: impl Into<String>) -> Self {
        DeployError(InnerDeployError::ContainerNotFound { what: what.into() })
    }

    pub fn route_not_found(domain: impl Into<String>) -> Self {
        DeployError(InnerDeployError::RouteNotFound {
            domain: domain.into(),
        })
    }

    pub fn config_error(message: impl Into<String>) -> Self {
        DeployError(InnerDeployError::ConfigError {
            message: message.into(),
        })
    }

    pub fn runtime_error(message: impl Into<String>) -> Self {
        DeployError(InnerDeployError::RuntimeFailed {
            message: message.into(),
        })
    }

    pub fn cancelled(during: impl Into<String>) -> Self {
        DeployError(InnerDeployError::Cancelled {
            during: during.into(),
        })
    }
}
