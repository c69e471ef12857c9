// ABOUTME: Capability traits a container runtime must provide.
// ABOUTME: Split per concern so fakes and partial backends stay small.

mod container;
mod image;
mod logs;
mod network;
mod shared_types;
mod volume;

pub use container::{ContainerError, ContainerOps};
pub use image::{ImageError, ImageOps};
pub use logs::{LogError, LogLine, LogOps, LogOptions, LogStream};
pub use network::{NetworkError, NetworkOps};
pub use shared_types::{
    ContainerFilters, ContainerHealth, ContainerInfo, ContainerSpec, ContainerState,
    ContainerSummary, HealthState, ImageSummary, NetworkSpec, PortBinding, RegistryAuth,
};
pub use volume::{VolumeError, VolumeOps};

/// The full capability set the orchestrator requires from a runtime.
pub trait Runtime: ContainerOps + ImageOps + NetworkOps + VolumeOps + LogOps {}

impl<T: ContainerOps + ImageOps + NetworkOps + VolumeOps + LogOps> Runtime for T {}
