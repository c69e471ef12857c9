// ABOUTME: Application-wide error types for gordon.
// ABOUTME: Uses thiserror for ergonomic error handling with preserved rich types.

use std::path::PathBuf;
use thiserror::Error;

use crate::manager::DeployError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration file not found in {0}")]
    ConfigNotFound(PathBuf),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("runtime connection failed: {0}")]
    RuntimeConnection(String),

    #[error("deployment failed: {0}")]
    Deploy(#[from] DeployError),

    #[error("route store error: {0}")]
    RouteStore(String),
}

impl Error {
    /// Returns the deployment error if this is a `Deploy` variant.
    pub fn as_deploy_error(&self) -> Option<&DeployError> {
        match self {
            Error::Deploy(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
