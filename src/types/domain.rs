// ABOUTME: Validated public hostname for a route.
// ABOUTME: Provides sanitized forms for container, network, and env-file names.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("domain cannot be empty")]
    Empty,

    #[error("domain exceeds maximum length of 253 characters")]
    TooLong,

    #[error("domain label cannot be empty")]
    EmptyLabel,

    #[error("domain must be lowercase")]
    NotLowercase,

    #[error("invalid character in domain: '{0}'")]
    InvalidChar(char),
}

/// A public hostname, the unique key of a route.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Domain(String);

impl Domain {
    pub fn new(value: &str) -> Result<Self, DomainError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(DomainError::Empty);
        }
        if value.len() > 253 {
            return Err(DomainError::TooLong);
        }
        for label in value.split('.') {
            if label.is_empty() {
                return Err(DomainError::EmptyLabel);
            }
        }
        for c in value.chars() {
            if c.is_ascii_uppercase() {
                return Err(DomainError::NotLowercase);
            }
            if !c.is_ascii_lowercase() && !c.is_ascii_digit() && c != '-' && c != '.' && c != ':' {
                return Err(DomainError::InvalidChar(c));
            }
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name-safe form: dots and colons become dashes.
    /// Used in network, volume, and attachment container names.
    pub fn sanitized(&self) -> String {
        self.0.replace(['.', ':'], "-")
    }

    /// Legacy name-safe form used by older releases: dots and colons stripped.
    /// Probed for one release so existing attachments can be adopted.
    pub fn sanitized_legacy(&self) -> String {
        self.0.replace(['.', ':'], "")
    }

    /// File name for this domain's env file: `.`, `:`, `/` become `_`.
    pub fn env_file_name(&self) -> String {
        let mut name = self.0.replace(['.', ':', '/'], "_");
        name.push_str(".env");
        name
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for Domain {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Domain::new(&value).map_err(serde::de::Error::custom)
    }
}
