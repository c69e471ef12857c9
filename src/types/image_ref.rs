// ABOUTME: Container image reference parsing and canonicalization.
// ABOUTME: Handles formats like myapp, myapp:tag, registry/image:tag@digest.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseImageRefError {
    #[error("image reference cannot be empty")]
    Empty,

    #[error("invalid character in image reference: {0}")]
    InvalidChar(char),

    #[error("invalid image reference format: {0}")]
    InvalidFormat(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    registry: Option<String>,
    name: String,
    tag: Option<String>,
    digest: Option<String>,
}

/// Characters permitted anywhere in a reference. Brackets appear in IPv6
/// registry hosts.
fn is_ref_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "/:.-_@[]".contains(c)
}

impl ImageRef {
    /// Tokenize right to left: the digest hangs off the first `@`, the tag is
    /// a colon inside the final path component (a colon further left belongs
    /// to a registry port), and the leading component is a registry only when
    /// it could plausibly be a host.
    pub fn parse(input: &str) -> Result<Self, ParseImageRefError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ParseImageRefError::Empty);
        }
        if let Some(bad) = input.chars().find(|c| !is_ref_char(*c)) {
            return Err(ParseImageRefError::InvalidChar(bad));
        }

        let (reference, digest) = match input.find('@') {
            Some(at) => (&input[..at], Some(input[at + 1..].to_string())),
            None => (input, None),
        };

        let last_component_start = reference.rfind('/').map_or(0, |slash| slash + 1);
        let (repo, tag) = match reference[last_component_start..].find(':') {
            Some(offset) => {
                let colon = last_component_start + offset;
                (&reference[..colon], Some(reference[colon + 1..].to_string()))
            }
            None => (reference, None),
        };
        if repo.is_empty() {
            return Err(ParseImageRefError::InvalidFormat(input.to_string()));
        }

        let (registry, name) = match repo.find('/') {
            Some(slash) if is_registry_component(&repo[..slash]) => (
                Some(repo[..slash].to_string()),
                repo[slash + 1..].to_string(),
            ),
            // Either a bare name or a namespaced one like `library/nginx`.
            _ => (None, repo.to_string()),
        };

        // An untagged, undigested reference means the latest tag.
        let tag = match (&tag, &digest) {
            (None, None) => Some("latest".to_string()),
            _ => tag,
        };

        Ok(Self {
            registry,
            name,
            tag,
            digest,
        })
    }

    pub fn registry(&self) -> Option<&str> {
        self.registry.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// Derive the attachment service name: last path component with the tag
    /// stripped and a leading `my-` trimmed, so `my-postgres:16` becomes
    /// `postgres` and peers can reach it under that hostname.
    pub fn service_name(&self) -> String {
        let last = self.name.rsplit('/').next().unwrap_or(&self.name);
        last.strip_prefix("my-").unwrap_or(last).to_string()
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref registry) = self.registry {
            write!(f, "{}/", registry)?;
        }
        write!(f, "{}", self.name)?;
        if let Some(ref tag) = self.tag {
            write!(f, ":{}", tag)?;
        }
        if let Some(ref digest) = self.digest {
            write!(f, "@{}", digest)?;
        }
        Ok(())
    }
}

/// A leading path component names a registry when it could be a host:
/// `localhost`, a bracketed IPv6 address, a dotted name, or host:port.
fn is_registry_component(component: &str) -> bool {
    component == "localhost"
        || component.starts_with('[')
        || component.contains('.')
        || component.contains(':')
}

/// Whether a raw reference already carries an explicit registry.
pub fn has_explicit_registry(reference: &str) -> bool {
    match reference.find('/') {
        Some(slash) => is_registry_component(&reference[..slash]),
        None => false,
    }
}

/// Whether a reference pins content by digest rather than tag.
pub fn is_digest_ref(reference: &str) -> bool {
    reference.contains("@sha256:")
}

/// Normalize a reference for local-presence comparison: default the tag to
/// `latest` and drop the implicit Docker Hub library prefix.
pub fn normalize_for_match(reference: &str) -> String {
    let reference = reference
        .strip_prefix("docker.io/library/")
        .or_else(|| reference.strip_prefix("library/"))
        .unwrap_or(reference);

    if is_digest_ref(reference) {
        return reference.to_string();
    }

    let has_tag = match reference.rsplit_once(':') {
        Some((_, after)) => !after.contains('/') && !after.contains(']'),
        None => false,
    };

    if has_tag {
        reference.to_string()
    } else {
        format!("{reference}:latest")
    }
}

/// Whether two references name the same local image after normalization.
pub fn refs_match(a: &str, b: &str) -> bool {
    normalize_for_match(a) == normalize_for_match(b)
}
