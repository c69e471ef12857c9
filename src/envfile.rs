// ABOUTME: Per-domain .env file parsing, merging, and 0600 persistence.
// ABOUTME: Image-extracted values act as defaults; on-disk values win.

use crate::types::Domain;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnvFileError {
    #[error("I/O error for {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("extracting {path} from {image}: {message}")]
    Extraction {
        image: String,
        path: String,
        message: String,
    },
}

/// Loads the user-provided environment for a domain.
#[async_trait]
pub trait EnvLoader: Send + Sync {
    /// Environment as `KEY=VALUE` entries; a domain without an env file
    /// yields an empty list.
    async fn load_env(&self, domain: &Domain) -> Result<Vec<String>, EnvFileError>;
}

/// Extracts a file from inside an image, for `gordon.env-file` labels.
#[async_trait]
pub trait EnvFileExtractor: Send + Sync {
    async fn extract_env_file(
        &self,
        image: &str,
        path: &str,
    ) -> Result<bytes::Bytes, EnvFileError>;
}

/// Directory-backed env loader: one `<domain>.env` file per domain.
pub struct DirEnvLoader {
    dir: PathBuf,
}

impl DirEnvLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, domain: &Domain) -> PathBuf {
        self.dir.join(domain.env_file_name())
    }
}

#[async_trait]
impl EnvLoader for DirEnvLoader {
    async fn load_env(&self, domain: &Domain) -> Result<Vec<String>, EnvFileError> {
        let path = self.path_for(domain);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(EnvFileError::Io { path, source: e }),
        };

        Ok(parse(&content)
            .into_iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect())
    }
}

/// Parse KEY=VALUE lines. Supports `#` comments, blank lines, single- and
/// double-quoted values, and whitespace trimming. Malformed lines are skipped.
pub fn parse(content: &str) -> Vec<(String, String)> {
    let mut entries = Vec::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            continue;
        };

        let key = key.trim();
        if key.is_empty() || key.contains(char::is_whitespace) {
            continue;
        }

        let value = value.trim();
        let value = unquote(value);

        entries.push((key.to_string(), value));
    }

    entries
}

fn unquote(value: &str) -> String {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            let inner = &value[1..value.len() - 1];
            if first == b'"' {
                return inner.replace("\\\"", "\"");
            }
            return inner.to_string();
        }
    }
    value.to_string()
}

/// Merge image-provided defaults under existing values: keys already present
/// keep their value, new keys come from the image.
pub fn merge(
    existing: &[(String, String)],
    image: &[(String, String)],
) -> BTreeMap<String, String> {
    let mut merged: BTreeMap<String, String> = BTreeMap::new();
    for (k, v) in image {
        merged.insert(k.clone(), v.clone());
    }
    for (k, v) in existing {
        merged.insert(k.clone(), v.clone());
    }
    merged
}

/// Serialize sorted by key, quoting values that need it.
pub fn serialize(entries: &BTreeMap<String, String>) -> String {
    let mut out = String::new();
    for (key, value) in entries {
        out.push_str(key);
        out.push('=');
        if needs_quoting(value) {
            out.push('"');
            out.push_str(&value.replace('"', "\\\""));
            out.push('"');
        } else {
            out.push_str(value);
        }
        out.push('\n');
    }
    out
}

fn needs_quoting(value: &str) -> bool {
    value
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '$' | '\\'))
}

/// Write an env file, created with owner-only permissions.
pub async fn write_env_file(path: &Path, content: &str) -> Result<(), EnvFileError> {
    let io_err = |source| EnvFileError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| EnvFileError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
    }

    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path).await.map_err(io_err)?;

    use tokio::io::AsyncWriteExt;
    file.write_all(content.as_bytes()).await.map_err(io_err)?;

    // An existing file keeps its old mode; clamp it down.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))
            .await
            .map_err(io_err)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parses_plain_entries() {
        let entries = parse("A=1\nB=two\n");
        assert_eq!(
            entries,
            vec![("A".into(), "1".into()), ("B".into(), "two".into())]
        );
    }

    #[test]
    fn skips_comments_blanks_and_malformed_lines() {
        let entries = parse("# comment\n\nnot a pair\nKEY WITH SPACE=x\nGOOD=yes\n");
        assert_eq!(entries, vec![("GOOD".into(), "yes".into())]);
    }

    #[test]
    fn strips_quotes() {
        let entries = parse("A=\"hello world\"\nB='single'\nC=\"esc \\\" quote\"\n");
        assert_eq!(entries[0].1, "hello world");
        assert_eq!(entries[1].1, "single");
        assert_eq!(entries[2].1, "esc \" quote");
    }

    #[test]
    fn trims_whitespace_around_key_and_value() {
        let entries = parse("  A = spaced  \n");
        assert_eq!(entries, vec![("A".into(), "spaced".into())]);
    }

    #[test]
    fn existing_values_override_image_values() {
        let image = vec![("A".into(), "img".into()), ("B".into(), "img".into())];
        let existing = vec![("A".into(), "user".into()), ("C".into(), "user".into())];
        let merged = merge(&existing, &image);

        assert_eq!(merged.get("A").unwrap(), "user");
        assert_eq!(merged.get("B").unwrap(), "img");
        assert_eq!(merged.get("C").unwrap(), "user");
    }

    #[test]
    fn serializes_sorted_with_quoting() {
        let mut entries = BTreeMap::new();
        entries.insert("ZED".to_string(), "plain".to_string());
        entries.insert("ALPHA".to_string(), "has space".to_string());
        let out = serialize(&entries);
        assert_eq!(out, "ALPHA=\"has space\"\nZED=plain\n");
    }

    proptest! {
        // Whatever we serialize must parse back to the same map.
        #[test]
        fn serialize_parse_round_trip(
            entries in proptest::collection::btree_map(
                "[A-Z][A-Z0-9_]{0,8}",
                "[ -~]{0,16}",
                0..8,
            )
        ) {
            let entries: BTreeMap<String, String> = entries
                .into_iter()
                .map(|(k, v)| (k, v.trim().to_string()))
                .collect();
            let out = serialize(&entries);
            let parsed: BTreeMap<String, String> = parse(&out).into_iter().collect();
            prop_assert_eq!(parsed, entries);
        }
    }
}
