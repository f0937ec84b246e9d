//! Durable storage for uploaded artifacts.
//!
//! The ingest path writes each artifact exactly once; the worker reads it
//! once through the absolute path returned by [`ArtifactStore::local_path`].

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;

/// Fallback stem used when sanitization strips the whole name.
const FALLBACK_NAME: &str = "document";

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));
static UNSAFE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_.-]").expect("valid regex"));

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("failed to write artifact {location}: {source}")]
    Write {
        location: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to remove artifact {location}: {source}")]
    Remove {
        location: String,
        #[source]
        source: std::io::Error,
    },
}

/// Reference to a stored artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredArtifact {
    /// Storage reference recorded on the job.
    pub location: String,
    /// Absolute path handed to the worker process.
    pub path: PathBuf,
}

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Persist `bytes` under a fresh location derived from `file_name`.
    async fn put(&self, file_name: &str, bytes: &[u8]) -> Result<StoredArtifact, StorageError>;

    /// Delete a stored artifact. Used to roll back an ingest whose job could not be created.
    async fn remove(&self, location: &str) -> Result<(), StorageError>;

    /// Resolve a storage reference to a local filesystem path.
    fn local_path(&self, location: &str) -> PathBuf;
}

/// Stores artifacts as files under a single upload directory.
pub struct LocalArtifactStore {
    root: PathBuf,
}

impl LocalArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn put(&self, file_name: &str, bytes: &[u8]) -> Result<StoredArtifact, StorageError> {
        let location = storage_location(file_name);
        let write_err = |source| StorageError::Write {
            location: location.clone(),
            source,
        };

        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(write_err)?;

        // Write to a sibling temp file and rename so the worker never sees a partial file.
        let path = self.local_path(&location);
        let partial = self.root.join(format!(".{location}.part"));
        tokio::fs::write(&partial, bytes).await.map_err(write_err)?;
        if let Err(e) = tokio::fs::rename(&partial, &path).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(write_err(e));
        }

        tracing::debug!(location = %location, size = bytes.len(), "Artifact stored");
        Ok(StoredArtifact { location, path })
    }

    async fn remove(&self, location: &str) -> Result<(), StorageError> {
        tokio::fs::remove_file(self.local_path(location))
            .await
            .map_err(|source| StorageError::Remove {
                location: location.to_string(),
                source,
            })
    }

    fn local_path(&self, location: &str) -> PathBuf {
        self.root.join(location)
    }
}

/// Make a client-supplied file name safe to use as a path component.
///
/// Whitespace runs become `_`; anything outside `[A-Za-z0-9_.-]` is dropped.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let spaced = WHITESPACE.replace_all(base.trim(), "_");
    let cleaned = UNSAFE_CHARS.replace_all(&spaced, "");
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        cleaned.to_string()
    }
}

/// Unique storage reference: `<unix-millis>-<8 hex>-<sanitized name>`.
fn storage_location(file_name: &str) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let nonce = uuid::Uuid::new_v4().simple().to_string();
    format!("{millis}-{}-{}", &nonce[..8], sanitize_file_name(file_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_whitespace_and_strips_symbols() {
        assert_eq!(sanitize_file_name("my contract (v2).pdf"), "my_contract_v2.pdf");
        assert_eq!(sanitize_file_name("  lease\tterms.docx "), "lease_terms.docx");
    }

    #[test]
    fn sanitize_drops_directory_components() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\Users\\x\\deal.pdf"), "deal.pdf");
        assert_eq!(sanitize_file_name(".hidden"), "hidden");
    }

    #[test]
    fn sanitize_falls_back_when_nothing_is_left() {
        assert_eq!(sanitize_file_name("()"), FALLBACK_NAME);
        assert_eq!(sanitize_file_name(""), FALLBACK_NAME);
        assert_eq!(sanitize_file_name(".."), FALLBACK_NAME);
    }

    #[test]
    fn locations_are_unique() {
        let a = storage_location("contract.pdf");
        let b = storage_location("contract.pdf");
        assert_ne!(a, b);
        assert!(a.ends_with("-contract.pdf"));
    }

    #[tokio::test]
    async fn put_writes_bytes_and_remove_deletes_them() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(dir.path().join("uploads"));

        let stored = store.put("contract.pdf", b"%PDF-1.4").await.unwrap();
        assert_eq!(stored.path, store.local_path(&stored.location));
        assert!(stored.path.starts_with(store.root()));
        assert_eq!(tokio::fs::read(&stored.path).await.unwrap(), b"%PDF-1.4");

        store.remove(&stored.location).await.unwrap();
        assert!(!stored.path.exists());
    }

    #[tokio::test]
    async fn put_fails_when_root_is_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        tokio::fs::write(&blocker, b"x").await.unwrap();

        let store = LocalArtifactStore::new(&blocker);
        let err = store.put("a.pdf", b"data").await.unwrap_err();
        assert!(matches!(err, StorageError::Write { .. }));
    }
}
