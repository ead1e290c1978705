//! Directory-backed storage backend.
//!
//! On-disk layout:
//!
//! ```text
//! <root>/
//! ├── blobs/<uuid>.blob          # one bundle per file
//! ├── nodes/<hash-hex>.json      # node hash index (NodeLocator)
//! └── refs/<ref/name>.ref        # NodeHandle as JSON
//! ```
//!
//! Ref files are written to a temporary sibling and renamed into place, so a
//! ref is always either its old or its new value.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;
use uuid::Uuid;

use arbor_types::{BlobLocator, ContentHash, NodeHandle, NodeLocator, RefName};

use crate::error::{StoreError, StoreResult};
use crate::traits::{BlobStore, RefStore};

const REF_EXTENSION: &str = "ref";

/// Storage backend keeping one file per blob and per ref under `root`.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    /// Open (or create) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        for dir in ["blobs", "nodes", "refs"] {
            tokio::fs::create_dir_all(root.join(dir)).await?;
        }
        Ok(Self { root })
    }

    /// The root directory of this store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, locator: &BlobLocator) -> Option<PathBuf> {
        // Locators minted here are bare UUIDs; anything else cannot name a
        // file in this store.
        let id = locator.as_str();
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return None;
        }
        Some(self.root.join("blobs").join(format!("{id}.blob")))
    }

    fn node_path(&self, hash: &ContentHash) -> PathBuf {
        self.root.join("nodes").join(format!("{}.json", hash.to_hex()))
    }

    fn ref_path(&self, name: &RefName) -> PathBuf {
        let mut path = self.root.join("refs");
        let mut components = name.as_str().split('/').peekable();
        while let Some(component) = components.next() {
            if components.peek().is_some() {
                path.push(component);
            } else {
                path.push(format!("{component}.{REF_EXTENSION}"));
            }
        }
        path
    }

    async fn write_atomic(path: &Path, data: &[u8]) -> StoreResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension(format!("tmp-{}", Uuid::now_v7()));
        tokio::fs::write(&tmp, data).await?;
        if let Err(e) = tokio::fs::rename(&tmp, path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn read_optional(path: &Path) -> StoreResult<Option<Vec<u8>>> {
        match tokio::fs::read(path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl BlobStore for FileStorage {
    async fn put_blob(&self, data: Bytes) -> StoreResult<BlobLocator> {
        let locator = BlobLocator::new(Uuid::now_v7().to_string())?;
        let path = self
            .blob_path(&locator)
            .ok_or_else(|| StoreError::NotFound(locator.clone()))?;
        Self::write_atomic(&path, &data).await?;
        debug!(%locator, bytes = data.len(), "stored blob");
        Ok(locator)
    }

    async fn get_blob(&self, locator: &BlobLocator) -> StoreResult<Bytes> {
        let path = self
            .blob_path(locator)
            .ok_or_else(|| StoreError::NotFound(locator.clone()))?;
        match Self::read_optional(&path).await? {
            Some(data) => Ok(Bytes::from(data)),
            None => Err(StoreError::NotFound(locator.clone())),
        }
    }

    async fn has_blob(&self, locator: &BlobLocator) -> StoreResult<bool> {
        match self.blob_path(locator) {
            Some(path) => Ok(tokio::fs::try_exists(path).await?),
            None => Ok(false),
        }
    }

    async fn find_node(&self, hash: &ContentHash) -> StoreResult<Option<NodeLocator>> {
        match Self::read_optional(&self.node_path(hash)).await? {
            Some(data) => serde_json::from_slice(&data)
                .map(Some)
                .map_err(|e| StoreError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    async fn add_node(&self, hash: ContentHash, locator: NodeLocator) -> StoreResult<()> {
        let path = self.node_path(&hash);
        if tokio::fs::try_exists(&path).await? {
            return Ok(());
        }
        let data =
            serde_json::to_vec(&locator).map_err(|e| StoreError::Serialization(e.to_string()))?;
        Self::write_atomic(&path, &data).await
    }
}

#[async_trait]
impl RefStore for FileStorage {
    async fn read_ref(&self, name: &RefName) -> StoreResult<Option<NodeHandle>> {
        match Self::read_optional(&self.ref_path(name)).await? {
            Some(data) => serde_json::from_slice(&data)
                .map(Some)
                .map_err(|e| StoreError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    async fn write_ref(&self, name: &RefName, handle: &NodeHandle) -> StoreResult<()> {
        let data =
            serde_json::to_vec(handle).map_err(|e| StoreError::Serialization(e.to_string()))?;
        Self::write_atomic(&self.ref_path(name), &data).await?;
        debug!(%name, %handle, "wrote ref");
        Ok(())
    }

    async fn delete_ref(&self, name: &RefName) -> StoreResult<bool> {
        match tokio::fs::remove_file(self.ref_path(name)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_refs(&self, prefix: &str) -> StoreResult<Vec<(RefName, NodeHandle)>> {
        let refs_root = self.root.join("refs");
        let mut result = Vec::new();
        let mut pending = vec![refs_root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                    continue;
                }
                if path.extension().and_then(|e| e.to_str()) != Some(REF_EXTENSION) {
                    continue;
                }
                let Ok(relative) = path.strip_prefix(&refs_root) else {
                    continue;
                };
                let joined: Vec<String> = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect();
                let joined = joined.join("/");
                let Some(stem) = joined.strip_suffix(&format!(".{REF_EXTENSION}")) else {
                    continue;
                };
                let name = RefName::new(stem)?;
                if !name.as_str().starts_with(prefix) {
                    continue;
                }
                if let Some(handle) = self.read_ref(&name).await? {
                    result.push((name, handle));
                }
            }
        }

        result.sort_by(|(a, _), (b, _)| a.cmp(b));
        Ok(result)
    }
}
