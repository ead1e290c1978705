use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::file::FileStorage;
use crate::memory::InMemoryStorage;
use crate::traits::StorageBackend;

/// Which backend to open.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Non-persistent, process-local store.
    #[default]
    Memory,
    /// Directory-backed store under [`StorageConfig::root`].
    File,
}

/// Storage backend configuration.
///
/// ```toml
/// [storage]
/// backend = "file"
/// root = "/var/lib/arbor"
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: BackendKind,
    /// Root directory, required for the file backend.
    pub root: Option<PathBuf>,
    /// Whether the backend remembers node hashes for cross-session
    /// deduplication (memory backend only; the file backend always does).
    #[serde(default = "default_index_nodes")]
    pub index_nodes: bool,
}

fn default_index_nodes() -> bool {
    true
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::memory()
    }
}

#[derive(Deserialize)]
struct ConfigFile {
    storage: StorageConfig,
}

impl StorageConfig {
    /// In-memory configuration.
    pub fn memory() -> Self {
        Self {
            backend: BackendKind::Memory,
            root: None,
            index_nodes: true,
        }
    }

    /// Directory-backed configuration rooted at `root`.
    pub fn file(root: impl Into<PathBuf>) -> Self {
        Self {
            backend: BackendKind::File,
            root: Some(root.into()),
            index_nodes: true,
        }
    }

    /// Parse the `[storage]` table of a TOML document.
    pub fn from_toml_str(source: &str) -> StoreResult<Self> {
        let file: ConfigFile =
            toml::from_str(source).map_err(|e| StoreError::Config(e.to_string()))?;
        file.storage.validate()?;
        Ok(file.storage)
    }

    /// Check that the configuration can be opened.
    pub fn validate(&self) -> StoreResult<()> {
        if self.backend == BackendKind::File && self.root.is_none() {
            return Err(StoreError::Config("file backend requires `root`".into()));
        }
        Ok(())
    }

    /// Open the configured backend.
    pub async fn open(&self) -> StoreResult<Arc<dyn StorageBackend>> {
        self.validate()?;
        match self.backend {
            BackendKind::Memory if self.index_nodes => Ok(Arc::new(InMemoryStorage::new())),
            BackendKind::Memory => Ok(Arc::new(InMemoryStorage::without_node_index())),
            BackendKind::File => {
                let root = self
                    .root
                    .clone()
                    .ok_or_else(|| StoreError::Config("file backend requires `root`".into()))?;
                Ok(Arc::new(FileStorage::open(root).await?))
            }
        }
    }
}
