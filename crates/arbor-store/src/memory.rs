use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;
use uuid::Uuid;

use arbor_types::{BlobLocator, ContentHash, NodeHandle, NodeLocator, RefName};

use crate::error::{StoreError, StoreResult};
use crate::traits::{BlobStore, RefStore};

/// In-memory, HashMap-based storage backend.
///
/// Intended for tests and embedding. Blobs, refs, and the node hash index
/// are held behind `RwLock`s for safe concurrent access. Nothing is
/// persisted.
pub struct InMemoryStorage {
    blobs: RwLock<HashMap<BlobLocator, Bytes>>,
    refs: RwLock<HashMap<RefName, NodeHandle>>,
    nodes: RwLock<HashMap<ContentHash, NodeLocator>>,
    index_nodes: bool,
}

impl InMemoryStorage {
    /// Create a new empty store with the node hash index enabled.
    pub fn new() -> Self {
        Self {
            blobs: RwLock::new(HashMap::new()),
            refs: RwLock::new(HashMap::new()),
            nodes: RwLock::new(HashMap::new()),
            index_nodes: true,
        }
    }

    /// Create a store that does not remember node hashes, so deduplication
    /// only happens within a single writer session.
    pub fn without_node_index() -> Self {
        Self {
            index_nodes: false,
            ..Self::new()
        }
    }

    /// Number of blobs currently stored.
    pub fn blob_count(&self) -> usize {
        self.blobs.read().expect("lock poisoned").len()
    }

    /// Total bytes across all stored blobs.
    pub fn total_bytes(&self) -> u64 {
        self.blobs
            .read()
            .expect("lock poisoned")
            .values()
            .map(|blob| blob.len() as u64)
            .sum()
    }

    /// Return a sorted list of all blob locators in the store.
    pub fn all_locators(&self) -> Vec<BlobLocator> {
        let map = self.blobs.read().expect("lock poisoned");
        let mut locators: Vec<BlobLocator> = map.keys().cloned().collect();
        locators.sort();
        locators
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobStore for InMemoryStorage {
    async fn put_blob(&self, data: Bytes) -> StoreResult<BlobLocator> {
        let locator = BlobLocator::new(format!("mem/{}", Uuid::now_v7()))?;
        self.blobs
            .write()
            .expect("lock poisoned")
            .insert(locator.clone(), data);
        Ok(locator)
    }

    async fn get_blob(&self, locator: &BlobLocator) -> StoreResult<Bytes> {
        let map = self.blobs.read().expect("lock poisoned");
        map.get(locator)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(locator.clone()))
    }

    async fn has_blob(&self, locator: &BlobLocator) -> StoreResult<bool> {
        Ok(self.blobs.read().expect("lock poisoned").contains_key(locator))
    }

    async fn find_node(&self, hash: &ContentHash) -> StoreResult<Option<NodeLocator>> {
        Ok(self.nodes.read().expect("lock poisoned").get(hash).cloned())
    }

    async fn add_node(&self, hash: ContentHash, locator: NodeLocator) -> StoreResult<()> {
        if self.index_nodes {
            self.nodes
                .write()
                .expect("lock poisoned")
                .entry(hash)
                .or_insert(locator);
        }
        Ok(())
    }
}

#[async_trait]
impl RefStore for InMemoryStorage {
    async fn read_ref(&self, name: &RefName) -> StoreResult<Option<NodeHandle>> {
        Ok(self.refs.read().expect("lock poisoned").get(name).cloned())
    }

    async fn write_ref(&self, name: &RefName, handle: &NodeHandle) -> StoreResult<()> {
        self.refs
            .write()
            .expect("lock poisoned")
            .insert(name.clone(), handle.clone());
        Ok(())
    }

    async fn delete_ref(&self, name: &RefName) -> StoreResult<bool> {
        Ok(self.refs.write().expect("lock poisoned").remove(name).is_some())
    }

    async fn list_refs(&self, prefix: &str) -> StoreResult<Vec<(RefName, NodeHandle)>> {
        let refs = self.refs.read().expect("lock poisoned");
        let mut result: Vec<(RefName, NodeHandle)> = refs
            .iter()
            .filter(|(name, _)| name.as_str().starts_with(prefix))
            .map(|(name, handle)| (name.clone(), handle.clone()))
            .collect();
        result.sort_by(|(a, _), (b, _)| a.cmp(b));
        Ok(result)
    }
}

impl std::fmt::Debug for InMemoryStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStorage")
            .field("blob_count", &self.blob_count())
            .field("index_nodes", &self.index_nodes)
            .finish()
    }
}
