use async_trait::async_trait;
use bytes::Bytes;

use arbor_types::{BlobLocator, ContentHash, NodeHandle, NodeLocator, RefName};

use crate::error::StoreResult;

/// Blob storage: the physical home of bundles.
///
/// All implementations must satisfy these invariants:
/// - Blobs are immutable once written. A locator is never reused for
///   different bytes.
/// - `put_blob` returns only after the blob is durably readable by
///   `get_blob` (as durable as the backend is).
/// - Concurrent reads are always safe.
/// - The store never interprets blob contents.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store a blob and return the locator assigned to it.
    async fn put_blob(&self, data: Bytes) -> StoreResult<BlobLocator>;

    /// Read a blob by locator.
    ///
    /// Returns `Err(StoreError::NotFound)` if the blob does not exist.
    async fn get_blob(&self, locator: &BlobLocator) -> StoreResult<Bytes>;

    /// Check whether a blob exists.
    async fn has_blob(&self, locator: &BlobLocator) -> StoreResult<bool>;

    /// Look up a previously stored node by content hash.
    ///
    /// Backends without a hash index return `Ok(None)`, which only costs
    /// deduplication across writer sessions.
    async fn find_node(&self, _hash: &ContentHash) -> StoreResult<Option<NodeLocator>> {
        Ok(None)
    }

    /// Record that a node with `hash` is stored at `locator`.
    ///
    /// Called by writers after the containing blob has been stored.
    async fn add_node(&self, _hash: ContentHash, _locator: NodeLocator) -> StoreResult<()> {
        Ok(())
    }
}

/// Registry of named refs, each pointing at one root node.
#[async_trait]
pub trait RefStore: Send + Sync {
    /// Read a ref. Returns `Ok(None)` if the ref does not exist.
    async fn read_ref(&self, name: &RefName) -> StoreResult<Option<NodeHandle>>;

    /// Create or replace a ref. Replacement is atomic: readers observe
    /// either the old or the new handle.
    async fn write_ref(&self, name: &RefName, handle: &NodeHandle) -> StoreResult<()>;

    /// Delete a ref. Returns `true` if the ref existed.
    async fn delete_ref(&self, name: &RefName) -> StoreResult<bool>;

    /// List all refs whose name starts with `prefix`, sorted by name.
    async fn list_refs(&self, prefix: &str) -> StoreResult<Vec<(RefName, NodeHandle)>>;
}

/// A complete backend: blob storage plus ref registry.
pub trait StorageBackend: BlobStore + RefStore {}

impl<T: BlobStore + RefStore + ?Sized> StorageBackend for T {}
