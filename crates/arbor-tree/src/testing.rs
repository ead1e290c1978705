//! Node kinds and backends shared by the unit tests of this crate.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;

use arbor_store::{BlobStore, InMemoryStorage, RefStore, StoreError, StoreResult};
use arbor_types::{BlobLocator, ContentHash, NodeHandle, NodeLocator, NodeType, RefName};

use crate::error::TreeResult;
use crate::leaf::LeafNode;
use crate::node::{AnyNodeRef, DecodeNode, NodeReader, NodeWriter, TreeNode};
use crate::node_ref::TreeNodeRef;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub fn leaf(data: &[u8]) -> TreeNodeRef<LeafNode> {
    TreeNodeRef::new(LeafNode::new(Bytes::copy_from_slice(data)))
}

// ---------------------------------------------------------------------------
// Node kinds
// ---------------------------------------------------------------------------

/// Labelled interior node with two lists of children.
#[derive(Debug)]
pub struct BranchNode {
    pub label: String,
    pub branches: Vec<TreeNodeRef<BranchNode>>,
    pub leaves: Vec<TreeNodeRef<LeafNode>>,
}

impl BranchNode {
    pub const NODE_TYPE: NodeType = NodeType::new(0x7e57_b4a0, 1);

    pub fn new(
        label: &str,
        branches: Vec<TreeNodeRef<BranchNode>>,
        leaves: Vec<TreeNodeRef<LeafNode>>,
    ) -> Self {
        Self {
            label: label.to_string(),
            branches,
            leaves,
        }
    }
}

impl TreeNode for BranchNode {
    fn node_type(&self) -> NodeType {
        Self::NODE_TYPE
    }

    fn serialize(&self, writer: &mut NodeWriter<'_>) -> TreeResult<()> {
        writer.write_str(&self.label);
        writer.write_varint(self.branches.len() as u64);
        writer.write_varint(self.leaves.len() as u64);
        for branch in &self.branches {
            writer.write_ref(branch)?;
        }
        for leaf in &self.leaves {
            writer.write_ref(leaf)?;
        }
        Ok(())
    }

    fn enumerate_refs(&self) -> Vec<&dyn AnyNodeRef> {
        let mut refs: Vec<&dyn AnyNodeRef> = Vec::new();
        refs.extend(self.branches.iter().map(|r| r as &dyn AnyNodeRef));
        refs.extend(self.leaves.iter().map(|r| r as &dyn AnyNodeRef));
        refs
    }
}

impl DecodeNode for BranchNode {
    fn accepts(node_type: &NodeType) -> bool {
        node_type.same_kind(&Self::NODE_TYPE)
    }

    fn decode(reader: &mut NodeReader) -> TreeResult<Self> {
        let label = reader.read_str()?;
        let branch_count = reader.read_varint()?;
        let leaf_count = reader.read_varint()?;
        let branches = (0..branch_count)
            .map(|_| reader.read_ref())
            .collect::<TreeResult<Vec<_>>>()?;
        let leaves = (0..leaf_count)
            .map(|_| reader.read_ref())
            .collect::<TreeResult<Vec<_>>>()?;
        Ok(Self {
            label,
            branches,
            leaves,
        })
    }
}

/// Writes a reference it does not report from `enumerate_refs`.
pub struct UnlistedNode {
    pub child: TreeNodeRef<LeafNode>,
}

impl TreeNode for UnlistedNode {
    fn node_type(&self) -> NodeType {
        NodeType::new(0xbad, 1)
    }

    fn serialize(&self, writer: &mut NodeWriter<'_>) -> TreeResult<()> {
        writer.write_ref(&self.child)
    }

    fn enumerate_refs(&self) -> Vec<&dyn AnyNodeRef> {
        Vec::new()
    }
}

// ---------------------------------------------------------------------------
// Backends
// ---------------------------------------------------------------------------

/// In-memory backend that counts blob fetches.
#[derive(Default)]
pub struct CountingStorage {
    inner: InMemoryStorage,
    gets: AtomicUsize,
}

impl CountingStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlobStore for CountingStorage {
    async fn put_blob(&self, data: Bytes) -> StoreResult<BlobLocator> {
        self.inner.put_blob(data).await
    }

    async fn get_blob(&self, locator: &BlobLocator) -> StoreResult<Bytes> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get_blob(locator).await
    }

    async fn has_blob(&self, locator: &BlobLocator) -> StoreResult<bool> {
        self.inner.has_blob(locator).await
    }

    async fn find_node(&self, hash: &ContentHash) -> StoreResult<Option<NodeLocator>> {
        self.inner.find_node(hash).await
    }

    async fn add_node(&self, hash: ContentHash, locator: NodeLocator) -> StoreResult<()> {
        self.inner.add_node(hash, locator).await
    }
}

#[async_trait]
impl RefStore for CountingStorage {
    async fn read_ref(&self, name: &RefName) -> StoreResult<Option<NodeHandle>> {
        self.inner.read_ref(name).await
    }

    async fn write_ref(&self, name: &RefName, handle: &NodeHandle) -> StoreResult<()> {
        self.inner.write_ref(name, handle).await
    }

    async fn delete_ref(&self, name: &RefName) -> StoreResult<bool> {
        self.inner.delete_ref(name).await
    }

    async fn list_refs(&self, prefix: &str) -> StoreResult<Vec<(RefName, NodeHandle)>> {
        self.inner.list_refs(prefix).await
    }
}

/// In-memory backend whose `put_blob` fails after a fixed number of calls.
pub struct FailingStorage {
    inner: InMemoryStorage,
    remaining_puts: AtomicUsize,
}

impl FailingStorage {
    pub fn new(successful_puts: usize) -> Self {
        Self {
            inner: InMemoryStorage::new(),
            remaining_puts: AtomicUsize::new(successful_puts),
        }
    }
}

#[async_trait]
impl BlobStore for FailingStorage {
    async fn put_blob(&self, data: Bytes) -> StoreResult<BlobLocator> {
        let allowed = self
            .remaining_puts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if !allowed {
            return Err(StoreError::Io(std::io::Error::other("injected put failure")));
        }
        self.inner.put_blob(data).await
    }

    async fn get_blob(&self, locator: &BlobLocator) -> StoreResult<Bytes> {
        self.inner.get_blob(locator).await
    }

    async fn has_blob(&self, locator: &BlobLocator) -> StoreResult<bool> {
        self.inner.has_blob(locator).await
    }
}

#[async_trait]
impl RefStore for FailingStorage {
    async fn read_ref(&self, name: &RefName) -> StoreResult<Option<NodeHandle>> {
        self.inner.read_ref(name).await
    }

    async fn write_ref(&self, name: &RefName, handle: &NodeHandle) -> StoreResult<()> {
        self.inner.write_ref(name, handle).await
    }

    async fn delete_ref(&self, name: &RefName) -> StoreResult<bool> {
        self.inner.delete_ref(name).await
    }

    async fn list_refs(&self, prefix: &str) -> StoreResult<Vec<(RefName, NodeHandle)>> {
        self.inner.list_refs(prefix).await
    }
}
