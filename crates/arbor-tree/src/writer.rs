//! Writes node graphs into bundles.
//!
//! The graph is walked in post-order. Each distinct node is serialized,
//! hashed and packed into the open bundle as soon as its children are
//! done, skipping any node whose hash is already stored, so children
//! always land in an earlier or the same bundle as their parents. Nothing
//! but the open bundle and the hashes of visited nodes is held while a
//! graph is written.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use arbor_bundle::{BundleBuilder, ExportRef};
use arbor_store::{BlobStore, RefStore, StorageBackend};
use arbor_types::{ContentHash, NodeHandle, NodeLocator, NodeType, RefName};

use crate::error::{TreeError, TreeResult};
use crate::node::{node_hash, node_key, NodeWriter, TreeNode, WrittenRef};
use crate::options::TreeOptions;

/// Counters kept across the lifetime of a [`TreeWriter`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct WriteStats {
    /// Distinct in-memory nodes serialized.
    pub nodes_visited: u64,
    /// Exports added to bundles.
    pub exports_written: u64,
    /// Nodes skipped because an identical node was already stored.
    pub exports_deduplicated: u64,
    pub blobs_written: u64,
    pub bytes_written: u64,
}

/// A node serialized and waiting to be packed.
struct Serialized {
    node_type: NodeType,
    hash: ContentHash,
    data: Vec<u8>,
    refs: Vec<WrittenRef>,
}

/// A node on the walk stack.
enum Visit<'a> {
    Borrowed(&'a dyn TreeNode),
    Shared(Arc<dyn TreeNode>),
}

impl Visit<'_> {
    fn node(&self) -> &dyn TreeNode {
        match self {
            Visit::Borrowed(node) => *node,
            Visit::Shared(node) => node.as_ref(),
        }
    }
}

/// The bundle currently being filled.
struct OpenBundle {
    builder: BundleBuilder,
    members: Vec<(ContentHash, u32)>,
    index: HashMap<ContentHash, u32>,
}

impl OpenBundle {
    fn new(options: &TreeOptions) -> Self {
        Self {
            builder: BundleBuilder::new(options.compression, options.packet_size),
            members: Vec::new(),
            index: HashMap::new(),
        }
    }
}

/// Stores node graphs and binds refs to their roots.
///
/// One writer is one session: nodes stored by earlier calls are remembered
/// by hash and never written twice. Backends with a node index extend that
/// deduplication across sessions.
pub struct TreeWriter {
    store: Arc<dyn StorageBackend>,
    options: TreeOptions,
    written: HashMap<ContentHash, NodeLocator>,
    stats: WriteStats,
}

impl TreeWriter {
    pub fn new(store: Arc<dyn StorageBackend>, options: TreeOptions) -> TreeResult<Self> {
        options.validate()?;
        Ok(Self {
            store,
            options,
            written: HashMap::new(),
            stats: WriteStats::default(),
        })
    }

    pub fn options(&self) -> &TreeOptions {
        &self.options
    }

    pub fn stats(&self) -> WriteStats {
        self.stats
    }

    /// Store the graph under `root` and point `name` at it.
    ///
    /// The ref is only updated after every bundle has been stored; if any
    /// step fails the ref keeps its previous value.
    pub async fn write(&mut self, name: &RefName, root: &dyn TreeNode) -> TreeResult<NodeHandle> {
        let handle = self.flush(root).await?;
        self.store.write_ref(name, &handle).await?;
        info!(%name, %handle, "committed ref");
        Ok(handle)
    }

    /// Store the graph under `root` without binding a ref.
    pub async fn flush(&mut self, root: &dyn TreeNode) -> TreeResult<NodeHandle> {
        let mut handles = self.flush_all(&[root]).await?;
        handles
            .pop()
            .ok_or_else(|| TreeError::UnresolvedReference("root was not stored".into()))
    }

    /// Store several graphs in one pass, packing them into shared bundles.
    ///
    /// Returns one handle per root, in order. Producers use this to move
    /// finished subtrees out of memory in batches and keep only the
    /// returned handles.
    pub async fn flush_all(&mut self, roots: &[&dyn TreeNode]) -> TreeResult<Vec<NodeHandle>> {
        let mut resolved: HashMap<usize, ContentHash> = HashMap::new();
        let mut open = OpenBundle::new(&self.options);
        let mut root_hashes = Vec::with_capacity(roots.len());

        for &root in roots {
            let mut stack = vec![(Visit::Borrowed(root), false)];
            while let Some((visit, children_done)) = stack.pop() {
                let key = node_key(visit.node());
                if resolved.contains_key(&key) {
                    continue;
                }
                if !children_done {
                    let children = unwritten_children(visit.node())?;
                    stack.push((visit, true));
                    stack.extend(children.into_iter().rev().map(|c| (Visit::Shared(c), false)));
                    continue;
                }

                let node = serialize(visit.node(), &resolved)?;
                resolved.insert(key, node.hash);
                self.stats.nodes_visited += 1;
                self.pack(&mut open, node).await?;
            }
            let hash = resolved.get(&node_key(root)).copied().ok_or_else(|| {
                TreeError::UnresolvedReference("root was not serialized".into())
            })?;
            root_hashes.push(hash);
        }
        self.flush_bundle(&mut open).await?;

        root_hashes
            .into_iter()
            .map(|hash| {
                let locator = self.written.get(&hash).cloned().ok_or_else(|| {
                    TreeError::UnresolvedReference(format!("root {hash} was not stored"))
                })?;
                Ok(NodeHandle::new(hash, locator))
            })
            .collect()
    }

    /// Add `node` to the open bundle unless an identical node is stored.
    async fn pack(&mut self, open: &mut OpenBundle, node: Serialized) -> TreeResult<()> {
        if self.written.contains_key(&node.hash) || open.index.contains_key(&node.hash) {
            self.stats.exports_deduplicated += 1;
            return Ok(());
        }
        if let Some(locator) = self.store.find_node(&node.hash).await? {
            self.written.insert(node.hash, locator);
            self.stats.exports_deduplicated += 1;
            return Ok(());
        }

        let would_overflow = open.builder.payload_len() + node.data.len() as u64
            > self.options.max_blob_size as u64
            || open.builder.export_count() >= self.options.max_exports_per_blob;
        if !open.builder.is_empty() && would_overflow {
            self.flush_bundle(open).await?;
        }

        let refs = node
            .refs
            .iter()
            .map(|r| self.resolve(open, r))
            .collect::<TreeResult<Vec<_>>>()?;
        let index = open
            .builder
            .add_export(node.node_type, node.hash, &node.data, refs)?;
        open.members.push((node.hash, index));
        open.index.insert(node.hash, index);
        Ok(())
    }

    fn resolve(&self, open: &OpenBundle, written_ref: &WrittenRef) -> TreeResult<ExportRef> {
        match written_ref {
            WrittenRef::Stored(handle) => Ok(ExportRef::Import(handle.clone())),
            WrittenRef::Pending(hash) => {
                if let Some(&index) = open.index.get(hash) {
                    return Ok(ExportRef::Local(index));
                }
                let locator = self.written.get(hash).ok_or_else(|| {
                    TreeError::UnresolvedReference(format!("child {hash} stored after its parent"))
                })?;
                Ok(ExportRef::Import(NodeHandle::new(*hash, locator.clone())))
            }
        }
    }

    async fn flush_bundle(&mut self, open: &mut OpenBundle) -> TreeResult<()> {
        if open.builder.is_empty() {
            return Ok(());
        }
        let builder = std::mem::replace(
            &mut open.builder,
            BundleBuilder::new(self.options.compression, self.options.packet_size),
        );
        let exports = builder.export_count();
        let data = builder.finish()?;
        let bytes = data.len() as u64;
        let blob = self.store.put_blob(data).await?;

        for (hash, index) in open.members.drain(..) {
            let locator = NodeLocator::new(blob.clone(), index);
            self.store.add_node(hash, locator.clone()).await?;
            self.written.insert(hash, locator);
        }
        open.index.clear();

        self.stats.exports_written += exports as u64;
        self.stats.blobs_written += 1;
        self.stats.bytes_written += bytes;
        debug!(%blob, exports, bytes, stats = ?self.stats, "flushed bundle");
        Ok(())
    }
}

/// In-memory children of `node` that still need writing.
fn unwritten_children(node: &dyn TreeNode) -> TreeResult<Vec<Arc<dyn TreeNode>>> {
    let mut children = Vec::new();
    for child_ref in node.enumerate_refs() {
        if child_ref.handle().is_some() {
            continue;
        }
        let child = child_ref.target().ok_or_else(|| {
            TreeError::UnresolvedReference("reference has neither a handle nor a target".into())
        })?;
        children.push(child);
    }
    Ok(children)
}

fn serialize(node: &dyn TreeNode, resolved: &HashMap<usize, ContentHash>) -> TreeResult<Serialized> {
    let (data, refs) = {
        let mut writer = NodeWriter::new(resolved);
        node.serialize(&mut writer)?;
        writer.into_parts()
    };
    let node_type = node.node_type();
    let hash = node_hash(&node_type, &data, refs.iter().map(WrittenRef::hash));
    Ok(Serialized {
        node_type,
        hash,
        data,
        refs,
    })
}

impl std::fmt::Debug for TreeWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeWriter")
            .field("options", &self.options)
            .field("known_nodes", &self.written.len())
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leaf::LeafNode;
    use crate::node_ref::TreeNodeRef;
    use crate::reader::TreeReader;
    use crate::testing::{init_tracing, leaf, BranchNode, FailingStorage};
    use arbor_store::InMemoryStorage;

    fn name(s: &str) -> RefName {
        RefName::new(s).unwrap()
    }

    fn one_per_blob() -> TreeOptions {
        TreeOptions {
            max_exports_per_blob: 1,
            ..Default::default()
        }
    }

    // -----------------------------------------------------------------------
    // Round trip
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn tree_roundtrip() {
        init_tracing();
        let store = Arc::new(InMemoryStorage::new());
        let inner = BranchNode::new("inner", vec![], vec![leaf(b"alpha"), leaf(b"beta")]);
        let root = BranchNode::new("root", vec![TreeNodeRef::new(inner)], vec![leaf(b"gamma")]);

        let mut writer = TreeWriter::new(store.clone(), TreeOptions::default()).unwrap();
        let handle = writer.write(&name("trees/main"), &root).await.unwrap();

        let reader = TreeReader::new(store.clone());
        let back = reader.read::<BranchNode>(&name("trees/main")).await.unwrap();
        assert_eq!(reader.read_ref(&name("trees/main")).await.unwrap(), handle);
        assert_eq!(back.label, "root");

        let inner = back.branches[0].expand(&reader).await.unwrap();
        assert_eq!(inner.label, "inner");
        let mut texts = Vec::new();
        for leaf_ref in &inner.leaves {
            texts.push(leaf_ref.expand(&reader).await.unwrap().data.clone());
        }
        assert_eq!(texts, vec![&b"alpha"[..], &b"beta"[..]]);
        assert_eq!(
            back.leaves[0].expand(&reader).await.unwrap().data,
            &b"gamma"[..]
        );
    }

    #[tokio::test]
    async fn same_graph_same_root_hash() {
        let build = || BranchNode::new("r", vec![], vec![leaf(b"1"), leaf(b"2")]);
        let a = TreeWriter::new(Arc::new(InMemoryStorage::new()), TreeOptions::default())
            .unwrap()
            .flush(&build())
            .await
            .unwrap();
        let b = TreeWriter::new(Arc::new(InMemoryStorage::new()), one_per_blob())
            .unwrap()
            .flush(&build())
            .await
            .unwrap();
        assert_eq!(a.hash, b.hash);
    }

    // -----------------------------------------------------------------------
    // Deduplication
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn identical_children_stored_once() {
        let store = Arc::new(InMemoryStorage::new());
        let root = BranchNode::new(
            "root",
            vec![
                TreeNodeRef::new(BranchNode::new("empty", vec![], vec![])),
                TreeNodeRef::new(BranchNode::new("empty", vec![], vec![])),
                TreeNodeRef::new(BranchNode::new("empty", vec![], vec![])),
            ],
            vec![],
        );
        let mut writer = TreeWriter::new(store.clone(), one_per_blob()).unwrap();
        writer.write(&name("dedup"), &root).await.unwrap();

        assert_eq!(store.blob_count(), 2);
        let stats = writer.stats();
        assert_eq!(stats.nodes_visited, 4);
        assert_eq!(stats.exports_written, 2);
        assert_eq!(stats.exports_deduplicated, 2);
    }

    #[tokio::test]
    async fn shared_child_serialized_once() {
        let store = Arc::new(InMemoryStorage::new());
        let shared = TreeNodeRef::new(LeafNode::new(&b"shared"[..]));
        let root = BranchNode::new("root", vec![], vec![shared.clone(), shared]);
        let mut writer = TreeWriter::new(store, TreeOptions::default()).unwrap();
        writer.flush(&root).await.unwrap();
        assert_eq!(writer.stats().nodes_visited, 2);
        assert_eq!(writer.stats().exports_written, 2);
    }

    #[tokio::test]
    async fn second_session_reuses_stored_nodes() {
        let store = Arc::new(InMemoryStorage::new());
        let build = || BranchNode::new("r", vec![], vec![leaf(b"one"), leaf(b"two")]);

        let mut first = TreeWriter::new(store.clone(), TreeOptions::default()).unwrap();
        let a = first.flush(&build()).await.unwrap();

        let mut second = TreeWriter::new(store.clone(), TreeOptions::default()).unwrap();
        let b = second.flush(&build()).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(second.stats().blobs_written, 0);
        assert_eq!(store.blob_count(), 1);
    }

    #[tokio::test]
    async fn without_node_index_sessions_rewrite() {
        let store = Arc::new(InMemoryStorage::without_node_index());
        let build = || BranchNode::new("r", vec![], vec![leaf(b"one")]);

        TreeWriter::new(store.clone(), TreeOptions::default())
            .unwrap()
            .flush(&build())
            .await
            .unwrap();
        let mut second = TreeWriter::new(store.clone(), TreeOptions::default()).unwrap();
        second.flush(&build()).await.unwrap();
        assert_eq!(second.stats().blobs_written, 1);
        assert_eq!(store.blob_count(), 2);
    }

    #[tokio::test]
    async fn located_children_become_imports() {
        let store = Arc::new(InMemoryStorage::new());
        let base = BranchNode::new("base", vec![], vec![leaf(b"kept")]);
        let mut writer = TreeWriter::new(store.clone(), TreeOptions::default()).unwrap();
        writer.write(&name("v1"), &base).await.unwrap();

        let reader = TreeReader::new(store.clone());
        let stored = reader.read::<BranchNode>(&name("v1")).await.unwrap();
        let next = BranchNode::new(
            "next",
            vec![],
            vec![stored.leaves[0].clone(), leaf(b"added")],
        );

        let mut fresh = TreeWriter::new(store.clone(), TreeOptions::default()).unwrap();
        fresh.write(&name("v2"), &next).await.unwrap();
        assert_eq!(fresh.stats().nodes_visited, 2);
        assert_eq!(fresh.stats().exports_written, 2);

        let v2 = reader.read::<BranchNode>(&name("v2")).await.unwrap();
        assert_eq!(v2.leaves[0].handle(), stored.leaves[0].handle());
        assert_eq!(
            v2.leaves[0].expand(&reader).await.unwrap().data,
            &b"kept"[..]
        );
    }

    // -----------------------------------------------------------------------
    // Bundle limits
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn payload_limit_splits_bundles() {
        let store = Arc::new(InMemoryStorage::new());
        let leaves = (0..4u8).map(|i| leaf(&[i; 100])).collect();
        let root = BranchNode::new("root", vec![], leaves);
        let options = TreeOptions {
            max_blob_size: 250,
            ..Default::default()
        };
        let mut writer = TreeWriter::new(store.clone(), options).unwrap();
        let handle = writer.flush(&root).await.unwrap();

        // Two leaves fit per bundle; the root goes with the last pair.
        assert_eq!(store.blob_count(), 2);
        let reader = TreeReader::new(store.clone());
        let back = reader.read_node::<BranchNode>(&handle).await.unwrap();
        for (i, leaf_ref) in back.leaves.iter().enumerate() {
            assert_eq!(leaf_ref.expand(&reader).await.unwrap().data, vec![i as u8; 100]);
        }
    }

    // -----------------------------------------------------------------------
    // Failure atomicity
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn failed_flush_leaves_ref_untouched() {
        let store = Arc::new(FailingStorage::new(1));
        let mut writer = TreeWriter::new(store.clone(), one_per_blob()).unwrap();

        let first = BranchNode::new("first", vec![], vec![]);
        let before = writer.write(&name("r"), &first).await.unwrap();

        let second = BranchNode::new("second", vec![], vec![leaf(b"payload")]);
        assert!(writer.write(&name("r"), &second).await.is_err());

        let reader = TreeReader::new(store.clone());
        assert_eq!(reader.read_ref(&name("r")).await.unwrap(), before);
    }

    #[tokio::test]
    async fn dangling_materialized_ref_rejected() {
        let store = Arc::new(InMemoryStorage::new());
        let root = crate::testing::UnlistedNode {
            child: leaf(b"hidden"),
        };
        let mut writer = TreeWriter::new(store, TreeOptions::default()).unwrap();
        assert!(matches!(
            writer.flush(&root).await,
            Err(TreeError::UnresolvedReference(_))
        ));
    }

    #[tokio::test]
    async fn flush_all_packs_roots_together() {
        let store = Arc::new(InMemoryStorage::new());
        let shared = TreeNodeRef::new(LeafNode::new(&b"shared"[..]));
        let a = BranchNode::new("a", vec![], vec![shared.clone(), leaf(b"only a")]);
        let b = BranchNode::new("b", vec![], vec![shared, leaf(b"only b")]);

        let mut writer = TreeWriter::new(store.clone(), TreeOptions::default()).unwrap();
        let handles = writer.flush_all(&[&a as &dyn TreeNode, &b]).await.unwrap();
        assert_eq!(handles.len(), 2);
        assert_eq!(store.blob_count(), 1);
        assert_eq!(writer.stats().exports_written, 5);

        let reader = TreeReader::new(store.clone());
        let back_a = reader.read_node::<BranchNode>(&handles[0]).await.unwrap();
        let back_b = reader.read_node::<BranchNode>(&handles[1]).await.unwrap();
        assert_eq!(back_a.label, "a");
        assert_eq!(back_b.label, "b");
        assert_eq!(back_a.leaves[0].handle(), back_b.leaves[0].handle());
    }

    #[tokio::test]
    async fn flushed_subtrees_can_be_referenced_by_handle() {
        let store = Arc::new(InMemoryStorage::new());
        let mut writer = TreeWriter::new(store.clone(), TreeOptions::default()).unwrap();

        let part = BranchNode::new("part", vec![], vec![leaf(b"early")]);
        let part_handle = writer.flush(&part).await.unwrap();
        let root = BranchNode::new(
            "root",
            vec![TreeNodeRef::located(part_handle.clone())],
            vec![leaf(b"late")],
        );
        let handle = writer.write(&name("staged"), &root).await.unwrap();

        // The staged root hashes the same as the graph written in one go.
        let whole = BranchNode::new(
            "root",
            vec![TreeNodeRef::new(BranchNode::new("part", vec![], vec![leaf(b"early")]))],
            vec![leaf(b"late")],
        );
        let direct = TreeWriter::new(Arc::new(InMemoryStorage::new()), TreeOptions::default())
            .unwrap()
            .flush(&whole)
            .await
            .unwrap();
        assert_eq!(handle.hash, direct.hash);

        let reader = TreeReader::new(store);
        let back = reader.read::<BranchNode>(&name("staged")).await.unwrap();
        assert_eq!(back.branches[0].handle(), Some(&part_handle));
    }

    #[test]
    fn invalid_options_rejected() {
        let options = TreeOptions {
            packet_size: 0,
            ..Default::default()
        };
        assert!(TreeWriter::new(Arc::new(InMemoryStorage::new()), options).is_err());
    }
}
