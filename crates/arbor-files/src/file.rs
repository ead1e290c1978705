//! Chunked file content.
//!
//! A file is a tree: leaves hold raw bytes, interior nodes list their
//! children together with each child's byte length so that a range can be
//! located without expanding the children in front of it.

use bytes::{Bytes, BytesMut};

use arbor_bundle::codec::encode_varint;
use arbor_tree::{
    node_hash, AnyNodeRef, DecodeNode, NodeReader, NodeWriter, TreeError, TreeNode, TreeNodeRef,
    TreeReader, TreeResult,
};
use arbor_types::{ContentHash, NodeType};

use crate::error::{FilesError, FilesResult};

pub const LEAF_FILE_TYPE: NodeType = NodeType::new(0x6669_6c65_6c65_4166_9000_0000_0000_0001, 1);
pub const INTERIOR_FILE_TYPE: NodeType =
    NodeType::new(0x6669_6c65_696e_5466_9000_0000_0000_0002, 1);

/// Upper bound on the buffer reserved up front by a range read.
const MAX_RESERVE: u64 = 4 * 1024 * 1024;

/// A chunk of raw file bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeafFileNode {
    pub data: Bytes,
}

impl LeafFileNode {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    pub fn hash(&self) -> ContentHash {
        node_hash(&LEAF_FILE_TYPE, &self.data, [])
    }
}

/// A file subtree with its hash and content length: one child of an
/// interior node, or the root a chunker produces.
#[derive(Clone, Debug)]
pub struct FileChild {
    pub node: TreeNodeRef<FileNode>,
    pub hash: ContentHash,
    /// Content bytes under this child.
    pub length: u64,
}

/// An ordered list of file subtrees.
#[derive(Clone, Debug, Default)]
pub struct InteriorFileNode {
    pub children: Vec<FileChild>,
}

impl InteriorFileNode {
    pub fn new(children: Vec<FileChild>) -> Self {
        Self { children }
    }

    fn payload(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(1 + self.children.len() * 4);
        encode_varint(&mut buf, self.children.len() as u64);
        for child in &self.children {
            encode_varint(&mut buf, child.length);
        }
        buf
    }

    pub fn hash(&self) -> ContentHash {
        node_hash(
            &INTERIOR_FILE_TYPE,
            &self.payload(),
            self.children.iter().map(|c| &c.hash),
        )
    }

    pub fn length(&self) -> u64 {
        self.children
            .iter()
            .fold(0u64, |total, c| total.saturating_add(c.length))
    }
}

/// File content node: a leaf chunk or an interior node over chunks.
#[derive(Clone, Debug)]
pub enum FileNode {
    Leaf(LeafFileNode),
    Interior(InteriorFileNode),
}

impl FileNode {
    /// The empty file.
    pub fn empty() -> Self {
        FileNode::Leaf(LeafFileNode::new(Bytes::new()))
    }

    /// Content hash, identical to the one a tree writer assigns.
    pub fn hash(&self) -> ContentHash {
        match self {
            FileNode::Leaf(leaf) => leaf.hash(),
            FileNode::Interior(interior) => interior.hash(),
        }
    }

    /// Content bytes under this node.
    pub fn length(&self) -> u64 {
        match self {
            FileNode::Leaf(leaf) => leaf.data.len() as u64,
            FileNode::Interior(interior) => interior.length(),
        }
    }

    /// Read the whole file.
    pub async fn read_all(&self, reader: &TreeReader) -> FilesResult<Bytes> {
        self.read_range(reader, 0, self.length()).await
    }

    /// Read `len` bytes starting at `offset`, expanding only the subtrees
    /// that overlap the range.
    pub async fn read_range(&self, reader: &TreeReader, offset: u64, len: u64) -> FilesResult<Bytes> {
        let file_len = self.length();
        let end = offset.checked_add(len).filter(|&end| end <= file_len).ok_or(
            FilesError::OutOfRange {
                offset,
                len,
                file_len,
            },
        )?;
        if len == 0 {
            return Ok(Bytes::new());
        }
        if let FileNode::Leaf(leaf) = self {
            return Ok(leaf.data.slice(offset as usize..end as usize));
        }

        let mut out = BytesMut::with_capacity(len.min(MAX_RESERVE) as usize);
        let mut pending: Vec<PendingChild> = Vec::new();
        push_overlapping(self, 0, offset, end, &mut pending);

        while let Some((node_ref, start, length)) = pending.pop() {
            let node = node_ref.expand(reader).await?;
            if node.length() != length {
                return Err(FilesError::Corrupt(format!(
                    "child at offset {start} holds {} bytes but its parent records {length}",
                    node.length()
                )));
            }
            match node.as_ref() {
                FileNode::Leaf(leaf) => {
                    let from = offset.saturating_sub(start) as usize;
                    let to = (end - start).min(length) as usize;
                    out.extend_from_slice(&leaf.data[from..to]);
                }
                interior => push_overlapping(interior, start, offset, end, &mut pending),
            }
        }
        if out.len() as u64 != len {
            return Err(FilesError::Corrupt(format!(
                "read {} bytes of a {len}-byte range at offset {offset}",
                out.len()
            )));
        }
        Ok(out.freeze())
    }
}

/// A subtree to visit: its ref, start offset and recorded length.
type PendingChild = (TreeNodeRef<FileNode>, u64, u64);

/// Queue the children of `node` (which starts at `start`) that overlap
/// `[offset, end)`, last child first so they pop in file order.
fn push_overlapping(
    node: &FileNode,
    start: u64,
    offset: u64,
    end: u64,
    pending: &mut Vec<PendingChild>,
) {
    let FileNode::Interior(interior) = node else {
        return;
    };
    let mut child_start = start;
    let mut overlapping = Vec::new();
    for child in &interior.children {
        let child_end = child_start.saturating_add(child.length);
        if child_end > offset && child_start < end {
            overlapping.push((child.node.clone(), child_start, child.length));
        }
        child_start = child_end;
    }
    pending.extend(overlapping.into_iter().rev());
}

impl TreeNode for FileNode {
    fn node_type(&self) -> NodeType {
        match self {
            FileNode::Leaf(_) => LEAF_FILE_TYPE,
            FileNode::Interior(_) => INTERIOR_FILE_TYPE,
        }
    }

    fn serialize(&self, writer: &mut NodeWriter<'_>) -> TreeResult<()> {
        match self {
            FileNode::Leaf(leaf) => writer.write_raw(&leaf.data),
            FileNode::Interior(interior) => {
                writer.write_raw(&interior.payload());
                for child in &interior.children {
                    writer.write_ref(&child.node)?;
                }
            }
        }
        Ok(())
    }

    fn enumerate_refs(&self) -> Vec<&dyn AnyNodeRef> {
        match self {
            FileNode::Leaf(_) => Vec::new(),
            FileNode::Interior(interior) => interior
                .children
                .iter()
                .map(|c| &c.node as &dyn AnyNodeRef)
                .collect(),
        }
    }
}

impl DecodeNode for FileNode {
    fn accepts(node_type: &NodeType) -> bool {
        node_type.same_kind(&LEAF_FILE_TYPE) || node_type.same_kind(&INTERIOR_FILE_TYPE)
    }

    fn decode(reader: &mut NodeReader) -> TreeResult<Self> {
        if reader.node_type().same_kind(&LEAF_FILE_TYPE) {
            return Ok(FileNode::Leaf(LeafFileNode::new(reader.read_remaining())));
        }

        let count = reader.read_varint()?;
        if count as usize > reader.refs_remaining() {
            return Err(TreeError::Decode(format!(
                "interior file node lists {count} children but has {} references",
                reader.refs_remaining()
            )));
        }
        let lengths = (0..count)
            .map(|_| reader.read_varint())
            .collect::<TreeResult<Vec<_>>>()?;
        let mut children = Vec::with_capacity(lengths.len());
        for length in lengths {
            let node: TreeNodeRef<FileNode> = reader.read_ref()?;
            let hash = node
                .handle()
                .map(|h| h.hash)
                .ok_or_else(|| TreeError::Decode("file child without a handle".into()))?;
            children.push(FileChild { node, hash, length });
        }
        Ok(FileNode::Interior(InteriorFileNode::new(children)))
    }
}

impl From<LeafFileNode> for FileNode {
    fn from(leaf: LeafFileNode) -> Self {
        FileNode::Leaf(leaf)
    }
}

impl From<InteriorFileNode> for FileNode {
    fn from(interior: InteriorFileNode) -> Self {
        FileNode::Interior(interior)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use crate::chunker::FileNodeWriter;
    use crate::options::{ChunkSizes, ChunkingOptions};
    use arbor_store::InMemoryStorage;
    use arbor_tree::{TreeOptions, TreeWriter};

    fn small_options() -> ChunkingOptions {
        ChunkingOptions {
            leaf: ChunkSizes::new(64, 128, 256),
            interior: ChunkSizes::new(64, 96, 128),
        }
    }

    fn sample_data(len: usize) -> Vec<u8> {
        let mut state: u32 = 12345;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                (state >> 16) as u8
            })
            .collect()
    }

    #[tokio::test]
    async fn read_range_in_memory_and_stored() {
        let data = sample_data(5000);
        let mut writer = FileNodeWriter::new(small_options()).unwrap();
        writer.append(&data);
        let root = writer.finish().node.get().unwrap();
        assert!(matches!(*root, FileNode::Interior(_)));

        let store = Arc::new(InMemoryStorage::new());
        let reader = TreeReader::new(store.clone());
        assert_eq!(root.read_all(&reader).await.unwrap(), &data[..]);
        assert_eq!(
            root.read_range(&reader, 1000, 777).await.unwrap(),
            &data[1000..1777]
        );

        let handle = TreeWriter::new(store, TreeOptions::default())
            .unwrap()
            .flush(&*root)
            .await
            .unwrap();
        assert_eq!(handle.hash, root.hash());

        let stored = reader.read_node::<FileNode>(&handle).await.unwrap();
        assert_eq!(stored.length(), 5000);
        assert_eq!(stored.read_all(&reader).await.unwrap(), &data[..]);
        for (offset, len) in [(0, 1), (63, 200), (4999, 1), (2500, 0)] {
            assert_eq!(
                stored.read_range(&reader, offset, len).await.unwrap(),
                &data[offset as usize..(offset + len) as usize]
            );
        }
    }

    #[tokio::test]
    async fn out_of_range_read_rejected() {
        let reader = TreeReader::new(Arc::new(InMemoryStorage::new()));
        let leaf = FileNode::Leaf(LeafFileNode::new(&b"abc"[..]));
        assert!(matches!(
            leaf.read_range(&reader, 2, 2).await,
            Err(FilesError::OutOfRange { file_len: 3, .. })
        ));
        assert_eq!(leaf.read_range(&reader, 1, 2).await.unwrap(), &b"bc"[..]);
    }

    async fn store_claiming(leaf: &[u8], claimed: u64) -> (TreeReader, Arc<FileNode>) {
        let leaf = LeafFileNode::new(Bytes::copy_from_slice(leaf));
        let child = FileChild {
            hash: leaf.hash(),
            node: TreeNodeRef::new(FileNode::Leaf(leaf)),
            length: claimed,
        };
        let root = FileNode::Interior(InteriorFileNode::new(vec![child]));

        let store = Arc::new(InMemoryStorage::new());
        let handle = TreeWriter::new(store.clone(), TreeOptions::default())
            .unwrap()
            .flush(&root)
            .await
            .unwrap();
        let reader = TreeReader::new(store);
        let stored = reader.read_node::<FileNode>(&handle).await.unwrap();
        (reader, stored)
    }

    #[tokio::test]
    async fn child_longer_than_its_leaf_is_corrupt() {
        let (reader, stored) = store_claiming(b"abc", 5).await;
        assert_eq!(stored.length(), 5);
        assert!(matches!(
            stored.read_range(&reader, 4, 1).await,
            Err(FilesError::Corrupt(_))
        ));
        assert!(matches!(stored.read_all(&reader).await, Err(FilesError::Corrupt(_))));
    }

    #[tokio::test]
    async fn child_shorter_than_its_leaf_is_corrupt() {
        let (reader, stored) = store_claiming(b"abcdef", 2).await;
        assert!(matches!(
            stored.read_range(&reader, 0, 2).await,
            Err(FilesError::Corrupt(_))
        ));
    }

    #[tokio::test]
    async fn oversized_lengths_do_not_overflow() {
        let (reader, stored) = store_claiming(b"abc", u64::MAX).await;
        assert_eq!(stored.length(), u64::MAX);
        assert!(matches!(
            stored.read_range(&reader, u64::MAX - 1, 1).await,
            Err(FilesError::Corrupt(_))
        ));
    }

    #[test]
    fn empty_file_is_an_empty_leaf() {
        let empty = FileNode::empty();
        assert_eq!(empty.length(), 0);
        assert_eq!(empty.node_type(), LEAF_FILE_TYPE);
    }
}
