//! The node model: how node kinds serialize themselves and are rebuilt.
//!
//! A node's payload is a flat byte string written through [`NodeWriter`].
//! References to other nodes are not part of the payload. They are written
//! with [`NodeWriter::write_ref`], recorded in the export's reference list,
//! and handed back in the same order by [`NodeReader::read_ref`].

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;

use arbor_bundle::codec::{decode_varint, encode_varint};
use arbor_crypto::ContentHasher;
use arbor_types::{ContentHash, NodeHandle, NodeType};

use crate::error::{TreeError, TreeResult};
use crate::node_ref::TreeNodeRef;

/// A node kind that can be stored in a tree.
///
/// Nodes are immutable once built. A node's identity (its content hash) is
/// only known after all of its children have been serialized.
pub trait TreeNode: Send + Sync + 'static {
    /// Type tag recorded in the bundle's type table.
    fn node_type(&self) -> NodeType;

    /// Write the payload and the references, in order.
    fn serialize(&self, writer: &mut NodeWriter<'_>) -> TreeResult<()>;

    /// Direct references of this node.
    fn enumerate_refs(&self) -> Vec<&dyn AnyNodeRef>;
}

/// A node kind that can be rebuilt from its stored form.
pub trait DecodeNode: TreeNode + Sized {
    /// Whether values stored with `node_type` decode as this kind.
    fn accepts(node_type: &NodeType) -> bool;

    fn decode(reader: &mut NodeReader) -> TreeResult<Self>;
}

/// Type-erased view of a [`TreeNodeRef`].
pub trait AnyNodeRef: Send + Sync {
    /// Where the target is stored, if it has been flushed.
    fn handle(&self) -> Option<&NodeHandle>;

    /// The in-memory target, if there is one.
    fn target(&self) -> Option<Arc<dyn TreeNode>>;
}

/// Content hash of a node: type id, payload, then each child hash.
pub fn node_hash<'a>(
    node_type: &NodeType,
    payload: &[u8],
    children: impl IntoIterator<Item = &'a ContentHash>,
) -> ContentHash {
    let mut builder = ContentHasher::NODE.builder();
    builder.update(node_type.id.as_bytes()).update(payload);
    for child in children {
        builder.update(child.as_bytes());
    }
    builder.finalize()
}

/// Identity of an in-memory node, used to serialize shared nodes once.
pub(crate) fn node_key(node: &dyn TreeNode) -> usize {
    node as *const dyn TreeNode as *const () as usize
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// A reference as recorded while serializing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum WrittenRef {
    /// Target already lives in a bundle.
    Stored(NodeHandle),
    /// Target is an in-memory node of this write, identified by hash.
    Pending(ContentHash),
}

impl WrittenRef {
    pub(crate) fn hash(&self) -> &ContentHash {
        match self {
            WrittenRef::Stored(handle) => &handle.hash,
            WrittenRef::Pending(hash) => hash,
        }
    }
}

/// Sink for a node's payload and references.
pub struct NodeWriter<'a> {
    data: Vec<u8>,
    refs: Vec<WrittenRef>,
    resolved: &'a HashMap<usize, ContentHash>,
}

impl<'a> NodeWriter<'a> {
    pub(crate) fn new(resolved: &'a HashMap<usize, ContentHash>) -> Self {
        Self {
            data: Vec::new(),
            refs: Vec::new(),
            resolved,
        }
    }

    pub(crate) fn into_parts(self) -> (Vec<u8>, Vec<WrittenRef>) {
        (self.data, self.refs)
    }

    pub fn write_u8(&mut self, value: u8) {
        self.data.push(value);
    }

    pub fn write_bool(&mut self, value: bool) {
        self.data.push(value as u8);
    }

    pub fn write_u32(&mut self, value: u32) {
        self.data.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.data.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_varint(&mut self, value: u64) {
        encode_varint(&mut self.data, value);
    }

    /// Length-prefixed byte string.
    pub fn write_bytes(&mut self, value: &[u8]) {
        self.write_varint(value.len() as u64);
        self.data.extend_from_slice(value);
    }

    /// Bytes with no length prefix; the reader must know where they end.
    pub fn write_raw(&mut self, value: &[u8]) {
        self.data.extend_from_slice(value);
    }

    pub fn write_str(&mut self, value: &str) {
        self.write_bytes(value.as_bytes());
    }

    pub fn write_hash(&mut self, value: &ContentHash) {
        self.data.extend_from_slice(value.as_bytes());
    }

    /// Record a reference to another node.
    pub fn write_ref(&mut self, node_ref: &dyn AnyNodeRef) -> TreeResult<()> {
        if let Some(handle) = node_ref.handle() {
            self.refs.push(WrittenRef::Stored(handle.clone()));
            return Ok(());
        }
        let target = node_ref.target().ok_or_else(|| {
            TreeError::UnresolvedReference("reference has neither a handle nor a target".into())
        })?;
        let hash = self.resolved.get(&node_key(target.as_ref())).ok_or_else(|| {
            TreeError::UnresolvedReference(
                "child was not listed by enumerate_refs before serialization".into(),
            )
        })?;
        self.refs.push(WrittenRef::Pending(*hash));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// Source of a stored node's payload and references.
#[derive(Debug)]
pub struct NodeReader {
    node_type: NodeType,
    data: Bytes,
    pos: usize,
    refs: std::vec::IntoIter<NodeHandle>,
}

impl NodeReader {
    pub fn new(node_type: NodeType, data: Bytes, refs: Vec<NodeHandle>) -> Self {
        Self {
            node_type,
            data,
            pos: 0,
            refs: refs.into_iter(),
        }
    }

    /// Type tag the node was stored with.
    pub fn node_type(&self) -> NodeType {
        self.node_type
    }

    /// Payload bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// References not yet consumed.
    pub fn refs_remaining(&self) -> usize {
        self.refs.len()
    }

    fn take(&mut self, len: usize) -> TreeResult<Bytes> {
        if self.remaining() < len {
            return Err(TreeError::Decode(format!(
                "{} node truncated: wanted {len} bytes at offset {}, {} left",
                self.node_type,
                self.pos,
                self.remaining()
            )));
        }
        let out = self.data.slice(self.pos..self.pos + len);
        self.pos += len;
        Ok(out)
    }

    pub fn read_u8(&mut self) -> TreeResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_bool(&mut self) -> TreeResult<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(TreeError::Decode(format!("invalid bool byte {other}"))),
        }
    }

    pub fn read_u32(&mut self) -> TreeResult<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_u64(&mut self) -> TreeResult<u64> {
        let bytes = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&bytes);
        Ok(u64::from_be_bytes(buf))
    }

    pub fn read_varint(&mut self) -> TreeResult<u64> {
        let (value, consumed) = decode_varint(&self.data[self.pos..])
            .map_err(|e| TreeError::Decode(format!("{} node: {e}", self.node_type)))?;
        self.pos += consumed;
        Ok(value)
    }

    /// A length-prefixed byte string, as written by [`NodeWriter::write_bytes`].
    pub fn read_bytes(&mut self) -> TreeResult<Bytes> {
        let len = self.read_varint()?;
        let len = usize::try_from(len)
            .map_err(|_| TreeError::Decode(format!("length {len} too large")))?;
        self.take(len)
    }

    pub fn read_raw(&mut self, len: usize) -> TreeResult<Bytes> {
        self.take(len)
    }

    /// Everything left in the payload.
    pub fn read_remaining(&mut self) -> Bytes {
        let out = self.data.slice(self.pos..);
        self.pos = self.data.len();
        out
    }

    pub fn read_str(&mut self) -> TreeResult<String> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| TreeError::Decode(format!("invalid UTF-8 string: {e}")))
    }

    pub fn read_hash(&mut self) -> TreeResult<ContentHash> {
        let bytes = self.take(ContentHash::LEN)?;
        ContentHash::from_slice(&bytes).map_err(|e| TreeError::Decode(e.to_string()))
    }

    /// The next reference, as a located ref that expands on demand.
    pub fn read_ref<T>(&mut self) -> TreeResult<TreeNodeRef<T>> {
        let handle = self.refs.next().ok_or_else(|| {
            TreeError::Decode(format!("{} node has fewer references than fields", self.node_type))
        })?;
        Ok(TreeNodeRef::located(handle))
    }
}
