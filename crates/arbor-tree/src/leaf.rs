use bytes::Bytes;

use arbor_types::NodeType;

use crate::error::TreeResult;
use crate::node::{AnyNodeRef, DecodeNode, NodeReader, NodeWriter, TreeNode};

/// A node holding an opaque byte string and no references.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeafNode {
    pub data: Bytes,
}

impl LeafNode {
    pub const NODE_TYPE: NodeType = NodeType::new(0x6c65_6166_0000_4000_8000_0000_0000_0001, 1);

    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }
}

impl TreeNode for LeafNode {
    fn node_type(&self) -> NodeType {
        Self::NODE_TYPE
    }

    fn serialize(&self, writer: &mut NodeWriter<'_>) -> TreeResult<()> {
        writer.write_raw(&self.data);
        Ok(())
    }

    fn enumerate_refs(&self) -> Vec<&dyn AnyNodeRef> {
        Vec::new()
    }
}

impl DecodeNode for LeafNode {
    fn accepts(node_type: &NodeType) -> bool {
        node_type.same_kind(&Self::NODE_TYPE)
    }

    fn decode(reader: &mut NodeReader) -> TreeResult<Self> {
        Ok(Self {
            data: reader.read_remaining(),
        })
    }
}
