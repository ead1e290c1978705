use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use arbor_types::NodeType;

use crate::error::{TreeError, TreeResult};
use crate::leaf::LeafNode;
use crate::node::{DecodeNode, NodeReader, TreeNode};

/// Decoder for one node kind, erased to a trait object.
pub type DecodeFn = fn(&mut NodeReader) -> TreeResult<Arc<dyn TreeNode>>;

fn decode_erased<T: DecodeNode>(reader: &mut NodeReader) -> TreeResult<Arc<dyn TreeNode>> {
    Ok(Arc::new(T::decode(reader)?))
}

/// Maps type ids to decoders for reads that do not name a node kind.
#[derive(Clone, Default)]
pub struct NodeRegistry {
    decoders: HashMap<Uuid, DecodeFn>,
}

impl NodeRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry that knows the node kinds defined in this crate.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register::<LeafNode>(LeafNode::NODE_TYPE);
        registry
    }

    /// Decode values stored with `node_type`'s id as `T`.
    pub fn register<T: DecodeNode>(&mut self, node_type: NodeType) -> &mut Self {
        self.decoders.insert(node_type.id, decode_erased::<T>);
        self
    }

    pub fn contains(&self, node_type: &NodeType) -> bool {
        self.decoders.contains_key(&node_type.id)
    }

    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }

    /// Decode a node of whatever kind `reader` holds.
    pub fn decode(&self, reader: &mut NodeReader) -> TreeResult<Arc<dyn TreeNode>> {
        let node_type = reader.node_type();
        let decode = self
            .decoders
            .get(&node_type.id)
            .ok_or(TreeError::UnknownType(node_type))?;
        decode(reader)
    }
}

impl std::fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRegistry")
            .field("kinds", &self.decoders.len())
            .finish()
    }
}
