//! Content-addressed node trees for Arbor.
//!
//! Node kinds implement [`TreeNode`] (and [`DecodeNode`] to be read back).
//! A [`TreeWriter`] serializes a graph in post-order, deduplicates nodes by
//! content hash, packs them into bundles and finally points a ref at the
//! root. A [`TreeReader`] resolves refs and decodes nodes lazily: children
//! arrive as located [`TreeNodeRef`]s that are fetched on [`expand`].
//!
//! [`expand`]: TreeNodeRef::expand

pub mod cache;
pub mod error;
pub mod leaf;
pub mod node;
pub mod node_ref;
pub mod options;
pub mod reader;
pub mod registry;
pub mod writer;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{CachedNode, LruNodeCache, NodeCache};
pub use error::{TreeError, TreeResult};
pub use leaf::LeafNode;
pub use node::{node_hash, AnyNodeRef, DecodeNode, NodeReader, NodeWriter, TreeNode};
pub use node_ref::TreeNodeRef;
pub use options::TreeOptions;
pub use reader::TreeReader;
pub use registry::{DecodeFn, NodeRegistry};
pub use writer::{TreeWriter, WriteStats};
