use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Type tag recorded for every export in a bundle.
///
/// The `id` is a fixed 128-bit identifier chosen by the node kind's author;
/// the `version` travels in the type table alongside it so decoders can
/// accept older layouts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeType {
    pub id: Uuid,
    pub version: u32,
}

impl NodeType {
    /// Build a type tag from a 128-bit constant.
    pub const fn new(id: u128, version: u32) -> Self {
        Self {
            id: Uuid::from_u128(id),
            version,
        }
    }

    /// Whether two tags name the same node kind, regardless of version.
    pub fn same_kind(&self, other: &NodeType) -> bool {
        self.id == other.id
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/v{}", self.id, self.version)
    }
}
