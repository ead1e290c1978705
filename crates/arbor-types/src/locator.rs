use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::hash::ContentHash;

/// Opaque identifier for one stored bundle.
///
/// Locators are assigned by the storage backend when a bundle is written.
/// Their content is meaningful only to the backend that produced them, but
/// they must be printable, non-empty, and free of whitespace so they can be
/// embedded in bundle import tables and file names.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BlobLocator(Arc<str>);

impl BlobLocator {
    /// Longest accepted locator, in bytes.
    pub const MAX_LEN: usize = 1024;

    /// Validate and wrap a locator string.
    pub fn new(locator: impl Into<String>) -> Result<Self, TypeError> {
        let locator = locator.into();
        if locator.is_empty() {
            return Err(TypeError::InvalidLocator {
                locator,
                reason: "must not be empty".into(),
            });
        }
        if locator.len() > Self::MAX_LEN {
            return Err(TypeError::InvalidLocator {
                locator,
                reason: format!("longer than {} bytes", Self::MAX_LEN),
            });
        }
        if locator.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(TypeError::InvalidLocator {
                locator,
                reason: "must not contain whitespace or control characters".into(),
            });
        }
        Ok(Self(locator.into()))
    }

    /// The locator as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BlobLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobLocator({})", self.0)
    }
}

impl fmt::Display for BlobLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for BlobLocator {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<BlobLocator> for String {
    fn from(locator: BlobLocator) -> Self {
        locator.0.to_string()
    }
}

/// One exported node inside a specific bundle.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeLocator {
    /// The bundle holding the node.
    pub blob: BlobLocator,
    /// Position of the node in the bundle's export table.
    pub export_index: u32,
}

impl NodeLocator {
    pub fn new(blob: BlobLocator, export_index: u32) -> Self {
        Self { blob, export_index }
    }
}

impl fmt::Display for NodeLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.blob, self.export_index)
    }
}

/// A flushed node: where it lives and what its content hash is.
///
/// Handles are immutable values. Writers only hand them out once the bundle
/// holding the node has been stored, so a handle always resolves.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeHandle {
    pub hash: ContentHash,
    pub locator: NodeLocator,
}

impl NodeHandle {
    pub fn new(hash: ContentHash, locator: NodeLocator) -> Self {
        Self { hash, locator }
    }
}

impl fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.hash.short_hex(), self.locator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locator_accepts_path_like_strings() {
        let locator = BlobLocator::new("bundles/0192f7a1-aaaa").unwrap();
        assert_eq!(locator.as_str(), "bundles/0192f7a1-aaaa");
        assert_eq!(locator.to_string(), "bundles/0192f7a1-aaaa");
    }

    #[test]
    fn locator_rejects_empty_and_whitespace() {
        assert!(BlobLocator::new("").is_err());
        assert!(BlobLocator::new("has space").is_err());
        assert!(BlobLocator::new("line\nbreak").is_err());
    }

    #[test]
    fn locator_rejects_oversized() {
        let long = "x".repeat(BlobLocator::MAX_LEN + 1);
        assert!(BlobLocator::new(long).is_err());
    }

    #[test]
    fn locator_serde_validates() {
        let parsed: Result<BlobLocator, _> = serde_json::from_str("\"\"");
        assert!(parsed.is_err());
        let ok: BlobLocator = serde_json::from_str("\"blob-1\"").unwrap();
        assert_eq!(ok.as_str(), "blob-1");
    }

    #[test]
    fn node_locator_display() {
        let locator = NodeLocator::new(BlobLocator::new("b1").unwrap(), 7);
        assert_eq!(locator.to_string(), "b1#7");
    }

    #[test]
    fn handle_serde_roundtrip() {
        let handle = NodeHandle::new(
            ContentHash::of(b"node"),
            NodeLocator::new(BlobLocator::new("b2").unwrap(), 3),
        );
        let json = serde_json::to_string(&handle).unwrap();
        let parsed: NodeHandle = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, handle);
    }
}
