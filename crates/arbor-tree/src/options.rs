use serde::{Deserialize, Serialize};

use arbor_bundle::{Compression, DEFAULT_PACKET_SIZE};

use crate::error::{TreeError, TreeResult};

/// Limits applied by [`TreeWriter`](crate::TreeWriter) when packing nodes
/// into bundles.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeOptions {
    /// Flush the open bundle before its payload would exceed this many bytes.
    pub max_blob_size: usize,
    /// Flush the open bundle before it would hold more exports than this.
    pub max_exports_per_blob: usize,
    /// Decoded size at which a packet is sealed.
    pub packet_size: usize,
    pub compression: Compression,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            max_blob_size: 4 * 1024 * 1024,
            max_exports_per_blob: 4096,
            packet_size: DEFAULT_PACKET_SIZE,
            compression: Compression::Zstd,
        }
    }
}

impl TreeOptions {
    pub fn validate(&self) -> TreeResult<()> {
        if self.max_blob_size == 0 {
            return Err(TreeError::InvalidOptions("max_blob_size must be positive".into()));
        }
        if self.max_exports_per_blob == 0 {
            return Err(TreeError::InvalidOptions(
                "max_exports_per_blob must be positive".into(),
            ));
        }
        if self.packet_size == 0 {
            return Err(TreeError::InvalidOptions("packet_size must be positive".into()));
        }
        Ok(())
    }
}
