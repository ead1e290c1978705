use serde::{Deserialize, Serialize};

use arbor_types::ContentHash;

use crate::error::{FilesError, FilesResult};

/// Size bounds for one level of the chunk tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkSizes {
    pub min_size: usize,
    pub target_size: usize,
    pub max_size: usize,
}

impl ChunkSizes {
    pub const fn new(min_size: usize, target_size: usize, max_size: usize) -> Self {
        Self {
            min_size,
            target_size,
            max_size,
        }
    }

    /// Boundary threshold for a rolling hash checked every `step` bytes.
    ///
    /// Past `min_size`, a check succeeds with probability about
    /// `step / (target_size - min_size)`, so chunks average `target_size`.
    pub(crate) fn threshold(&self, step: usize) -> u64 {
        let checks = (self.target_size - self.min_size) / step.max(1);
        if checks == 0 {
            return u64::MAX;
        }
        u64::MAX / u64::try_from(checks).unwrap_or(u64::MAX)
    }

    fn validate(&self, level: &str) -> FilesResult<()> {
        if self.min_size == 0 || self.target_size == 0 || self.max_size == 0 {
            return Err(FilesError::InvalidOptions(format!("{level} sizes must be positive")));
        }
        if self.min_size > self.target_size || self.target_size > self.max_size {
            return Err(FilesError::InvalidOptions(format!(
                "{level} sizes must satisfy min <= target <= max, got {}/{}/{}",
                self.min_size, self.target_size, self.max_size
            )));
        }
        Ok(())
    }
}

/// Chunking parameters for file content.
///
/// `leaf` bounds are in content bytes. `interior` bounds are in packed
/// child-hash bytes (32 per child).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingOptions {
    pub leaf: ChunkSizes,
    pub interior: ChunkSizes,
}

impl Default for ChunkingOptions {
    fn default() -> Self {
        Self {
            leaf: ChunkSizes::new(32 * 1024, 64 * 1024, 128 * 1024),
            interior: ChunkSizes::new(1024, 4 * 1024, 8 * 1024),
        }
    }
}

impl ChunkingOptions {
    pub fn validate(&self) -> FilesResult<()> {
        self.leaf.validate("leaf")?;
        self.interior.validate("interior")?;

        let hash = ContentHash::LEN;
        // Every interior node but the last needs two children, or a level
        // could fail to shrink.
        if self.interior.min_size < 2 * hash {
            return Err(FilesError::InvalidOptions(format!(
                "interior min_size must hold at least two hashes ({} bytes)",
                2 * hash
            )));
        }
        if self.interior.max_size - self.interior.min_size < hash {
            return Err(FilesError::InvalidOptions(format!(
                "interior range must be at least one hash ({hash} bytes) wide"
            )));
        }
        Ok(())
    }
}
