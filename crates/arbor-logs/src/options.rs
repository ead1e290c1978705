use serde::{Deserialize, Serialize};

use arbor_files::ChunkingOptions;

use crate::error::{LogError, LogResult};

/// Parameters for building a log.
///
/// Lines are grouped into index blocks of at most `max_block_lines` lines.
/// A block is also closed once it holds `max_block_bytes` or more; blocks
/// always end on a line boundary, so a single long line may exceed it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogOptions {
    pub chunking: ChunkingOptions,
    pub max_block_lines: usize,
    pub max_block_bytes: usize,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            chunking: ChunkingOptions::default(),
            max_block_lines: 256,
            max_block_bytes: 16 * 1024,
        }
    }
}

impl LogOptions {
    pub fn validate(&self) -> LogResult<()> {
        self.chunking.validate()?;
        if self.max_block_lines == 0 {
            return Err(LogError::InvalidOptions("max_block_lines must be positive".into()));
        }
        if self.max_block_bytes == 0 {
            return Err(LogError::InvalidOptions("max_block_bytes must be positive".into()));
        }
        Ok(())
    }
}
