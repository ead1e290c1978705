use std::sync::Arc;

use bytes::Bytes;

use arbor_files::FileNode;
use arbor_tree::TreeReader;

use crate::error::LogResult;
use crate::node::{LogBlock, LogIndexNode};

/// Lines of one block, loaded on demand.
pub(crate) struct BlockText {
    data: Bytes,
    pos: usize,
    line: u64,
}

impl BlockText {
    pub(crate) async fn load(
        reader: &TreeReader,
        text: &FileNode,
        block: &LogBlock,
    ) -> LogResult<Self> {
        let data = text.read_range(reader, block.offset, block.length).await?;
        Ok(Self {
            data,
            pos: 0,
            line: block.first_line,
        })
    }

    /// Next line with its terminator, and its index.
    pub(crate) fn next_line(&mut self) -> Option<(u64, Bytes)> {
        if self.pos >= self.data.len() {
            return None;
        }
        let rest = &self.data[self.pos..];
        let len = rest
            .iter()
            .position(|&b| b == b'\n')
            .map_or(rest.len(), |i| i + 1);
        let line = self.data.slice(self.pos..self.pos + len);
        let index = self.line;
        self.pos += len;
        self.line += 1;
        Some((index, line))
    }
}

/// Cursor over the lines of a log, reading one index block of text at a
/// time.
pub struct LogLines {
    reader: TreeReader,
    text: Arc<FileNode>,
    index: Arc<LogIndexNode>,
    next_block: usize,
    next_line: u64,
    current: Option<BlockText>,
}

impl LogLines {
    pub(crate) fn new(
        reader: TreeReader,
        text: Arc<FileNode>,
        index: Arc<LogIndexNode>,
        start_line: u64,
    ) -> Self {
        Self {
            next_block: index.block_for_line(start_line),
            reader,
            text,
            index,
            next_line: start_line,
            current: None,
        }
    }

    /// Index of the line the next call returns.
    pub fn line_index(&self) -> u64 {
        self.next_line
    }

    /// The next line including its `\n` (absent only on an unterminated
    /// final line), or `None` past the end of the log.
    pub async fn next_line(&mut self) -> LogResult<Option<Bytes>> {
        loop {
            if let Some(block) = self.current.as_mut() {
                while let Some((index, line)) = block.next_line() {
                    if index >= self.next_line {
                        self.next_line = index + 1;
                        return Ok(Some(line));
                    }
                }
                self.current = None;
            }

            let Some(block) = self.index.blocks.get(self.next_block) else {
                return Ok(None);
            };
            self.current = Some(BlockText::load(&self.reader, &self.text, block).await?);
            self.next_block += 1;
        }
    }

    /// Drain the remaining lines.
    pub async fn collect(&mut self) -> LogResult<Vec<Bytes>> {
        let mut lines = Vec::new();
        while let Some(line) = self.next_line().await? {
            lines.push(line);
        }
        Ok(lines)
    }
}

impl std::fmt::Debug for LogLines {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogLines")
            .field("next_line", &self.next_line)
            .field("next_block", &self.next_block)
            .finish()
    }
}
