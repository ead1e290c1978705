use tracing::debug;

use arbor_files::FileNodeWriter;
use arbor_tree::TreeWriter;

use crate::error::LogResult;
use crate::ngram::{line_fingerprints, NgramSet};
use crate::node::{LogBlock, LogIndexNode, LogNode};
use crate::options::LogOptions;

/// Lines accumulated since the last closed block.
#[derive(Debug, Default)]
struct OpenBlock {
    first_line: u64,
    line_count: u64,
    offset: u64,
    length: u64,
    fingerprints: Vec<u32>,
}

impl OpenBlock {
    fn starting_at(first_line: u64, offset: u64) -> Self {
        Self {
            first_line,
            offset,
            ..Self::default()
        }
    }

    fn is_empty(&self) -> bool {
        self.line_count == 0
    }
}

/// Builds a [`LogNode`] from text written in arbitrary pieces.
pub struct LogBuilder {
    options: LogOptions,
    text: FileNodeWriter,
    blocks: Vec<LogBlock>,
    open: OpenBlock,
    /// Bytes of the current line, without a terminator yet.
    partial: Vec<u8>,
    length: u64,
    line_count: u64,
}

impl LogBuilder {
    pub fn new(options: LogOptions) -> LogResult<Self> {
        options.validate()?;
        Ok(Self {
            text: FileNodeWriter::new(options.chunking)?,
            options,
            blocks: Vec::new(),
            open: OpenBlock::default(),
            partial: Vec::new(),
            length: 0,
            line_count: 0,
        })
    }

    /// Bytes written so far.
    pub fn length(&self) -> u64 {
        self.length
    }

    /// Complete lines written so far.
    pub fn line_count(&self) -> u64 {
        self.line_count
    }

    /// Append text held entirely in memory until the log is written.
    pub fn write_data(&mut self, data: &[u8]) {
        self.text.append(data);
        self.index_lines(data);
    }

    /// Append text, storing finished chunks through `writer` whenever a
    /// blob's worth is buffered. Only the line index stays in memory.
    pub async fn write(&mut self, writer: &mut TreeWriter, data: &[u8]) -> LogResult<()> {
        self.text.write(writer, data).await?;
        self.index_lines(data);
        Ok(())
    }

    fn index_lines(&mut self, data: &[u8]) {
        self.length += data.len() as u64;

        let mut rest = data;
        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            self.partial.extend_from_slice(&rest[..pos]);
            self.end_line();
            rest = &rest[pos + 1..];
        }
        self.partial.extend_from_slice(rest);
    }

    fn end_line(&mut self) {
        line_fingerprints(&self.partial, &mut self.open.fingerprints);
        self.open.line_count += 1;
        self.open.length += self.partial.len() as u64 + 1;
        self.line_count += 1;
        self.partial.clear();

        if self.open.line_count >= self.options.max_block_lines as u64
            || self.open.length >= self.options.max_block_bytes as u64
        {
            let next = OpenBlock::starting_at(self.line_count, self.open.offset + self.open.length);
            let block = std::mem::replace(&mut self.open, next);
            self.blocks.push(close(block));
        }
    }

    /// A log holding everything written so far, including an unterminated
    /// final line. The builder keeps accepting data.
    pub fn flush(&self) -> LogNode {
        let mut blocks = self.blocks.clone();
        let mut line_count = self.line_count;
        if !self.open.is_empty() || !self.partial.is_empty() {
            let mut tail = OpenBlock {
                first_line: self.open.first_line,
                line_count: self.open.line_count,
                offset: self.open.offset,
                length: self.open.length,
                fingerprints: self.open.fingerprints.clone(),
            };
            if !self.partial.is_empty() {
                line_fingerprints(&self.partial, &mut tail.fingerprints);
                tail.line_count += 1;
                tail.length += self.partial.len() as u64;
                line_count += 1;
            }
            blocks.push(close(tail));
        }

        debug!(
            bytes = self.length,
            lines = line_count,
            blocks = blocks.len(),
            "log snapshot"
        );
        LogNode::from_parts(
            self.length,
            line_count,
            self.text.snapshot().node,
            LogIndexNode::new(blocks),
        )
    }

    pub fn finish(self) -> LogNode {
        self.flush()
    }
}

fn close(block: OpenBlock) -> LogBlock {
    LogBlock {
        first_line: block.first_line,
        line_count: block.line_count,
        offset: block.offset,
        length: block.length,
        ngrams: NgramSet::from_unsorted(block.fingerprints),
    }
}

impl std::fmt::Debug for LogBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogBuilder")
            .field("length", &self.length)
            .field("lines", &self.line_count)
            .field("blocks", &self.blocks.len())
            .finish()
    }
}
