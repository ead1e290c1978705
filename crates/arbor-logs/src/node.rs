use arbor_files::FileNode;
use arbor_tree::{
    AnyNodeRef, DecodeNode, NodeReader, NodeWriter, TreeError, TreeNode, TreeNodeRef, TreeReader,
    TreeResult,
};
use arbor_types::NodeType;

use crate::error::LogResult;
use crate::lines::LogLines;
use crate::ngram::NgramSet;
use crate::search::LogSearch;

pub const LOG_TYPE: NodeType = NodeType::new(0x6c6f_6774_6578_7400_9000_0000_0000_0004, 1);
pub const LOG_INDEX_TYPE: NodeType = NodeType::new(0x6c6f_6769_6e64_6578_9000_0000_0000_0005, 1);

/// A run of consecutive lines and the fingerprints of their text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogBlock {
    pub first_line: u64,
    pub line_count: u64,
    /// Byte offset of the first line in the log text.
    pub offset: u64,
    pub length: u64,
    pub ngrams: NgramSet,
}

impl LogBlock {
    /// One past the last line in the block.
    pub fn end_line(&self) -> u64 {
        self.first_line + self.line_count
    }
}

/// Search index over the blocks of a log, in line order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LogIndexNode {
    pub blocks: Vec<LogBlock>,
}

impl LogIndexNode {
    pub fn new(blocks: Vec<LogBlock>) -> Self {
        Self { blocks }
    }

    /// Position of the block holding `line`, or `blocks.len()` if the log
    /// has fewer lines.
    pub fn block_for_line(&self, line: u64) -> usize {
        self.blocks.partition_point(|b| b.end_line() <= line)
    }
}

impl TreeNode for LogIndexNode {
    fn node_type(&self) -> NodeType {
        LOG_INDEX_TYPE
    }

    fn serialize(&self, writer: &mut NodeWriter<'_>) -> TreeResult<()> {
        writer.write_varint(self.blocks.len() as u64);
        let mut ngrams = Vec::new();
        for block in &self.blocks {
            writer.write_varint(block.first_line);
            writer.write_varint(block.line_count);
            writer.write_varint(block.offset);
            writer.write_varint(block.length);
            ngrams.clear();
            block.ngrams.encode(&mut ngrams);
            writer.write_bytes(&ngrams);
        }
        Ok(())
    }

    fn enumerate_refs(&self) -> Vec<&dyn AnyNodeRef> {
        Vec::new()
    }
}

impl DecodeNode for LogIndexNode {
    fn accepts(node_type: &NodeType) -> bool {
        node_type.same_kind(&LOG_INDEX_TYPE)
    }

    fn decode(reader: &mut NodeReader) -> TreeResult<Self> {
        let count = reader.read_varint()?;
        let mut blocks = Vec::new();
        let mut next_line = 0;
        let mut next_offset = 0;
        for _ in 0..count {
            let block = LogBlock {
                first_line: reader.read_varint()?,
                line_count: reader.read_varint()?,
                offset: reader.read_varint()?,
                length: reader.read_varint()?,
                ngrams: NgramSet::decode(&reader.read_bytes()?)?,
            };
            if block.first_line != next_line || block.offset != next_offset {
                return Err(TreeError::Decode(format!(
                    "log block at line {} offset {} does not follow line {next_line} offset {next_offset}",
                    block.first_line, block.offset
                )));
            }
            next_line = block.end_line();
            next_offset = block.offset + block.length;
            blocks.push(block);
        }
        Ok(Self { blocks })
    }
}

/// A stored log: its raw text as a file tree plus a search index.
#[derive(Clone, Debug)]
pub struct LogNode {
    pub length: u64,
    pub line_count: u64,
    pub text: TreeNodeRef<FileNode>,
    pub index: TreeNodeRef<LogIndexNode>,
}

impl LogNode {
    /// Lines from `start_line` onward, each with its terminator.
    pub async fn read_log_lines(&self, reader: &TreeReader, start_line: u64) -> LogResult<LogLines> {
        let text = self.text.expand(reader).await?;
        let index = self.index.expand(reader).await?;
        Ok(LogLines::new(reader.clone(), text, index, start_line))
    }

    /// Lines from `start_line` onward whose text contains `term`.
    pub async fn search(
        &self,
        reader: &TreeReader,
        start_line: u64,
        term: impl Into<Vec<u8>>,
    ) -> LogResult<LogSearch> {
        let text = self.text.expand(reader).await?;
        let index = self.index.expand(reader).await?;
        Ok(LogSearch::new(reader.clone(), text, index, start_line, term.into()))
    }

    pub(crate) fn from_parts(
        length: u64,
        line_count: u64,
        text: TreeNodeRef<FileNode>,
        index: LogIndexNode,
    ) -> Self {
        Self {
            length,
            line_count,
            text,
            index: TreeNodeRef::new(index),
        }
    }
}

impl TreeNode for LogNode {
    fn node_type(&self) -> NodeType {
        LOG_TYPE
    }

    fn serialize(&self, writer: &mut NodeWriter<'_>) -> TreeResult<()> {
        writer.write_varint(self.length);
        writer.write_varint(self.line_count);
        writer.write_ref(&self.text)?;
        writer.write_ref(&self.index)
    }

    fn enumerate_refs(&self) -> Vec<&dyn AnyNodeRef> {
        vec![&self.text as &dyn AnyNodeRef, &self.index as &dyn AnyNodeRef]
    }
}

impl DecodeNode for LogNode {
    fn accepts(node_type: &NodeType) -> bool {
        node_type.same_kind(&LOG_TYPE)
    }

    fn decode(reader: &mut NodeReader) -> TreeResult<Self> {
        Ok(Self {
            length: reader.read_varint()?,
            line_count: reader.read_varint()?,
            text: reader.read_ref()?,
            index: reader.read_ref()?,
        })
    }
}
