//! Content-defined chunking of byte streams into file trees.
//!
//! Leaf boundaries are chosen by a BuzHash over the trailing
//! [`WINDOW_SIZE`] bytes of the current chunk. Once a chunk holds at least
//! `min_size` bytes, a boundary is cut wherever the hash falls at or below
//! a threshold derived from `target_size`; a boundary is forced at
//! `max_size`. Interior levels are built the same way over the children's
//! 32-byte hashes, checking only at child boundaries, until one root
//! remains. Boundaries depend only on content, never on how the bytes were
//! split across calls to [`FileNodeWriter::append`].
//!
//! Every level is cut as its children arrive, so the writer only holds the
//! open group of each level. [`FileNodeWriter::write`] also moves finished
//! subtrees into a [`TreeWriter`] once enough leaf bytes have piled up.

use bytes::Bytes;
use tracing::debug;

use arbor_crypto::BuzHash;
use arbor_tree::{TreeNode, TreeNodeRef, TreeWriter};
use arbor_types::ContentHash;

use crate::error::FilesResult;
use crate::file::{FileChild, FileNode, InteriorFileNode, LeafFileNode};
use crate::options::{ChunkSizes, ChunkingOptions};

/// Bytes covered by the rolling hash.
pub const WINDOW_SIZE: usize = BuzHash::PERIOD;

/// Feed `byte`, already appended to `buf`, into `hash`, dropping the byte
/// that leaves the window.
fn roll(hash: &mut BuzHash, buf: &[u8], byte: u8) {
    hash.add(byte);
    if buf.len() > WINDOW_SIZE {
        hash.sub(buf[buf.len() - 1 - WINDOW_SIZE]);
    }
}

fn chunk(node: FileNode) -> FileChild {
    FileChild {
        hash: node.hash(),
        length: node.length(),
        node: TreeNodeRef::new(node),
    }
}

/// The open group of one interior level.
#[derive(Clone, Default)]
struct Level {
    group: Vec<FileChild>,
    packed: Vec<u8>,
    hash: BuzHash,
}

impl Level {
    /// Add `child`, returning the parent node if this closes the group.
    fn push(&mut self, child: FileChild, sizes: &ChunkSizes, threshold: u64) -> Option<FileChild> {
        for &byte in child.hash.as_bytes() {
            self.packed.push(byte);
            roll(&mut self.hash, &self.packed, byte);
        }
        self.group.push(child);

        let size = self.packed.len();
        let forced = size + ContentHash::LEN > sizes.max_size;
        if size >= sizes.min_size && (forced || self.hash.value() <= threshold) {
            debug_assert!(size <= sizes.max_size);
            return Some(self.cut());
        }
        None
    }

    fn cut(&mut self) -> FileChild {
        self.packed.clear();
        self.hash.reset();
        let children = std::mem::take(&mut self.group);
        chunk(FileNode::Interior(InteriorFileNode::new(children)))
    }
}

/// Interior-level parameters shared by every level.
#[derive(Clone, Copy)]
struct Interior {
    sizes: ChunkSizes,
    threshold: u64,
}

impl Interior {
    /// Push `node` into level `depth`, carrying finished parents upward.
    fn push(&self, levels: &mut Vec<Level>, mut depth: usize, mut node: FileChild) {
        loop {
            if depth == levels.len() {
                levels.push(Level::default());
            }
            match levels[depth].push(node, &self.sizes, self.threshold) {
                Some(parent) => {
                    node = parent;
                    depth += 1;
                }
                None => return,
            }
        }
    }

    /// Close every open group bottom-up and return the root: the node left
    /// alone on the first level with nothing above it. Trailing groups are
    /// exempt from `min_size`.
    fn close(&self, mut levels: Vec<Level>) -> FileChild {
        let mut depth = 0;
        while depth < levels.len() {
            let top = depth + 1 == levels.len();
            if top && levels[depth].group.len() <= 1 {
                break;
            }
            if !levels[depth].group.is_empty() {
                let parent = levels[depth].cut();
                self.push(&mut levels, depth + 1, parent);
            }
            depth += 1;
        }
        let height = levels.len();
        let root = levels
            .pop()
            .and_then(|mut level| level.group.pop())
            .unwrap_or_else(|| chunk(FileNode::empty()));
        debug!(height, length = root.length, "closed chunk tree");
        root
    }
}

/// Incrementally chunks a byte stream into a [`FileNode`] tree.
pub struct FileNodeWriter {
    options: ChunkingOptions,
    leaf_threshold: u64,
    interior: Interior,
    current: Vec<u8>,
    hash: BuzHash,
    levels: Vec<Level>,
    length: u64,
    /// Bytes of cut leaves still held in memory.
    buffered: u64,
}

impl FileNodeWriter {
    pub fn new(options: ChunkingOptions) -> FilesResult<Self> {
        options.validate()?;
        Ok(Self {
            leaf_threshold: options.leaf.threshold(1),
            interior: Interior {
                sizes: options.interior,
                threshold: options.interior.threshold(ContentHash::LEN),
            },
            options,
            current: Vec::new(),
            hash: BuzHash::new(),
            levels: Vec::new(),
            length: 0,
            buffered: 0,
        })
    }

    pub fn options(&self) -> &ChunkingOptions {
        &self.options
    }

    /// Total bytes appended so far.
    pub fn length(&self) -> u64 {
        self.length
    }

    /// Content bytes held in memory: cut leaves not yet written plus the
    /// open leaf.
    pub fn buffered(&self) -> u64 {
        self.buffered + self.current.len() as u64
    }

    pub fn append(&mut self, data: &[u8]) {
        let leaf = self.options.leaf;
        for &byte in data {
            self.current.push(byte);
            roll(&mut self.hash, &self.current, byte);
            let len = self.current.len();
            if len >= leaf.max_size || (len >= leaf.min_size && self.hash.value() <= self.leaf_threshold)
            {
                self.cut_leaf();
            }
        }
        self.length += data.len() as u64;
    }

    fn cut_leaf(&mut self) {
        let data = Bytes::from(std::mem::take(&mut self.current));
        self.buffered += data.len() as u64;
        self.hash.reset();
        let leaf = chunk(FileNode::Leaf(LeafFileNode::new(data)));
        self.interior.push(&mut self.levels, 0, leaf);
    }

    /// Append `data`, handing finished subtrees to `writer` whenever a
    /// blob's worth of leaf bytes is buffered.
    pub async fn write(&mut self, writer: &mut TreeWriter, data: &[u8]) -> FilesResult<()> {
        self.append(data);
        if self.buffered >= writer.options().max_blob_size as u64 {
            self.spill(writer).await?;
        }
        Ok(())
    }

    /// Store every finished subtree still in memory through `writer` and
    /// keep only its handle. The open leaf stays in memory.
    pub async fn spill(&mut self, writer: &mut TreeWriter) -> FilesResult<()> {
        let mut slots = Vec::new();
        let mut nodes = Vec::new();
        for (depth, level) in self.levels.iter().enumerate() {
            for (i, child) in level.group.iter().enumerate() {
                if child.node.handle().is_some() {
                    continue;
                }
                if let Some(node) = child.node.get() {
                    slots.push((depth, i));
                    nodes.push(node);
                }
            }
        }
        if nodes.is_empty() {
            return Ok(());
        }

        let roots: Vec<&dyn TreeNode> = nodes.iter().map(|n| n.as_ref() as &dyn TreeNode).collect();
        let handles = writer.flush_all(&roots).await?;
        for ((depth, i), handle) in slots.into_iter().zip(handles) {
            let child = &mut self.levels[depth].group[i];
            debug_assert_eq!(child.hash, handle.hash);
            child.node = TreeNodeRef::located(handle);
        }
        debug!(
            subtrees = nodes.len(),
            bytes = self.buffered,
            "spilled file chunks"
        );
        self.buffered = 0;
        Ok(())
    }

    /// Root for the data appended so far. The writer keeps accepting data
    /// and later roots share every unchanged leaf.
    pub fn snapshot(&self) -> FileChild {
        let mut levels = self.levels.clone();
        if !self.current.is_empty() {
            let tail = Bytes::copy_from_slice(&self.current);
            let leaf = chunk(FileNode::Leaf(LeafFileNode::new(tail)));
            self.interior.push(&mut levels, 0, leaf);
        }
        self.interior.close(levels)
    }

    /// Root for all appended data.
    ///
    /// Subtrees already spilled are referenced by handle; the rest of the
    /// tree, root included, is still in memory.
    pub fn finish(mut self) -> FileChild {
        if !self.current.is_empty() {
            self.cut_leaf();
        }
        self.interior.close(self.levels)
    }
}

impl std::fmt::Debug for FileNodeWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileNodeWriter")
            .field("length", &self.length)
            .field("levels", &self.levels.len())
            .field("buffered", &self.buffered())
            .finish()
    }
}

/// Chunk `data` in one call, entirely in memory.
pub fn chunk_bytes(data: &[u8], options: ChunkingOptions) -> FilesResult<FileChild> {
    let mut writer = FileNodeWriter::new(options)?;
    writer.append(data);
    Ok(writer.finish())
}
