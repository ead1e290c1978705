use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info};
use walkdir::WalkDir;

use arbor_tree::{
    AnyNodeRef, DecodeNode, NodeReader, NodeWriter, TreeError, TreeNode, TreeNodeRef, TreeReader,
    TreeResult, TreeWriter,
};
use arbor_types::{NodeHandle, NodeType};

use crate::chunker::FileNodeWriter;
use crate::error::{FilesError, FilesResult};
use crate::file::{FileChild, FileNode};
use crate::options::ChunkingOptions;

pub const DIRECTORY_TYPE: NodeType = NodeType::new(0x6469_7265_6374_6f72_9000_0000_0000_0003, 1);

const READ_BUFFER: usize = 256 * 1024;
const RESTORE_CHUNK: u64 = 1024 * 1024;

/// Attribute bits stored with a file entry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct FileFlags(u32);

impl FileFlags {
    pub const NONE: FileFlags = FileFlags(0);
    pub const EXECUTABLE: FileFlags = FileFlags(1);
    pub const READ_ONLY: FileFlags = FileFlags(2);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: FileFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for FileFlags {
    type Output = FileFlags;

    fn bitor(self, rhs: FileFlags) -> FileFlags {
        FileFlags(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for FileFlags {
    fn bitor_assign(&mut self, rhs: FileFlags) {
        self.0 |= rhs.0;
    }
}

/// A named file inside a directory.
#[derive(Clone, Debug)]
pub struct FileEntry {
    pub node: TreeNodeRef<FileNode>,
    pub length: u64,
    pub flags: FileFlags,
}

impl FileEntry {
    pub fn new(content: FileChild, flags: FileFlags) -> Self {
        Self {
            node: content.node,
            length: content.length,
            flags,
        }
    }
}

/// A directory: named sub-directories and named files sharing one namespace.
#[derive(Clone, Debug, Default)]
pub struct DirectoryNode {
    directories: BTreeMap<String, TreeNodeRef<DirectoryNode>>,
    files: BTreeMap<String, FileEntry>,
}

fn validate_name(name: &str) -> FilesResult<()> {
    let reason = if name.is_empty() {
        "empty"
    } else if name == "." || name == ".." {
        "reserved"
    } else if name.contains('/') {
        "contains a path separator"
    } else if name.contains('\0') {
        "contains NUL"
    } else {
        return Ok(());
    };
    Err(FilesError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    })
}

impl DirectoryNode {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_free(&self, name: &str) -> FilesResult<()> {
        validate_name(name)?;
        if self.files.contains_key(name) || self.directories.contains_key(name) {
            return Err(FilesError::DuplicateName(name.to_string()));
        }
        Ok(())
    }

    pub fn add_file(&mut self, name: impl Into<String>, entry: FileEntry) -> FilesResult<()> {
        let name = name.into();
        self.check_free(&name)?;
        self.files.insert(name, entry);
        Ok(())
    }

    pub fn add_directory(
        &mut self,
        name: impl Into<String>,
        directory: impl Into<TreeNodeRef<DirectoryNode>>,
    ) -> FilesResult<()> {
        let name = name.into();
        self.check_free(&name)?;
        self.directories.insert(name, directory.into());
        Ok(())
    }

    pub fn file(&self, name: &str) -> Option<&FileEntry> {
        self.files.get(name)
    }

    pub fn directory(&self, name: &str) -> Option<&TreeNodeRef<DirectoryNode>> {
        self.directories.get(name)
    }

    /// Files in name order.
    pub fn files(&self) -> impl Iterator<Item = (&str, &FileEntry)> {
        self.files.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    /// Sub-directories in name order.
    pub fn directories(&self) -> impl Iterator<Item = (&str, &TreeNodeRef<DirectoryNode>)> {
        self.directories.iter().map(|(name, dir)| (name.as_str(), dir))
    }

    pub fn len(&self) -> usize {
        self.files.len() + self.directories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Build a directory tree mirroring `path` on disk, chunking every file.
    ///
    /// File content and finished sub-directories are stored through
    /// `writer` as the walk goes, so only a blob's worth of data is held in
    /// memory at a time. The returned root may still hold unwritten
    /// children; flush it with the same writer.
    ///
    /// Symbolic links are skipped. Executable and read-only permissions are
    /// kept as [`FileFlags`].
    pub async fn copy_from_directory(
        path: impl AsRef<Path>,
        options: &ChunkingOptions,
        writer: &mut TreeWriter,
    ) -> FilesResult<DirectoryNode> {
        let root = path.as_ref();
        options.validate()?;

        let budget = writer.options().max_blob_size as u64;
        let mut pending: HashMap<PathBuf, DirectoryNode> = HashMap::new();
        let mut unwritten = 0u64;
        let mut file_count = 0usize;
        let mut byte_count = 0u64;
        let mut spilled = 0usize;

        let walk = WalkDir::new(root)
            .follow_links(false)
            .contents_first(true)
            .sort_by_file_name();
        for entry in walk {
            let entry = entry?;
            let file_type = entry.file_type();
            if entry.depth() == 0 {
                if !file_type.is_dir() {
                    return Err(FilesError::Io(std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        format!("{} is not a directory", root.display()),
                    )));
                }
                continue;
            }
            if file_type.is_symlink() {
                debug!(path = %entry.path().display(), "skipping symbolic link");
                continue;
            }

            let name = entry_name(entry.path())?;
            let parent = entry.path().parent().unwrap_or(root).to_path_buf();

            if file_type.is_dir() {
                let directory = pending.remove(entry.path()).unwrap_or_default();
                pending.entry(parent).or_default().add_directory(name, directory)?;
            } else if file_type.is_file() {
                let metadata = entry.metadata()?;
                let (content, buffered) = chunk_file(entry.path(), options, writer).await?;
                byte_count += content.length;
                file_count += 1;
                unwritten += buffered;
                let entry = FileEntry::new(content, flags_from_metadata(&metadata));
                pending.entry(parent).or_default().add_file(name, entry)?;

                if unwritten >= budget {
                    spilled += spill_directories(&mut pending, writer).await?;
                    unwritten = 0;
                }
            } else {
                debug!(path = %entry.path().display(), "skipping special file");
            }
        }

        let directory = pending.remove(root).unwrap_or_default();
        info!(
            path = %root.display(),
            files = file_count,
            bytes = byte_count,
            spilled,
            "copied directory from disk"
        );
        Ok(directory)
    }

    /// In-memory children in name order, directories first.
    fn unwritten_children(&self) -> Vec<(String, Arc<dyn TreeNode>)> {
        let directories = self
            .directories
            .iter()
            .filter(|(_, dir)| dir.handle().is_none())
            .filter_map(|(name, dir)| dir.get().map(|node| (name.clone(), node as Arc<dyn TreeNode>)));
        let files = self
            .files
            .iter()
            .filter(|(_, file)| file.node.handle().is_none())
            .filter_map(|(name, file)| {
                file.node.get().map(|node| (name.clone(), node as Arc<dyn TreeNode>))
            });
        directories.chain(files).collect()
    }

    /// Point the child called `name` at its stored copy.
    fn locate_child(&mut self, name: &str, handle: NodeHandle) {
        if let Some(directory) = self.directories.get_mut(name) {
            *directory = TreeNodeRef::located(handle);
        } else if let Some(file) = self.files.get_mut(name) {
            file.node = TreeNodeRef::located(handle);
        }
    }

    /// Recreate this directory tree under `path`, reading file content
    /// through `reader`.
    pub async fn copy_to_directory(&self, reader: &TreeReader, path: impl AsRef<Path>) -> FilesResult<()> {
        let root = path.as_ref().to_path_buf();
        let mut pending: Vec<(TreeNodeRef<DirectoryNode>, PathBuf)> = Vec::new();

        let mut file_count = self.restore_level(reader, &root, &mut pending).await?;
        while let Some((node_ref, dir_path)) = pending.pop() {
            let directory = node_ref.expand(reader).await?;
            file_count += directory.restore_level(reader, &dir_path, &mut pending).await?;
        }

        info!(path = %root.display(), files = file_count, "copied directory to disk");
        Ok(())
    }

    /// Write the files of this directory to `path` and queue its
    /// sub-directories.
    async fn restore_level(
        &self,
        reader: &TreeReader,
        path: &Path,
        pending: &mut Vec<(TreeNodeRef<DirectoryNode>, PathBuf)>,
    ) -> FilesResult<usize> {
        tokio::fs::create_dir_all(path).await?;
        for (name, entry) in &self.files {
            let target = path.join(name);
            let node = entry.node.expand(reader).await?;
            write_file(reader, &node, &target).await?;
            apply_flags(&target, entry.flags).await?;
        }
        for (name, directory) in &self.directories {
            pending.push((directory.clone(), path.join(name)));
        }
        Ok(self.files.len())
    }
}

fn entry_name(path: &Path) -> FilesResult<String> {
    let name = path.file_name().unwrap_or_default();
    name.to_str().map(str::to_string).ok_or_else(|| FilesError::InvalidName {
        name: name.to_string_lossy().into_owned(),
        reason: "not valid UTF-8".to_string(),
    })
}

/// Chunk one file through `writer`. Also returns the content bytes still
/// held in memory under the root.
async fn chunk_file(
    path: &Path,
    options: &ChunkingOptions,
    writer: &mut TreeWriter,
) -> FilesResult<(FileChild, u64)> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut chunker = FileNodeWriter::new(*options)?;
    let mut buf = vec![0u8; READ_BUFFER];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        chunker.write(writer, &buf[..n]).await?;
    }
    let buffered = chunker.buffered();
    Ok((chunker.finish(), buffered))
}

/// Store the in-memory children of every directory under construction and
/// keep only their handles. Returns the number of subtrees written.
async fn spill_directories(
    pending: &mut HashMap<PathBuf, DirectoryNode>,
    writer: &mut TreeWriter,
) -> FilesResult<usize> {
    let mut paths: Vec<PathBuf> = pending.keys().cloned().collect();
    paths.sort();

    let mut slots = Vec::new();
    let mut nodes = Vec::new();
    for path in paths {
        let Some(directory) = pending.get(&path) else {
            continue;
        };
        for (name, node) in directory.unwritten_children() {
            slots.push((path.clone(), name));
            nodes.push(node);
        }
    }
    if nodes.is_empty() {
        return Ok(0);
    }

    let roots: Vec<&dyn TreeNode> = nodes.iter().map(|node| node.as_ref()).collect();
    let handles = writer.flush_all(&roots).await?;
    for ((path, name), handle) in slots.into_iter().zip(handles) {
        if let Some(directory) = pending.get_mut(&path) {
            directory.locate_child(&name, handle);
        }
    }
    debug!(subtrees = nodes.len(), "spilled directory entries");
    Ok(nodes.len())
}

fn flags_from_metadata(metadata: &std::fs::Metadata) -> FileFlags {
    let mut flags = FileFlags::NONE;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if metadata.permissions().mode() & 0o111 != 0 {
            flags |= FileFlags::EXECUTABLE;
        }
    }
    if metadata.permissions().readonly() {
        flags |= FileFlags::READ_ONLY;
    }
    flags
}

async fn write_file(reader: &TreeReader, node: &FileNode, target: &Path) -> FilesResult<()> {
    let mut file = tokio::fs::File::create(target).await?;
    let length = node.length();
    let mut offset = 0;
    while offset < length {
        let len = RESTORE_CHUNK.min(length - offset);
        let data = node.read_range(reader, offset, len).await?;
        file.write_all(&data).await?;
        offset += len;
    }
    file.flush().await?;
    Ok(())
}

async fn apply_flags(target: &Path, flags: FileFlags) -> FilesResult<()> {
    let mut permissions = tokio::fs::metadata(target).await?.permissions();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = if flags.contains(FileFlags::EXECUTABLE) { 0o755 } else { 0o644 };
        permissions.set_mode(mode);
    }
    if flags.contains(FileFlags::READ_ONLY) {
        permissions.set_readonly(true);
    }
    tokio::fs::set_permissions(target, permissions).await?;
    Ok(())
}

impl TreeNode for DirectoryNode {
    fn node_type(&self) -> NodeType {
        DIRECTORY_TYPE
    }

    fn serialize(&self, writer: &mut NodeWriter<'_>) -> TreeResult<()> {
        writer.write_varint(self.directories.len() as u64);
        for (name, directory) in &self.directories {
            writer.write_str(name);
            writer.write_ref(directory)?;
        }
        writer.write_varint(self.files.len() as u64);
        for (name, entry) in &self.files {
            writer.write_str(name);
            writer.write_varint(entry.length);
            writer.write_varint(u64::from(entry.flags.bits()));
            writer.write_ref(&entry.node)?;
        }
        Ok(())
    }

    fn enumerate_refs(&self) -> Vec<&dyn AnyNodeRef> {
        let mut refs: Vec<&dyn AnyNodeRef> = Vec::with_capacity(self.len());
        refs.extend(self.directories.values().map(|d| d as &dyn AnyNodeRef));
        refs.extend(self.files.values().map(|f| &f.node as &dyn AnyNodeRef));
        refs
    }
}

impl DecodeNode for DirectoryNode {
    fn accepts(node_type: &NodeType) -> bool {
        node_type.same_kind(&DIRECTORY_TYPE)
    }

    fn decode(reader: &mut NodeReader) -> TreeResult<Self> {
        let invalid = |e: FilesError| TreeError::Decode(e.to_string());
        let mut directory = DirectoryNode::new();

        let dir_count = reader.read_varint()?;
        for _ in 0..dir_count {
            let name = reader.read_str()?;
            let node: TreeNodeRef<DirectoryNode> = reader.read_ref()?;
            directory.add_directory(name, node).map_err(invalid)?;
        }

        let file_count = reader.read_varint()?;
        for _ in 0..file_count {
            let name = reader.read_str()?;
            let length = reader.read_varint()?;
            let bits = u32::try_from(reader.read_varint()?)
                .map_err(|_| TreeError::Decode("file flags out of range".into()))?;
            let node = reader.read_ref()?;
            let entry = FileEntry {
                node,
                length,
                flags: FileFlags::from_bits(bits),
            };
            directory.add_file(name, entry).map_err(invalid)?;
        }
        Ok(directory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::chunk_bytes;
    use crate::options::ChunkSizes;
    use arbor_store::InMemoryStorage;
    use arbor_tree::{TreeOptions, TreeWriter};
    use arbor_types::RefName;

    fn small_options() -> ChunkingOptions {
        ChunkingOptions {
            leaf: ChunkSizes::new(64, 256, 1024),
            interior: ChunkSizes::new(64, 128, 256),
        }
    }

    fn file(data: &[u8]) -> FileEntry {
        FileEntry::new(chunk_bytes(data, small_options()).unwrap(), FileFlags::NONE)
    }

    // -----------------------------------------------------------------------
    // Names
    // -----------------------------------------------------------------------

    #[test]
    fn duplicate_names_rejected_across_kinds() {
        let mut dir = DirectoryNode::new();
        dir.add_file("a", file(b"1")).unwrap();
        assert!(matches!(
            dir.add_file("a", file(b"2")),
            Err(FilesError::DuplicateName(name)) if name == "a"
        ));
        assert!(matches!(
            dir.add_directory("a", DirectoryNode::new()),
            Err(FilesError::DuplicateName(_))
        ));
        dir.add_directory("b", DirectoryNode::new()).unwrap();
        assert!(dir.add_file("b", file(b"3")).is_err());
        assert_eq!(dir.len(), 2);
    }

    #[test]
    fn invalid_names_rejected() {
        let mut dir = DirectoryNode::new();
        for name in ["", ".", "..", "a/b", "nul\0"] {
            assert!(
                matches!(dir.add_file(name, file(b"x")), Err(FilesError::InvalidName { .. })),
                "{name:?} accepted"
            );
        }
        assert!(dir.is_empty());
    }

    #[test]
    fn flags_combine() {
        let flags = FileFlags::EXECUTABLE | FileFlags::READ_ONLY;
        assert!(flags.contains(FileFlags::EXECUTABLE));
        assert!(flags.contains(FileFlags::READ_ONLY));
        assert!(!FileFlags::NONE.contains(FileFlags::EXECUTABLE));
        assert_eq!(flags.bits(), 3);
    }

    // -----------------------------------------------------------------------
    // Storage
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn directory_round_trips_through_store() {
        let mut inner = DirectoryNode::new();
        inner.add_file("notes.txt", file(b"inner notes")).unwrap();
        let mut root = DirectoryNode::new();
        root.add_directory("docs", inner).unwrap();
        let big: Vec<u8> = (0..10_000u32).map(|i| (i * 7 % 251) as u8).collect();
        root.add_file(
            "run.sh",
            FileEntry::new(chunk_bytes(&big, small_options()).unwrap(), FileFlags::EXECUTABLE),
        )
        .unwrap();

        let store = Arc::new(InMemoryStorage::new());
        let name = RefName::new("trees/main").unwrap();
        let mut writer = TreeWriter::new(store.clone(), TreeOptions::default()).unwrap();
        writer.write(&name, &root).await.unwrap();

        let reader = TreeReader::new(store);
        let stored = reader.read::<DirectoryNode>(&name).await.unwrap();
        assert_eq!(stored.len(), 2);

        let run = stored.file("run.sh").unwrap();
        assert_eq!(run.length, 10_000);
        assert!(run.flags.contains(FileFlags::EXECUTABLE));
        let content = run.node.expand(&reader).await.unwrap();
        assert_eq!(content.read_all(&reader).await.unwrap(), &big[..]);

        let docs = stored.directory("docs").unwrap().expand(&reader).await.unwrap();
        let notes = docs.file("notes.txt").unwrap().node.expand(&reader).await.unwrap();
        assert_eq!(notes.read_all(&reader).await.unwrap(), &b"inner notes"[..]);
    }

    #[tokio::test]
    async fn identical_subdirectories_stored_once() {
        let mut root = DirectoryNode::new();
        for name in ["a", "b", "c"] {
            root.add_directory(name, DirectoryNode::new()).unwrap();
        }

        let store = Arc::new(InMemoryStorage::new());
        let options = TreeOptions {
            max_exports_per_blob: 1,
            ..TreeOptions::default()
        };
        let mut writer = TreeWriter::new(store.clone(), options).unwrap();
        writer.flush(&root).await.unwrap();

        let stats = writer.stats();
        assert_eq!(stats.exports_written, 2);
        assert_eq!(stats.exports_deduplicated, 2);
        assert_eq!(store.blob_count(), 2);
    }

    // -----------------------------------------------------------------------
    // Disk
    // -----------------------------------------------------------------------

    fn writer_on(store: &Arc<InMemoryStorage>, max_blob_size: usize) -> TreeWriter {
        let options = TreeOptions {
            max_blob_size,
            ..TreeOptions::default()
        };
        TreeWriter::new(store.clone(), options).unwrap()
    }

    #[tokio::test]
    async fn disk_round_trip() {
        let source = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(source.path().join("src/nested")).unwrap();
        std::fs::create_dir_all(source.path().join("empty")).unwrap();
        std::fs::write(source.path().join("README"), b"hello arbor\n").unwrap();
        let large: Vec<u8> = (0..50_000u32).map(|i| (i % 13) as u8 ^ (i >> 8) as u8).collect();
        std::fs::write(source.path().join("src/data.bin"), &large).unwrap();
        std::fs::write(source.path().join("src/nested/empty.txt"), b"").unwrap();

        let store = Arc::new(InMemoryStorage::new());
        let mut writer = writer_on(&store, TreeOptions::default().max_blob_size);
        let tree = DirectoryNode::copy_from_directory(source.path(), &small_options(), &mut writer)
            .await
            .unwrap();
        assert_eq!(tree.len(), 3);
        assert!(tree.directory("empty").is_some());
        assert_eq!(tree.file("README").unwrap().length, 12);

        let handle = writer.flush(&tree).await.unwrap();
        let reader = TreeReader::new(store);
        let stored = reader.read_node::<DirectoryNode>(&handle).await.unwrap();

        let target = tempfile::tempdir().unwrap();
        let out = target.path().join("restored");
        stored.copy_to_directory(&reader, &out).await.unwrap();

        assert_eq!(std::fs::read(out.join("README")).unwrap(), b"hello arbor\n");
        assert_eq!(std::fs::read(out.join("src/data.bin")).unwrap(), large);
        assert_eq!(std::fs::read(out.join("src/nested/empty.txt")).unwrap(), b"");
        assert!(out.join("empty").is_dir());
    }

    #[tokio::test]
    async fn copy_in_writes_while_walking() {
        let source = tempfile::tempdir().unwrap();
        let mut expected = Vec::new();
        for dir in ["a", "b", "c"] {
            std::fs::create_dir_all(source.path().join(dir)).unwrap();
            for i in 0..4u32 {
                let data: Vec<u8> = (0..3_000u32)
                    .map(|j| (j.wrapping_mul(31) ^ i.wrapping_mul(977) ^ dir.as_bytes()[0] as u32) as u8)
                    .collect();
                let rel = format!("{dir}/{i}.bin");
                std::fs::write(source.path().join(&rel), &data).unwrap();
                expected.push((rel, data));
            }
        }

        let store = Arc::new(InMemoryStorage::new());
        let mut writer = writer_on(&store, 4096);
        let tree = DirectoryNode::copy_from_directory(source.path(), &small_options(), &mut writer)
            .await
            .unwrap();
        let written_during_walk = store.blob_count();
        assert!(written_during_walk > 0);
        assert!(tree.directory("a").unwrap().handle().is_some());

        let handle = writer.flush(&tree).await.unwrap();
        assert!(store.blob_count() >= written_during_walk);

        let reader = TreeReader::new(store);
        let stored = reader.read_node::<DirectoryNode>(&handle).await.unwrap();
        let target = tempfile::tempdir().unwrap();
        stored.copy_to_directory(&reader, target.path()).await.unwrap();
        for (rel, data) in expected {
            assert_eq!(std::fs::read(target.path().join(&rel)).unwrap(), data, "{rel}");
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn executable_bit_preserved_and_symlinks_skipped() {
        use std::os::unix::fs::PermissionsExt;

        let source = tempfile::tempdir().unwrap();
        let script = source.path().join("build.sh");
        std::fs::write(&script, b"#!/bin/sh\necho hi\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        std::fs::write(source.path().join("plain.txt"), b"plain").unwrap();
        std::os::unix::fs::symlink(&script, source.path().join("link.sh")).unwrap();

        let store = Arc::new(InMemoryStorage::new());
        let mut writer = writer_on(&store, TreeOptions::default().max_blob_size);
        let tree = DirectoryNode::copy_from_directory(source.path(), &small_options(), &mut writer)
            .await
            .unwrap();
        assert!(tree.file("link.sh").is_none());
        assert!(tree.file("build.sh").unwrap().flags.contains(FileFlags::EXECUTABLE));
        assert!(!tree.file("plain.txt").unwrap().flags.contains(FileFlags::EXECUTABLE));

        let reader = TreeReader::new(store);
        let target = tempfile::tempdir().unwrap();
        tree.copy_to_directory(&reader, target.path()).await.unwrap();
        let mode = std::fs::metadata(target.path().join("build.sh")).unwrap().permissions().mode();
        assert_ne!(mode & 0o111, 0);
        let mode = std::fs::metadata(target.path().join("plain.txt")).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0);
    }

    #[tokio::test]
    async fn copy_from_missing_directory_fails() {
        let source = tempfile::tempdir().unwrap();
        let missing = source.path().join("missing");
        let store = Arc::new(InMemoryStorage::new());
        let mut writer = writer_on(&store, TreeOptions::default().max_blob_size);
        assert!(matches!(
            DirectoryNode::copy_from_directory(&missing, &small_options(), &mut writer).await,
            Err(FilesError::Walk(_))
        ));
    }
}
