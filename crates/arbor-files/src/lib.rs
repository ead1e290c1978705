//! Files and directories stored as Arbor node trees.
//!
//! File content is split by [`FileNodeWriter`] at content-defined
//! boundaries, so identical runs of bytes map to identical leaves wherever
//! they occur and are stored once. [`DirectoryNode`] mirrors a directory
//! hierarchy and can be copied from and to disk.

pub mod chunker;
pub mod directory;
pub mod error;
pub mod file;
pub mod options;

use arbor_tree::NodeRegistry;

pub use chunker::{chunk_bytes, FileNodeWriter, WINDOW_SIZE};
pub use directory::{DirectoryNode, FileEntry, FileFlags, DIRECTORY_TYPE};
pub use error::{FilesError, FilesResult};
pub use file::{FileChild, FileNode, InteriorFileNode, LeafFileNode, INTERIOR_FILE_TYPE, LEAF_FILE_TYPE};
pub use options::{ChunkSizes, ChunkingOptions};

/// Register the file and directory node kinds with `registry`.
pub fn register_file_nodes(registry: &mut NodeRegistry) -> &mut NodeRegistry {
    registry
        .register::<FileNode>(LEAF_FILE_TYPE)
        .register::<FileNode>(INTERIOR_FILE_TYPE)
        .register::<DirectoryNode>(DIRECTORY_TYPE)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arbor_store::InMemoryStorage;
    use arbor_tree::{TreeNode, TreeOptions, TreeReader, TreeWriter};

    use super::*;

    #[tokio::test]
    async fn registered_kinds_decode_untyped() {
        let mut registry = NodeRegistry::with_defaults();
        register_file_nodes(&mut registry);
        assert!(registry.contains(&DIRECTORY_TYPE));
        assert!(registry.contains(&INTERIOR_FILE_TYPE));

        let mut root = DirectoryNode::new();
        let content = chunk_bytes(b"registered", ChunkingOptions::default()).unwrap();
        root.add_file("a.txt", FileEntry::new(content, FileFlags::NONE)).unwrap();

        let store = Arc::new(InMemoryStorage::new());
        let handle = TreeWriter::new(store.clone(), TreeOptions::default())
            .unwrap()
            .flush(&root)
            .await
            .unwrap();

        let reader = TreeReader::new(store).with_registry(registry);
        let node = reader.read_any(&handle).await.unwrap();
        assert_eq!(node.node_type(), DIRECTORY_TYPE);
    }
}
