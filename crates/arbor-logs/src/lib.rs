//! Searchable log storage for Arbor.
//!
//! A [`LogBuilder`] stores log text as a chunked file tree and groups lines
//! into blocks. Each block records the set of 4-byte n-gram fingerprints of
//! its lines, which lets [`LogNode::search`] skip blocks that cannot contain
//! a term and scan only the rest. Blocks are never skipped wrongly; a
//! scanned block may still turn out to hold no match.

pub mod builder;
pub mod error;
pub mod lines;
pub mod ngram;
pub mod node;
pub mod options;
pub mod search;

use arbor_tree::NodeRegistry;

pub use builder::LogBuilder;
pub use error::{LogError, LogResult};
pub use lines::LogLines;
pub use ngram::{NgramSet, NGRAM_LEN};
pub use node::{LogBlock, LogIndexNode, LogNode, LOG_INDEX_TYPE, LOG_TYPE};
pub use options::LogOptions;
pub use search::{LogSearch, SearchMatch, SearchStats};

/// Register the log node kinds with `registry`.
pub fn register_log_nodes(registry: &mut NodeRegistry) -> &mut NodeRegistry {
    registry
        .register::<LogNode>(LOG_TYPE)
        .register::<LogIndexNode>(LOG_INDEX_TYPE)
}


#[cfg(test)]
mod tests {
    use super::*;
    use arbor_tree::TreeNode;

    #[tokio::test]
    async fn registered_kinds_decode_untyped() {
        let mut registry = NodeRegistry::with_defaults();
        arbor_files::register_file_nodes(&mut registry);
        register_log_nodes(&mut registry);

        let log = testing::build(b"one\ntwo\n", LogOptions::default());
        let (reader, stored) = testing::store(&log).await;
        let reader = reader.with_registry(registry);

        let index = stored.index.handle().unwrap();
        let node = reader.read_any(index).await.unwrap();
        assert_eq!(node.node_type(), LOG_INDEX_TYPE);
        let text = stored.text.handle().unwrap();
        assert_eq!(
            reader.read_any(text).await.unwrap().node_type(),
            arbor_files::LEAF_FILE_TYPE
        );
    }
}
