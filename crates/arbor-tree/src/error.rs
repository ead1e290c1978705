use arbor_bundle::BundleError;
use arbor_store::StoreError;
use arbor_types::{ContentHash, NodeLocator, NodeType};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TreeError {
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("bundle error: {0}")]
    Bundle(#[from] BundleError),

    #[error("node at {locator} has type {actual}, which {expected} cannot decode")]
    UnexpectedType {
        locator: NodeLocator,
        expected: &'static str,
        actual: NodeType,
    },

    #[error("no decoder registered for node type {0}")]
    UnknownType(NodeType),

    #[error("hash mismatch at {locator}: expected {expected}, computed {actual}")]
    HashMismatch {
        locator: NodeLocator,
        expected: ContentHash,
        actual: ContentHash,
    },

    #[error("decode error: {0}")]
    Decode(String),

    #[error("unresolved reference: {0}")]
    UnresolvedReference(String),

    #[error("export {locator} out of range (bundle has {count} exports)")]
    ExportOutOfRange { locator: NodeLocator, count: usize },

    #[error("invalid tree options: {0}")]
    InvalidOptions(String),
}

pub type TreeResult<T> = Result<T, TreeError>;
