use arbor_types::{BlobLocator, RefName, TypeError};

/// Errors from storage backend operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested blob was not found.
    #[error("blob not found: {0}")]
    NotFound(BlobLocator),

    /// The requested ref has never been written (or was deleted).
    #[error("ref not found: {0}")]
    RefNotFound(RefName),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored record failed validation.
    #[error(transparent)]
    InvalidValue(#[from] TypeError),

    /// The backend configuration is malformed.
    #[error("invalid storage config: {0}")]
    Config(String),

    /// Storage backend is read-only or otherwise unavailable.
    #[error("store is read-only")]
    ReadOnly,
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
