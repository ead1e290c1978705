use arbor_tree::TreeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FilesError {
    #[error("tree error: {0}")]
    Tree(#[from] TreeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("duplicate entry name: {0}")]
    DuplicateName(String),

    #[error("invalid entry name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    #[error("invalid chunking options: {0}")]
    InvalidOptions(String),

    #[error("corrupt file tree: {0}")]
    Corrupt(String),

    #[error("range {offset}+{len} is outside a file of {file_len} bytes")]
    OutOfRange { offset: u64, len: u64, file_len: u64 },
}

pub type FilesResult<T> = Result<T, FilesError>;
