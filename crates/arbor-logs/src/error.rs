use arbor_files::FilesError;
use arbor_tree::TreeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LogError {
    #[error("tree error: {0}")]
    Tree(#[from] TreeError),

    #[error("file error: {0}")]
    Files(#[from] FilesError),

    #[error("invalid log options: {0}")]
    InvalidOptions(String),
}

pub type LogResult<T> = Result<T, LogError>;
