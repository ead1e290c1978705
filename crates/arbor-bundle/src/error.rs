use arbor_types::TypeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BundleError {
    #[error("invalid bundle magic: expected {expected}, got {actual}")]
    InvalidMagic { expected: String, actual: String },

    #[error("unsupported bundle version: {0}")]
    UnsupportedVersion(u32),

    #[error("unknown compression format: {0}")]
    UnknownCompression(u8),

    #[error("truncated bundle: needed {needed} bytes at offset {offset}")]
    Truncated { offset: usize, needed: usize },

    #[error("corrupt bundle header: {0}")]
    CorruptHeader(String),

    #[error("CRC32 mismatch for packet {packet}")]
    CrcMismatch { packet: usize },

    #[error("decompression failed: {0}")]
    DecompressionFailed(String),

    #[error("compression failed: {0}")]
    CompressionFailed(String),

    #[error("{what} of {len} bytes exceeds the 4 GiB format limit")]
    TooLarge { what: &'static str, len: usize },

    #[error("export {index} out of range (bundle has {count} exports)")]
    ExportOutOfRange { index: u32, count: usize },

    #[error("export {export} has invalid reference {reference}: {reason}")]
    InvalidReference {
        export: u32,
        reference: u32,
        reason: String,
    },

    #[error(transparent)]
    InvalidValue(#[from] TypeError),
}

pub type BundleResult<T> = Result<T, BundleError>;
