//! Storage backends for Arbor.
//!
//! A backend stores opaque bundle blobs under backend-assigned
//! [`BlobLocator`]s and keeps the registry of named refs. It never
//! interprets blob contents.
//!
//! # Storage Backends
//!
//! All backends implement [`BlobStore`] and [`RefStore`], and therefore
//! [`StorageBackend`]:
//!
//! - [`InMemoryStorage`] -- `HashMap`-based store for tests and embedding
//! - [`FileStorage`] -- one file per blob and per ref under a root directory
//!
//! # Design Rules
//!
//! 1. Blobs are immutable once written.
//! 2. Write-then-link: blobs are stored before any ref points at them.
//! 3. Concurrent reads are always safe.
//! 4. Ref writes replace the previous value atomically.
//! 5. All I/O errors are propagated, never silently ignored.
//!
//! [`BlobLocator`]: arbor_types::BlobLocator

pub mod config;
pub mod error;
pub mod file;
pub mod memory;
pub mod traits;

pub use config::{BackendKind, StorageConfig};
pub use error::{StoreError, StoreResult};
pub use file::FileStorage;
pub use memory::InMemoryStorage;
pub use traits::{BlobStore, RefStore, StorageBackend};
