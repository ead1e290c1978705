//! Foundation types for Arbor.
//!
//! This crate provides the identity and addressing types shared by every
//! other Arbor crate. Nothing in here performs I/O.
//!
//! # Key Types
//!
//! - [`ContentHash`]: BLAKE3 digest used as the deduplication identity
//! - [`BlobLocator`]: Backend-assigned identifier of one stored bundle
//! - [`NodeLocator`]: A bundle plus the index of an export inside it
//! - [`NodeHandle`]: A located node together with its content hash
//! - [`RefName`]: Validated name of a mutable root pointer
//! - [`NodeType`]: 128-bit type tag plus version recorded per export

pub mod error;
pub mod hash;
pub mod locator;
pub mod names;
pub mod node_type;

pub use error::TypeError;
pub use hash::ContentHash;
pub use locator::{BlobLocator, NodeHandle, NodeLocator};
pub use names::RefName;
pub use node_type::NodeType;
