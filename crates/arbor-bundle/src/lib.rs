//! Bundle wire format for Arbor.
//!
//! A bundle is the unit of physical storage: one blob holding many nodes
//! ("exports"). The header lists the node types used, the exports of other
//! bundles referenced ("imports"), every export with its hash, payload
//! length and references, and the packet table. The payload follows as a
//! sequence of independently compressed packets, so reading one node only
//! decompresses the packet that contains it.
//!
//! # Format
//!
//! ```text
//! magic "ABDL" | version u32 | compression u8
//! types   | imports | exports | packets      (varint-counted tables)
//! payload                                    (concatenated packets)
//! ```
//!
//! References of an export index a combined table: the flattened imports
//! first, then the local exports. Local references always point backwards.

pub mod builder;
pub mod bundle;
pub mod codec;
pub mod compression;
pub mod error;
pub mod header;

pub use builder::{BundleBuilder, ExportRef, DEFAULT_PACKET_SIZE};
pub use bundle::Bundle;
pub use compression::Compression;
pub use error::{BundleError, BundleResult};
pub use header::{
    BundleExport, BundleHeader, BundleImport, BundlePacket, ExportSpan, ImportedExport,
    ReferenceTarget, BUNDLE_MAGIC, BUNDLE_VERSION,
};
