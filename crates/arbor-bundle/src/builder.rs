use std::collections::HashMap;

use bytes::Bytes;
use tracing::trace;

use arbor_types::{BlobLocator, ContentHash, NodeHandle, NodeType};

use crate::compression::Compression;
use crate::error::{BundleError, BundleResult};
use crate::header::{BundleExport, BundleHeader, BundleImport, BundlePacket, ImportedExport};

/// Default packet size in decoded bytes.
pub const DEFAULT_PACKET_SIZE: usize = 64 * 1024;

/// Lengths are stored as `u32` on the wire.
fn format_len(what: &'static str, len: usize) -> BundleResult<u32> {
    u32::try_from(len).map_err(|_| BundleError::TooLarge { what, len })
}

/// A reference from an export being built to another node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExportRef {
    /// An export already added to this builder.
    Local(u32),
    /// A node stored in another bundle.
    Import(NodeHandle),
}

struct PendingExport {
    type_index: u32,
    hash: ContentHash,
    length: u32,
    refs: Vec<ExportRef>,
}

/// Accumulates exports and produces one encoded bundle.
///
/// Payloads are appended to the open packet, which is sealed and compressed
/// as soon as it reaches the packet size, so no export ever spans two
/// packets. References are kept symbolic until [`finish`](Self::finish)
/// lays out the import table.
pub struct BundleBuilder {
    compression: Compression,
    packet_size: usize,
    types: Vec<NodeType>,
    type_lookup: HashMap<NodeType, u32>,
    exports: Vec<PendingExport>,
    packets: Vec<BundlePacket>,
    encoded: Vec<u8>,
    current: Vec<u8>,
    payload_len: u64,
}

impl BundleBuilder {
    pub fn new(compression: Compression, packet_size: usize) -> Self {
        Self {
            compression,
            packet_size: packet_size.max(1),
            types: Vec::new(),
            type_lookup: HashMap::new(),
            exports: Vec::new(),
            packets: Vec::new(),
            encoded: Vec::new(),
            current: Vec::new(),
            payload_len: 0,
        }
    }

    /// Add one export and return its index in the bundle.
    pub fn add_export(
        &mut self,
        node_type: NodeType,
        hash: ContentHash,
        data: &[u8],
        refs: Vec<ExportRef>,
    ) -> BundleResult<u32> {
        let index = self.exports.len() as u32;
        for reference in &refs {
            if let ExportRef::Local(target) = reference {
                if *target >= index {
                    return Err(BundleError::InvalidReference {
                        export: index,
                        reference: *target,
                        reason: "local references must point to earlier exports".into(),
                    });
                }
            }
        }
        let length = format_len("export", data.len())?;

        let type_index = match self.type_lookup.get(&node_type) {
            Some(&i) => i,
            None => {
                let i = self.types.len() as u32;
                self.types.push(node_type);
                self.type_lookup.insert(node_type, i);
                i
            }
        };

        self.current.extend_from_slice(data);
        self.payload_len += data.len() as u64;
        self.exports.push(PendingExport {
            type_index,
            hash,
            length,
            refs,
        });
        if self.current.len() >= self.packet_size {
            self.seal_packet()?;
        }
        Ok(index)
    }

    pub fn export_count(&self) -> usize {
        self.exports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exports.is_empty()
    }

    /// Decoded payload bytes added so far.
    pub fn payload_len(&self) -> u64 {
        self.payload_len
    }

    fn seal_packet(&mut self) -> BundleResult<()> {
        if self.current.is_empty() {
            return Ok(());
        }
        let encoded = self.compression.compress(&self.current)?;
        let packet = BundlePacket {
            decoded_length: format_len("packet", self.current.len())?,
            encoded_length: format_len("encoded packet", encoded.len())?,
            crc32: crc32fast::hash(&encoded),
        };
        trace!(
            packet = self.packets.len(),
            decoded = packet.decoded_length,
            encoded = packet.encoded_length,
            "sealed packet"
        );
        self.packets.push(packet);
        self.encoded.extend_from_slice(&encoded);
        self.current.clear();
        Ok(())
    }

    /// Seal the open packet and encode the bundle.
    pub fn finish(mut self) -> BundleResult<Bytes> {
        self.seal_packet()?;

        // Imports are numbered in order of first use.
        let mut import_slots: HashMap<BlobLocator, usize> = HashMap::new();
        let mut import_entries: Vec<HashMap<u32, usize>> = Vec::new();
        let mut imports: Vec<BundleImport> = Vec::new();
        for export in &self.exports {
            for reference in &export.refs {
                let ExportRef::Import(handle) = reference else {
                    continue;
                };
                let slot = *import_slots
                    .entry(handle.locator.blob.clone())
                    .or_insert_with(|| {
                        imports.push(BundleImport {
                            locator: handle.locator.blob.clone(),
                            exports: Vec::new(),
                        });
                        import_entries.push(HashMap::new());
                        imports.len() - 1
                    });
                let entries = &mut import_entries[slot];
                if !entries.contains_key(&handle.locator.export_index) {
                    entries.insert(handle.locator.export_index, imports[slot].exports.len());
                    imports[slot].exports.push(ImportedExport {
                        export_index: handle.locator.export_index,
                        hash: handle.hash,
                    });
                }
            }
        }

        let mut import_base = Vec::with_capacity(imports.len());
        let mut imported = 0usize;
        for import in &imports {
            import_base.push(imported);
            imported += import.exports.len();
        }

        let exports = self
            .exports
            .iter()
            .map(|export| BundleExport {
                type_index: export.type_index,
                hash: export.hash,
                length: export.length,
                references: export
                    .refs
                    .iter()
                    .map(|reference| match reference {
                        ExportRef::Local(i) => (imported + *i as usize) as u32,
                        ExportRef::Import(handle) => {
                            let slot = import_slots[&handle.locator.blob];
                            (import_base[slot] + import_entries[slot][&handle.locator.export_index])
                                as u32
                        }
                    })
                    .collect(),
            })
            .collect();

        let header = BundleHeader {
            compression: self.compression,
            types: self.types,
            imports,
            exports,
            packets: self.packets,
        };

        let mut buf = header.to_bytes();
        buf.extend_from_slice(&self.encoded);
        Ok(Bytes::from(buf))
    }
}

impl std::fmt::Debug for BundleBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BundleBuilder")
            .field("compression", &self.compression)
            .field("exports", &self.exports.len())
            .field("packets", &self.packets.len())
            .field("payload_len", &self.payload_len)
            .finish()
    }
}
