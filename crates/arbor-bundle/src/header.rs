//! Bundle header: the type, import, export and packet tables that precede
//! the payload.

use arbor_types::{BlobLocator, ContentHash, NodeHandle, NodeLocator, NodeType};
use uuid::Uuid;

use crate::codec::{encode_string, encode_varint, ByteReader};
use crate::compression::Compression;
use crate::error::{BundleError, BundleResult};

/// Magic bytes at the start of every bundle.
pub const BUNDLE_MAGIC: &[u8; 4] = b"ABDL";

/// Current bundle format version.
pub const BUNDLE_VERSION: u32 = 1;

/// One export of another bundle that this bundle references.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImportedExport {
    pub export_index: u32,
    pub hash: ContentHash,
}

/// All exports referenced from one other bundle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BundleImport {
    pub locator: BlobLocator,
    pub exports: Vec<ImportedExport>,
}

/// One node stored in this bundle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BundleExport {
    /// Index into [`BundleHeader::types`].
    pub type_index: u32,
    pub hash: ContentHash,
    /// Payload length in decoded bytes.
    pub length: u32,
    /// Indices into the combined reference table, in payload order.
    pub references: Vec<u32>,
}

/// One independently compressed slice of the payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BundlePacket {
    pub decoded_length: u32,
    pub encoded_length: u32,
    /// CRC32 of the encoded bytes.
    pub crc32: u32,
}

/// Where an entry of the combined reference table points.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReferenceTarget {
    /// An export of another bundle.
    Import {
        locator: NodeLocator,
        hash: ContentHash,
    },
    /// An earlier export of the same bundle.
    Local(u32),
}

impl ReferenceTarget {
    /// Resolve to a full handle, given the locator of the bundle holding
    /// the reference.
    pub fn to_handle(&self, this_bundle: &BlobLocator, exports: &[BundleExport]) -> Option<NodeHandle> {
        match self {
            ReferenceTarget::Import { locator, hash } => {
                Some(NodeHandle::new(*hash, locator.clone()))
            }
            ReferenceTarget::Local(index) => exports.get(*index as usize).map(|export| {
                NodeHandle::new(export.hash, NodeLocator::new(this_bundle.clone(), *index))
            }),
        }
    }
}

/// Position of one export inside the decoded payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExportSpan {
    pub packet: usize,
    /// Offset within the decoded packet.
    pub offset: usize,
    pub length: usize,
}

/// Decoded bundle header.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BundleHeader {
    pub compression: Compression,
    pub types: Vec<NodeType>,
    pub imports: Vec<BundleImport>,
    pub exports: Vec<BundleExport>,
    pub packets: Vec<BundlePacket>,
}

impl BundleHeader {
    // -----------------------------------------------------------------------
    // Encoding
    // -----------------------------------------------------------------------

    pub fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(BUNDLE_MAGIC);
        buf.extend_from_slice(&BUNDLE_VERSION.to_be_bytes());
        buf.push(self.compression.tag());

        encode_varint(buf, self.types.len() as u64);
        for node_type in &self.types {
            buf.extend_from_slice(node_type.id.as_bytes());
            encode_varint(buf, node_type.version as u64);
        }

        encode_varint(buf, self.imports.len() as u64);
        for import in &self.imports {
            encode_string(buf, import.locator.as_str());
            encode_varint(buf, import.exports.len() as u64);
            for imported in &import.exports {
                encode_varint(buf, imported.export_index as u64);
                buf.extend_from_slice(imported.hash.as_bytes());
            }
        }

        encode_varint(buf, self.exports.len() as u64);
        for export in &self.exports {
            encode_varint(buf, export.type_index as u64);
            buf.extend_from_slice(export.hash.as_bytes());
            encode_varint(buf, export.length as u64);
            encode_varint(buf, export.references.len() as u64);
            for reference in &export.references {
                encode_varint(buf, *reference as u64);
            }
        }

        encode_varint(buf, self.packets.len() as u64);
        for packet in &self.packets {
            encode_varint(buf, packet.decoded_length as u64);
            encode_varint(buf, packet.encoded_length as u64);
            buf.extend_from_slice(&packet.crc32.to_be_bytes());
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode(&mut buf);
        buf
    }

    // -----------------------------------------------------------------------
    // Decoding
    // -----------------------------------------------------------------------

    /// Decode and validate a header from the start of `data`.
    ///
    /// Returns the header and the number of bytes it occupied.
    pub fn decode(data: &[u8]) -> BundleResult<(Self, usize)> {
        let mut reader = ByteReader::new(data);

        let magic: [u8; 4] = reader.read_array()?;
        if &magic != BUNDLE_MAGIC {
            return Err(BundleError::InvalidMagic {
                expected: String::from_utf8_lossy(BUNDLE_MAGIC).into_owned(),
                actual: String::from_utf8_lossy(&magic).into_owned(),
            });
        }
        let version = reader.read_u32()?;
        if version != BUNDLE_VERSION {
            return Err(BundleError::UnsupportedVersion(version));
        }
        let compression = Compression::from_tag(reader.read_u8()?)?;

        let type_count = reader.read_count(17)?;
        let mut types = Vec::with_capacity(type_count);
        for _ in 0..type_count {
            let id = Uuid::from_bytes(reader.read_array()?);
            let version = reader.read_varint_u32()?;
            types.push(NodeType { id, version });
        }

        let import_count = reader.read_count(2)?;
        let mut imports = Vec::with_capacity(import_count);
        for _ in 0..import_count {
            let locator = BlobLocator::new(reader.read_string()?)?;
            let export_count = reader.read_count(33)?;
            let mut exports = Vec::with_capacity(export_count);
            for _ in 0..export_count {
                let export_index = reader.read_varint_u32()?;
                let hash = reader.read_hash()?;
                exports.push(ImportedExport { export_index, hash });
            }
            imports.push(BundleImport { locator, exports });
        }

        let export_count = reader.read_count(35)?;
        let mut exports = Vec::with_capacity(export_count);
        for _ in 0..export_count {
            let type_index = reader.read_varint_u32()?;
            let hash = reader.read_hash()?;
            let length = reader.read_varint_u32()?;
            let reference_count = reader.read_count(1)?;
            let mut references = Vec::with_capacity(reference_count);
            for _ in 0..reference_count {
                references.push(reader.read_varint_u32()?);
            }
            exports.push(BundleExport {
                type_index,
                hash,
                length,
                references,
            });
        }

        let packet_count = reader.read_count(6)?;
        let mut packets = Vec::with_capacity(packet_count);
        for _ in 0..packet_count {
            let decoded_length = reader.read_varint_u32()?;
            let encoded_length = reader.read_varint_u32()?;
            let crc32 = reader.read_u32()?;
            packets.push(BundlePacket {
                decoded_length,
                encoded_length,
                crc32,
            });
        }

        let header = Self {
            compression,
            types,
            imports,
            exports,
            packets,
        };
        header.validate()?;
        Ok((header, reader.position()))
    }

    // -----------------------------------------------------------------------
    // Structure
    // -----------------------------------------------------------------------

    /// Number of entries contributed to the reference table by imports.
    pub fn import_reference_count(&self) -> usize {
        self.imports.iter().map(|import| import.exports.len()).sum()
    }

    /// The combined reference table: flattened imports, then local exports.
    pub fn reference_table(&self) -> Vec<ReferenceTarget> {
        let mut table = Vec::with_capacity(self.import_reference_count() + self.exports.len());
        for import in &self.imports {
            for imported in &import.exports {
                table.push(ReferenceTarget::Import {
                    locator: NodeLocator::new(import.locator.clone(), imported.export_index),
                    hash: imported.hash,
                });
            }
        }
        table.extend((0..self.exports.len() as u32).map(ReferenceTarget::Local));
        table
    }

    /// Total encoded payload length described by the packet table.
    pub fn encoded_payload_len(&self) -> u64 {
        self.packets.iter().map(|p| p.encoded_length as u64).sum()
    }

    /// Total decoded payload length described by the packet table.
    pub fn decoded_payload_len(&self) -> u64 {
        self.packets.iter().map(|p| p.decoded_length as u64).sum()
    }

    /// Locate every export inside the packets.
    ///
    /// Fails if an export would straddle a packet boundary or the export
    /// lengths do not add up to the decoded payload length.
    pub fn export_spans(&self) -> BundleResult<Vec<ExportSpan>> {
        let mut spans = Vec::with_capacity(self.exports.len());
        let mut offset: u64 = 0;
        let mut current = 0usize;
        let mut next_packet = 0usize;
        let mut packet_start: u64 = 0;
        let mut packet_end: u64 = 0;

        for (index, export) in self.exports.iter().enumerate() {
            let length = export.length as u64;
            if length > 0 {
                while offset >= packet_end {
                    let packet = self.packets.get(next_packet).ok_or_else(|| {
                        BundleError::CorruptHeader(format!(
                            "export {index} lies beyond the last packet"
                        ))
                    })?;
                    current = next_packet;
                    next_packet += 1;
                    packet_start = packet_end;
                    packet_end += packet.decoded_length as u64;
                }
                if offset + length > packet_end {
                    return Err(BundleError::CorruptHeader(format!(
                        "export {index} spans a packet boundary"
                    )));
                }
            }
            spans.push(ExportSpan {
                packet: current,
                offset: (offset.saturating_sub(packet_start)) as usize,
                length: length as usize,
            });
            offset += length;
        }

        if offset != self.decoded_payload_len() {
            return Err(BundleError::CorruptHeader(format!(
                "payload length mismatch: exports cover {offset} bytes, packets hold {}",
                self.decoded_payload_len()
            )));
        }
        Ok(spans)
    }

    /// Check internal consistency of the tables.
    pub fn validate(&self) -> BundleResult<()> {
        let imported = self.import_reference_count();
        let table_len = imported + self.exports.len();

        for (index, export) in self.exports.iter().enumerate() {
            let index = index as u32;
            if export.type_index as usize >= self.types.len() {
                return Err(BundleError::CorruptHeader(format!(
                    "export {index} has type index {} but only {} types are declared",
                    export.type_index,
                    self.types.len()
                )));
            }
            for &reference in &export.references {
                let reason = if reference as usize >= table_len {
                    Some(format!("reference table has {table_len} entries"))
                } else if reference as usize >= imported
                    && reference as usize - imported >= index as usize
                {
                    Some("local references must point to earlier exports".to_string())
                } else {
                    None
                };
                if let Some(reason) = reason {
                    return Err(BundleError::InvalidReference {
                        export: index,
                        reference,
                        reason,
                    });
                }
            }
        }

        self.export_spans()?;
        Ok(())
    }
}
