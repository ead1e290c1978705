use std::sync::OnceLock;

use bytes::Bytes;
use tracing::trace;

use arbor_types::NodeType;

use crate::error::{BundleError, BundleResult};
use crate::header::{BundleExport, BundleHeader, ExportSpan, ReferenceTarget};

/// A parsed bundle.
///
/// Parsing reads and validates the header only. Packets are checked and
/// decompressed the first time an export inside them is requested, and the
/// decoded packet is kept for later exports.
pub struct Bundle {
    header: BundleHeader,
    payload: Bytes,
    packet_offsets: Vec<usize>,
    spans: Vec<ExportSpan>,
    references: Vec<ReferenceTarget>,
    decoded: Vec<OnceLock<Bytes>>,
}

impl Bundle {
    /// Parse an encoded bundle.
    pub fn parse(data: Bytes) -> BundleResult<Self> {
        let (header, header_len) = BundleHeader::decode(&data)?;
        let payload = data.slice(header_len..);

        let expected = header.encoded_payload_len();
        if payload.len() as u64 != expected {
            if (payload.len() as u64) < expected {
                return Err(BundleError::Truncated {
                    offset: data.len(),
                    needed: (expected - payload.len() as u64) as usize,
                });
            }
            return Err(BundleError::CorruptHeader(format!(
                "{} trailing bytes after payload",
                payload.len() as u64 - expected
            )));
        }

        let mut packet_offsets = Vec::with_capacity(header.packets.len());
        let mut offset = 0usize;
        for packet in &header.packets {
            packet_offsets.push(offset);
            offset += packet.encoded_length as usize;
        }

        let spans = header.export_spans()?;
        let references = header.reference_table();
        let decoded = header.packets.iter().map(|_| OnceLock::new()).collect();

        Ok(Self {
            header,
            payload,
            packet_offsets,
            spans,
            references,
            decoded,
        })
    }

    pub fn header(&self) -> &BundleHeader {
        &self.header
    }

    pub fn export_count(&self) -> usize {
        self.header.exports.len()
    }

    pub fn export(&self, index: u32) -> BundleResult<&BundleExport> {
        self.header
            .exports
            .get(index as usize)
            .ok_or(BundleError::ExportOutOfRange {
                index,
                count: self.header.exports.len(),
            })
    }

    /// Type tag of an export.
    pub fn node_type(&self, index: u32) -> BundleResult<NodeType> {
        let export = self.export(index)?;
        Ok(self.header.types[export.type_index as usize])
    }

    /// Resolved reference targets of an export, in payload order.
    pub fn references(&self, index: u32) -> BundleResult<Vec<ReferenceTarget>> {
        let export = self.export(index)?;
        Ok(export
            .references
            .iter()
            .map(|&r| self.references[r as usize].clone())
            .collect())
    }

    /// Decoded payload of an export.
    pub fn export_data(&self, index: u32) -> BundleResult<Bytes> {
        self.export(index)?;
        let span = self.spans[index as usize];
        if span.length == 0 {
            return Ok(Bytes::new());
        }
        let packet = self.packet(span.packet)?;
        Ok(packet.slice(span.offset..span.offset + span.length))
    }

    fn packet(&self, index: usize) -> BundleResult<Bytes> {
        if let Some(decoded) = self.decoded[index].get() {
            return Ok(decoded.clone());
        }

        let info = &self.header.packets[index];
        let start = self.packet_offsets[index];
        let encoded = &self.payload[start..start + info.encoded_length as usize];
        if crc32fast::hash(encoded) != info.crc32 {
            return Err(BundleError::CrcMismatch { packet: index });
        }
        let decoded = Bytes::from(
            self.header
                .compression
                .decompress(encoded, info.decoded_length as usize)?,
        );
        trace!(packet = index, bytes = decoded.len(), "decoded packet");
        let _ = self.decoded[index].set(decoded.clone());
        Ok(decoded)
    }
}

impl std::fmt::Debug for Bundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bundle")
            .field("exports", &self.header.exports.len())
            .field("imports", &self.header.imports.len())
            .field("packets", &self.header.packets.len())
            .finish()
    }
}
