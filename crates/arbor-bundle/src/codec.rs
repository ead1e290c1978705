//! Primitive encodings shared by the bundle header and node payloads.
//!
//! Fixed-width integers are big-endian. Variable-length integers use
//! unsigned LEB128: seven bits per byte, low bits first, high bit set on
//! every byte except the last.

use arbor_types::ContentHash;

use crate::error::{BundleError, BundleResult};

/// Encode a u64 as a variable-length integer.
pub fn encode_varint(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value > 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if value == 0 {
            break;
        }
    }
}

/// Number of bytes [`encode_varint`] produces for `value`.
pub fn varint_len(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.max(1).div_ceil(7)
}

/// Decode a variable-length integer. Returns (value, bytes_consumed).
pub fn decode_varint(data: &[u8]) -> BundleResult<(u64, usize)> {
    let mut value: u64 = 0;
    let mut shift = 0;
    for (i, &byte) in data.iter().enumerate() {
        if shift >= 64 || (shift == 63 && byte > 1) {
            return Err(BundleError::CorruptHeader("varint overflow".into()));
        }
        value |= ((byte & 0x7F) as u64) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(BundleError::Truncated {
        offset: data.len(),
        needed: 1,
    })
}

/// Append a length-prefixed UTF-8 string.
pub fn encode_string(buf: &mut Vec<u8>, value: &str) {
    encode_varint(buf, value.len() as u64);
    buf.extend_from_slice(value.as_bytes());
}

/// Cursor over an encoded byte slice.
#[derive(Debug)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current offset from the start of the slice.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn read_bytes(&mut self, len: usize) -> BundleResult<&'a [u8]> {
        if self.remaining() < len {
            return Err(BundleError::Truncated {
                offset: self.pos,
                needed: len,
            });
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn read_array<const N: usize>(&mut self) -> BundleResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> BundleResult<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u32(&mut self) -> BundleResult<u32> {
        Ok(u32::from_be_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> BundleResult<u64> {
        Ok(u64::from_be_bytes(self.read_array()?))
    }

    pub fn read_varint(&mut self) -> BundleResult<u64> {
        let (value, consumed) =
            decode_varint(&self.data[self.pos..]).map_err(|e| match e {
                BundleError::Truncated { needed, .. } => BundleError::Truncated {
                    offset: self.data.len(),
                    needed,
                },
                other => other,
            })?;
        self.pos += consumed;
        Ok(value)
    }

    /// Read a varint that must fit in a `u32`.
    pub fn read_varint_u32(&mut self) -> BundleResult<u32> {
        let value = self.read_varint()?;
        u32::try_from(value)
            .map_err(|_| BundleError::CorruptHeader(format!("value {value} exceeds u32")))
    }

    /// Read a varint used as an element count, rejecting counts that could
    /// not possibly fit in the remaining input.
    pub fn read_count(&mut self, min_element_size: usize) -> BundleResult<usize> {
        let count = self.read_varint()?;
        let count = usize::try_from(count)
            .map_err(|_| BundleError::CorruptHeader(format!("count {count} too large")))?;
        if count.saturating_mul(min_element_size.max(1)) > self.remaining() {
            return Err(BundleError::Truncated {
                offset: self.pos,
                needed: count.saturating_mul(min_element_size.max(1)),
            });
        }
        Ok(count)
    }

    pub fn read_string(&mut self) -> BundleResult<&'a str> {
        let len = self.read_count(1)?;
        let bytes = self.read_bytes(len)?;
        std::str::from_utf8(bytes)
            .map_err(|e| BundleError::CorruptHeader(format!("invalid UTF-8 string: {e}")))
    }

    pub fn read_hash(&mut self) -> BundleResult<ContentHash> {
        Ok(ContentHash::from_hash(self.read_array()?))
    }
}
