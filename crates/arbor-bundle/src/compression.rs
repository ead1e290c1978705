use serde::{Deserialize, Serialize};

use crate::error::{BundleError, BundleResult};

const ZSTD_LEVEL: i32 = 3;

/// Packet compression format, recorded once per bundle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// Packets are stored as-is.
    None,
    /// Packets are zstd frames.
    #[default]
    Zstd,
}

impl Compression {
    /// Wire tag for this format.
    pub fn tag(self) -> u8 {
        match self {
            Compression::None => 0,
            Compression::Zstd => 1,
        }
    }

    pub fn from_tag(tag: u8) -> BundleResult<Self> {
        match tag {
            0 => Ok(Compression::None),
            1 => Ok(Compression::Zstd),
            other => Err(BundleError::UnknownCompression(other)),
        }
    }

    /// Encode one packet.
    pub fn compress(self, data: &[u8]) -> BundleResult<Vec<u8>> {
        match self {
            Compression::None => Ok(data.to_vec()),
            Compression::Zstd => zstd::encode_all(data, ZSTD_LEVEL)
                .map_err(|e| BundleError::CompressionFailed(e.to_string())),
        }
    }

    /// Decode one packet and check it has the recorded decoded length.
    pub fn decompress(self, data: &[u8], decoded_len: usize) -> BundleResult<Vec<u8>> {
        let decoded = match self {
            Compression::None => data.to_vec(),
            Compression::Zstd => zstd::decode_all(data)
                .map_err(|e| BundleError::DecompressionFailed(e.to_string()))?,
        };
        if decoded.len() != decoded_len {
            return Err(BundleError::DecompressionFailed(format!(
                "expected {decoded_len} decoded bytes, got {}",
                decoded.len()
            )));
        }
        Ok(decoded)
    }
}
