//! Body compression selected by the frame's compression id.
//!
//! The frame header names a compressor by a single byte; [`CompressType`] maps that
//! byte to a name, and the name is resolved through the extension registry to a
//! [`Compressor`].

use crate::core::frame::MAX_FRAME_LENGTH;
use crate::error::{Result, RpcError};
use std::io::Read;

/// Maximum output size for decompression, aligned with the frame limit
const MAX_DECOMPRESSION_SIZE: usize = MAX_FRAME_LENGTH;

/// Compression ids carried in byte 11 of the frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressType {
    None = 0x00,
    Lz4 = 0x01,
    Zstd = 0x02,
}

impl CompressType {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x00 => Some(CompressType::None),
            0x01 => Some(CompressType::Lz4),
            0x02 => Some(CompressType::Zstd),
            _ => None,
        }
    }

    /// Extension name for this id
    pub fn name(self) -> &'static str {
        match self {
            CompressType::None => "none",
            CompressType::Lz4 => "lz4",
            CompressType::Zstd => "zstd",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "none" => Some(CompressType::None),
            "lz4" => Some(CompressType::Lz4),
            "zstd" => Some(CompressType::Zstd),
            _ => None,
        }
    }
}

/// Compression capability consumed by the frame codec
pub trait Compressor: Send + Sync {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// Pass-through
pub struct NoCompression;

impl Compressor for NoCompression {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        if data.len() > MAX_DECOMPRESSION_SIZE {
            return Err(RpcError::DecompressionFailure);
        }
        Ok(data.to_vec())
    }
}

/// LZ4 block format with a 4-byte little-endian size prefix
pub struct Lz4Compressor;

impl Compressor for Lz4Compressor {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(lz4_flex::compress_prepend_size(data))
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        if data.len() < 4 {
            return Err(RpcError::DecompressionFailure);
        }

        // Reject the claimed size before lz4_flex allocates for it
        let claimed_size = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if claimed_size > MAX_DECOMPRESSION_SIZE {
            return Err(RpcError::DecompressionFailure);
        }

        lz4_flex::decompress_size_prepended(data).map_err(|_| RpcError::DecompressionFailure)
    }
}

/// Zstandard stream format
pub struct ZstdCompressor {
    level: i32,
}

impl ZstdCompressor {
    pub fn new(level: i32) -> Self {
        Self { level }
    }
}

impl Default for ZstdCompressor {
    fn default() -> Self {
        Self::new(1)
    }
}

impl Compressor for ZstdCompressor {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        zstd::stream::copy_encode(data, &mut out, self.level)
            .map_err(|_| RpcError::CompressionFailure)?;
        Ok(out)
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut reader =
            zstd::stream::Decoder::new(data).map_err(|_| RpcError::DecompressionFailure)?;

        // Read in chunks so the size limit holds for streams with no declared size
        let mut out = Vec::new();
        let mut chunk = [0u8; 8192];
        loop {
            match reader.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    out.extend_from_slice(&chunk[..n]);
                    if out.len() > MAX_DECOMPRESSION_SIZE {
                        return Err(RpcError::DecompressionFailure);
                    }
                }
                Err(_) => return Err(RpcError::DecompressionFailure),
            }
        }
        Ok(out)
    }
}
