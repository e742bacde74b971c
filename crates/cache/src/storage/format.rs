//! Binary format of durable entries
//!
//! Each file is a fixed-size bincode [`StorageHeader`] followed by the
//! payload: a bincode-encoded image record, optionally zstd compressed.
//! The header carries CRC32C checksums of itself and of the payload so a
//! torn or tampered file is detected before any pixel data is trusted.

use crc32c::crc32c;
use lumen_core::{CacheKey, DecodedImage, Error, PixelFormat, Result, SerializationOp};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Magic number for durable entries: "LUMN"
pub const LUMEN_MAGIC: u32 = 0x4C55_4D4E;

/// Current storage format version
pub const STORAGE_VERSION: u16 = 1;

/// Encoded length of [`StorageHeader`] under bincode's fixed-int encoding
pub const HEADER_SIZE: usize = 32;

/// Binary header written in front of every durable payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageHeader {
    magic: u32,
    version: u16,
    /// Bit 0: payload is zstd compressed
    flags: u16,
    /// CRC32C of the header with this field zeroed
    header_crc: u32,
    uncompressed_size: u64,
    payload_size: u64,
    data_crc: u32,
}

impl StorageHeader {
    const FLAG_COMPRESSED: u16 = 1 << 0;

    pub fn new(uncompressed_size: u64, payload: &[u8], compressed: bool) -> Self {
        let mut header = Self {
            magic: LUMEN_MAGIC,
            version: STORAGE_VERSION,
            flags: if compressed { Self::FLAG_COMPRESSED } else { 0 },
            header_crc: 0,
            uncompressed_size,
            payload_size: payload.len() as u64,
            data_crc: crc32c(payload),
        };
        header.header_crc = header.calculate_crc();
        header
    }

    fn calculate_crc(&self) -> u32 {
        let mut temp = *self;
        temp.header_crc = 0;
        match bincode::serialize(&temp) {
            Ok(bytes) => crc32c(&bytes),
            Err(_) => 0,
        }
    }

    /// Check magic, version and header checksum
    pub fn validate(&self, key: &CacheKey) -> Result<()> {
        if self.magic != LUMEN_MAGIC {
            return Err(Error::corruption(
                key.as_str(),
                format!(
                    "invalid magic number: expected {LUMEN_MAGIC:08x}, got {:08x}",
                    self.magic
                ),
            ));
        }
        if self.version > STORAGE_VERSION {
            return Err(Error::corruption(
                key.as_str(),
                format!("unsupported storage version {}", self.version),
            ));
        }
        let expected = self.calculate_crc();
        if self.header_crc != expected {
            return Err(Error::corruption(
                key.as_str(),
                format!(
                    "header CRC mismatch: expected {expected:08x}, got {:08x}",
                    self.header_crc
                ),
            ));
        }
        Ok(())
    }

    pub fn is_compressed(&self) -> bool {
        self.flags & Self::FLAG_COMPRESSED != 0
    }

    pub fn payload_size(&self) -> u64 {
        self.payload_size
    }
}

#[derive(Serialize)]
struct StoredImageRef<'a> {
    width: u32,
    height: u32,
    format: PixelFormat,
    pixels: &'a [u8],
}

#[derive(Deserialize)]
struct StoredImage {
    width: u32,
    height: u32,
    format: PixelFormat,
    pixels: Vec<u8>,
}

/// Encodes and decodes durable entries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurableCodec {
    compress: bool,
    level: i32,
}

impl DurableCodec {
    pub fn new(compress: bool, level: i32) -> Self {
        Self { compress, level }
    }

    pub fn uncompressed() -> Self {
        Self::new(false, 0)
    }

    pub fn encode(&self, key: &CacheKey, image: &DecodedImage) -> Result<Vec<u8>> {
        let record = StoredImageRef {
            width: image.width(),
            height: image.height(),
            format: image.format(),
            pixels: image.pixels(),
        };
        let body = bincode::serialize(&record).map_err(|e| {
            Error::serialization(key.as_str(), SerializationOp::Encode, e.to_string())
        })?;

        let payload = if self.compress {
            zstd::bulk::compress(&body, self.level).map_err(|e| {
                Error::serialization(key.as_str(), SerializationOp::Compress, e.to_string())
            })?
        } else {
            body.clone()
        };

        let header = StorageHeader::new(body.len() as u64, &payload, self.compress);
        let mut output = bincode::serialize(&header).map_err(|e| {
            Error::serialization(key.as_str(), SerializationOp::Encode, e.to_string())
        })?;
        output.reserve(payload.len());
        output.extend_from_slice(&payload);
        Ok(output)
    }

    /// Decode a durable entry, verifying every checksum on the way.
    ///
    /// Entries written with or without compression decode regardless of this
    /// codec's own setting.
    pub fn decode(&self, key: &CacheKey, bytes: &[u8]) -> Result<DecodedImage> {
        if bytes.len() < HEADER_SIZE {
            return Err(Error::corruption(
                key.as_str(),
                format!("truncated header: {} bytes", bytes.len()),
            ));
        }
        let (head, payload) = bytes.split_at(HEADER_SIZE);

        let header: StorageHeader = bincode::deserialize(head)
            .map_err(|e| Error::corruption(key.as_str(), format!("unreadable header: {e}")))?;
        header.validate(key)?;

        if payload.len() as u64 != header.payload_size {
            return Err(Error::corruption(
                key.as_str(),
                format!(
                    "payload size mismatch: expected {}, got {}",
                    header.payload_size,
                    payload.len()
                ),
            ));
        }
        let actual_crc = crc32c(payload);
        if actual_crc != header.data_crc {
            return Err(Error::corruption(
                key.as_str(),
                format!(
                    "data CRC mismatch: expected {:08x}, got {actual_crc:08x}",
                    header.data_crc
                ),
            ));
        }

        let body: Cow<'_, [u8]> = if header.is_compressed() {
            let capacity = usize::try_from(header.uncompressed_size).map_err(|_| {
                Error::corruption(key.as_str(), "uncompressed size exceeds address space")
            })?;
            Cow::Owned(zstd::bulk::decompress(payload, capacity).map_err(|e| {
                Error::serialization(key.as_str(), SerializationOp::Decompress, e.to_string())
            })?)
        } else {
            Cow::Borrowed(payload)
        };

        if body.len() as u64 != header.uncompressed_size {
            return Err(Error::corruption(
                key.as_str(),
                format!(
                    "decompressed size mismatch: expected {}, got {}",
                    header.uncompressed_size,
                    body.len()
                ),
            ));
        }

        let stored: StoredImage = bincode::deserialize(&body).map_err(|e| {
            Error::serialization(key.as_str(), SerializationOp::Decode, e.to_string())
        })?;

        DecodedImage::new(stored.width, stored.height, stored.format, stored.pixels)
            .map_err(|e| Error::corruption(key.as_str(), e.to_string()))
    }
}

impl Default for DurableCodec {
    fn default() -> Self {
        Self::new(true, lumen_core::DEFAULT_COMPRESSION_LEVEL)
    }
}
