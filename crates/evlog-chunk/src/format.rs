//! Chunk file header and footer codec.
//!
//! A chunk file is `header | data | map | footer`. The header is written when
//! the file is created; the footer only when the chunk is completed. Both are
//! fixed 128-byte blocks with little-endian fields and a trailing xxh3 of
//! their own encoded fields.

use evlog_error::{EvlogError, Result};
use uuid::Uuid;
use xxhash_rust::xxh3::xxh3_64;

/// Size of the encoded header.
pub const CHUNK_HEADER_SIZE: usize = 128;
/// Size of the encoded footer.
pub const CHUNK_FOOTER_SIZE: usize = 128;

const HEADER_MAGIC: [u8; 4] = *b"EVCH";
const FOOTER_MAGIC: [u8; 4] = *b"EVCF";
const FORMAT_VERSION: u32 = 1;

const HEADER_HASH_INPUT_BYTES: usize = 40;
const FOOTER_HASH_INPUT_BYTES: usize = 40;

const FOOTER_FLAG_COMPLETED: u8 = 0x01;

/// Header stored at the start of each chunk file.
///
/// Layout (128 bytes):
/// - `magic[4]`
/// - `version: u32`
/// - `chunk_size: u32` (data capacity of an ongoing chunk)
/// - `chunk_start_number: u32`
/// - `chunk_end_number: u32`
/// - `is_scavenged: u8`, 3 reserved bytes
/// - `chunk_id[16]`
/// - `header_xxh3: u64` (hash of preceding 40 bytes)
/// - zero padding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub chunk_size: u32,
    pub chunk_start_number: u32,
    pub chunk_end_number: u32,
    pub is_scavenged: bool,
    pub chunk_id: Uuid,
}

impl ChunkHeader {
    /// Header for a fresh chunk with a random id.
    #[must_use]
    pub fn new(
        chunk_size: u32,
        chunk_start_number: u32,
        chunk_end_number: u32,
        is_scavenged: bool,
    ) -> Self {
        Self {
            chunk_size,
            chunk_start_number,
            chunk_end_number,
            is_scavenged,
            chunk_id: Uuid::new_v4(),
        }
    }

    #[inline]
    #[must_use]
    pub const fn start_number(&self) -> usize {
        self.chunk_start_number as usize
    }

    #[inline]
    #[must_use]
    pub const fn end_number(&self) -> usize {
        self.chunk_end_number as usize
    }

    /// Number of chunk slots this chunk covers.
    #[inline]
    #[must_use]
    pub const fn chunk_count(&self) -> usize {
        self.end_number() - self.start_number() + 1
    }

    #[must_use]
    pub fn encode(&self) -> [u8; CHUNK_HEADER_SIZE] {
        let mut out = [0_u8; CHUNK_HEADER_SIZE];
        out[0..4].copy_from_slice(&HEADER_MAGIC);
        out[4..8].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
        out[8..12].copy_from_slice(&self.chunk_size.to_le_bytes());
        out[12..16].copy_from_slice(&self.chunk_start_number.to_le_bytes());
        out[16..20].copy_from_slice(&self.chunk_end_number.to_le_bytes());
        out[20] = u8::from(self.is_scavenged);
        out[24..40].copy_from_slice(self.chunk_id.as_bytes());
        let checksum = xxh3_64(&out[..HEADER_HASH_INPUT_BYTES]);
        out[40..48].copy_from_slice(&checksum.to_le_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < CHUNK_HEADER_SIZE {
            return Err(EvlogError::corrupt(format!(
                "chunk header too short: expected {CHUNK_HEADER_SIZE}, got {}",
                bytes.len()
            )));
        }
        if bytes[0..4] != HEADER_MAGIC {
            return Err(EvlogError::corrupt(format!(
                "invalid chunk header magic: {:02X?}",
                &bytes[0..4]
            )));
        }

        let version = read_u32_at(bytes, 4, "version")?;
        if version != FORMAT_VERSION {
            return Err(EvlogError::corrupt(format!(
                "unsupported chunk format version {version}, expected {FORMAT_VERSION}"
            )));
        }

        let stored_checksum = read_u64_at(bytes, 40, "header_xxh3")?;
        let computed_checksum = xxh3_64(&bytes[..HEADER_HASH_INPUT_BYTES]);
        if stored_checksum != computed_checksum {
            return Err(EvlogError::corrupt(format!(
                "chunk header checksum mismatch: stored {stored_checksum:#018X}, computed {computed_checksum:#018X}"
            )));
        }

        let chunk_start_number = read_u32_at(bytes, 12, "chunk_start_number")?;
        let chunk_end_number = read_u32_at(bytes, 16, "chunk_end_number")?;
        if chunk_end_number < chunk_start_number {
            return Err(EvlogError::corrupt(format!(
                "chunk header range is inverted: #{chunk_start_number}-{chunk_end_number}"
            )));
        }

        let id_bytes: [u8; 16] = bytes[24..40]
            .try_into()
            .map_err(|_| EvlogError::corrupt("failed to parse field chunk_id"))?;

        Ok(Self {
            chunk_size: read_u32_at(bytes, 8, "chunk_size")?,
            chunk_start_number,
            chunk_end_number,
            is_scavenged: bytes[20] != 0,
            chunk_id: Uuid::from_bytes(id_bytes),
        })
    }
}

/// Footer written when a chunk is completed.
///
/// Layout (128 bytes):
/// - `magic[4]`
/// - `flags: u8` (bit 0: completed), 3 reserved bytes
/// - `physical_data_size: u64`
/// - `logical_data_size: u64`
/// - `map_size: u32`, 4 reserved bytes
/// - `content_xxh3: u64` (hash of header, data and map)
/// - `footer_xxh3: u64` (hash of preceding 40 bytes)
/// - zero padding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkFooter {
    pub is_completed: bool,
    pub physical_data_size: u64,
    pub logical_data_size: u64,
    pub map_size: u32,
    pub content_hash: u64,
}

impl ChunkFooter {
    #[must_use]
    pub fn encode(&self) -> [u8; CHUNK_FOOTER_SIZE] {
        let mut out = [0_u8; CHUNK_FOOTER_SIZE];
        out[0..4].copy_from_slice(&FOOTER_MAGIC);
        if self.is_completed {
            out[4] = FOOTER_FLAG_COMPLETED;
        }
        out[8..16].copy_from_slice(&self.physical_data_size.to_le_bytes());
        out[16..24].copy_from_slice(&self.logical_data_size.to_le_bytes());
        out[24..28].copy_from_slice(&self.map_size.to_le_bytes());
        out[32..40].copy_from_slice(&self.content_hash.to_le_bytes());
        let checksum = xxh3_64(&out[..FOOTER_HASH_INPUT_BYTES]);
        out[40..48].copy_from_slice(&checksum.to_le_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < CHUNK_FOOTER_SIZE {
            return Err(EvlogError::corrupt(format!(
                "chunk footer too short: expected {CHUNK_FOOTER_SIZE}, got {}",
                bytes.len()
            )));
        }
        if bytes[0..4] != FOOTER_MAGIC {
            return Err(EvlogError::corrupt(format!(
                "invalid chunk footer magic: {:02X?}",
                &bytes[0..4]
            )));
        }

        let stored_checksum = read_u64_at(bytes, 40, "footer_xxh3")?;
        let computed_checksum = xxh3_64(&bytes[..FOOTER_HASH_INPUT_BYTES]);
        if stored_checksum != computed_checksum {
            return Err(EvlogError::corrupt(format!(
                "chunk footer checksum mismatch: stored {stored_checksum:#018X}, computed {computed_checksum:#018X}"
            )));
        }

        Ok(Self {
            is_completed: bytes[4] & FOOTER_FLAG_COMPLETED != 0,
            physical_data_size: read_u64_at(bytes, 8, "physical_data_size")?,
            logical_data_size: read_u64_at(bytes, 16, "logical_data_size")?,
            map_size: read_u32_at(bytes, 24, "map_size")?,
            content_hash: read_u64_at(bytes, 32, "content_xxh3")?,
        })
    }
}

fn read_u32_at(bytes: &[u8], start: usize, field: &str) -> Result<u32> {
    let slice = bytes
        .get(start..start + 4)
        .ok_or_else(|| EvlogError::corrupt(format!("field {field} out of bounds")))?;
    let array: [u8; 4] = slice
        .try_into()
        .map_err(|_| EvlogError::corrupt(format!("failed to parse field {field}")))?;
    Ok(u32::from_le_bytes(array))
}

fn read_u64_at(bytes: &[u8], start: usize, field: &str) -> Result<u64> {
    let slice = bytes
        .get(start..start + 8)
        .ok_or_else(|| EvlogError::corrupt(format!("field {field} out of bounds")))?;
    let array: [u8; 8] = slice
        .try_into()
        .map_err(|_| EvlogError::corrupt(format!("failed to parse field {field}")))?;
    Ok(u64::from_le_bytes(array))
}
