//! Binary format structures

use std::ops::Range;

use bytemuck::{Pod, Zeroable};

/// File magic bytes: "TAPE\x00\x01\x00\x00"
pub const FILE_MAGIC: [u8; 8] = [0x54, 0x41, 0x50, 0x45, 0x00, 0x01, 0x00, 0x00];

/// Current format version
pub const FILE_VERSION: u32 = 1;

/// File header size (cache-aligned to 128 bytes)
pub const HEADER_SIZE: usize = 128;

/// Index entry size (cache-aligned to 128 bytes)
pub const INDEX_ENTRY_SIZE: usize = 128;

/// Byte range of the CRC field inside the header
pub const HEADER_CRC_RANGE: Range<usize> = 12..16;

/// Tape file extension
pub const FILE_EXTENSION: &str = "tape";

/// File header (128 bytes, cache-aligned)
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C, align(128))]
pub struct FileHeader {
    /// Magic bytes for file format identification
    pub magic: [u8; 8],

    /// Format version
    pub version: u32,

    /// CRC32 of header (excluding this field)
    pub header_crc: u32,

    /// SHA-256 of the tape name
    pub name_digest: [u8; 32],

    /// Number of interactions stored
    pub interaction_count: u64,

    /// Offset to start of data section
    pub data_offset: u64,

    /// Size of the data section in bytes
    pub data_size: u64,

    /// Write timestamp (Unix epoch nanoseconds)
    pub written_at: u64,

    /// CRC32 of the index section
    pub index_crc: u32,

    /// Reserved for future use
    pub reserved: [u32; 11],
}

static_assertions::const_assert_eq!(std::mem::size_of::<FileHeader>(), HEADER_SIZE);
static_assertions::const_assert_eq!(std::mem::align_of::<FileHeader>(), 128);

/// Index entry for a single interaction (128 bytes, cache-aligned)
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C, align(128))]
pub struct InteractionEntry {
    /// Request fingerprint (SHA-256)
    pub request_fingerprint: [u8; 32],

    /// Offset to request data
    pub request_offset: u64,

    /// Offset to response data
    pub response_offset: u64,

    /// Recording timestamp (Unix epoch nanoseconds)
    pub recorded_at: u64,

    /// Request data size
    pub request_size: u32,

    /// Response data size
    pub response_size: u32,

    /// CRC32 of request data
    pub request_crc: u32,

    /// CRC32 of response data
    pub response_crc: u32,

    /// Reserved for future use
    pub reserved: [u64; 7],
}

static_assertions::const_assert_eq!(std::mem::size_of::<InteractionEntry>(), INDEX_ENTRY_SIZE);
static_assertions::const_assert_eq!(std::mem::align_of::<InteractionEntry>(), 128);

impl Default for FileHeader {
    fn default() -> Self {
        Self {
            magic: FILE_MAGIC,
            version: FILE_VERSION,
            header_crc: 0,
            name_digest: [0; 32],
            interaction_count: 0,
            data_offset: HEADER_SIZE as u64,
            data_size: 0,
            written_at: 0,
            index_crc: 0,
            reserved: [0; 11],
        }
    }
}

impl FileHeader {
    /// Offset where the data section starts for `count` interactions
    #[must_use]
    pub fn data_offset_for(count: u64) -> u64 {
        HEADER_SIZE as u64 + count * INDEX_ENTRY_SIZE as u64
    }

    /// Byte range of the index section
    #[must_use]
    pub fn index_range(&self) -> Range<usize> {
        HEADER_SIZE..self.data_offset as usize
    }

    /// Total file length this header describes
    #[must_use]
    pub fn expected_file_len(&self) -> u64 {
        self.data_offset.saturating_add(self.data_size)
    }
}
