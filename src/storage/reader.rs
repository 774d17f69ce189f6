//! Tape file reader

use std::fs::File;
use std::path::Path;
use std::time::{Duration, UNIX_EPOCH};

use bytemuck::try_from_bytes;
use crc32fast::Hasher;
use memmap2::Mmap;

use super::codec::{decode_request, decode_response};
use super::format::{FileHeader, InteractionEntry, HEADER_CRC_RANGE, HEADER_SIZE, INDEX_ENTRY_SIZE};
use crate::fingerprint::{fingerprint_request, name_digest};
use crate::interaction::Interaction;
use crate::{Result, TapedeckError};

/// Reader for tape files
pub struct TapeReader {
    _file: File,
    mmap: Mmap,
    header: FileHeader,
}

impl TapeReader {
    /// Open an existing tape file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be opened, mapped, or is invalid
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;

        // Mapping an empty file fails, so check the size first
        let len = file.metadata()?.len();
        if len < HEADER_SIZE as u64 {
            return Err(TapedeckError::InvalidFormat(
                "File too small to contain header".to_string(),
            ));
        }

        let mmap = unsafe { Mmap::map(&file)? };

        let header: FileHeader = *try_from_bytes(&mmap[..HEADER_SIZE])
            .map_err(|e| TapedeckError::InvalidFormat(format!("Unreadable header: {e}")))?;

        super::validate_header(&header)?;

        // Verify header CRC (exclude CRC field)
        let mut hasher = Hasher::new();
        hasher.update(&mmap[..HEADER_CRC_RANGE.start]);
        hasher.update(&mmap[HEADER_CRC_RANGE.end..HEADER_SIZE]);
        let computed_crc = hasher.finalize();

        if header.header_crc != computed_crc {
            return Err(TapedeckError::CorruptedData {
                offset: 0,
                expected: header.header_crc,
                actual: computed_crc,
            });
        }

        let max_entries = (len - HEADER_SIZE as u64) / INDEX_ENTRY_SIZE as u64;
        if header.interaction_count > max_entries
            || header.data_offset != FileHeader::data_offset_for(header.interaction_count)
            || header.expected_file_len() != len
        {
            return Err(TapedeckError::InvalidFormat(format!(
                "Header describes {} interactions in {} bytes, file has {len} bytes",
                header.interaction_count,
                header.expected_file_len()
            )));
        }

        let index_range = header.index_range();
        let index_crc = crc32fast::hash(&mmap[index_range.clone()]);
        if index_crc != header.index_crc {
            return Err(TapedeckError::CorruptedData {
                offset: index_range.start as u64,
                expected: header.index_crc,
                actual: index_crc,
            });
        }

        Ok(Self {
            _file: file,
            mmap,
            header,
        })
    }

    /// Get the number of interactions in this tape
    #[must_use]
    pub fn interaction_count(&self) -> u64 {
        self.header.interaction_count
    }

    /// Whether the file was written for the tape called `name`
    #[must_use]
    pub fn is_named(&self, name: &str) -> bool {
        self.header.name_digest == name_digest(name)
    }

    /// Get all index entries in recording order
    ///
    /// # Errors
    ///
    /// Returns error if an entry cannot be read
    pub fn entries(&self) -> Result<Vec<InteractionEntry>> {
        (0..self.header.interaction_count as usize)
            .map(|i| {
                let offset = HEADER_SIZE + i * INDEX_ENTRY_SIZE;
                try_from_bytes::<InteractionEntry>(&self.mmap[offset..offset + INDEX_ENTRY_SIZE])
                    .copied()
                    .map_err(|e| {
                        TapedeckError::InvalidFormat(format!("Unreadable index entry {i}: {e}"))
                    })
            })
            .collect()
    }

    /// Read request data for an interaction
    ///
    /// # Errors
    ///
    /// Returns error if offset is invalid or the block fails its CRC
    pub fn read_request(&self, entry: &InteractionEntry) -> Result<&[u8]> {
        self.block(entry.request_offset, entry.request_size, entry.request_crc)
    }

    /// Read response data for an interaction
    ///
    /// # Errors
    ///
    /// Returns error if offset is invalid or the block fails its CRC
    pub fn read_response(&self, entry: &InteractionEntry) -> Result<&[u8]> {
        self.block(entry.response_offset, entry.response_size, entry.response_crc)
    }

    /// Decode every interaction, failing on the first bad one
    ///
    /// # Errors
    ///
    /// Returns error if any block is out of bounds, corrupt, or undecodable
    pub fn interactions(&self) -> Result<Vec<Interaction>> {
        self.entries()?
            .iter()
            .map(|entry| {
                let request = decode_request(self.read_request(entry)?)?;
                if fingerprint_request(&request) != entry.request_fingerprint {
                    return Err(TapedeckError::InvalidFormat(format!(
                        "Fingerprint mismatch for {} {}",
                        request.method, request.uri
                    )));
                }
                let response = decode_response(self.read_response(entry)?)?;
                let recorded_at = UNIX_EPOCH + Duration::from_nanos(entry.recorded_at);
                Ok(Interaction::recorded_at(request, response, recorded_at))
            })
            .collect()
    }

    fn block(&self, offset: u64, size: u32, crc: u32) -> Result<&[u8]> {
        let range = usize::try_from(offset)
            .ok()
            .and_then(|start| Some(start..start.checked_add(size as usize)?))
            .filter(|range| {
                range.start >= self.header.data_offset as usize && range.end <= self.mmap.len()
            })
            .ok_or_else(|| {
                TapedeckError::InvalidFormat(format!(
                    "Block of {size} bytes at {offset} outside data section of {} bytes",
                    self.mmap.len()
                ))
            })?;

        let data = &self.mmap[range];
        let actual = crc32fast::hash(data);
        if actual != crc {
            return Err(TapedeckError::CorruptedData {
                offset,
                expected: crc,
                actual,
            });
        }

        Ok(data)
    }
}
