//! Tape file writer

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use bytemuck::bytes_of;
use crc32fast::Hasher;

use super::codec::{encode_request, encode_response};
use super::format::{FileHeader, InteractionEntry, HEADER_CRC_RANGE, HEADER_SIZE, INDEX_ENTRY_SIZE};
use crate::fingerprint::{fingerprint_request, name_digest};
use crate::interaction::Interaction;
use crate::{Result, TapedeckError};

/// Builds a tape file image in memory and publishes it atomically
pub struct TapeWriter {
    header: FileHeader,
    entries: Vec<InteractionEntry>,
    blocks: Vec<u8>,
}

impl TapeWriter {
    /// Start a tape file for `name`
    #[must_use]
    pub fn new(name: &str) -> Self {
        let mut header = FileHeader::default();
        header.name_digest = name_digest(name);

        Self {
            header,
            entries: Vec::new(),
            blocks: Vec::new(),
        }
    }

    /// Append an interaction
    ///
    /// # Errors
    ///
    /// Returns error if the interaction cannot be encoded
    pub fn append_interaction(&mut self, interaction: &Interaction) -> Result<()> {
        let request_data = encode_request(interaction.request())?;
        let response_data = encode_response(interaction.response())?;
        let request_size = block_size(&request_data)?;
        let response_size = block_size(&response_data)?;

        // Offsets are relative to the data section until into_bytes()
        let request_offset = self.blocks.len() as u64;
        let response_offset = request_offset + request_data.len() as u64;

        let entry = InteractionEntry {
            request_fingerprint: fingerprint_request(interaction.request()),
            request_offset,
            response_offset,
            recorded_at: unix_nanos(interaction.timestamp()),
            request_size,
            response_size,
            request_crc: crc32fast::hash(&request_data),
            response_crc: crc32fast::hash(&response_data),
            reserved: [0; 7],
        };

        self.blocks.extend_from_slice(&request_data);
        self.blocks.extend_from_slice(&response_data);
        self.entries.push(entry);
        self.header.interaction_count += 1;

        Ok(())
    }

    /// Serialize the complete file image
    #[must_use]
    pub fn into_bytes(mut self) -> Vec<u8> {
        let count = self.entries.len() as u64;
        let data_offset = FileHeader::data_offset_for(count);

        self.header.data_offset = data_offset;
        self.header.data_size = self.blocks.len() as u64;
        self.header.written_at = unix_nanos(SystemTime::now());
        self.header.header_crc = 0;

        let mut index = Vec::with_capacity(self.entries.len() * INDEX_ENTRY_SIZE);
        for entry in &mut self.entries {
            entry.request_offset += data_offset;
            entry.response_offset += data_offset;
            index.extend_from_slice(bytes_of(entry));
        }
        self.header.index_crc = crc32fast::hash(&index);

        let mut image = Vec::with_capacity((data_offset as usize) + self.blocks.len());
        image.extend_from_slice(bytes_of(&self.header));
        image.extend_from_slice(&index);
        image.extend_from_slice(&self.blocks);

        // Calculate header CRC (exclude CRC field)
        let mut hasher = Hasher::new();
        hasher.update(&image[..HEADER_CRC_RANGE.start]);
        hasher.update(&image[HEADER_CRC_RANGE.end..HEADER_SIZE]);
        let crc = hasher.finalize();
        image[HEADER_CRC_RANGE].copy_from_slice(&crc.to_le_bytes());

        image
    }

    /// Write the file to `path` via a synced temporary file and a rename
    ///
    /// A crash mid-write leaves any previous file at `path` intact.
    ///
    /// # Errors
    ///
    /// Returns error if the temporary file cannot be written or renamed
    pub fn persist(self, path: &Path) -> Result<()> {
        let image = self.into_bytes();
        let tmp_path = temp_path(path);

        let written = write_and_rename(&image, &tmp_path, path);
        if written.is_err() {
            let _ = fs::remove_file(&tmp_path);
        }
        written
    }
}

fn write_and_rename(image: &[u8], tmp_path: &Path, path: &Path) -> Result<()> {
    let mut file = File::create(tmp_path)?;
    file.write_all(image)?;
    file.sync_all()?;
    fs::rename(tmp_path, path)?;
    Ok(())
}

fn block_size(block: &[u8]) -> Result<u32> {
    u32::try_from(block.len()).map_err(|_| TapedeckError::DataTooLarge {
        size: block.len(),
        limit: u32::MAX as usize,
    })
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

fn unix_nanos(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default()
}
