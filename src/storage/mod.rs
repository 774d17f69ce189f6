//! Binary storage format for tapes

mod codec;
mod format;
mod reader;
mod writer;

pub use codec::{decode_request, decode_response, encode_request, encode_response};
pub use format::{
    FileHeader, InteractionEntry, FILE_EXTENSION, FILE_MAGIC, FILE_VERSION, HEADER_SIZE,
    INDEX_ENTRY_SIZE,
};
pub use reader::TapeReader;
pub use writer::TapeWriter;

use crate::Result;

/// Validate tape file magic and version
///
/// # Errors
///
/// Returns error if magic or version is invalid
pub fn validate_header(header: &FileHeader) -> Result<()> {
    if header.magic != FILE_MAGIC {
        return Err(crate::TapedeckError::InvalidFormat(format!(
            "Invalid magic bytes: expected {:?}, got {:?}",
            FILE_MAGIC, header.magic
        )));
    }

    if header.version != FILE_VERSION {
        return Err(crate::TapedeckError::InvalidFormat(format!(
            "Unsupported version: {}, expected {}",
            header.version, FILE_VERSION
        )));
    }

    Ok(())
}
