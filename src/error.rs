//! Error types for Tapedeck

use std::io;
use thiserror::Error;

use crate::mode::TapeMode;

/// Result type for Tapedeck operations
pub type Result<T> = std::result::Result<T, TapedeckError>;

/// Errors that can occur in Tapedeck
#[derive(Debug, Error)]
pub enum TapedeckError {
    /// Operation is invalid for the current session state
    #[error("Invalid session state: {0}")]
    State(String),

    /// A read-only tape had no interaction matching the request
    #[error("No match on tape '{tape}' for {method} {uri}: {reason}")]
    NoMatchFound {
        /// Tape that was searched
        tape: String,
        /// Request method
        method: String,
        /// Request URI
        uri: String,
        /// Why nothing matched
        reason: String,
    },

    /// Record attempted under a mode that forbids it
    #[error("Tape '{tape}' is {mode}: cannot {operation}")]
    ModeViolation {
        /// Tape the operation targeted
        tape: String,
        /// Mode the tape is in
        mode: TapeMode,
        /// Rejected operation
        operation: &'static str,
    },

    /// Stored tape could not be reconstructed
    #[error("Failed to load tape '{name}': {reason}")]
    Load {
        /// Tape name
        name: String,
        /// Underlying cause
        reason: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid tape file format
    #[error("Invalid tape format: {0}")]
    InvalidFormat(String),

    /// Tape file corrupted (CRC mismatch)
    #[error("Tape corrupted at offset {offset}: expected CRC {expected:#x}, got {actual:#x}")]
    CorruptedData {
        /// Offset where corruption was detected
        offset: u64,
        /// Expected CRC32 value
        expected: u32,
        /// Actual CRC32 value
        actual: u32,
    },

    /// Invalid tape name
    #[error("Invalid tape name: {0}")]
    InvalidTapeName(String),

    /// Request/response too large to encode
    #[error("Data too large: {size} bytes exceeds limit of {limit} bytes")]
    DataTooLarge {
        /// Actual size
        size: usize,
        /// Size limit
        limit: usize,
    },

    /// Live request to the upstream server failed
    #[error("Upstream request failed: {0}")]
    Upstream(String),
}

impl TapedeckError {
    /// Wrap a storage failure as a load error for `name`
    pub(crate) fn load(name: &str, cause: impl std::fmt::Display) -> Self {
        Self::Load {
            name: name.to_string(),
            reason: cause.to_string(),
        }
    }
}
