//! Tape modes

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::TapedeckError;

/// Governs whether an inserted tape may be played back, recorded to, or both
///
/// The mode is fixed for one insertion; nothing transitions it automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TapeMode {
    /// Replay only. A miss is fatal and nothing goes live.
    ReadOnly,
    /// Replay on hit, go live and record on miss
    #[default]
    ReadWrite,
    /// Always go live and record; existing interactions are never replayed
    WriteOnly,
}

impl TapeMode {
    /// All modes, in declaration order
    pub const ALL: [Self; 3] = [Self::ReadOnly, Self::ReadWrite, Self::WriteOnly];

    /// Whether recorded interactions may be played back
    #[must_use]
    pub fn is_readable(self) -> bool {
        matches!(self, Self::ReadOnly | Self::ReadWrite)
    }

    /// Whether new interactions may be recorded
    #[must_use]
    pub fn is_writable(self) -> bool {
        matches!(self, Self::ReadWrite | Self::WriteOnly)
    }

    /// Canonical upper-case name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReadOnly => "READ_ONLY",
            Self::ReadWrite => "READ_WRITE",
            Self::WriteOnly => "WRITE_ONLY",
        }
    }
}

impl fmt::Display for TapeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TapeMode {
    type Err = TapedeckError;

    /// Accepts `READ_ONLY`, `read-only`, `read_only` and so on
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str() == normalized)
            .ok_or_else(|| {
                TapedeckError::Config(format!(
                    "Unknown tape mode '{s}', expected one of READ_ONLY, READ_WRITE, WRITE_ONLY"
                ))
            })
    }
}

impl TryFrom<String> for TapeMode {
    type Error = TapedeckError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TapeMode> for String {
    fn from(mode: TapeMode) -> Self {
        mode.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities() {
        assert!(TapeMode::ReadOnly.is_readable());
        assert!(!TapeMode::ReadOnly.is_writable());

        assert!(TapeMode::ReadWrite.is_readable());
        assert!(TapeMode::ReadWrite.is_writable());

        assert!(!TapeMode::WriteOnly.is_readable());
        assert!(TapeMode::WriteOnly.is_writable());
    }

    #[test]
    fn test_parse_spellings() {
        assert_eq!("READ_ONLY".parse::<TapeMode>().unwrap(), TapeMode::ReadOnly);
        assert_eq!("read_write".parse::<TapeMode>().unwrap(), TapeMode::ReadWrite);
        assert_eq!(" write-only ".parse::<TapeMode>().unwrap(), TapeMode::WriteOnly);
    }

    #[test]
    fn test_parse_unknown_mode() {
        let err = "READ_SOMETIMES".parse::<TapeMode>().unwrap_err();
        assert!(matches!(err, TapedeckError::Config(_)));
    }

    #[test]
    fn test_default_is_read_write() {
        assert_eq!(TapeMode::default(), TapeMode::ReadWrite);
    }

    #[test]
    fn test_display_roundtrips_through_parse() {
        for mode in TapeMode::ALL {
            assert_eq!(mode.to_string().parse::<TapeMode>().unwrap(), mode);
        }
    }
}
