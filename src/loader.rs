//! Loading and persisting tapes by name

use std::path::{Path, PathBuf};

use dashmap::DashMap;
use tracing::{debug, info};

use crate::interaction::Interaction;
use crate::naming::{tape_file_stem, validate_tape_name};
use crate::storage::{TapeReader, TapeWriter, FILE_EXTENSION};
use crate::tape::Tape;
use crate::{Result, TapedeckError};

/// Storage backend for tapes
pub trait TapeLoader: Send + Sync {
    /// Load the tape stored under `name`, or a new empty tape if there is none
    ///
    /// # Errors
    ///
    /// Returns `Load` if a stored tape exists but cannot be reconstructed
    fn load(&self, name: &str) -> Result<Tape>;

    /// Persist the tape's interactions under its name
    ///
    /// # Errors
    ///
    /// Returns error if the tape could not be saved
    fn write(&self, tape: &Tape) -> Result<()>;
}

/// Stores each tape as a binary file under a root directory
#[derive(Debug, Clone)]
pub struct FileTapeLoader {
    tape_root: PathBuf,
}

impl FileTapeLoader {
    /// Create a loader rooted at `tape_root`
    pub fn new(tape_root: impl Into<PathBuf>) -> Self {
        Self {
            tape_root: tape_root.into(),
        }
    }

    /// Directory tapes are stored in
    #[must_use]
    pub fn tape_root(&self) -> &Path {
        &self.tape_root
    }

    /// File a tape called `name` is stored in
    ///
    /// # Errors
    ///
    /// Returns error if `name` is not a valid tape name
    pub fn file_for(&self, name: &str) -> Result<PathBuf> {
        validate_tape_name(name)?;
        Ok(self
            .tape_root
            .join(format!("{}.{FILE_EXTENSION}", tape_file_stem(name))))
    }

    fn read_interactions(path: &Path, name: &str) -> Result<Vec<Interaction>> {
        let reader = TapeReader::open(path)?;
        if !reader.is_named(name) {
            return Err(TapedeckError::InvalidFormat(format!(
                "{} belongs to a different tape",
                path.display()
            )));
        }
        reader.interactions()
    }
}

impl TapeLoader for FileTapeLoader {
    fn load(&self, name: &str) -> Result<Tape> {
        let path = self.file_for(name)?;

        if !path.exists() {
            debug!("No stored tape at {}, starting empty", path.display());
            return Ok(Tape::new(name));
        }

        let interactions =
            Self::read_interactions(&path, name).map_err(|e| TapedeckError::load(name, e))?;

        info!(
            "Loaded tape '{}': {} interactions",
            name,
            interactions.len()
        );
        Ok(Tape::with_interactions(name, interactions))
    }

    fn write(&self, tape: &Tape) -> Result<()> {
        let path = self.file_for(tape.name())?;

        if !tape.is_dirty() && path.exists() {
            debug!("Tape '{}' unchanged, keeping {}", tape.name(), path.display());
            return Ok(());
        }

        std::fs::create_dir_all(&self.tape_root)?;

        let mut writer = TapeWriter::new(tape.name());
        for interaction in tape.interactions() {
            writer.append_interaction(interaction)?;
        }
        writer.persist(&path)?;

        info!(
            "Wrote tape '{}': {} interactions to {}",
            tape.name(),
            tape.len(),
            path.display()
        );
        Ok(())
    }
}

/// Keeps tapes in memory, keyed by name
#[derive(Debug, Default)]
pub struct MemoryTapeLoader {
    tapes: DashMap<String, Vec<Interaction>>,
}

impl MemoryTapeLoader {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a tape has been written under `name`
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tapes.contains_key(name)
    }

    /// Stored interactions for `name`
    #[must_use]
    pub fn stored(&self, name: &str) -> Option<Vec<Interaction>> {
        self.tapes.get(name).map(|entry| entry.value().clone())
    }
}

impl TapeLoader for MemoryTapeLoader {
    fn load(&self, name: &str) -> Result<Tape> {
        validate_tape_name(name)?;
        let interactions = self.stored(name).unwrap_or_default();
        Ok(Tape::with_interactions(name, interactions))
    }

    fn write(&self, tape: &Tape) -> Result<()> {
        self.tapes
            .insert(tape.name().to_string(), tape.interactions().to_vec());
        Ok(())
    }
}

impl<L: TapeLoader + ?Sized> TapeLoader for std::sync::Arc<L> {
    fn load(&self, name: &str) -> Result<Tape> {
        (**self).load(name)
    }

    fn write(&self, tape: &Tape) -> Result<()> {
        (**self).write(tape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Request, Response};
    use crate::storage::HEADER_SIZE;
    use std::fs;
    use tempfile::TempDir;

    fn recorded_tape(name: &str, uris: &[&str]) -> Tape {
        let mut tape = Tape::new(name);
        for uri in uris {
            tape.record(Request::new("GET", *uri), Response::new(200).with_body("ok"))
                .unwrap();
        }
        tape
    }

    #[test]
    fn test_load_missing_tape_is_empty() {
        let dir = TempDir::new().unwrap();
        let loader = FileTapeLoader::new(dir.path());

        let tape = loader.load("episode1").unwrap();
        assert_eq!(tape.name(), "episode1");
        assert!(tape.is_empty());
    }

    #[test]
    fn test_file_roundtrip_preserves_order() {
        let dir = TempDir::new().unwrap();
        let loader = FileTapeLoader::new(dir.path().join("nested").join("tapes"));
        let tape = recorded_tape(
            "round trip",
            &["http://example.com/1", "http://example.com/2", "http://example.com/3"],
        );

        loader.write(&tape).unwrap();
        assert!(loader.file_for("round trip").unwrap().ends_with("round%20trip.tape"));

        let loaded = loader.load("round trip").unwrap();
        assert_eq!(loaded.interactions(), tape.interactions());
        assert!(!loaded.is_dirty());
    }

    #[test]
    fn test_clean_tape_not_rewritten() {
        let dir = TempDir::new().unwrap();
        let loader = FileTapeLoader::new(dir.path());
        loader
            .write(&recorded_tape("clean", &["http://example.com/"]))
            .unwrap();

        let path = loader.file_for("clean").unwrap();
        let before = fs::metadata(&path).unwrap().modified().unwrap();

        let loaded = loader.load("clean").unwrap();
        loader.write(&loaded).unwrap();

        assert_eq!(fs::metadata(&path).unwrap().modified().unwrap(), before);
    }

    #[test]
    fn test_clean_empty_tape_still_written_once() {
        let dir = TempDir::new().unwrap();
        let loader = FileTapeLoader::new(dir.path());

        loader.write(&Tape::new("fresh")).unwrap();
        assert!(loader.file_for("fresh").unwrap().exists());
    }

    #[test]
    fn test_corrupt_tape_is_load_error() {
        let dir = TempDir::new().unwrap();
        let loader = FileTapeLoader::new(dir.path());
        fs::write(loader.file_for("broken").unwrap(), b"not a tape").unwrap();

        match loader.load("broken") {
            Err(TapedeckError::Load { name, .. }) => assert_eq!(name, "broken"),
            other => panic!("expected Load error, got {other:?}"),
        }
    }

    #[test]
    fn test_renamed_file_is_load_error() {
        let dir = TempDir::new().unwrap();
        let loader = FileTapeLoader::new(dir.path());
        loader
            .write(&recorded_tape("original", &["http://example.com/"]))
            .unwrap();
        fs::rename(
            loader.file_for("original").unwrap(),
            loader.file_for("impostor").unwrap(),
        )
        .unwrap();

        assert!(matches!(
            loader.load("impostor"),
            Err(TapedeckError::Load { .. })
        ));
    }

    #[test]
    fn test_similar_names_stored_separately() {
        let dir = TempDir::new().unwrap();
        let loader = FileTapeLoader::new(dir.path());

        assert_ne!(
            loader.file_for("foo bar").unwrap(),
            loader.file_for("foo_bar").unwrap()
        );

        let spaced = recorded_tape("foo bar", &["http://example.com/spaced"]);
        let underscored = recorded_tape("foo_bar", &["http://example.com/a", "http://example.com/b"]);
        loader.write(&spaced).unwrap();
        loader.write(&underscored).unwrap();

        assert_eq!(loader.load("foo bar").unwrap().interactions(), spaced.interactions());
        assert_eq!(
            loader.load("foo_bar").unwrap().interactions(),
            underscored.interactions()
        );
    }

    #[test]
    fn test_corrupt_index_offset_is_load_error() {
        let dir = TempDir::new().unwrap();
        let loader = FileTapeLoader::new(dir.path());
        loader
            .write(&recorded_tape("idx", &["http://example.com/"]))
            .unwrap();

        let path = loader.file_for("idx").unwrap();
        let mut bytes = fs::read(&path).unwrap();
        let request_offset = HEADER_SIZE + 32..HEADER_SIZE + 40;
        bytes[request_offset].copy_from_slice(&(u64::MAX - 1).to_le_bytes());
        fs::write(&path, &bytes).unwrap();

        assert!(matches!(loader.load("idx"), Err(TapedeckError::Load { .. })));
    }

    #[test]
    fn test_invalid_name_rejected() {
        let dir = TempDir::new().unwrap();
        let loader = FileTapeLoader::new(dir.path());

        assert!(matches!(
            loader.load("../escape"),
            Err(TapedeckError::InvalidTapeName(_))
        ));
    }

    #[test]
    fn test_write_failure_propagates() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, b"").unwrap();
        let loader = FileTapeLoader::new(&blocker);

        let tape = recorded_tape("lost", &["http://example.com/"]);
        assert!(loader.write(&tape).is_err());
    }

    #[test]
    fn test_memory_roundtrip() {
        let loader = MemoryTapeLoader::new();
        assert!(loader.load("memory").unwrap().is_empty());

        let tape = recorded_tape("memory", &["http://example.com/a", "http://example.com/b"]);
        loader.write(&tape).unwrap();

        assert!(loader.contains("memory"));
        assert_eq!(
            loader.load("memory").unwrap().interactions(),
            tape.interactions()
        );
    }
}
