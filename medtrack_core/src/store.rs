//! Durable storage for the medication collection.
//!
//! The whole collection is one JSON array written under a single key. The
//! file store locks the file around every read and write and replaces it
//! atomically, so a reader never observes a half-written collection.

use crate::{Error, Medication, Result};
use fs2::FileExt;
use std::cell::{Cell, RefCell};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tempfile::NamedTempFile;

/// Backing store for [`crate::MedicationRepository`]
pub trait MedicationStore {
    /// Read the full collection. A missing collection is empty, not an error.
    fn load(&self) -> Result<Vec<Medication>>;

    /// Replace the full collection
    fn save_all(&mut self, medications: &[Medication]) -> Result<()>;
}

/// JSON file store with file locking
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Create a new store for the given path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy an unreadable collection aside so the next save cannot destroy it
    fn preserve_corrupt(&self) {
        let backup = self.path.with_extension("json.corrupt");
        match std::fs::copy(&self.path, &backup) {
            Ok(_) => tracing::warn!("Kept unreadable medications file as {:?}", backup),
            Err(e) => tracing::warn!("Failed to back up unreadable {:?}: {}", self.path, e),
        }
    }
}

impl MedicationStore for JsonFileStore {
    fn load(&self) -> Result<Vec<Medication>> {
        if !self.path.exists() {
            tracing::info!("No medications file at {:?}, starting empty", self.path);
            return Ok(Vec::new());
        }

        let file = File::open(&self.path)?;
        // Acquire shared lock for reading
        file.lock_shared()?;

        let mut contents = String::new();
        let read = std::io::BufReader::new(&file).read_to_string(&mut contents);
        file.unlock()?;
        read?;

        if contents.trim().is_empty() {
            return Ok(Vec::new());
        }

        match serde_json::from_str::<Vec<Medication>>(&contents) {
            Ok(medications) => {
                tracing::debug!(
                    "Loaded {} medication(s) from {:?}",
                    medications.len(),
                    self.path
                );
                Ok(medications)
            }
            Err(e) => {
                self.preserve_corrupt();
                Err(Error::Json(e))
            }
        }
    }

    /// Atomically writes the collection by:
    /// 1. Writing to a temp file
    /// 2. Syncing to disk
    /// 3. Renaming over the original
    fn save_all(&mut self, medications: &[Medication]) -> Result<()> {
        let parent = self.path.parent().ok_or_else(|| {
            Error::Other(format!("medications path {:?} has no parent", self.path))
        })?;
        std::fs::create_dir_all(parent)?;

        let temp = NamedTempFile::new_in(parent)?;
        temp.as_file().lock_exclusive()?;

        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            serde_json::to_writer(&mut writer, medications)?;
            writer.flush()?;
        }

        temp.as_file().sync_all()?;
        temp.as_file().unlock()?;

        temp.persist(&self.path).map_err(|e| Error::Io(e.error))?;

        tracing::debug!(
            "Saved {} medication(s) to {:?}",
            medications.len(),
            self.path
        );
        Ok(())
    }
}

/// In-memory store holding the serialized collection.
///
/// Clones share the same contents, so a test can keep a handle and inspect
/// what the repository wrote.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    contents: Rc<RefCell<Option<String>>>,
    saves: Rc<Cell<usize>>,
    fail_writes: Rc<Cell<bool>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with raw JSON, valid or not
    pub fn with_contents(raw: impl Into<String>) -> Self {
        let store = Self::default();
        *store.contents.borrow_mut() = Some(raw.into());
        store
    }

    /// Raw JSON from the last save
    pub fn contents(&self) -> Option<String> {
        self.contents.borrow().clone()
    }

    /// Number of successful saves
    pub fn save_count(&self) -> usize {
        self.saves.get()
    }

    /// Make subsequent saves fail with an IO error
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.set(fail);
    }
}

impl MedicationStore for MemoryStore {
    fn load(&self) -> Result<Vec<Medication>> {
        match self.contents.borrow().as_deref() {
            None => Ok(Vec::new()),
            Some(raw) => Ok(serde_json::from_str(raw)?),
        }
    }

    fn save_all(&mut self, medications: &[Medication]) -> Result<()> {
        if self.fail_writes.get() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "memory store is read-only",
            )));
        }
        *self.contents.borrow_mut() = Some(serde_json::to_string(medications)?);
        self.saves.set(self.saves.get() + 1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::tests::{date, medication};
    use crate::Frequency;

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("medications.json");

        let mut med = medication(Frequency::Twice);
        med.taken_history.insert(date("2026-01-15"), vec![true, false]);

        let mut store = JsonFileStore::new(&path);
        store.save_all(&[med.clone()]).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded, vec![med]);
    }

    #[test]
    fn test_load_nonexistent_returns_empty() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(temp_dir.path().join("missing.json"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_corrupted_file_is_error_and_preserved() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("medications.json");
        std::fs::write(&path, "[{ invalid json ").unwrap();

        let store = JsonFileStore::new(&path);
        assert!(matches!(store.load(), Err(Error::Json(_))));

        let backup = path.with_extension("json.corrupt");
        assert_eq!(
            std::fs::read_to_string(backup).unwrap(),
            "[{ invalid json "
        );
    }

    #[test]
    fn test_atomic_save() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("medications.json");

        let mut store = JsonFileStore::new(&path);
        store.save_all(&[]).unwrap();

        // Verify the file exists and no stray temp files remain
        assert!(path.exists());
        let extras: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name() != "medications.json")
            .collect();
        assert!(
            extras.is_empty(),
            "Expected only medications.json, found extras: {:?}",
            extras
        );
    }

    #[test]
    fn test_memory_store_shares_contents() {
        let store = MemoryStore::new();
        let mut writer = store.clone();
        writer.save_all(&[medication(Frequency::Once)]).unwrap();

        assert_eq!(store.save_count(), 1);
        assert_eq!(store.load().unwrap().len(), 1);

        store.set_fail_writes(true);
        assert!(writer.save_all(&[]).is_err());
        assert_eq!(store.load().unwrap().len(), 1);
    }
}
