// File-backed store: one JSON object per file, rewritten atomically on
// every mutation.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tracing::debug;

use super::KvStore;
use crate::error::CoreError;

#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, String>, CoreError> {
        match fs::read_to_string(&self.path) {
            Ok(text) if text.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(text) => serde_json::from_str(&text).map_err(|e| CoreError::Persistence {
                message: format!("corrupt store {}: {e}", self.path.display()),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(io_error(&self.path, &e)),
        }
    }

    fn save(&self, entries: &BTreeMap<String, String>) -> Result<(), CoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| io_error(parent, &e))?;
        }
        let text = serde_json::to_string_pretty(entries)
            .map_err(|e| CoreError::Internal(format!("serialize store: {e}")))?;

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, text).map_err(|e| io_error(&tmp, &e))?;
        fs::rename(&tmp, &self.path).map_err(|e| io_error(&self.path, &e))?;
        debug!(path = %self.path.display(), keys = entries.len(), "store saved");
        Ok(())
    }
}

fn io_error(path: &Path, err: &std::io::Error) -> CoreError {
    CoreError::Persistence {
        message: format!("{}: {err}", path.display()),
    }
}

impl KvStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, CoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.load()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.load()?;
        entries.insert(key.to_owned(), value.to_owned());
        self.save(&entries)
    }

    fn clear(&self, key: &str) -> Result<(), CoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.load()?;
        if entries.remove(key).is_some() {
            self.save(&entries)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn values_survive_a_new_instance() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("rfidly.json");

        FileStore::new(&path).set("selection:items", "[7]").unwrap();

        let reopened = FileStore::new(&path);
        assert_eq!(reopened.get("selection:items").unwrap().as_deref(), Some("[7]"));

        reopened.clear("selection:items").unwrap();
        assert!(FileStore::new(&path).get("selection:items").unwrap().is_none());
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("absent.json"));
        assert!(store.get("anything").unwrap().is_none());
        store.clear("anything").unwrap();
    }

    #[test]
    fn corrupt_file_is_a_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            FileStore::new(&path).get("k"),
            Err(CoreError::Persistence { .. })
        ));
    }
}
