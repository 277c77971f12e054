//! Narrow key-value interface for the little state filedock persists.
//!
//! The core only stores the main-image backup record through this trait.
//! Embedding applications can plug in their own storage; two implementations
//! ship here:
//! - [`MemoryKeyValueStore`] for tests and ephemeral sessions
//! - [`JsonFileKeyValueStore`] backed by a single JSON object on disk

mod atomic;

pub use atomic::{atomic_read_json, atomic_write_json};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

use crate::error::Result;

/// String key-value storage.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// In-memory key-value store.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Option<String> {
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.remove(key);
        Ok(())
    }
}

/// Key-value store persisted as one JSON object.
///
/// Every `set`/`remove` rewrites the file atomically.
#[derive(Debug)]
pub struct JsonFileKeyValueStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileKeyValueStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole map, returning empty on any error.
    fn load(&self) -> BTreeMap<String, String> {
        match atomic_read_json::<BTreeMap<String, String>>(&self.path) {
            Ok(Some(values)) => values,
            Ok(None) => BTreeMap::new(),
            Err(e) => {
                warn!(
                    "Failed to read key-value store at {}: {}",
                    self.path.display(),
                    e
                );
                BTreeMap::new()
            }
        }
    }
}

impl KeyValueStore for JsonFileKeyValueStore {
    fn get(&self, key: &str) -> Option<String> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        self.load().remove(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut values = self.load();
        values.insert(key.to_string(), value.to_string());
        atomic_write_json(&self.path, &values)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut values = self.load();
        if values.remove(key).is_some() {
            atomic_write_json(&self.path, &values)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn exercise(store: &dyn KeyValueStore) {
        assert_eq!(store.get("k"), None);
        store.set("k", "v1").unwrap();
        store.set("other", "x").unwrap();
        assert_eq!(store.get("k").as_deref(), Some("v1"));
        store.set("k", "v2").unwrap();
        assert_eq!(store.get("k").as_deref(), Some("v2"));
        store.remove("k").unwrap();
        store.remove("k").unwrap();
        assert_eq!(store.get("k"), None);
        assert_eq!(store.get("other").as_deref(), Some("x"));
    }

    #[test]
    fn test_memory_store() {
        exercise(&MemoryKeyValueStore::new());
    }

    #[test]
    fn test_json_file_store() {
        let tmp = TempDir::new().unwrap();
        let store = JsonFileKeyValueStore::new(tmp.path().join("state.json"));
        exercise(&store);

        let reopened = JsonFileKeyValueStore::new(tmp.path().join("state.json"));
        assert_eq!(reopened.get("other").as_deref(), Some("x"));
    }

    #[test]
    fn test_json_file_store_recovers_from_corruption() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("state.json");
        std::fs::write(&path, "[1, 2").unwrap();

        let store = JsonFileKeyValueStore::new(&path);
        assert_eq!(store.get("k"), None);
        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").as_deref(), Some("v"));
    }
}
