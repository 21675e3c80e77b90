use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::warn;

use crate::{Error, Result};

/// Durable, page-scoped string key/value storage (`localStorage` shape).
pub trait PageStorage: Send + Sync {
    fn get_item(&self, key: &str) -> Option<String>;

    /// Fails with [`Error::Storage`] when the write cannot be stored.
    fn set_item(&self, key: &str, value: &str) -> Result<()>;

    fn remove_item(&self, key: &str) -> Result<()>;

    fn keys(&self) -> Vec<String>;
}

#[derive(Debug, Default)]
struct MemoryInner {
    items: HashMap<String, String>,
    quota: Option<usize>,
}

/// In-memory storage. Clones share the same items, so a test can keep a
/// handle while a tracker owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage that refuses writes once keys and values exceed `bytes`.
    pub fn with_quota(bytes: usize) -> Self {
        let storage = Self::new();
        storage.lock().quota = Some(bytes);
        storage
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PageStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        self.lock().items.get(key).cloned()
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let mut inner = self.lock();
        if let Some(quota) = inner.quota {
            let used: usize = inner
                .items
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            if used + key.len() + value.len() > quota {
                return Err(Error::Storage(format!(
                    "quota of {} bytes exceeded writing {}",
                    quota, key
                )));
            }
        }
        inner.items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.lock().items.remove(key);
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock().items.keys().cloned().collect();
        keys.sort();
        keys
    }
}

/// Storage persisted as one JSON object in a file. Every operation reads and
/// rewrites the whole file, which keeps processes sharing a file consistent.
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    path: PathBuf,
}

impl JsonFileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => {
                return Err(Error::Storage(format!(
                    "reading {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&raw)
            .map_err(|e| Error::Storage(format!("{} is not a storage file: {}", self.path.display(), e)))
    }

    fn write_all(&self, items: &BTreeMap<String, String>) -> Result<()> {
        let json = serde_json::to_string_pretty(items)?;
        fs::write(&self.path, json)
            .map_err(|e| Error::Storage(format!("writing {}: {}", self.path.display(), e)))
    }
}

impl PageStorage for JsonFileStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        match self.read_all() {
            Ok(mut items) => items.remove(key),
            Err(e) => {
                warn!("{}", e);
                None
            }
        }
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let mut items = self.read_all()?;
        items.insert(key.to_string(), value.to_string());
        self.write_all(&items)
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        let mut items = self.read_all()?;
        if items.remove(key).is_some() {
            self.write_all(&items)?;
        }
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        match self.read_all() {
            Ok(items) => items.into_keys().collect(),
            Err(e) => {
                warn!("{}", e);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_clones_share_items() {
        let a = MemoryStorage::new();
        let b = a.clone();
        a.set_item("k", "v").unwrap();
        assert_eq!(b.get_item("k").as_deref(), Some("v"));
        b.remove_item("k").unwrap();
        assert!(a.keys().is_empty());
    }

    #[test]
    fn quota_counts_replaced_values_once() {
        let s = MemoryStorage::with_quota(10);
        s.set_item("k", "12345").unwrap();
        s.set_item("k", "123456789").unwrap();
        assert!(s.set_item("j", "1").is_err());
        assert_eq!(s.get_item("k").as_deref(), Some("123456789"));
    }

    #[test]
    fn file_storage_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let s = JsonFileStorage::new(&path);
        assert!(s.get_item("k").is_none());
        s.set_item("k", "{\"a\":\"b\"}").unwrap();
        s.set_item("j", "x").unwrap();

        let reopened = JsonFileStorage::new(&path);
        assert_eq!(reopened.get_item("k").as_deref(), Some("{\"a\":\"b\"}"));
        assert_eq!(reopened.keys(), vec!["j".to_string(), "k".to_string()]);
    }

    #[test]
    fn corrupt_file_reads_empty_but_refuses_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, "not json").unwrap();
        let s = JsonFileStorage::new(&path);
        assert!(s.get_item("k").is_none());
        assert!(matches!(s.set_item("k", "v"), Err(Error::Storage(_))));
    }
}
