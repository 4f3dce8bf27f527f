//! File-backed storage: the durable tier.
//!
//! All keys live in one JSON object file. Every write rewrites the file via
//! a uniquely named temporary sibling and an atomic rename, so a crash mid-write never
//! leaves a truncated store behind.

use crate::{KeyValueStorage, StorageResult};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::warn;

/// Durable key/value store persisted to a JSON file.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStorage {
    /// Open (or lazily create) a store at `path`. Parent directories are
    /// created on first write.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> StorageResult<BTreeMap<String, String>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(e.into()),
        };

        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        match serde_json::from_str(&content) {
            Ok(map) => Ok(map),
            Err(e) => {
                // Unreadable store: start over rather than wedge every write.
                warn!(path = %self.path.display(), error = %e, "Durable store is corrupt, resetting");
                Ok(BTreeMap::new())
            }
        }
    }

    fn save(&self, map: &BTreeMap<String, String>) -> StorageResult<()> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent)?;

        // Uniquely named so concurrent clients never share a temp file
        let mut tmp = NamedTempFile::new_in(parent)?;
        serde_json::to_writer_pretty(&mut tmp, map)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

impl KeyValueStorage for FileStorage {
    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let _guard = self.lock.lock();
        let mut map = self.load()?;
        map.insert(key.to_string(), value.to_string());
        self.save(&map)
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let _guard = self.lock.lock();
        Ok(self.load()?.get(key).cloned())
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        let _guard = self.lock.lock();
        let mut map = self.load()?;
        let existed = map.remove(key).is_some();
        if existed {
            self.save(&map)?;
        }
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_file_storage_persists_across_instances() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("storage").join("local.json");

        let storage = FileStorage::open(&path);
        storage.set("a", "1").unwrap();
        storage.set("b", "2").unwrap();
        drop(storage);

        let reopened = FileStorage::open(&path);
        assert_eq!(reopened.get("a").unwrap(), Some("1".to_string()));
        assert_eq!(reopened.get("b").unwrap(), Some("2".to_string()));
    }

    #[test]
    fn test_file_storage_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::open(dir.path().join("absent.json"));

        assert_eq!(storage.get("anything").unwrap(), None);
        assert!(!storage.delete("anything").unwrap());
        assert!(!storage.path().exists());
    }

    #[test]
    fn test_file_storage_delete() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::open(dir.path().join("local.json"));

        storage.set("key", "value").unwrap();
        assert!(storage.delete("key").unwrap());
        assert!(!storage.has("key").unwrap());
    }

    #[test]
    fn test_file_storage_recovers_from_corrupt_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("local.json");
        std::fs::write(&path, "{not json").unwrap();

        let storage = FileStorage::open(&path);
        assert_eq!(storage.get("key").unwrap(), None);

        storage.set("key", "value").unwrap();
        assert_eq!(storage.get("key").unwrap(), Some("value".to_string()));
    }

    fn entries(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_file_storage_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("local.json");
        let storage = FileStorage::open(&path);

        storage.set("key", "value").unwrap();

        assert!(path.exists());
        assert_eq!(entries(dir.path()), vec!["local.json".to_string()]);
    }

    #[test]
    fn test_concurrent_writers_keep_the_file_readable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("local.json");

        let writers: Vec<_> = (0..2)
            .map(|writer| {
                let path = path.clone();
                std::thread::spawn(move || {
                    // Separate instances, as two client processes would have
                    let storage = FileStorage::open(&path);
                    for i in 0..25 {
                        storage.set(&format!("w{writer}"), &i.to_string()).unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        let map: BTreeMap<String, String> = serde_json::from_str(&content).unwrap();
        assert!(!map.is_empty());
        assert_eq!(entries(dir.path()), vec!["local.json".to_string()]);
    }
}
