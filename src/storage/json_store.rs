//! Scoped JSON document store
//!
//! Reads are tolerant: a missing or unparseable document yields `None` (the
//! caller substitutes its documented default) and corrupt files are logged.
//! Writes go to a temp file in the target directory and are renamed into
//! place, so a reader sees either the old or the new document.

use super::lock::ScopeLocks;
use super::DocPath;
use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Filesystem-backed document store rooted at the data directory
#[derive(Debug)]
pub struct JsonStore {
    root: PathBuf,
    locks: ScopeLocks,
}

impl JsonStore {
    /// Open (and create if needed) a store rooted at `root`
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        debug!("Opened JSON store at {}", root.display());
        Ok(Self {
            root,
            locks: ScopeLocks::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of a document
    pub fn resolve(&self, doc: &DocPath) -> PathBuf {
        self.root.join(doc.as_path())
    }

    pub fn exists(&self, doc: &DocPath) -> bool {
        self.resolve(doc).is_file()
    }

    /// Read a document; `None` when missing or corrupt
    pub fn load<T: DeserializeOwned>(&self, doc: &DocPath) -> Option<T> {
        self.load_path(&self.resolve(doc))
    }

    /// Read a document by absolute path; `None` when missing or corrupt
    pub fn load_path<T: DeserializeOwned>(&self, path: &Path) -> Option<T> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Unreadable document {}, using default: {}", path.display(), e);
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Corrupt document {}, using default: {}", path.display(), e);
                None
            }
        }
    }

    /// Read a document, falling back to `default`
    pub fn read_or<T: DeserializeOwned>(&self, doc: &DocPath, default: impl FnOnce() -> T) -> T {
        self.load(doc).unwrap_or_else(default)
    }

    /// Atomically replace a document
    pub fn write<T: Serialize>(&self, doc: &DocPath, value: &T) -> Result<()> {
        let path = self.resolve(doc);
        self.locks.with_lock(&path, || write_atomic(&path, value))
    }

    /// Write a document only if it does not exist yet; returns whether it was written
    pub fn create<T: Serialize>(&self, doc: &DocPath, value: &T) -> Result<bool> {
        let path = self.resolve(doc);
        self.locks.with_lock(&path, || {
            if path.exists() {
                return Ok(false);
            }
            write_atomic(&path, value)?;
            Ok(true)
        })
    }

    /// Locked read-modify-write; `f` may fail, in which case nothing is written
    pub fn try_update<T, R>(
        &self,
        doc: &DocPath,
        default: impl FnOnce() -> T,
        f: impl FnOnce(&mut T) -> Result<R>,
    ) -> Result<R>
    where
        T: Serialize + DeserializeOwned,
    {
        let path = self.resolve(doc);
        self.locks.with_lock(&path, || {
            let mut value = self.load_path(&path).unwrap_or_else(default);
            let out = f(&mut value)?;
            write_atomic(&path, &value)?;
            Ok(out)
        })
    }

    /// Locked read-modify-write
    pub fn update<T, R>(
        &self,
        doc: &DocPath,
        default: impl FnOnce() -> T,
        f: impl FnOnce(&mut T) -> R,
    ) -> Result<R>
    where
        T: Serialize + DeserializeOwned,
    {
        self.try_update(doc, default, |value| Ok(f(value)))
    }

    /// Delete a document; returns whether it existed
    pub fn remove(&self, doc: &DocPath) -> Result<bool> {
        let path = self.resolve(doc);
        self.locks.with_lock(&path, || match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        })
    }

    /// JSON documents directly under `dir`, sorted by file name
    pub fn list_dir(&self, dir: &str) -> Result<Vec<PathBuf>> {
        let full = self.root.join(dir);
        let entries = match std::fs::read_dir(&full) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.is_file() && path.extension().map(|ext| ext == "json").unwrap_or(false) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    serde_json::to_writer_pretty(&mut tmp, value)?;
    tmp.write_all(b"\n")?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Counter {
        count: u32,
    }

    fn store() -> (TempDir, JsonStore) {
        let dir = TempDir::new().unwrap();
        let store = JsonStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn test_missing_document_uses_default() {
        let (_dir, store) = store();
        let doc = DocPath::global("state/missing.json");
        let counter: Counter = store.read_or(&doc, Counter::default);
        assert_eq!(counter, Counter { count: 0 });
        assert!(!store.exists(&doc));
    }

    #[test]
    fn test_write_then_read() {
        let (_dir, store) = store();
        let doc = DocPath::scoped("profiles", "alice").unwrap();
        store.write(&doc, &Counter { count: 7 }).unwrap();

        let loaded: Option<Counter> = store.load(&doc);
        assert_eq!(loaded, Some(Counter { count: 7 }));
    }

    #[test]
    fn test_create_never_overwrites() {
        let (_dir, store) = store();
        let doc = DocPath::global("history/sessions/u1__s1.json");
        assert!(store.create(&doc, &Counter { count: 1 }).unwrap());
        assert!(!store.create(&doc, &Counter { count: 2 }).unwrap());

        let loaded: Option<Counter> = store.load(&doc);
        assert_eq!(loaded, Some(Counter { count: 1 }));
    }

    #[test]
    fn test_corrupt_document_recovers() {
        let (_dir, store) = store();
        let doc = DocPath::global("state/broken.json");
        let path = store.resolve(&doc);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{\"count\": ").unwrap();

        let counter: Counter = store.read_or(&doc, || Counter { count: 1 });
        assert_eq!(counter.count, 1);

        // An update over a corrupt file starts from the default and heals it
        store.update(&doc, Counter::default, |c| c.count += 1).unwrap();
        let healed: Option<Counter> = store.load(&doc);
        assert_eq!(healed, Some(Counter { count: 1 }));
    }

    #[test]
    fn test_failed_update_writes_nothing() {
        let (_dir, store) = store();
        let doc = DocPath::global("state/guarded.json");
        store.write(&doc, &Counter { count: 3 }).unwrap();

        let result: Result<()> = store.try_update(&doc, Counter::default, |c| {
            c.count = 99;
            Err(crate::error::BrewError::InvalidOperation("nope".to_string()))
        });
        assert!(result.is_err());

        let loaded: Option<Counter> = store.load(&doc);
        assert_eq!(loaded, Some(Counter { count: 3 }));
    }

    #[test]
    fn test_concurrent_updates_are_serialized() {
        let (_dir, store) = store();
        let store = Arc::new(store);
        let doc = DocPath::global("state/concurrent.json");

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let store = store.clone();
                let doc = doc.clone();
                std::thread::spawn(move || {
                    for _ in 0..5 {
                        store.update(&doc, Counter::default, |c| c.count += 1).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let loaded: Counter = store.read_or(&doc, Counter::default);
        assert_eq!(loaded.count, 50);
    }

    #[test]
    fn test_list_dir_skips_lock_files() {
        let (_dir, store) = store();
        store
            .write(&DocPath::scoped("cohorts", "a").unwrap(), &Counter::default())
            .unwrap();
        store
            .write(&DocPath::scoped("cohorts", "b").unwrap(), &Counter::default())
            .unwrap();

        let files = store.list_dir("cohorts").unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("a.json"));
        assert!(store.list_dir("nothing-here").unwrap().is_empty());
    }

    #[test]
    fn test_remove() {
        let (_dir, store) = store();
        let doc = DocPath::global("state/tmp.json");
        store.write(&doc, &Counter::default()).unwrap();
        assert!(store.remove(&doc).unwrap());
        assert!(!store.remove(&doc).unwrap());
    }
}
