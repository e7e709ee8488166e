//! Advisory per-scope locking
//!
//! Writers to the same document are serialized twice over: an in-process
//! mutex keyed by document path, then an exclusive `flock` on a sibling
//! `.lock` file so separate processes sharing a data directory also queue up.
//! Readers never lock; atomic renames keep them from seeing partial writes.

use crate::error::Result;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::trace;

/// Registry of per-document mutexes
///
/// Entries live only while some caller holds or waits on them.
#[derive(Debug, Default)]
pub struct ScopeLocks {
    registry: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl ScopeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the lock for `path`
    pub fn with_lock<R>(&self, path: &Path, f: impl FnOnce() -> Result<R>) -> Result<R> {
        let slot = {
            let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
            registry.entry(path.to_path_buf()).or_default().clone()
        };

        let result = Self::locked(&slot, path, f);
        self.release(path, slot);
        result
    }

    fn locked<R>(slot: &Mutex<()>, path: &Path, f: impl FnOnce() -> Result<R>) -> Result<R> {
        let _local = slot.lock().unwrap_or_else(PoisonError::into_inner);
        let _file = FileLock::acquire(path)?;
        trace!("Locked {}", path.display());
        f()
    }

    /// Drop the registry entry once no other caller holds a clone of it
    fn release(&self, path: &Path, slot: Arc<Mutex<()>>) {
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        let ours = registry.get(path).is_some_and(|s| Arc::ptr_eq(s, &slot));
        // One reference in the registry, one in `slot`
        if ours && Arc::strong_count(&slot) == 2 {
            registry.remove(path);
        }
    }

    /// Documents currently locked or awaited
    pub fn len(&self) -> usize {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lock file sitting next to the guarded document
pub fn lock_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(".lock");
    PathBuf::from(os)
}

#[cfg(unix)]
struct FileLock {
    _guard: nix::fcntl::Flock<std::fs::File>,
}

#[cfg(unix)]
impl FileLock {
    fn acquire(path: &Path) -> Result<Self> {
        use crate::error::BrewError;
        use nix::fcntl::{Flock, FlockArg};

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(lock_path(path))?;

        let guard = Flock::lock(file, FlockArg::LockExclusive).map_err(|(_, errno)| {
            BrewError::Lock(format!("flock failed for {}: {}", path.display(), errno))
        })?;

        Ok(Self { _guard: guard })
    }
}

// Without flock only the in-process mutex applies.
#[cfg(not(unix))]
struct FileLock;

#[cfg(not(unix))]
impl FileLock {
    fn acquire(_path: &Path) -> Result<Self> {
        Ok(Self)
    }
}
