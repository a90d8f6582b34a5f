//! Per-directory comparison locks.
//!
//! One output directory must only ever be evaluated by a single holder at a
//! time. The guard is deliberately non-blocking: contention means another
//! run is already doing this directory's work, so the caller skips instead
//! of waiting or retrying.

use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use fs2::FileExt;

use crate::errors::{CompareError, Result};

/// Marker file the exclusive lock is taken on.
pub const LOCK_FILE: &str = "comparison.lock";

/// A held per-directory lock. Released on drop.
pub trait LockGuard {}

/// Source of per-directory exclusive locks.
pub trait LockProvider {
    /// Try to take the lock for `outdir`. `None` means another holder has
    /// it and the caller should skip this directory, not retry.
    fn try_acquire(&self, outdir: &Path) -> Result<Option<Box<dyn LockGuard>>>;
}

/// Advisory lock on a marker file next to the comparison record.
///
/// The marker itself may outlive an aborted process, but the lock dies with
/// the file handle, so a later run simply re-acquires it.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileLockProvider;

struct FileLockGuard {
    file: File,
}

impl LockGuard for FileLockGuard {}

impl Drop for FileLockGuard {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

impl LockProvider for FileLockProvider {
    fn try_acquire(&self, outdir: &Path) -> Result<Option<Box<dyn LockGuard>>> {
        let file = File::create(outdir.join(LOCK_FILE))?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Box::new(FileLockGuard { file }))),
            Err(_) => Ok(None),
        }
    }
}

/// In-memory lock table for tests and embedders that must not touch real
/// marker files. Clones share one table.
#[derive(Debug, Clone, Default)]
pub struct MemoryLockProvider {
    held: Arc<Mutex<HashSet<PathBuf>>>,
}

struct MemoryLockGuard {
    held: Arc<Mutex<HashSet<PathBuf>>>,
    outdir: PathBuf,
}

impl LockGuard for MemoryLockGuard {}

impl Drop for MemoryLockGuard {
    fn drop(&mut self) {
        if let Ok(mut held) = self.held.lock() {
            held.remove(&self.outdir);
        }
    }
}

impl LockProvider for MemoryLockProvider {
    fn try_acquire(&self, outdir: &Path) -> Result<Option<Box<dyn LockGuard>>> {
        let mut held = self
            .held
            .lock()
            .map_err(|_| CompareError::Lock("lock table poisoned".to_string()))?;
        if !held.insert(outdir.to_path_buf()) {
            return Ok(None);
        }
        Ok(Some(Box::new(MemoryLockGuard {
            held: Arc::clone(&self.held),
            outdir: outdir.to_path_buf(),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_lock_excludes_second_holder() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FileLockProvider;

        let guard = provider.try_acquire(dir.path()).unwrap();
        assert!(guard.is_some());
        assert!(provider.try_acquire(dir.path()).unwrap().is_none());

        drop(guard);
        assert!(provider.try_acquire(dir.path()).unwrap().is_some());
    }

    #[test]
    fn file_lock_leaves_marker_behind() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FileLockProvider;

        drop(provider.try_acquire(dir.path()).unwrap());
        // The marker stays but the lock is free again.
        assert!(dir.path().join(LOCK_FILE).is_file());
        assert!(provider.try_acquire(dir.path()).unwrap().is_some());
    }

    #[test]
    fn memory_lock_excludes_until_drop() {
        let provider = MemoryLockProvider::default();
        let outdir = Path::new("/virtual/out");

        let guard = provider.try_acquire(outdir).unwrap();
        assert!(guard.is_some());
        assert!(provider.try_acquire(outdir).unwrap().is_none());

        drop(guard);
        assert!(provider.try_acquire(outdir).unwrap().is_some());
    }

    #[test]
    fn memory_lock_clones_share_the_table() {
        let provider = MemoryLockProvider::default();
        let clone = provider.clone();
        let outdir = Path::new("/virtual/out");

        let _guard = provider.try_acquire(outdir).unwrap().unwrap();
        assert!(clone.try_acquire(outdir).unwrap().is_none());
    }

    #[test]
    fn distinct_directories_do_not_contend() {
        let provider = MemoryLockProvider::default();
        let _a = provider.try_acquire(Path::new("/a")).unwrap().unwrap();
        assert!(provider.try_acquire(Path::new("/b")).unwrap().is_some());
    }
}
