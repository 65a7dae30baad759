//! Exclusive process lock on the cache root.
//!
//! Deletion (`evict`, `clear`) must not race other builds, so it takes an
//! advisory exclusive lock on `<root>/.lock`. Reads and writes stay
//! lock-free: writes are atomic renames.

use crate::store::CacheError;
use std::fs::{File, OpenOptions};
use std::path::Path;

/// Held for the duration of a destructive cache operation; released on drop.
#[derive(Debug)]
pub(crate) struct CacheLock {
    _file: File,
}

impl CacheLock {
    /// Try to take the exclusive lock without blocking.
    pub(crate) fn exclusive(root: &Path) -> Result<Self, CacheError> {
        let path = root.join(".lock");
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|source| CacheError::WriteFailure { path, source })?;
        Self::acquire(&file)?;
        Ok(Self { _file: file })
    }

    #[cfg(unix)]
    fn acquire(file: &File) -> Result<(), CacheError> {
        rustix::fs::flock(file, rustix::fs::FlockOperation::NonBlockingLockExclusive)
            .map_err(|_| CacheError::Locked)
    }

    // Advisory only off unix; the open itself is the best effort.
    #[cfg(not(unix))]
    fn acquire(_file: &File) -> Result<(), CacheError> {
        Ok(())
    }
}
