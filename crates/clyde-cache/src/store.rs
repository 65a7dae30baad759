//! The on-disk cache store.

use crate::bundle::ArtifactBundle;
use crate::index::{CacheIndex, CacheTier, IndexEntry};
use crate::key::CacheKey;
use crate::lock::CacheLock;
use crate::stats::{CacheStats, CacheStatsSnapshot};
use clyde_core::ErrorCode;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, warn};

/// Error produced by cache operations.
///
/// Callers treat read failures as misses and write failures as log-only;
/// only [`CacheError::Locked`] is expected to surface to a user.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Reading an entry failed.
    #[error("[E0501] cache read failure at {path}: {source}")]
    ReadFailure {
        /// Path involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// Writing an entry failed.
    #[error("[E0502] cache write failure at {path}: {source}")]
    WriteFailure {
        /// Path involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// An entry existed but did not parse; it has been purged.
    #[error("[E0503] corrupt cache entry {key} purged")]
    CorruptEntry {
        /// Hex key of the purged entry.
        key: String,
    },
    /// Another process holds the exclusive lock.
    #[error("[E0504] cache root is locked by another process")]
    Locked,
}

impl CacheError {
    /// The stable error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::ReadFailure { .. } => ErrorCode::E0501,
            Self::WriteFailure { .. } => ErrorCode::E0502,
            Self::CorruptEntry { .. } => ErrorCode::E0503,
            Self::Locked => ErrorCode::E0504,
        }
    }
}

/// Content-addressed two-tier store under a single root.
#[derive(Debug)]
pub struct Cache {
    root: PathBuf,
    index: CacheIndex,
    stats: CacheStats,
}

impl Cache {
    /// Open (creating if needed) the cache at `root`.
    ///
    /// # Errors
    /// Returns [`CacheError::WriteFailure`] if the tier directories cannot
    /// be created.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let root = root.into();
        for tier in [CacheTier::Object, CacheTier::Artifact] {
            let dir = root.join(tier.subdir());
            std::fs::create_dir_all(&dir)
                .map_err(|source| CacheError::WriteFailure { path: dir, source })?;
        }
        let index = CacheIndex::open(root.join("index.json"));
        Ok(Self {
            root,
            index,
            stats: CacheStats::default(),
        })
    }

    /// The user-level default cache root (`<user-cache>/clydepm`).
    #[must_use]
    pub fn default_root() -> Option<PathBuf> {
        directories::BaseDirs::new().map(|dirs| dirs.cache_dir().join("clydepm"))
    }

    /// The cache root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Look up a compiled object. O(1) disk lookup.
    ///
    /// # Errors
    /// Read failures are errors so the caller can downgrade them to misses
    /// explicitly; corrupt entries are purged internally and report a miss.
    pub fn get_object(&self, key: &CacheKey) -> Result<Option<Vec<u8>>, CacheError> {
        let path = self.entry_path(CacheTier::Object, key);
        if !path.is_file() {
            self.stats
                .record_lookup(&self.stats.object_hits, &self.stats.object_misses, false);
            return Ok(None);
        }
        let bytes = std::fs::read(&path).map_err(|source| CacheError::ReadFailure {
            path: path.clone(),
            source,
        })?;
        if bytes.is_empty() {
            self.purge_corrupt(CacheTier::Object, key, &path);
            self.stats
                .record_lookup(&self.stats.object_hits, &self.stats.object_misses, false);
            return Ok(None);
        }
        self.stats
            .record_lookup(&self.stats.object_hits, &self.stats.object_misses, true);
        Ok(Some(bytes))
    }

    /// Store a compiled object. Idempotent and atomic.
    ///
    /// # Errors
    /// Returns [`CacheError::WriteFailure`]; callers log and continue.
    pub fn put_object(&self, key: &CacheKey, bytes: &[u8]) -> Result<(), CacheError> {
        self.put(CacheTier::Object, key, bytes)
    }

    /// Look up a linked artifact bundle.
    ///
    /// # Errors
    /// As [`Cache::get_object`].
    pub fn get_artifact(&self, key: &CacheKey) -> Result<Option<ArtifactBundle>, CacheError> {
        let path = self.entry_path(CacheTier::Artifact, key);
        if !path.is_file() {
            self.stats.record_lookup(
                &self.stats.artifact_hits,
                &self.stats.artifact_misses,
                false,
            );
            return Ok(None);
        }
        let bytes = std::fs::read(&path).map_err(|source| CacheError::ReadFailure {
            path: path.clone(),
            source,
        })?;
        match ArtifactBundle::from_bytes(bytes) {
            Ok(bundle) => {
                self.stats.record_lookup(
                    &self.stats.artifact_hits,
                    &self.stats.artifact_misses,
                    true,
                );
                Ok(Some(bundle))
            }
            Err(_) => {
                self.purge_corrupt(CacheTier::Artifact, key, &path);
                self.stats.record_lookup(
                    &self.stats.artifact_hits,
                    &self.stats.artifact_misses,
                    false,
                );
                Ok(None)
            }
        }
    }

    /// Store a linked artifact bundle. Idempotent and atomic.
    ///
    /// # Errors
    /// Returns [`CacheError::WriteFailure`]; callers log and continue.
    pub fn put_artifact(&self, key: &CacheKey, bundle: &ArtifactBundle) -> Result<(), CacheError> {
        self.put(CacheTier::Artifact, key, bundle.as_bytes())
    }

    /// Is this key present in the given tier?
    #[must_use]
    pub fn contains(&self, tier: CacheTier, key: &CacheKey) -> bool {
        self.entry_path(tier, key).is_file()
    }

    /// Index entries, optionally filtered by tier.
    #[must_use]
    pub fn enumerate(&self, tier: Option<CacheTier>) -> Vec<IndexEntry> {
        self.index.snapshot(tier)
    }

    /// Remove entries matching `predicate` under the exclusive process lock.
    /// Returns the number of removed entries.
    ///
    /// # Errors
    /// Returns [`CacheError::Locked`] when another process holds the lock.
    pub fn evict(&self, predicate: impl Fn(&IndexEntry) -> bool) -> Result<usize, CacheError> {
        let _lock = CacheLock::exclusive(&self.root)?;
        let victims: Vec<IndexEntry> = self
            .index
            .snapshot(None)
            .into_iter()
            .filter(|entry| predicate(entry))
            .collect();
        for entry in &victims {
            if let Some(key) = CacheKey::from_hex(&entry.key) {
                let path = self.entry_path(entry.tier, &key);
                if let Err(error) = std::fs::remove_file(&path)
                    && error.kind() != std::io::ErrorKind::NotFound
                {
                    warn!(path = %path.display(), %error, "evict could not remove entry");
                }
            }
        }
        let keys: Vec<String> = victims.iter().map(|e| e.key.clone()).collect();
        self.index.remove_many(&keys);
        debug!(removed = victims.len(), "cache eviction complete");
        Ok(victims.len())
    }

    /// Remove every entry in both tiers. Returns the number removed.
    ///
    /// # Errors
    /// Returns [`CacheError::Locked`] when another process holds the lock.
    pub fn clear(&self) -> Result<usize, CacheError> {
        let _lock = CacheLock::exclusive(&self.root)?;
        let mut removed = 0;
        for tier in [CacheTier::Object, CacheTier::Artifact] {
            let dir = self.root.join(tier.subdir());
            if dir.exists() {
                removed += count_files(&dir);
                std::fs::remove_dir_all(&dir).map_err(|source| CacheError::WriteFailure {
                    path: dir.clone(),
                    source,
                })?;
            }
            std::fs::create_dir_all(&dir)
                .map_err(|source| CacheError::WriteFailure { path: dir, source })?;
        }
        self.index.clear();
        Ok(removed)
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    fn entry_path(&self, tier: CacheTier, key: &CacheKey) -> PathBuf {
        let (shard, rest) = key.shard();
        self.root
            .join(tier.subdir())
            .join(shard)
            .join(format!("{rest}.{}", tier.extension()))
    }

    fn put(&self, tier: CacheTier, key: &CacheKey, bytes: &[u8]) -> Result<(), CacheError> {
        let path = self.entry_path(tier, key);
        if path.is_file() {
            debug!(key = %key, "already cached");
            return Ok(());
        }
        self.write_atomic(&path, bytes)?;
        self.stats
            .writes
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        self.index.insert(IndexEntry {
            key: key.to_hex(),
            tier,
            size: bytes.len() as u64,
            created_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        });
        debug!(key = %key, size = bytes.len(), tier = ?tier, "cached");
        Ok(())
    }

    /// Write to a unique temp name in the destination directory, then rename
    /// onto the final path. The rename is atomic; a concurrent writer's
    /// rename replaces a byte-identical file harmlessly.
    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<(), CacheError> {
        let parent = path.parent().unwrap_or(Path::new("."));
        std::fs::create_dir_all(parent).map_err(|source| CacheError::WriteFailure {
            path: parent.to_path_buf(),
            source,
        })?;
        let map_err = |source| CacheError::WriteFailure {
            path: path.to_path_buf(),
            source,
        };
        let mut temp = tempfile::NamedTempFile::new_in(parent).map_err(map_err)?;
        temp.write_all(bytes).map_err(map_err)?;
        temp.flush().map_err(map_err)?;
        temp.persist(path).map_err(|e| map_err(e.error))?;
        Ok(())
    }

    fn purge_corrupt(&self, tier: CacheTier, key: &CacheKey, path: &Path) {
        warn!(key = %key, tier = ?tier, "corrupt cache entry purged");
        let _ = std::fs::remove_file(path);
        self.index.remove(&key.to_hex());
        self.stats
            .corrupt_purged
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    }
}

fn count_files(dir: &Path) -> usize {
    walk_count(dir).unwrap_or(0)
}

fn walk_count(dir: &Path) -> std::io::Result<usize> {
    let mut count = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            count += walk_count(&entry.path())?;
        } else {
            count += 1;
        }
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{KeyWriter, ToolIdentity, object_key};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn key(tag: &str) -> CacheKey {
        let mut writer = KeyWriter::new();
        writer.write_str(tag);
        writer.finish()
    }

    fn cache() -> (tempfile::TempDir, Cache) {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::open(dir.path().join("clydepm")).unwrap();
        (dir, cache)
    }

    #[test]
    fn object_round_trip() {
        let (_dir, cache) = cache();
        let key = key("object-1");
        assert_eq!(cache.get_object(&key).unwrap(), None);
        cache.put_object(&key, b"object bytes").unwrap();
        assert_eq!(cache.get_object(&key).unwrap().as_deref(), Some(&b"object bytes"[..]));

        let stats = cache.stats();
        assert_eq!(stats.object_misses, 1);
        assert_eq!(stats.object_hits, 1);
        assert_eq!(stats.writes, 1);
    }

    #[test]
    fn puts_are_idempotent() {
        let (_dir, cache) = cache();
        let key = key("object-2");
        cache.put_object(&key, b"bytes").unwrap();
        cache.put_object(&key, b"bytes").unwrap();
        assert_eq!(cache.stats().writes, 1);
        assert_eq!(cache.enumerate(None).len(), 1);
    }

    #[test]
    fn entries_are_sharded() {
        let (_dir, cache) = cache();
        let key = key("object-3");
        cache.put_object(&key, b"bytes").unwrap();
        let (shard, rest) = key.shard();
        let expected = cache
            .root()
            .join("objects")
            .join(shard)
            .join(format!("{rest}.o"));
        assert!(expected.is_file());
    }

    #[test]
    fn corrupt_object_is_purged_and_misses() {
        let (_dir, cache) = cache();
        let key = key("object-4");
        cache.put_object(&key, b"bytes").unwrap();

        // Truncate the entry behind the cache's back.
        let (shard, rest) = key.shard();
        let path = cache
            .root()
            .join("objects")
            .join(shard)
            .join(format!("{rest}.o"));
        std::fs::write(&path, b"").unwrap();

        assert_eq!(cache.get_object(&key).unwrap(), None);
        assert!(!path.exists());
        assert_eq!(cache.stats().corrupt_purged, 1);
    }

    #[test]
    fn corrupt_artifact_is_purged_and_misses() {
        let (_dir, cache) = cache();
        let key = key("artifact-1");
        let (shard, rest) = key.shard();
        let path = cache
            .root()
            .join("artifacts")
            .join(&shard)
            .join(format!("{rest}.tar"));
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, vec![0xff; 64]).unwrap();

        assert!(cache.get_artifact(&key).unwrap().is_none());
        assert!(!path.exists());
    }

    #[test]
    fn artifact_round_trip() {
        let (_dir, cache) = cache();
        let src = tempfile::tempdir().unwrap();
        let artifact = src.path().join("app");
        std::fs::write(&artifact, b"binary").unwrap();
        let bundle = ArtifactBundle::pack(&artifact, None).unwrap();

        let key = key("artifact-2");
        cache.put_artifact(&key, &bundle).unwrap();
        let loaded = cache.get_artifact(&key).unwrap().unwrap();
        assert_eq!(loaded.as_bytes(), bundle.as_bytes());
    }

    #[test]
    fn evict_with_predicate() {
        let (_dir, cache) = cache();
        cache.put_object(&key("keep"), b"keep").unwrap();
        cache.put_object(&key("drop"), b"drop").unwrap();
        let victim = key("drop").to_hex();

        let removed = cache.evict(|entry| entry.key == victim).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(cache.get_object(&key("drop")).unwrap(), None);
        assert!(cache.get_object(&key("keep")).unwrap().is_some());
    }

    #[test]
    fn clear_empties_both_tiers() {
        let (_dir, cache) = cache();
        cache.put_object(&key("a"), b"a").unwrap();
        cache.put_object(&key("b"), b"b").unwrap();
        let removed = cache.clear().unwrap();
        assert_eq!(removed, 2);
        assert!(cache.enumerate(None).is_empty());
    }

    #[test]
    fn identical_inputs_share_one_entry() {
        let (_dir, cache) = cache();
        let compiler = ToolIdentity {
            name: "gcc".to_string(),
            version: "13.2.0".to_string(),
            target: "x86_64-linux-gnu".to_string(),
        };
        let traits = BTreeMap::new();
        let inputs = crate::key::ObjectKeyInputs {
            source: b"int main(){}",
            headers: &[],
            compiler: &compiler,
            flags: &[],
            language: "c",
            traits: &traits,
        };
        let k1 = object_key(&inputs);
        let k2 = object_key(&inputs);
        cache.put_object(&k1, b"obj").unwrap();
        cache.put_object(&k2, b"obj").unwrap();
        assert_eq!(cache.enumerate(None).len(), 1);
    }
}
