//! The summary index (`index.json`).
//!
//! The index is advisory: the content-addressed files are the source of
//! truth, and a missing or corrupt index is rebuilt as entries are touched.
//! Every update rewrites the file atomically.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use tracing::warn;

/// The two cache tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheTier {
    /// Compiled object files.
    Object,
    /// Linked artifacts bundled with their public headers.
    Artifact,
}

impl CacheTier {
    /// Directory name under the cache root.
    #[must_use]
    pub const fn subdir(self) -> &'static str {
        match self {
            Self::Object => "objects",
            Self::Artifact => "artifacts",
        }
    }

    /// File extension for entries of this tier.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Object => "o",
            Self::Artifact => "tar",
        }
    }
}

/// One index record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Hex cache key.
    pub key: String,
    /// Which tier the entry lives in.
    pub tier: CacheTier,
    /// Stored size in bytes.
    pub size: u64,
    /// Creation time, seconds since the Unix epoch.
    pub created_at: u64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct IndexFile {
    version: u32,
    entries: Vec<IndexEntry>,
}

/// In-memory view of `index.json`.
#[derive(Debug)]
pub(crate) struct CacheIndex {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, IndexEntry>>,
}

impl CacheIndex {
    const FILE_VERSION: u32 = 1;

    pub(crate) fn open(path: PathBuf) -> Self {
        let entries = match std::fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<IndexFile>(&bytes) {
                Ok(file) => file.entries.into_iter().map(|e| (e.key.clone(), e)).collect(),
                Err(error) => {
                    warn!(path = %path.display(), %error, "cache index unreadable, starting empty");
                    BTreeMap::new()
                }
            },
            Err(_) => BTreeMap::new(),
        };
        Self {
            path,
            entries: RwLock::new(entries),
        }
    }

    pub(crate) fn insert(&self, entry: IndexEntry) {
        self.entries.write().insert(entry.key.clone(), entry);
        self.flush();
    }

    pub(crate) fn remove(&self, key: &str) {
        self.entries.write().remove(key);
        self.flush();
    }

    pub(crate) fn remove_many(&self, keys: &[String]) {
        {
            let mut entries = self.entries.write();
            for key in keys {
                entries.remove(key);
            }
        }
        self.flush();
    }

    pub(crate) fn snapshot(&self, tier: Option<CacheTier>) -> Vec<IndexEntry> {
        self.entries
            .read()
            .values()
            .filter(|e| tier.is_none_or(|t| e.tier == t))
            .cloned()
            .collect()
    }

    pub(crate) fn clear(&self) {
        self.entries.write().clear();
        self.flush();
    }

    /// Atomic rewrite: temp file in the same directory, then rename.
    fn flush(&self) {
        let file = IndexFile {
            version: Self::FILE_VERSION,
            entries: self.entries.read().values().cloned().collect(),
        };
        let Some(parent) = self.path.parent() else {
            return;
        };
        let result = tempfile::NamedTempFile::new_in(parent).and_then(|mut temp| {
            serde_json::to_writer_pretty(&mut temp, &file)?;
            temp.flush()?;
            temp.persist(&self.path).map_err(|e| e.error)?;
            Ok(())
        });
        if let Err(error) = result {
            // The index is advisory; a failed rewrite must not fail a build.
            warn!(path = %self.path.display(), %error, "cache index flush failed");
        }
    }
}
