//! Materialized package store.
//!
//! Fetched tarballs unpack under `<cache_root>/packages/<name>/<version>/`.
//! Materialization is unpack-to-temp then rename, so two concurrent builds
//! fetching the same package race benignly: the loser's rename finds the
//! winner's identical tree already in place.

use crate::RegistryError;
use clyde_core::Version;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Error produced while materializing a package.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem operation failed.
    #[error("package store i/o at {path}: {source}")]
    Io {
        /// Path involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The tarball did not unpack.
    #[error("failed to unpack package archive: {source}")]
    Unpack {
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl From<StoreError> for RegistryError {
    fn from(err: StoreError) -> Self {
        Self::Backend {
            message: err.to_string(),
        }
    }
}

/// The on-disk store of fetched package sources.
#[derive(Debug, Clone)]
pub struct PackageStore {
    root: PathBuf,
}

impl PackageStore {
    /// Open (creating if needed) the store at `root`.
    ///
    /// # Errors
    /// Returns [`StoreError::Io`] if the directory cannot be created.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|source| StoreError::Io {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    /// The store root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where a package version lives (whether or not it is materialized).
    ///
    /// An `@org/name` package nests naturally: `packages/@org/name/1.0.0/`.
    #[must_use]
    pub fn path_of(&self, name: &str, version: &Version) -> PathBuf {
        self.root.join(name).join(version.to_string())
    }

    /// Is this package version already materialized?
    #[must_use]
    pub fn contains(&self, name: &str, version: &Version) -> bool {
        self.path_of(name, version).is_dir()
    }

    /// Unpack a fetched tarball into its final location, returning the
    /// package root. Idempotent; safe against concurrent materialization.
    ///
    /// # Errors
    /// Returns [`StoreError`] when unpacking or the final rename fails.
    pub fn materialize(
        &self,
        name: &str,
        version: &Version,
        tarball: &[u8],
    ) -> Result<PathBuf, StoreError> {
        let dest = self.path_of(name, version);
        if dest.is_dir() {
            debug!(name, %version, "package already materialized");
            return Ok(dest);
        }

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let staging = tempfile::tempdir_in(&self.root).map_err(|source| StoreError::Io {
            path: self.root.clone(),
            source,
        })?;
        tar::Archive::new(tarball)
            .unpack(staging.path())
            .map_err(|source| StoreError::Unpack { source })?;

        match std::fs::rename(staging.path(), &dest) {
            Ok(()) => {
                debug!(name, %version, path = %dest.display(), "package materialized");
                Ok(dest)
            }
            // Another process won the race; its tree is byte-identical.
            Err(_) if dest.is_dir() => Ok(dest),
            Err(source) => Err(StoreError::Io { path: dest, source }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryRegistry;
    use crate::Registry;
    use pretty_assertions::assert_eq;

    #[test]
    fn materialize_and_reuse() {
        let dir = tempfile::tempdir().unwrap();
        let store = PackageStore::open(dir.path().join("packages")).unwrap();
        let registry = InMemoryRegistry::new();
        registry.publish(
            "zlib",
            Version::new(1, 3, 0),
            &[
                ("package.yml", "name: zlib\nversion: 1.3.0\ntype: library\n"),
                ("src/inflate.c", "int inflate(void) { return 0; }\n"),
            ],
        );

        let fetched = registry.fetch("zlib", &Version::new(1, 3, 0)).unwrap();
        let root = store
            .materialize("zlib", &Version::new(1, 3, 0), &fetched.tarball)
            .unwrap();

        assert!(root.join("package.yml").is_file());
        assert!(root.join("src/inflate.c").is_file());
        assert!(store.contains("zlib", &Version::new(1, 3, 0)));

        // Second materialization is a no-op returning the same root.
        let again = store
            .materialize("zlib", &Version::new(1, 3, 0), &fetched.tarball)
            .unwrap();
        assert_eq!(root, again);
    }

    #[test]
    fn org_names_nest() {
        let dir = tempfile::tempdir().unwrap();
        let store = PackageStore::open(dir.path().join("packages")).unwrap();
        let path = store.path_of("@acme/netkit", &Version::new(1, 0, 0));
        assert!(path.ends_with("@acme/netkit/1.0.0"));
    }
}
