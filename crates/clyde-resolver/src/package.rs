//! Resolved packages.

use clyde_core::Version;
use clyde_manifest::{Manifest, ManifestError, ManifestWarning};
use std::fmt;
use std::path::{Path, PathBuf};

/// The `(name, version)` identity of a resolved package.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageKey {
    /// Package name.
    pub name: String,
    /// Package version.
    pub version: Version,
}

impl fmt::Display for PackageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// Where a package's sources came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageOrigin {
    /// The root is user-provided and never copied.
    Local,
    /// The root lives inside the package store, materialized from a fetch.
    Remote,
}

/// A manifest plus the filesystem root holding its sources.
///
/// Constructed exactly once per `(name, version)` per resolution.
#[derive(Debug, Clone)]
pub struct Package {
    /// The parsed manifest.
    pub manifest: Manifest,
    /// Root directory containing the package's files.
    pub root: PathBuf,
    /// Local or remote origin.
    pub origin: PackageOrigin,
}

impl Package {
    /// Load a local package from a directory, returning manifest warnings
    /// alongside it.
    ///
    /// # Errors
    /// Propagates manifest loading and validation failures.
    pub fn load_local(dir: &Path) -> Result<(Self, Vec<ManifestWarning>), ManifestError> {
        let (manifest, warnings) = Manifest::load(dir)?;
        Ok((
            Self {
                manifest,
                root: dir.to_path_buf(),
                origin: PackageOrigin::Local,
            },
            warnings,
        ))
    }

    /// The package name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.manifest.name
    }

    /// The package version.
    #[must_use]
    pub fn version(&self) -> &Version {
        &self.manifest.version
    }

    /// This package's `(name, version)` identity.
    #[must_use]
    pub fn key(&self) -> PackageKey {
        PackageKey {
            name: self.manifest.name.clone(),
            version: self.manifest.version.clone(),
        }
    }
}
