//! In-memory registry fake for tests and embedders.

use crate::{FetchedPackage, PackageMetadata, Registry, RegistryError};
use clyde_core::Version;
use dashmap::DashMap;
use std::collections::BTreeMap;

/// A registry backed by in-process tarballs.
///
/// Versions for a name are kept sorted, so snapshots are deterministic.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    packages: DashMap<String, BTreeMap<Version, Vec<u8>>>,
}

impl InMemoryRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a package version from `(path, contents)` pairs.
    ///
    /// The files are packed into a tarball the way a real registry would
    /// serve them, with the package root at the archive root.
    pub fn publish(&self, name: &str, version: Version, files: &[(&str, &str)]) {
        let tarball = build_tarball(files);
        self.packages
            .entry(name.to_string())
            .or_default()
            .insert(version, tarball);
    }

    /// Publish a prebuilt tarball.
    pub fn publish_tarball(&self, name: &str, version: Version, tarball: Vec<u8>) {
        self.packages
            .entry(name.to_string())
            .or_default()
            .insert(version, tarball);
    }
}

impl Registry for InMemoryRegistry {
    fn list_versions(&self, name: &str) -> Result<Vec<Version>, RegistryError> {
        self.packages
            .get(name)
            .map(|entry| entry.keys().cloned().collect())
            .ok_or_else(|| RegistryError::NotFound {
                name: name.to_string(),
            })
    }

    fn fetch(&self, name: &str, version: &Version) -> Result<FetchedPackage, RegistryError> {
        let entry = self
            .packages
            .get(name)
            .ok_or_else(|| RegistryError::NotFound {
                name: name.to_string(),
            })?;
        let tarball = entry
            .get(version)
            .cloned()
            .ok_or_else(|| RegistryError::VersionNotFound {
                name: name.to_string(),
                version: version.clone(),
            })?;
        Ok(FetchedPackage {
            tarball,
            metadata: PackageMetadata {
                name: name.to_string(),
                version: version.clone(),
            },
        })
    }
}

/// Pack `(path, contents)` pairs into an in-memory tar archive.
fn build_tarball(files: &[(&str, &str)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (path, contents) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, path, contents.as_bytes())
            .expect("in-memory tar write cannot fail");
    }
    builder.into_inner().expect("in-memory tar finish cannot fail")
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    #[test]
    fn list_versions_sorted() {
        let registry = InMemoryRegistry::new();
        registry.publish("zlib", Version::new(1, 3, 0), &[]);
        registry.publish("zlib", Version::new(1, 2, 0), &[]);
        let versions = registry.list_versions("zlib").unwrap();
        assert_eq!(versions, vec![Version::new(1, 2, 0), Version::new(1, 3, 0)]);
    }

    #[test]
    fn unknown_name_errors() {
        let registry = InMemoryRegistry::new();
        assert_matches!(
            registry.list_versions("ghost"),
            Err(RegistryError::NotFound { .. })
        );
    }

    #[test]
    fn fetch_round_trips_contents() {
        let registry = InMemoryRegistry::new();
        registry.publish(
            "zlib",
            Version::new(1, 3, 0),
            &[("package.yml", "name: zlib\nversion: 1.3.0\ntype: library\n")],
        );
        let fetched = registry.fetch("zlib", &Version::new(1, 3, 0)).unwrap();
        assert_eq!(fetched.metadata.name, "zlib");

        let mut archive = tar::Archive::new(&fetched.tarball[..]);
        let mut paths = Vec::new();
        for entry in archive.entries().unwrap() {
            paths.push(entry.unwrap().path().unwrap().into_owned());
        }
        assert_eq!(paths, vec![std::path::PathBuf::from("package.yml")]);
    }

    #[test]
    fn missing_version_errors() {
        let registry = InMemoryRegistry::new();
        registry.publish("zlib", Version::new(1, 3, 0), &[]);
        assert_matches!(
            registry.fetch("zlib", &Version::new(9, 9, 9)),
            Err(RegistryError::VersionNotFound { .. })
        );
    }
}
