//! Registry capability and package store.
//!
//! The core treats the registry as a black box returning package sources by
//! `(name, version)`. Modeling it as an injected capability lets the resolver
//! run against an in-memory fake with no network.

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

mod memory;
mod store;

pub use memory::InMemoryRegistry;
pub use store::{PackageStore, StoreError};

use clyde_core::Version;
use thiserror::Error;

/// Error produced by a registry backend.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The registry has no package with this name.
    #[error("package '{name}' not found in registry")]
    NotFound {
        /// The missing name.
        name: String,
    },
    /// The registry has the package but not this version.
    #[error("package '{name}' has no version {version}")]
    VersionNotFound {
        /// Package name.
        name: String,
        /// The missing version.
        version: Version,
    },
    /// The backend failed (network, storage, ...).
    #[error("registry backend error: {message}")]
    Backend {
        /// Backend-reported description.
        message: String,
    },
}

/// Registry-reported metadata accompanying a fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageMetadata {
    /// Package name.
    pub name: String,
    /// Fetched version.
    pub version: Version,
}

/// A fetched package: a tar archive of its root plus metadata.
#[derive(Debug, Clone)]
pub struct FetchedPackage {
    /// Tar archive of the package root (manifest included).
    pub tarball: Vec<u8>,
    /// Registry metadata.
    pub metadata: PackageMetadata,
}

/// The registry capability consumed by the resolver.
///
/// Implementations must be deterministic for a fixed snapshot: the same
/// inputs return the same version lists and bytes.
pub trait Registry: Send + Sync {
    /// All published versions of `name`, in no particular order.
    ///
    /// # Errors
    /// Returns [`RegistryError::NotFound`] for unknown names.
    fn list_versions(&self, name: &str) -> Result<Vec<Version>, RegistryError>;

    /// Fetch one version's sources as a tarball.
    ///
    /// # Errors
    /// Returns [`RegistryError::VersionNotFound`] when the version is absent.
    fn fetch(&self, name: &str, version: &Version) -> Result<FetchedPackage, RegistryError>;
}
