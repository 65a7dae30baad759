//! Package manifest parsing and validation.
//!
//! A package is described by a `package.yml` at its root (`config.yaml` is
//! accepted as a historical alias). The manifest names the package, its
//! version and type, the source layout, per-compiler-family flags, traits,
//! and version-constrained requirements.

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

mod error;
mod parse;
mod types;

pub use error::ManifestError;
pub use parse::{MANIFEST_FILE, MANIFEST_FILE_ALIAS, ManifestWarning, parse_manifest};
pub use types::{Language, Manifest, PackageKind, PackageRequirement, VariantOverlay};
