//! Manifest data model.

use clyde_core::{Version, VersionConstraint};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// What kind of artifact a package produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageKind {
    /// Static library (`lib<name>.a` plus public headers).
    Library,
    /// Executable.
    Application,
}

impl fmt::Display for PackageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Library => write!(f, "library"),
            Self::Application => write!(f, "application"),
        }
    }
}

/// Source language of a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// Plain C.
    C,
    /// C++.
    Cpp,
}

impl Language {
    /// The default language when the manifest does not name one.
    #[must_use]
    pub const fn default_for(kind: PackageKind) -> Self {
        match kind {
            PackageKind::Application => Self::C,
            PackageKind::Library => Self::Cpp,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::C => write!(f, "c"),
            Self::Cpp => write!(f, "cpp"),
        }
    }
}

/// A named dependency with its version constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRequirement {
    /// The required package's name.
    pub name: String,
    /// The constraint its version must satisfy.
    pub constraint: VersionConstraint,
}

impl fmt::Display for PackageRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.constraint)
    }
}

/// Flag overlay merged in when the variant's named trait is active.
///
/// A variant named `x` is active when the build's traits contain `x` with a
/// value other than `"false"` or `"0"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantOverlay {
    /// Additional compile flags per compiler family.
    #[serde(default)]
    pub cflags: BTreeMap<String, String>,
    /// Additional linker flags per compiler family.
    #[serde(default)]
    pub ldflags: BTreeMap<String, String>,
}

/// A parsed and validated package manifest.
///
/// Immutable once constructed; the maps are sorted so every traversal of a
/// manifest is deterministic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    /// Package name, optionally prefixed `@org/`.
    pub name: String,
    /// Package version.
    pub version: Version,
    /// Library or application.
    pub kind: PackageKind,
    /// Source language (inferred from the kind when absent).
    pub language: Language,
    /// Source globs relative to the package root.
    pub sources: Vec<String>,
    /// Compile flags keyed by compiler family name.
    pub cflags: BTreeMap<String, String>,
    /// Linker flags keyed by compiler family name.
    pub ldflags: BTreeMap<String, String>,
    /// Build-parameterizing key/value traits.
    pub traits: BTreeMap<String, String>,
    /// Requirements, unique by name.
    pub requires: Vec<PackageRequirement>,
    /// Conditional flag overlays keyed by trait name.
    pub variants: BTreeMap<String, VariantOverlay>,
}

impl Manifest {
    /// The bare name without any `@org/` prefix.
    #[must_use]
    pub fn short_name(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }

    /// Is the named variant active under this manifest's traits?
    #[must_use]
    pub fn variant_active(&self, variant: &str) -> bool {
        self.traits
            .get(variant)
            .is_some_and(|v| v != "false" && v != "0")
    }
}
