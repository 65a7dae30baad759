//! Manifest loading and parsing.
//!
//! The on-disk document is YAML. Requirement values are polymorphic: a bare
//! constraint string (`"^1.2.0"`) or a map carrying a `path:` or `git:` key;
//! the map forms normalize to the `local:`/`git:` constraint variants before
//! validation. Unknown top-level keys are preserved as warnings, never
//! errors.

use crate::error::ManifestError;
use crate::types::{Language, Manifest, PackageKind, PackageRequirement, VariantOverlay};
use clyde_core::{ConstraintError, Version, VersionConstraint};
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::debug;

/// Primary manifest file name.
pub const MANIFEST_FILE: &str = "package.yml";
/// Historical manifest file name, accepted as an alias.
pub const MANIFEST_FILE_ALIAS: &str = "config.yaml";

/// Keys the parser understands; anything else becomes a warning.
const KNOWN_KEYS: &[&str] = &[
    "name", "version", "type", "language", "sources", "cflags", "ldflags", "traits", "requires",
    "variants",
];

static NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(@[a-z0-9_-]+/)?[a-z0-9_-]+$").unwrap());

/// A non-fatal observation made while parsing a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestWarning {
    /// The manifest field the warning refers to.
    pub field: String,
    /// Human-readable description.
    pub message: String,
}

impl fmt::Display for ManifestWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Raw manifest as deserialized, before validation.
#[derive(Debug, Deserialize)]
struct RawManifest {
    name: Option<String>,
    version: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    language: Option<String>,
    sources: Option<Vec<String>>,
    #[serde(default)]
    cflags: BTreeMap<String, String>,
    #[serde(default)]
    ldflags: BTreeMap<String, String>,
    #[serde(default)]
    traits: BTreeMap<String, String>,
    #[serde(default)]
    requires: BTreeMap<String, RawConstraint>,
    #[serde(default)]
    variants: BTreeMap<String, VariantOverlay>,
}

/// A requirement value: a constraint string, or a `path:`/`git:` map.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawConstraint {
    Text(String),
    Map(RawConstraintMap),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConstraintMap {
    path: Option<String>,
    git: Option<String>,
}

impl RawConstraint {
    fn into_constraint(self, name: &str) -> Result<VersionConstraint, ManifestError> {
        match self {
            Self::Text(text) => VersionConstraint::parse(&text).map_err(|source| {
                ManifestError::MalformedConstraint {
                    name: name.to_string(),
                    source,
                }
            }),
            Self::Map(RawConstraintMap {
                path: Some(path),
                git: None,
            }) => Ok(VersionConstraint::LocalPath(PathBuf::from(path))),
            Self::Map(RawConstraintMap {
                path: None,
                git: Some(reference),
            }) => Ok(VersionConstraint::GitRef(reference)),
            Self::Map(_) => Err(ManifestError::MalformedConstraint {
                name: name.to_string(),
                source: ConstraintError::Empty,
            }),
        }
    }
}

/// Parse and validate manifest bytes.
///
/// # Errors
/// Returns a [`ManifestError`] for syntax problems, missing required fields,
/// unknown type/language values, malformed constraints, or an invalid name.
pub fn parse_manifest(bytes: &[u8]) -> Result<(Manifest, Vec<ManifestWarning>), ManifestError> {
    let value: serde_yaml::Value = serde_yaml::from_slice(bytes)?;

    let mut warnings = Vec::new();
    if let serde_yaml::Value::Mapping(mapping) = &value {
        for key in mapping.keys() {
            if let Some(key) = key.as_str()
                && !KNOWN_KEYS.contains(&key)
            {
                warnings.push(ManifestWarning {
                    field: key.to_string(),
                    message: "unknown key is ignored".to_string(),
                });
            }
        }
    }

    let raw: RawManifest = serde_yaml::from_value(value)?;

    let name = raw
        .name
        .ok_or(ManifestError::MissingField { field: "name" })?;
    if !NAME_PATTERN.is_match(&name) {
        return Err(ManifestError::InvalidName { name });
    }

    let version = raw
        .version
        .ok_or(ManifestError::MissingField { field: "version" })?;
    let version = Version::parse(&version)?;

    let kind = raw
        .kind
        .ok_or(ManifestError::MissingField { field: "type" })?;
    let kind = match kind.as_str() {
        "library" => PackageKind::Library,
        "application" => PackageKind::Application,
        _ => return Err(ManifestError::UnknownType { value: kind }),
    };

    let language = match raw.language.as_deref() {
        None => Language::default_for(kind),
        Some("c") => Language::C,
        Some("cpp") => Language::Cpp,
        Some(other) => {
            return Err(ManifestError::UnknownLanguage {
                value: other.to_string(),
            });
        }
    };

    let sources = raw
        .sources
        .unwrap_or_else(|| vec!["src/**/*.{c,cc,cpp,cxx}".to_string()]);

    let mut requires = Vec::with_capacity(raw.requires.len());
    for (dep_name, raw_constraint) in raw.requires {
        let constraint = raw_constraint.into_constraint(&dep_name)?;
        requires.push(PackageRequirement {
            name: dep_name,
            constraint,
        });
    }

    debug!(name = %name, version = %version, requires = requires.len(), "manifest parsed");

    Ok((
        Manifest {
            name,
            version,
            kind,
            language,
            sources,
            cflags: raw.cflags,
            ldflags: raw.ldflags,
            traits: raw.traits,
            requires,
            variants: raw.variants,
        },
        warnings,
    ))
}

impl Manifest {
    /// Load the manifest from a package root, probing `package.yml` first and
    /// `config.yaml` as the historical alias.
    ///
    /// # Errors
    /// Returns [`ManifestError::NotFound`] if neither file exists, otherwise
    /// whatever [`parse_manifest`] reports.
    pub fn load(dir: &Path) -> Result<(Self, Vec<ManifestWarning>), ManifestError> {
        let path = [MANIFEST_FILE, MANIFEST_FILE_ALIAS]
            .iter()
            .map(|candidate| dir.join(candidate))
            .find(|p| p.is_file())
            .ok_or_else(|| ManifestError::NotFound {
                dir: dir.to_path_buf(),
            })?;
        let bytes = std::fs::read(&path).map_err(|source| ManifestError::Io {
            path: path.clone(),
            source,
        })?;
        parse_manifest(&bytes)
    }
}
