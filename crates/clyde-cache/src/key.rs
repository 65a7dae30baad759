//! Canonical cache key derivation.
//!
//! Keys must be stable across releases, so the byte layout is fixed here and
//! nowhere else: every hash input starts with a one-byte format version,
//! composite fields are length-prefixed (u64 little-endian) concatenations,
//! strings are UTF-8, and maps are written sorted by key. Changing any of
//! this is a cache-format version change: bump [`CACHE_FORMAT_VERSION`].

use clyde_manifest::Manifest;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// Version byte prefixed to every hash input.
pub const CACHE_FORMAT_VERSION: u8 = 1;

/// A fixed-width content hash identifying cached values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CacheKey([u8; 32]);

impl CacheKey {
    /// The raw digest bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex form.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from a 64-character hex string.
    #[must_use]
    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        bytes.try_into().ok().map(Self)
    }

    /// Shard prefix (first two hex chars) and remainder, for on-disk layout.
    #[must_use]
    pub fn shard(&self) -> (String, String) {
        let hex = self.to_hex();
        (hex[..2].to_string(), hex[2..].to_string())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Incremental writer producing a [`CacheKey`] from canonical fields.
#[derive(Debug)]
pub struct KeyWriter {
    hasher: Sha256,
}

impl KeyWriter {
    /// Start a new key, writing the format version byte first.
    #[must_use]
    pub fn new() -> Self {
        let mut hasher = Sha256::new();
        hasher.update([CACHE_FORMAT_VERSION]);
        Self { hasher }
    }

    /// Write a length-prefixed byte field.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.hasher.update((bytes.len() as u64).to_le_bytes());
        self.hasher.update(bytes);
    }

    /// Write a length-prefixed UTF-8 string field.
    pub fn write_str(&mut self, s: &str) {
        self.write_bytes(s.as_bytes());
    }

    /// Write a fixed-width integer field.
    pub fn write_u64(&mut self, value: u64) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Write a string map sorted by key.
    pub fn write_map(&mut self, map: &BTreeMap<String, String>) {
        self.write_u64(map.len() as u64);
        for (k, v) in map {
            self.write_str(k);
            self.write_str(v);
        }
    }

    /// Finish and produce the key.
    #[must_use]
    pub fn finish(self) -> CacheKey {
        CacheKey(self.hasher.finalize().into())
    }
}

impl Default for KeyWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Identity of the compiler or linker that produced a cached value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolIdentity {
    /// Tool name (e.g. `gcc`).
    pub name: String,
    /// Full version string.
    pub version: String,
    /// Target triple.
    pub target: String,
}

impl ToolIdentity {
    fn write_to(&self, writer: &mut KeyWriter) {
        writer.write_str(&self.name);
        writer.write_str(&self.version);
        writer.write_str(&self.target);
    }
}

impl From<&clyde_core::CompilerInfo> for ToolIdentity {
    fn from(info: &clyde_core::CompilerInfo) -> Self {
        Self {
            name: info.name.clone(),
            version: info.version.clone(),
            target: info.target.clone(),
        }
    }
}

/// Everything that determines one object file.
#[derive(Debug)]
pub struct ObjectKeyInputs<'a> {
    /// Bytes of the source file.
    pub source: &'a [u8],
    /// Resolved include-order list: normalized header path and header bytes,
    /// for every public header transitively reachable from the source.
    pub headers: &'a [(&'a Path, Vec<u8>)],
    /// Compiler identity.
    pub compiler: &'a ToolIdentity,
    /// Compile flag vector, in order.
    pub flags: &'a [String],
    /// Language selection (`c` or `cpp`).
    pub language: &'a str,
    /// Trait key/value pairs relevant to the compilation.
    pub traits: &'a BTreeMap<String, String>,
}

/// Derive the object-tier key.
#[must_use]
pub fn object_key(inputs: &ObjectKeyInputs<'_>) -> CacheKey {
    let mut writer = KeyWriter::new();
    writer.write_str("object");
    writer.write_bytes(inputs.source);

    writer.write_u64(inputs.headers.len() as u64);
    for (path, bytes) in inputs.headers {
        writer.write_str(&normalize_path(path));
        writer.write_bytes(bytes);
    }

    inputs.compiler.write_to(&mut writer);

    writer.write_u64(inputs.flags.len() as u64);
    for flag in inputs.flags {
        writer.write_str(flag);
    }

    writer.write_str(inputs.language);
    writer.write_map(inputs.traits);
    writer.finish()
}

/// Everything that determines one linked artifact.
#[derive(Debug)]
pub struct ArtifactKeyInputs<'a> {
    /// The package manifest, in canonical form.
    pub manifest: &'a Manifest,
    /// Object keys participating in the link (sorted internally).
    pub object_keys: &'a [CacheKey],
    /// Link flag vector, in order.
    pub link_flags: &'a [String],
    /// Linker identity.
    pub linker: &'a ToolIdentity,
    /// Artifact keys of directly linked library dependencies
    /// (sorted internally).
    pub dependency_artifacts: &'a [CacheKey],
}

/// Derive the artifact-tier key.
#[must_use]
pub fn artifact_key(inputs: &ArtifactKeyInputs<'_>) -> CacheKey {
    let mut writer = KeyWriter::new();
    writer.write_str("artifact");
    write_manifest(&mut writer, inputs.manifest);

    let mut objects: Vec<&CacheKey> = inputs.object_keys.iter().collect();
    objects.sort();
    writer.write_u64(objects.len() as u64);
    for key in objects {
        writer.write_bytes(key.as_bytes());
    }

    writer.write_u64(inputs.link_flags.len() as u64);
    for flag in inputs.link_flags {
        writer.write_str(flag);
    }

    inputs.linker.write_to(&mut writer);

    let mut deps: Vec<&CacheKey> = inputs.dependency_artifacts.iter().collect();
    deps.sort();
    writer.write_u64(deps.len() as u64);
    for key in deps {
        writer.write_bytes(key.as_bytes());
    }

    writer.finish()
}

/// Canonical manifest serialization: every field, maps sorted, lists in
/// manifest order.
fn write_manifest(writer: &mut KeyWriter, manifest: &Manifest) {
    writer.write_str(&manifest.name);
    writer.write_str(&manifest.version.to_string());
    writer.write_str(&manifest.kind.to_string());
    writer.write_str(&manifest.language.to_string());

    writer.write_u64(manifest.sources.len() as u64);
    for glob in &manifest.sources {
        writer.write_str(glob);
    }

    writer.write_map(&manifest.cflags);
    writer.write_map(&manifest.ldflags);
    writer.write_map(&manifest.traits);

    writer.write_u64(manifest.requires.len() as u64);
    for requirement in &manifest.requires {
        writer.write_str(&requirement.name);
        writer.write_str(&requirement.constraint.to_string());
    }

    writer.write_u64(manifest.variants.len() as u64);
    for (name, overlay) in &manifest.variants {
        writer.write_str(name);
        writer.write_map(&overlay.cflags);
        writer.write_map(&overlay.ldflags);
    }
}

/// Normalize a path for hashing: absolute paths as-is, separators unified.
fn normalize_path(path: &Path) -> String {
    let text = path.to_string_lossy();
    if std::path::MAIN_SEPARATOR == '/' {
        text.into_owned()
    } else {
        text.replace(std::path::MAIN_SEPARATOR, "/")
    }
}
