//! Compiler identity.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The compiler family, used to key flag maps and drive diagnostics parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompilerFamily {
    /// GNU compiler collection.
    Gcc,
    /// LLVM clang.
    Clang,
    /// Anything else; rejected at plan time.
    Other,
}

impl CompilerFamily {
    /// The family name as used in manifest flag maps.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Gcc => "gcc",
            Self::Clang => "clang",
            Self::Other => "other",
        }
    }

    /// Classify a `--version` banner.
    #[must_use]
    pub fn from_version_banner(banner: &str) -> Self {
        let lower = banner.to_ascii_lowercase();
        if lower.contains("clang") {
            Self::Clang
        } else if lower.contains("gcc") || lower.contains("free software foundation") {
            Self::Gcc
        } else {
            Self::Other
        }
    }
}

impl fmt::Display for CompilerFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identity of a probed compiler, cached per process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerInfo {
    /// Executable name (e.g. `cc`, `gcc`).
    pub name: String,
    /// Full version string from the banner's first line.
    pub version: String,
    /// Target triple (opaque; no cross-compilation selection logic).
    pub target: String,
    /// Detected family.
    pub family: CompilerFamily,
}
