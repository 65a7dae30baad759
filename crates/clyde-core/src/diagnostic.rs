//! Structured compiler diagnostics.
//!
//! The toolchain driver parses compiler stderr into these records; the
//! executor forwards them on the event stream sorted by source location.
//! Only the GCC-compatible `file:line:col: severity: message` prefix is
//! assumed stable.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Diagnostic severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Supplementary note attached to another diagnostic.
    Note,
    /// Warning; compilation continues.
    Warning,
    /// Error; the step fails.
    Error,
    /// Fatal error; the compiler stopped immediately.
    Fatal,
}

impl Severity {
    /// Parse the severity word of a GCC-compatible diagnostic line.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "note" => Some(Self::Note),
            "warning" => Some(Self::Warning),
            "error" => Some(Self::Error),
            "fatal error" => Some(Self::Fatal),
            _ => None,
        }
    }

    /// Does this severity fail the step?
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error | Self::Fatal)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Note => write!(f, "note"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
            Self::Fatal => write!(f, "fatal error"),
        }
    }
}

/// One parsed compiler diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Severity of the diagnostic.
    pub severity: Severity,
    /// Source file the diagnostic points at.
    pub file: PathBuf,
    /// 1-based line, 0 when the compiler gave none.
    pub line: u32,
    /// 1-based column, 0 when the compiler gave none.
    pub column: u32,
    /// The warning flag, when the compiler names one (e.g. `-Wunused`).
    pub flag: Option<String>,
    /// Message text, verbatim.
    pub message: String,
}

impl Diagnostic {
    /// Sort key for source-file order: (file, line, column).
    #[must_use]
    pub fn location_key(&self) -> (&PathBuf, u32, u32) {
        (&self.file, self.line, self.column)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}: {}: {}",
            self.file.display(),
            self.line,
            self.column,
            self.severity,
            self.message
        )?;
        if let Some(flag) = &self.flag {
            write!(f, " [{flag}]")?;
        }
        Ok(())
    }
}
