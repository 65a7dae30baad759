//! Manifest error type.

use clyde_core::{ConstraintError, ErrorCode, VersionError};
use std::path::PathBuf;
use thiserror::Error;

/// Error produced while loading, parsing, or validating a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The document is not valid YAML or has the wrong shape.
    #[error("[E0201] manifest syntax error: {0}")]
    Syntax(#[from] serde_yaml::Error),

    /// A required key is absent.
    #[error("[E0202] manifest is missing required field '{field}'")]
    MissingField {
        /// The absent key.
        field: &'static str,
    },

    /// `type` is not `library` or `application`.
    #[error("[E0203] unknown package type '{value}' (expected 'library' or 'application')")]
    UnknownType {
        /// The rejected value.
        value: String,
    },

    /// `language` is not `c` or `cpp`.
    #[error("[E0204] unknown language '{value}' (expected 'c' or 'cpp')")]
    UnknownLanguage {
        /// The rejected value.
        value: String,
    },

    /// A requirement constraint did not parse.
    #[error("[E0205] malformed constraint for requirement '{name}': {source}")]
    MalformedConstraint {
        /// The requirement the constraint belongs to.
        name: String,
        /// The underlying parse failure.
        #[source]
        source: ConstraintError,
    },

    /// The package name does not match `(@org/)?name` with lowercase
    /// alphanumerics, `_` and `-`.
    #[error("[E0206] invalid package name '{name}'")]
    InvalidName {
        /// The rejected name.
        name: String,
    },

    /// The `version` field did not parse.
    #[error("[E0201] invalid manifest version: {0}")]
    InvalidVersion(#[from] VersionError),

    /// Neither `package.yml` nor `config.yaml` exists in the directory.
    #[error("[E0207] no manifest found in {dir}")]
    NotFound {
        /// The directory that was probed.
        dir: PathBuf,
    },

    /// Reading the manifest file failed.
    #[error("[E0207] failed to read manifest at {path}: {source}")]
    Io {
        /// The manifest path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl ManifestError {
    /// The stable error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Syntax(_) | Self::InvalidVersion(_) => ErrorCode::E0201,
            Self::MissingField { .. } => ErrorCode::E0202,
            Self::UnknownType { .. } => ErrorCode::E0203,
            Self::UnknownLanguage { .. } => ErrorCode::E0204,
            Self::MalformedConstraint { .. } => ErrorCode::E0205,
            Self::InvalidName { .. } => ErrorCode::E0206,
            Self::NotFound { .. } | Self::Io { .. } => ErrorCode::E0207,
        }
    }
}
