//! Semantic version handling.
//!
//! Versions are a `major.minor.patch` triple with optional pre-release
//! identifiers and build metadata:
//!
//! - `1.2.3`
//! - `1.0.0-alpha`, `1.0.0-beta.2`, `1.0.0-rc.1`
//! - `2.1.0+build.5`
//!
//! Ordering follows semantic-version precedence: pre-release versions sort
//! below their release counterpart, numeric identifiers compare numerically
//! and below string identifiers. Build metadata never affects precedence; it
//! participates only as a final disambiguator so that the total order stays
//! consistent with equality.
//!
//! Parsing normalizes leading zeros in numeric components (`1.02.3` parses
//! as `1.2.3`); everything else round-trips through `Display` unchanged.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error produced when a version string does not parse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    /// The input was empty or all whitespace.
    #[error("empty version string")]
    Empty,
    /// A `major.minor.patch` component was absent.
    #[error("version '{input}' is missing its {component} component")]
    MissingComponent {
        /// Which component was missing.
        component: &'static str,
        /// The offending input.
        input: String,
    },
    /// A numeric component did not parse as a non-negative integer.
    #[error("version '{input}' has an invalid {component} component")]
    InvalidComponent {
        /// Which component was invalid.
        component: &'static str,
        /// The offending input.
        input: String,
    },
    /// More than three dotted numeric components.
    #[error("version '{input}' has more than three numeric components")]
    TooManyComponents {
        /// The offending input.
        input: String,
    },
    /// A pre-release or build identifier was empty.
    #[error("version '{input}' contains an empty identifier")]
    EmptyIdentifier {
        /// The offending input.
        input: String,
    },
    /// A pre-release identifier contained characters outside `[0-9A-Za-z-]`.
    #[error("version '{input}' contains an invalid identifier '{identifier}'")]
    InvalidIdentifier {
        /// The offending input.
        input: String,
        /// The identifier that failed.
        identifier: String,
    },
}

/// One dot-separated pre-release identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PreReleaseId {
    /// All-digit identifier, compared numerically.
    Numeric(u64),
    /// Alphanumeric identifier, compared lexicographically.
    Text(String),
}

impl PartialOrd for PreReleaseId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PreReleaseId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Numeric(a), Self::Numeric(b)) => a.cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            // Numeric identifiers have lower precedence than string identifiers
            (Self::Numeric(_), Self::Text(_)) => Ordering::Less,
            (Self::Text(_), Self::Numeric(_)) => Ordering::Greater,
        }
    }
}

impl fmt::Display for PreReleaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

/// A parsed semantic version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version {
    /// Major version component.
    pub major: u64,
    /// Minor version component.
    pub minor: u64,
    /// Patch version component.
    pub patch: u64,
    /// Pre-release identifiers (empty for release versions).
    pub pre_release: SmallVec<[PreReleaseId; 2]>,
    /// Build metadata (ignored by precedence).
    pub build_metadata: Option<String>,
}

impl Version {
    /// Create a release version with no pre-release or build metadata.
    #[must_use]
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            pre_release: SmallVec::new(),
            build_metadata: None,
        }
    }

    /// Parse a version string.
    ///
    /// # Errors
    /// Returns a [`VersionError`] describing the first syntactic problem.
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let s = input.trim();
        if s.is_empty() {
            return Err(VersionError::Empty);
        }

        let (s, build_metadata) = match s.split_once('+') {
            Some((head, build)) => {
                if build.is_empty() {
                    return Err(VersionError::EmptyIdentifier {
                        input: input.to_string(),
                    });
                }
                (head, Some(build.to_string()))
            }
            None => (s, None),
        };

        let (core, pre) = match s.split_once('-') {
            Some((head, pre)) => (head, Some(pre)),
            None => (s, None),
        };

        let mut components = core.split('.');
        let major = Self::component(components.next(), "major", input)?;
        let minor = Self::component(components.next(), "minor", input)?;
        let patch = Self::component(components.next(), "patch", input)?;
        if components.next().is_some() {
            return Err(VersionError::TooManyComponents {
                input: input.to_string(),
            });
        }

        let mut pre_release = SmallVec::new();
        if let Some(pre) = pre {
            if pre.is_empty() {
                return Err(VersionError::EmptyIdentifier {
                    input: input.to_string(),
                });
            }
            for id in pre.split('.') {
                pre_release.push(Self::identifier(id, input)?);
            }
        }

        Ok(Self {
            major,
            minor,
            patch,
            pre_release,
            build_metadata,
        })
    }

    /// Is this a pre-release version?
    #[must_use]
    pub fn is_pre_release(&self) -> bool {
        !self.pre_release.is_empty()
    }

    /// The `(major, minor, patch)` triple.
    #[must_use]
    pub fn triple(&self) -> (u64, u64, u64) {
        (self.major, self.minor, self.patch)
    }

    /// Precedence comparison: build metadata is ignored entirely.
    #[must_use]
    pub fn cmp_precedence(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then_with(|| self.minor.cmp(&other.minor))
            .then_with(|| self.patch.cmp(&other.patch))
            .then_with(|| cmp_pre_release(&self.pre_release, &other.pre_release))
    }

    /// Precedence equality: same triple and pre-release, build metadata ignored.
    #[must_use]
    pub fn eq_precedence(&self, other: &Self) -> bool {
        self.cmp_precedence(other) == Ordering::Equal
    }

    fn component(
        text: Option<&str>,
        component: &'static str,
        input: &str,
    ) -> Result<u64, VersionError> {
        let text = text.filter(|t| !t.is_empty()).ok_or(VersionError::MissingComponent {
            component,
            input: input.to_string(),
        })?;
        if !text.chars().all(|c| c.is_ascii_digit()) {
            return Err(VersionError::InvalidComponent {
                component,
                input: input.to_string(),
            });
        }
        text.parse().map_err(|_| VersionError::InvalidComponent {
            component,
            input: input.to_string(),
        })
    }

    fn identifier(id: &str, input: &str) -> Result<PreReleaseId, VersionError> {
        if id.is_empty() {
            return Err(VersionError::EmptyIdentifier {
                input: input.to_string(),
            });
        }
        if id.chars().all(|c| c.is_ascii_digit()) {
            return id
                .parse()
                .map(PreReleaseId::Numeric)
                .map_err(|_| VersionError::InvalidIdentifier {
                    input: input.to_string(),
                    identifier: id.to_string(),
                });
        }
        if id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            Ok(PreReleaseId::Text(id.to_string()))
        } else {
            Err(VersionError::InvalidIdentifier {
                input: input.to_string(),
                identifier: id.to_string(),
            })
        }
    }
}

/// Semver precedence for pre-release identifier lists.
///
/// An empty list (a release) sorts above any non-empty list; otherwise
/// identifiers compare pairwise with the shorter list losing ties.
fn cmp_pre_release(a: &[PreReleaseId], b: &[PreReleaseId]) -> Ordering {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => {
            for (x, y) in a.iter().zip(b.iter()) {
                match x.cmp(y) {
                    Ordering::Equal => {}
                    other => return other,
                }
            }
            a.len().cmp(&b.len())
        }
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        // Precedence first; build metadata only disambiguates so that the
        // total order agrees with structural equality.
        self.cmp_precedence(other)
            .then_with(|| self.build_metadata.cmp(&other.build_metadata))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        for (i, id) in self.pre_release.iter().enumerate() {
            write!(f, "{}{id}", if i == 0 { '-' } else { '.' })?;
        }
        if let Some(build) = &self.build_metadata {
            write!(f, "+{build}")?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
