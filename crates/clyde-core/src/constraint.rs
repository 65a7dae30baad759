//! Version constraints and constraint intersection.
//!
//! Constraints accepted on input, one variant per surface form:
//!
//! - `=1.2.3` (a bare `1.2.3` is the same): exact
//! - `^1.2.3`: at least `1.2.3`, below the next major (next minor for `0.y.z`)
//! - `~1.2.3`: at least `1.2.3`, below the next minor
//! - `>=1.2.3`, `<2.0.0`: open bounds; written adjacently they compose to a range
//! - `local:<path>`: only the package materialized from that path
//! - `git:<ref>`: only the exact matching ref
//!
//! Pre-release versions are not admitted by caret/tilde unless the constraint
//! itself carries a pre-release tag on the same `(major, minor, patch)`.

use crate::version::{Version, VersionError};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Error produced when a constraint string does not parse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConstraintError {
    /// The input was empty or all whitespace.
    #[error("empty constraint string")]
    Empty,
    /// An embedded version failed to parse.
    #[error(transparent)]
    Version(#[from] VersionError),
    /// An operator outside the accepted grammar (`<=`, `>`, `*`, ...).
    #[error("constraint '{input}' uses an unsupported operator")]
    UnsupportedOperator {
        /// The offending input.
        input: String,
    },
    /// Adjacent bounds that do not compose to `>=lo <hi`.
    #[error("constraint '{input}' has bounds that do not compose to a range")]
    MalformedBounds {
        /// The offending input.
        input: String,
    },
    /// A composed range whose lower bound is not below its upper bound.
    #[error("range constraint '{input}' admits no versions")]
    EmptyRange {
        /// The offending input.
        input: String,
    },
}

/// A disjunction-free predicate over versions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VersionConstraint {
    /// Exactly this version.
    Exact(Version),
    /// At least the base, below the next major (next minor for `0.y.z`).
    Caret(Version),
    /// At least the base, below the next minor.
    Tilde(Version),
    /// At least this version.
    GreaterOrEqual(Version),
    /// Strictly below this version.
    LessThan(Version),
    /// `lo <= v < hi`.
    Range(Version, Version),
    /// Only the exact matching git ref (opaque to version comparison).
    GitRef(String),
    /// Only the package materialized from this filesystem location.
    LocalPath(PathBuf),
}

impl VersionConstraint {
    /// Parse a constraint string using the surface grammar above.
    ///
    /// # Errors
    /// Returns a [`ConstraintError`] describing the first problem.
    pub fn parse(input: &str) -> Result<Self, ConstraintError> {
        let s = input.trim();
        if s.is_empty() {
            return Err(ConstraintError::Empty);
        }

        if let Some(path) = s.strip_prefix("local:") {
            return Ok(Self::LocalPath(PathBuf::from(path)));
        }
        if let Some(reference) = s.strip_prefix("git:") {
            return Ok(Self::GitRef(reference.to_string()));
        }

        // Adjacent bounds (whitespace or comma separated) compose to a range.
        let tokens: Vec<&str> = s
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|t| !t.is_empty())
            .collect();
        match tokens.len() {
            1 => Self::parse_single(tokens[0], input),
            2 => Self::parse_bounds(&tokens, input),
            _ => Err(ConstraintError::MalformedBounds {
                input: input.to_string(),
            }),
        }
    }

    fn parse_single(token: &str, input: &str) -> Result<Self, ConstraintError> {
        if token.starts_with("<=") || (token.starts_with('>') && !token.starts_with(">=")) {
            return Err(ConstraintError::UnsupportedOperator {
                input: input.to_string(),
            });
        }
        if let Some(rest) = token.strip_prefix(">=") {
            return Ok(Self::GreaterOrEqual(Version::parse(rest)?));
        }
        if let Some(rest) = token.strip_prefix('<') {
            return Ok(Self::LessThan(Version::parse(rest)?));
        }
        if let Some(rest) = token.strip_prefix('=') {
            return Ok(Self::Exact(Version::parse(rest)?));
        }
        if let Some(rest) = token.strip_prefix('^') {
            return Ok(Self::Caret(Version::parse(rest)?));
        }
        if let Some(rest) = token.strip_prefix('~') {
            return Ok(Self::Tilde(Version::parse(rest)?));
        }
        // Bare version is an exact match.
        Ok(Self::Exact(Version::parse(token)?))
    }

    fn parse_bounds(tokens: &[&str], input: &str) -> Result<Self, ConstraintError> {
        let mut lower = None;
        let mut upper = None;
        for &token in tokens {
            match Self::parse_single(token, input)? {
                Self::GreaterOrEqual(v) if lower.is_none() => lower = Some(v),
                Self::LessThan(v) if upper.is_none() => upper = Some(v),
                _ => {
                    return Err(ConstraintError::MalformedBounds {
                        input: input.to_string(),
                    });
                }
            }
        }
        match (lower, upper) {
            (Some(lo), Some(hi)) if lo.cmp_precedence(&hi).is_lt() => Ok(Self::Range(lo, hi)),
            (Some(_), Some(_)) => Err(ConstraintError::EmptyRange {
                input: input.to_string(),
            }),
            _ => Err(ConstraintError::MalformedBounds {
                input: input.to_string(),
            }),
        }
    }

    /// Does this constraint admit the given version?
    ///
    /// `GitRef` and `LocalPath` pin a source, not a version number; they admit
    /// whatever version the pinned source declares.
    #[must_use]
    pub fn admits(&self, version: &Version) -> bool {
        match self {
            Self::Exact(v) => version.eq_precedence(v),
            Self::Caret(base) => Self::admits_bounded(base, &caret_ceiling(base), version),
            Self::Tilde(base) => Self::admits_bounded(base, &tilde_ceiling(base), version),
            Self::GreaterOrEqual(v) => version.cmp_precedence(v).is_ge(),
            Self::LessThan(v) => version.cmp_precedence(v).is_lt(),
            Self::Range(lo, hi) => {
                version.cmp_precedence(lo).is_ge() && version.cmp_precedence(hi).is_lt()
            }
            Self::GitRef(_) | Self::LocalPath(_) => true,
        }
    }

    /// Caret/tilde admission with the pre-release rule: a pre-release version
    /// is admitted only when the base itself is a pre-release on the same
    /// triple.
    fn admits_bounded(base: &Version, ceiling: &Version, version: &Version) -> bool {
        if version.is_pre_release() {
            return base.is_pre_release()
                && base.triple() == version.triple()
                && version.cmp_precedence(base).is_ge();
        }
        version.cmp_precedence(base).is_ge() && version.cmp_precedence(ceiling).is_lt()
    }

    /// Does this constraint pin a non-registry source (`git:`/`local:`)?
    #[must_use]
    pub fn is_source_pin(&self) -> bool {
        matches!(self, Self::GitRef(_) | Self::LocalPath(_))
    }

    /// Lower/upper interval bounds for the version-shaped variants.
    /// `None` for source pins; the upper bound is exclusive.
    fn interval(&self) -> Option<(Version, Option<Version>)> {
        match self {
            Self::Exact(_) | Self::GitRef(_) | Self::LocalPath(_) => None,
            Self::Caret(base) => Some((base.clone(), Some(caret_ceiling(base)))),
            Self::Tilde(base) => Some((base.clone(), Some(tilde_ceiling(base)))),
            Self::GreaterOrEqual(v) => Some((v.clone(), None)),
            Self::LessThan(v) => Some((Version::new(0, 0, 0), Some(v.clone()))),
            Self::Range(lo, hi) => Some((lo.clone(), Some(hi.clone()))),
        }
    }
}

fn caret_ceiling(base: &Version) -> Version {
    if base.major > 0 {
        Version::new(base.major + 1, 0, 0)
    } else {
        Version::new(0, base.minor + 1, 0)
    }
}

fn tilde_ceiling(base: &Version) -> Version {
    Version::new(base.major, base.minor + 1, 0)
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(v) => write!(f, "={v}"),
            Self::Caret(v) => write!(f, "^{v}"),
            Self::Tilde(v) => write!(f, "~{v}"),
            Self::GreaterOrEqual(v) => write!(f, ">={v}"),
            Self::LessThan(v) => write!(f, "<{v}"),
            Self::Range(lo, hi) => write!(f, ">={lo} <{hi}"),
            Self::GitRef(r) => write!(f, "git:{r}"),
            Self::LocalPath(p) => write!(f, "local:{}", p.display()),
        }
    }
}

impl FromStr for VersionConstraint {
    type Err = ConstraintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for VersionConstraint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for VersionConstraint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// The outcome of intersecting a set of constraints on one package name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intersection {
    /// A single constraint equivalent to the conjunction.
    Narrowed(VersionConstraint),
    /// The admitted sets are disjoint.
    Unsatisfiable,
}

/// Intersect constraints accumulated for a single package name.
///
/// Source pins (`git:`/`local:`) intersect only with identical pins. An exact
/// constraint survives only if every other constraint admits its version.
/// Interval-shaped constraints narrow by bounds; the narrowed form is a
/// `Range` (or an open bound when unbounded above).
#[must_use]
pub fn intersect(constraints: &[VersionConstraint]) -> Intersection {
    let Some(first) = constraints.first() else {
        return Intersection::Narrowed(VersionConstraint::GreaterOrEqual(Version::new(0, 0, 0)));
    };
    if constraints.len() == 1 {
        return Intersection::Narrowed(first.clone());
    }

    // Source pins must all be the same pin.
    if let Some(pin) = constraints.iter().find(|c| c.is_source_pin()) {
        return if constraints.iter().all(|c| c == pin) {
            Intersection::Narrowed(pin.clone())
        } else {
            Intersection::Unsatisfiable
        };
    }

    // An exact pin wins if everything else admits it.
    if let Some(VersionConstraint::Exact(pinned)) = constraints
        .iter()
        .find(|c| matches!(c, VersionConstraint::Exact(_)))
    {
        return if constraints.iter().all(|c| c.admits(pinned)) {
            Intersection::Narrowed(VersionConstraint::Exact(pinned.clone()))
        } else {
            Intersection::Unsatisfiable
        };
    }

    let mut lower = Version::new(0, 0, 0);
    let mut upper: Option<Version> = None;
    for constraint in constraints {
        let Some((lo, hi)) = constraint.interval() else {
            continue;
        };
        if lo.cmp_precedence(&lower).is_gt() {
            lower = lo;
        }
        if let Some(hi) = hi {
            match &upper {
                Some(current) if hi.cmp_precedence(current).is_ge() => {}
                _ => upper = Some(hi),
            }
        }
    }

    match upper {
        Some(hi) if lower.cmp_precedence(&hi).is_ge() => Intersection::Unsatisfiable,
        Some(hi) => Intersection::Narrowed(VersionConstraint::Range(lower, hi)),
        None => Intersection::Narrowed(VersionConstraint::GreaterOrEqual(lower)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn c(s: &str) -> VersionConstraint {
        VersionConstraint::parse(s).unwrap()
    }

    #[test]
    fn parse_variants() {
        assert_eq!(c("=1.2.3"), VersionConstraint::Exact(v("1.2.3")));
        assert_eq!(c("1.2.3"), VersionConstraint::Exact(v("1.2.3")));
        assert_eq!(c("^1.2.3"), VersionConstraint::Caret(v("1.2.3")));
        assert_eq!(c("~1.2.3"), VersionConstraint::Tilde(v("1.2.3")));
        assert_eq!(c(">=1.2.3"), VersionConstraint::GreaterOrEqual(v("1.2.3")));
        assert_eq!(c("<2.0.0"), VersionConstraint::LessThan(v("2.0.0")));
        assert_eq!(
            c(">=1.2.3 <2.0.0"),
            VersionConstraint::Range(v("1.2.3"), v("2.0.0"))
        );
        assert_eq!(
            c("<2.0.0, >=1.2.3"),
            VersionConstraint::Range(v("1.2.3"), v("2.0.0"))
        );
        assert_eq!(
            c("git:v1.2-branch"),
            VersionConstraint::GitRef("v1.2-branch".to_string())
        );
        assert_eq!(
            c("local:../libfoo"),
            VersionConstraint::LocalPath(PathBuf::from("../libfoo"))
        );
    }

    #[test_case("<=1.0.0" ; "less or equal")]
    #[test_case(">1.0.0" ; "strictly greater")]
    #[test_case("" ; "empty")]
    #[test_case(">=1.0.0 >=2.0.0" ; "two lower bounds")]
    #[test_case(">=2.0.0 <1.0.0" ; "inverted range")]
    #[test_case(">=1.0.0 <2.0.0 <3.0.0" ; "three bounds")]
    fn parse_rejects(input: &str) {
        assert!(VersionConstraint::parse(input).is_err());
    }

    #[test_case("=1.2.3", "1.2.3", true ; "exact match")]
    #[test_case("=1.2.3", "1.2.4", false ; "exact mismatch")]
    #[test_case("^1.2.3", "1.2.3", true ; "caret lower bound")]
    #[test_case("^1.2.3", "1.9.9", true ; "caret higher minor")]
    #[test_case("^1.2.3", "2.0.0", false ; "caret next major")]
    #[test_case("^1.2.3", "1.2.2", false ; "caret below base")]
    #[test_case("^0.3.1", "0.3.5", true ; "caret zero major within minor")]
    #[test_case("^0.3.1", "0.4.0", false ; "caret zero major next minor")]
    #[test_case("~1.2.3", "1.2.9", true ; "tilde higher patch")]
    #[test_case("~1.2.3", "1.3.0", false ; "tilde next minor")]
    #[test_case(">=1.0.0", "0.9.9", false ; "gte below")]
    #[test_case(">=1.0.0", "4.0.0", true ; "gte above")]
    #[test_case("<2.0.0", "1.9.9", true ; "lt below")]
    #[test_case("<2.0.0", "2.0.0", false ; "lt at bound")]
    #[test_case(">=1.0.0 <2.0.0", "1.5.0", true ; "range inside")]
    #[test_case(">=1.0.0 <2.0.0", "2.0.0", false ; "range at upper")]
    fn admission(constraint: &str, version: &str, expected: bool) {
        assert_eq!(c(constraint).admits(&v(version)), expected);
    }

    #[test]
    fn pre_release_not_admitted_by_caret() {
        assert!(!c("^1.2.0").admits(&v("1.3.0-alpha")));
        assert!(!c("~1.2.0").admits(&v("1.2.5-rc.1")));
    }

    #[test]
    fn pre_release_admitted_with_matching_tag() {
        let caret = c("^1.2.0-alpha");
        assert!(caret.admits(&v("1.2.0-alpha")));
        assert!(caret.admits(&v("1.2.0-beta")));
        // Different triple: still excluded.
        assert!(!caret.admits(&v("1.3.0-alpha")));
        // Below the base pre-release: excluded.
        assert!(!caret.admits(&v("1.2.0-aaa")));
        // The release itself is admitted normally.
        assert!(caret.admits(&v("1.2.0")));
    }

    #[test]
    fn exact_admits_pre_release() {
        assert!(c("=1.0.0-rc.1").admits(&v("1.0.0-rc.1")));
        assert!(!c("=1.0.0-rc.1").admits(&v("1.0.0")));
    }

    #[test]
    fn display_round_trip() {
        for text in [
            "=1.2.3",
            "^1.2.3",
            "~0.4.0",
            ">=1.0.0",
            "<2.0.0",
            ">=1.0.0 <2.0.0",
            "git:main",
            "local:vendor/libx",
        ] {
            assert_eq!(c(text).to_string(), text);
        }
    }

    #[test]
    fn intersect_carets() {
        let narrowed = intersect(&[c("^1.2.0"), c("^1.4.0")]);
        assert_eq!(
            narrowed,
            Intersection::Narrowed(VersionConstraint::Range(v("1.4.0"), v("2.0.0")))
        );
    }

    #[test]
    fn intersect_disjoint_exacts() {
        assert_eq!(
            intersect(&[c("=1.0.0"), c("=2.0.0")]),
            Intersection::Unsatisfiable
        );
    }

    #[test]
    fn intersect_exact_inside_caret() {
        assert_eq!(
            intersect(&[c("^1.0.0"), c("=1.5.0")]),
            Intersection::Narrowed(VersionConstraint::Exact(v("1.5.0")))
        );
    }

    #[test]
    fn intersect_exact_outside_range() {
        assert_eq!(
            intersect(&[c(">=2.0.0"), c("=1.5.0")]),
            Intersection::Unsatisfiable
        );
    }

    #[test]
    fn intersect_disjoint_majors() {
        assert_eq!(intersect(&[c("^1.0.0"), c("^2.0.0")]), Intersection::Unsatisfiable);
    }

    #[test]
    fn intersect_bounds_compose() {
        assert_eq!(
            intersect(&[c(">=1.2.0"), c("<1.9.0")]),
            Intersection::Narrowed(VersionConstraint::Range(v("1.2.0"), v("1.9.0")))
        );
    }

    #[test]
    fn intersect_open_above() {
        assert_eq!(
            intersect(&[c(">=1.2.0"), c(">=2.0.0")]),
            Intersection::Narrowed(VersionConstraint::GreaterOrEqual(v("2.0.0")))
        );
    }

    #[test]
    fn intersect_identical_git_refs() {
        assert_eq!(
            intersect(&[c("git:main"), c("git:main")]),
            Intersection::Narrowed(VersionConstraint::GitRef("main".to_string()))
        );
        assert_eq!(
            intersect(&[c("git:main"), c("git:dev")]),
            Intersection::Unsatisfiable
        );
    }

    #[test]
    fn intersect_pin_with_version_constraint() {
        assert_eq!(
            intersect(&[c("git:main"), c("^1.0.0")]),
            Intersection::Unsatisfiable
        );
    }

    #[test]
    fn intersect_single_preserves_variant() {
        assert_matches!(
            intersect(&[c("^1.2.0")]),
            Intersection::Narrowed(VersionConstraint::Caret(_))
        );
    }
}
