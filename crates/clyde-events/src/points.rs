//! The stable hook point taxonomy.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Pipeline phase a hook point belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Dependency resolution.
    Resolution,
    /// Build planning.
    Planning,
    /// Plan execution.
    Execution,
}

/// Well-known points at which events are emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HookPoint {
    /// Before resolution starts.
    PreResolution,
    /// A requirement was first seen.
    PackageDiscovered,
    /// A concrete version was chosen for a name.
    VersionSelected,
    /// A package's sources were materialized.
    PackageFetched,
    /// After resolution completes.
    PostResolution,
    /// Before planning starts.
    PrePlan,
    /// The topological build order is fixed.
    BuildOrderComputed,
    /// After planning completes.
    PostPlan,
    /// Before the first step runs.
    PreBuild,
    /// Before one compile step.
    PreCompile,
    /// After one compile step.
    PostCompile,
    /// Before one link step.
    PreLink,
    /// After one link step.
    PostLink,
    /// After the build finishes, with the summary.
    PostBuild,
}

impl HookPoint {
    /// The point name as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PreResolution => "pre-resolution",
            Self::PackageDiscovered => "package-discovered",
            Self::VersionSelected => "version-selected",
            Self::PackageFetched => "package-fetched",
            Self::PostResolution => "post-resolution",
            Self::PrePlan => "pre-plan",
            Self::BuildOrderComputed => "build-order-computed",
            Self::PostPlan => "post-plan",
            Self::PreBuild => "pre-build",
            Self::PreCompile => "pre-compile",
            Self::PostCompile => "post-compile",
            Self::PreLink => "pre-link",
            Self::PostLink => "post-link",
            Self::PostBuild => "post-build",
        }
    }

    /// Parse a point from its string name.
    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pre-resolution" => Some(Self::PreResolution),
            "package-discovered" => Some(Self::PackageDiscovered),
            "version-selected" => Some(Self::VersionSelected),
            "package-fetched" => Some(Self::PackageFetched),
            "post-resolution" => Some(Self::PostResolution),
            "pre-plan" => Some(Self::PrePlan),
            "build-order-computed" => Some(Self::BuildOrderComputed),
            "post-plan" => Some(Self::PostPlan),
            "pre-build" => Some(Self::PreBuild),
            "pre-compile" => Some(Self::PreCompile),
            "post-compile" => Some(Self::PostCompile),
            "pre-link" => Some(Self::PreLink),
            "post-link" => Some(Self::PostLink),
            "post-build" => Some(Self::PostBuild),
            _ => None,
        }
    }

    /// The phase this point belongs to.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        match self {
            Self::PreResolution
            | Self::PackageDiscovered
            | Self::VersionSelected
            | Self::PackageFetched
            | Self::PostResolution => Phase::Resolution,
            Self::PrePlan | Self::BuildOrderComputed | Self::PostPlan => Phase::Planning,
            Self::PreBuild
            | Self::PreCompile
            | Self::PostCompile
            | Self::PreLink
            | Self::PostLink
            | Self::PostBuild => Phase::Execution,
        }
    }

    /// The matching post point for a pre point, and vice versa.
    #[must_use]
    pub const fn counterpart(&self) -> Option<Self> {
        match self {
            Self::PreResolution => Some(Self::PostResolution),
            Self::PostResolution => Some(Self::PreResolution),
            Self::PrePlan => Some(Self::PostPlan),
            Self::PostPlan => Some(Self::PrePlan),
            Self::PreBuild => Some(Self::PostBuild),
            Self::PostBuild => Some(Self::PreBuild),
            Self::PreCompile => Some(Self::PostCompile),
            Self::PostCompile => Some(Self::PreCompile),
            Self::PreLink => Some(Self::PostLink),
            Self::PostLink => Some(Self::PreLink),
            _ => None,
        }
    }

    /// All points, in pipeline order.
    #[must_use]
    pub fn all() -> Vec<Self> {
        vec![
            Self::PreResolution,
            Self::PackageDiscovered,
            Self::VersionSelected,
            Self::PackageFetched,
            Self::PostResolution,
            Self::PrePlan,
            Self::BuildOrderComputed,
            Self::PostPlan,
            Self::PreBuild,
            Self::PreCompile,
            Self::PostCompile,
            Self::PreLink,
            Self::PostLink,
            Self::PostBuild,
        ]
    }
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
