//! Typed event payloads.
//!
//! Events are immutable from the subscriber's perspective. Steps are
//! identified by a monotonic [`StepId`] assigned at plan time; subscribers
//! that correlate `Pre`/`Post` pairs key on the id, never on file paths.

use crate::points::HookPoint;
use clyde_core::{Diagnostic, Version, VersionConstraint};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Monotonic identity of one plan step, stable for the lifetime of a build.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct StepId(pub u64);

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How a single executed step went.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOutcome {
    /// Did the step succeed?
    pub success: bool,
    /// Was the result served from the cache without a toolchain invocation?
    pub cache_hit: bool,
    /// Wall time of the step (zero for cache hits).
    pub duration: Duration,
}

/// Aggregate result of a build, carried by [`BuildEvent::PostBuild`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSummary {
    /// Did every scheduled step succeed?
    pub success: bool,
    /// Compile steps that actually ran (cache hits included).
    pub compile_steps_run: usize,
    /// Link steps that actually ran (cache hits included).
    pub link_steps_run: usize,
    /// Object-tier cache hits.
    pub object_cache_hits: usize,
    /// Artifact-tier cache hits.
    pub artifact_cache_hits: usize,
    /// Steps that failed.
    pub failed_steps: Vec<StepId>,
    /// Steps skipped because a dependency failed or the build was cancelled.
    pub skipped_steps: Vec<StepId>,
    /// Was the build cancelled?
    pub cancelled: bool,
    /// Total wall time.
    pub duration: Duration,
}

/// One event on the build stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BuildEvent {
    /// Resolution is about to start from the root manifest.
    PreResolution {
        /// Root package name.
        root: String,
        /// Root package version.
        version: Version,
    },
    /// A requirement for `name` was seen for the first time.
    PackageDiscovered {
        /// Required package name.
        name: String,
        /// The constraint that introduced it.
        constraint: VersionConstraint,
        /// Name of the package whose manifest required it.
        origin: String,
    },
    /// A concrete version was selected for `name`.
    VersionSelected {
        /// Package name.
        name: String,
        /// The chosen version.
        version: Version,
    },
    /// A package's sources were materialized into the package store.
    PackageFetched {
        /// Package name.
        name: String,
        /// Fetched version.
        version: Version,
    },
    /// Resolution finished.
    PostResolution {
        /// Number of packages in the graph (root included).
        packages: usize,
        /// Resolution wall time.
        duration: Duration,
    },
    /// Planning is about to start.
    PrePlan {
        /// Number of packages to plan.
        packages: usize,
    },
    /// The topological order is fixed.
    BuildOrderComputed {
        /// Total compile steps in the plan.
        compile_steps: usize,
        /// Total link steps in the plan.
        link_steps: usize,
    },
    /// Planning finished.
    PostPlan {
        /// Planning wall time.
        duration: Duration,
    },
    /// Execution is about to start.
    PreBuild {
        /// Compile steps scheduled.
        compile_steps: usize,
        /// Link steps scheduled.
        link_steps: usize,
        /// Worker pool size.
        parallelism: usize,
    },
    /// One compile step is about to run.
    PreCompile {
        /// Step identity.
        step: StepId,
        /// Owning package name.
        package: String,
        /// The source file being compiled.
        source: PathBuf,
    },
    /// One compile step finished.
    PostCompile {
        /// Step identity.
        step: StepId,
        /// Owning package name.
        package: String,
        /// Result of the step.
        outcome: StepOutcome,
        /// Parsed diagnostics in source-location order.
        diagnostics: Vec<Diagnostic>,
    },
    /// One link step is about to run.
    PreLink {
        /// Step identity.
        step: StepId,
        /// Owning package name.
        package: String,
    },
    /// One link step finished.
    PostLink {
        /// Step identity.
        step: StepId,
        /// Owning package name.
        package: String,
        /// Result of the step.
        outcome: StepOutcome,
    },
    /// The build is done.
    PostBuild {
        /// Aggregate summary.
        summary: BuildSummary,
    },
}

impl BuildEvent {
    /// The hook point this event is emitted at.
    #[must_use]
    pub const fn point(&self) -> HookPoint {
        match self {
            Self::PreResolution { .. } => HookPoint::PreResolution,
            Self::PackageDiscovered { .. } => HookPoint::PackageDiscovered,
            Self::VersionSelected { .. } => HookPoint::VersionSelected,
            Self::PackageFetched { .. } => HookPoint::PackageFetched,
            Self::PostResolution { .. } => HookPoint::PostResolution,
            Self::PrePlan { .. } => HookPoint::PrePlan,
            Self::BuildOrderComputed { .. } => HookPoint::BuildOrderComputed,
            Self::PostPlan { .. } => HookPoint::PostPlan,
            Self::PreBuild { .. } => HookPoint::PreBuild,
            Self::PreCompile { .. } => HookPoint::PreCompile,
            Self::PostCompile { .. } => HookPoint::PostCompile,
            Self::PreLink { .. } => HookPoint::PreLink,
            Self::PostLink { .. } => HookPoint::PostLink,
            Self::PostBuild { .. } => HookPoint::PostBuild,
        }
    }

    /// The step this event belongs to, for step-scoped events.
    #[must_use]
    pub const fn step(&self) -> Option<StepId> {
        match self {
            Self::PreCompile { step, .. }
            | Self::PostCompile { step, .. }
            | Self::PreLink { step, .. }
            | Self::PostLink { step, .. } => Some(*step),
            _ => None,
        }
    }
}
