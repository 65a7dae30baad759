//! Build outcomes.

use clyde_cache::CacheStatsSnapshot;
use clyde_core::{Diagnostic, ErrorCode};
use clyde_events::{BuildSummary, HookError, StepId};
use clyde_resolver::PackageKey;
use clyde_toolchain::ToolchainError;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal executor error. Step failures are not errors; they are recorded in
/// the [`BuildReport`].
#[derive(Debug, Error)]
pub enum BuildError {
    /// The toolchain itself is unusable (probe failed, executable missing,
    /// child killed by signal).
    #[error(transparent)]
    Toolchain(#[from] ToolchainError),

    /// A critical hook subscriber failed.
    #[error(transparent)]
    Hook(#[from] HookError),
}

impl BuildError {
    /// The stable error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Toolchain(e) => e.code(),
            Self::Hook(_) => ErrorCode::E0705,
        }
    }
}

/// Why a step failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The compiler reported errors.
    Compile,
    /// The linker reported errors.
    Link,
    /// The configured per-step timeout elapsed; the child was terminated.
    Timeout,
}

impl FailureKind {
    /// The stable error code for this failure.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Compile => ErrorCode::E0701,
            Self::Link => ErrorCode::E0702,
            Self::Timeout => ErrorCode::E0703,
        }
    }
}

/// One failed step with its evidence.
#[derive(Debug, Clone)]
pub struct StepFailure {
    /// The failing step.
    pub step: StepId,
    /// Owning package.
    pub package: PackageKey,
    /// Failure classification.
    pub kind: FailureKind,
    /// Structured diagnostics (compile failures).
    pub diagnostics: Vec<Diagnostic>,
    /// Raw tool output (link failures, captured as-is).
    pub output: String,
}

/// A produced artifact, carrying references to its dependency artifacts.
#[derive(Debug, Clone)]
pub struct BuildArtifact {
    /// Owning package.
    pub package: PackageKey,
    /// The artifact on disk: a static archive or an executable.
    pub path: PathBuf,
    /// Public include directories exported alongside a library.
    pub include_dirs: Vec<PathBuf>,
    /// Direct dependency packages whose artifacts this one links.
    pub dependencies: Vec<PackageKey>,
}

/// Aggregate result of one executed plan.
#[derive(Debug)]
pub struct BuildReport {
    /// The summary also carried by the final `PostBuild` event.
    pub summary: BuildSummary,
    /// Artifacts produced (or restored from cache), in completion order.
    pub artifacts: Vec<BuildArtifact>,
    /// Failed steps with evidence.
    pub failures: Vec<StepFailure>,
    /// Cache counters at the end of the build.
    pub cache: CacheStatsSnapshot,
}

impl BuildReport {
    /// Did every scheduled step succeed?
    #[must_use]
    pub fn success(&self) -> bool {
        self.summary.success
    }

    /// Process exit code: 0 success, 3 build failure, 1 cancelled.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        if self.summary.success {
            0
        } else if self.summary.cancelled {
            ErrorCode::E0704.exit_code()
        } else {
            ErrorCode::E0701.exit_code()
        }
    }

    /// The artifact of one package, if it was produced.
    #[must_use]
    pub fn artifact_of(&self, name: &str) -> Option<&BuildArtifact> {
        self.artifacts.iter().find(|a| a.package.name == name)
    }
}
