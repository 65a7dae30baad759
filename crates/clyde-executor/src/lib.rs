//! Build plan execution.
//!
//! The executor walks a [`clyde_planner::BuildPlan`] with a parallel worker
//! pool, consulting the object and artifact cache tiers before every
//! toolchain invocation, emitting events at every well-known point, and
//! honoring the plan's partial order: a package compiles only after its
//! dependencies have linked, and links only after its own compiles and its
//! dependencies' artifacts.

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

mod executor;
mod keys;
mod report;

pub use executor::{BuildExecutor, ExecutorConfig};
pub use keys::{accurate_object_key, object_lookup_key};
pub use report::{BuildArtifact, BuildError, BuildReport, FailureKind, StepFailure};
