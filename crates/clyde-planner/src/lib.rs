//! Build planning.
//!
//! Turns a resolved dependency graph into a topologically ordered plan of
//! compile and link steps, with output locations assigned beneath
//! `<root>/.build/` and conservative object cache keys precomputed.

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

mod plan;
mod sources;
mod steps;

pub use plan::plan;
pub use sources::expand_braces;
pub use steps::{BuildPlan, CompileStep, LinkStep, PackageLayout, PlanError, PlanWarning};
