//! Core types for the Clyde package manager.
//!
//! This crate provides the foundational types used throughout Clyde:
//! - Semantic versions and their total order
//! - Version constraints and constraint intersection
//! - Structured compiler diagnostics
//! - Error codes shared by every component

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod compiler;
pub mod constraint;
pub mod diagnostic;
pub mod error;
pub mod version;

pub use compiler::{CompilerFamily, CompilerInfo};
pub use constraint::{ConstraintError, Intersection, VersionConstraint, intersect};
pub use diagnostic::{Diagnostic, Severity};
pub use error::ErrorCode;
pub use version::{PreReleaseId, Version, VersionError};
