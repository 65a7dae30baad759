//! Dependency resolution.
//!
//! Transforms a root package into a fully materialized dependency graph by
//! intersecting version constraints, selecting concrete versions from the
//! registry, fetching sources into the package store, and recursing into
//! dependency manifests. Cycles and conflicts are fatal; every error carries
//! the requirement chain from the root.

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

mod graph;
mod package;
mod resolver;

pub use graph::{DependencyGraph, PackageId};
pub use package::{Package, PackageKey, PackageOrigin};
pub use resolver::{ConflictSource, ResolveError, ResolverStats, resolve, resolve_with_stats};
