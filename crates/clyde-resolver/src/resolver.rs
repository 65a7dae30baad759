//! The worklist resolver.
//!
//! Resolution maintains a FIFO worklist of requirements and a map of chosen
//! versions per name. Constraints on a name accumulate and intersect; a
//! disjoint reappearance is reported as a conflict with both origins rather
//! than backtracked, since manifest-level pinning is expected to eliminate
//! ambiguity. Given a fixed registry snapshot the algorithm is fully
//! deterministic: requirements are processed in manifest order, breadth
//! first, and candidate versions are ranked by a total order.

use crate::graph::{DependencyGraph, PackageId};
use crate::package::{Package, PackageKey, PackageOrigin};
use clyde_core::{ErrorCode, Intersection, Version, VersionConstraint, intersect};
use clyde_events::{BuildEvent, HookBus, HookError};
use clyde_manifest::{Manifest, ManifestError, PackageRequirement};
use clyde_registry::{PackageStore, Registry, RegistryError};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

/// One origin of a constraint involved in a conflict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictSource {
    /// The constraint as written in the origin manifest.
    pub constraint: VersionConstraint,
    /// Name of the package whose manifest carries the constraint.
    pub origin: String,
    /// Requirement chain from the root to the origin, inclusive.
    pub chain: Vec<String>,
}

/// Fatal resolution error, carrying the requirement chain from the root.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// No registry version satisfies the intersected constraint.
    #[error(
        "[E0301] no version of '{name}' satisfies '{constraint}' (required via {})",
        .chain.join(" > ")
    )]
    NoCompatibleVersion {
        /// Package name.
        name: String,
        /// Display form of the intersected constraint.
        constraint: String,
        /// Versions the registry offered.
        candidates: Vec<Version>,
        /// Requirement chain from the root.
        chain: Vec<String>,
    },

    /// Two or more constraints on one name admit no common version.
    #[error(
        "[E0302] conflicting requirements for '{name}': {}",
        .sources
            .iter()
            .map(|s| format!("'{}' required by {}", s.constraint, s.origin))
            .collect::<Vec<_>>()
            .join("; ")
    )]
    VersionConflict {
        /// Package name.
        name: String,
        /// Every recorded constraint with its origin and chain.
        sources: Vec<ConflictSource>,
    },

    /// The requirement closure contains a cycle.
    #[error("[E0303] circular dependency: {}", .path.join(" -> "))]
    CircularDependency {
        /// Requirement path visiting each cycle vertex once, closing on the
        /// repeated package.
        path: Vec<String>,
    },

    /// The registry or package store failed to produce sources.
    #[error("[E0304] failed to fetch '{name}' (required via {}): {source}", .chain.join(" > "))]
    FetchFailed {
        /// Package name.
        name: String,
        /// Requirement chain from the root.
        chain: Vec<String>,
        /// Underlying registry or store failure.
        #[source]
        source: RegistryError,
    },

    /// A dependency's manifest failed to parse or validate.
    #[error("[E0304] invalid manifest for '{name}' (required via {}): {source}", .chain.join(" > "))]
    Manifest {
        /// Package name.
        name: String,
        /// Requirement chain from the root.
        chain: Vec<String>,
        /// Underlying manifest failure.
        #[source]
        source: ManifestError,
    },

    /// A materialized package declares a different name than it was
    /// required as.
    #[error("[E0304] package at {root} declares name '{found}' but was required as '{expected}'")]
    NameMismatch {
        /// The name the requirement used.
        expected: String,
        /// The name the manifest declares.
        found: String,
        /// The materialized package root.
        root: PathBuf,
    },

    /// A critical hook subscriber failed.
    #[error(transparent)]
    Hook(#[from] HookError),
}

impl ResolveError {
    /// The stable error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NoCompatibleVersion { .. } => ErrorCode::E0301,
            Self::VersionConflict { .. } => ErrorCode::E0302,
            Self::CircularDependency { .. } => ErrorCode::E0303,
            Self::FetchFailed { .. } | Self::NameMismatch { .. } => ErrorCode::E0304,
            Self::Manifest { .. } => ErrorCode::E0304,
            Self::Hook(_) => ErrorCode::E0705,
        }
    }

    /// Origin package names, for conflict errors.
    #[must_use]
    pub fn origins(&self) -> Vec<&str> {
        match self {
            Self::VersionConflict { sources, .. } => {
                sources.iter().map(|s| s.origin.as_str()).collect()
            }
            _ => Vec::new(),
        }
    }
}

/// Counters collected during one resolution.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ResolverStats {
    /// Remote packages fetched and materialized.
    pub packages_fetched: u64,
    /// Candidate versions enumerated from the registry.
    pub versions_considered: u64,
    /// Requirements popped off the worklist.
    pub requirements_processed: u64,
}

/// A requirement waiting on the worklist, tagged with its provenance.
#[derive(Debug)]
struct Pending {
    requirement: PackageRequirement,
    origin: PackageKey,
    origin_id: PackageId,
    origin_root: PathBuf,
    /// Package names from the root to the origin, inclusive.
    chain: Vec<String>,
}

/// A constraint recorded against a name, with provenance.
#[derive(Debug)]
struct Recorded {
    constraint: VersionConstraint,
    origin: String,
    chain: Vec<String>,
}

/// Resolve the dependency graph rooted at `root`.
///
/// # Errors
/// Every error is fatal; see [`ResolveError`].
pub fn resolve(
    root: Package,
    registry: &dyn Registry,
    store: &PackageStore,
    bus: &HookBus,
) -> Result<DependencyGraph, ResolveError> {
    resolve_with_stats(root, registry, store, bus).map(|(graph, _)| graph)
}

/// [`resolve`], also returning the resolver's counters.
///
/// # Errors
/// Every error is fatal; see [`ResolveError`].
pub fn resolve_with_stats(
    root: Package,
    registry: &dyn Registry,
    store: &PackageStore,
    bus: &HookBus,
) -> Result<(DependencyGraph, ResolverStats), ResolveError> {
    let started = Instant::now();
    bus.emit(&BuildEvent::PreResolution {
        root: root.name().to_string(),
        version: root.version().clone(),
    })?;

    let root_key = root.key();
    let root_dir = root.root.clone();
    let root_requires = root.manifest.requires.clone();

    let mut graph = DependencyGraph::new(root);
    let root_id = graph.root_id();

    let mut stats = ResolverStats::default();
    let mut recorded: HashMap<String, Vec<Recorded>> = HashMap::new();
    let mut chosen: HashMap<String, (PackageId, Version)> = HashMap::new();
    chosen.insert(root_key.name.clone(), (root_id, root_key.version.clone()));

    let mut seen: HashSet<String> = HashSet::new();
    seen.insert(root_key.name.clone());

    let mut worklist: VecDeque<Pending> = root_requires
        .into_iter()
        .map(|requirement| Pending {
            requirement,
            origin: root_key.clone(),
            origin_id: root_id,
            origin_root: root_dir.clone(),
            chain: vec![root_key.name.clone()],
        })
        .collect();

    while let Some(pending) = worklist.pop_front() {
        stats.requirements_processed += 1;
        let name = pending.requirement.name.clone();
        let constraint = pending.requirement.constraint.clone();

        if seen.insert(name.clone()) {
            bus.emit(&BuildEvent::PackageDiscovered {
                name: name.clone(),
                constraint: constraint.clone(),
                origin: pending.origin.name.clone(),
            })?;
        }

        let records = recorded.entry(name.clone()).or_default();
        records.push(Recorded {
            constraint: constraint.clone(),
            origin: pending.origin.name.clone(),
            chain: pending.chain.clone(),
        });
        let accumulated: Vec<VersionConstraint> =
            records.iter().map(|r| r.constraint.clone()).collect();
        let narrowed = match intersect(&accumulated) {
            Intersection::Narrowed(c) => c,
            Intersection::Unsatisfiable => return Err(conflict(name, records)),
        };

        if let Some((existing_id, existing_version)) = chosen.get(&name) {
            // Already chosen. No backtracking: the chosen version must be
            // admitted by every constraint recorded so far.
            let still_admitted = accumulated.iter().all(|c| c.admits(existing_version));
            if !still_admitted {
                return Err(conflict(name, records));
            }
            if graph.would_cycle(pending.origin_id, *existing_id) {
                let mut path = pending.chain;
                path.push(name);
                return Err(ResolveError::CircularDependency { path });
            }
            graph.add_edge(pending.origin_id, *existing_id);
            continue;
        }

        // Materialize the chosen package.
        let package = materialize(
            &name, &narrowed, records, registry, store, bus, &pending, &mut stats,
        )?;
        let version = package.version().clone();
        bus.emit(&BuildEvent::VersionSelected {
            name: name.clone(),
            version: version.clone(),
        })?;
        debug!(name = %name, version = %version, "version selected");

        let id = graph.add_package(package);
        chosen.insert(name.clone(), (id, version));
        graph.add_edge(pending.origin_id, id);

        let requires = graph.package(id).manifest.requires.clone();
        let child_key = graph.package(id).key();
        let child_root = graph.package(id).root.clone();
        let mut chain = pending.chain;
        chain.push(name);
        for requirement in requires {
            worklist.push_back(Pending {
                requirement,
                origin: child_key.clone(),
                origin_id: id,
                origin_root: child_root.clone(),
                chain: chain.clone(),
            });
        }
    }

    let duration = started.elapsed();
    bus.emit(&BuildEvent::PostResolution {
        packages: graph.len(),
        duration,
    })?;
    info!(
        packages = graph.len(),
        edges = graph.edge_count(),
        fetched = stats.packages_fetched,
        duration_ms = duration.as_millis() as u64,
        "resolution complete"
    );

    Ok((graph, stats))
}

fn conflict(name: String, records: &[Recorded]) -> ResolveError {
    ResolveError::VersionConflict {
        name,
        sources: records
            .iter()
            .map(|r| ConflictSource {
                constraint: r.constraint.clone(),
                origin: r.origin.clone(),
                chain: r.chain.clone(),
            })
            .collect(),
    }
}

/// Select and materialize the package satisfying `narrowed`.
#[allow(clippy::too_many_arguments)]
fn materialize(
    name: &str,
    narrowed: &VersionConstraint,
    records: &[Recorded],
    registry: &dyn Registry,
    store: &PackageStore,
    bus: &HookBus,
    pending: &Pending,
    stats: &mut ResolverStats,
) -> Result<Package, ResolveError> {
    match narrowed {
        VersionConstraint::LocalPath(path) => {
            let dir = if path.is_absolute() {
                path.clone()
            } else {
                pending.origin_root.join(path)
            };
            let (manifest, warnings) =
                Manifest::load(&dir).map_err(|source| ResolveError::Manifest {
                    name: name.to_string(),
                    chain: pending.chain.clone(),
                    source,
                })?;
            for warning in warnings {
                warn!(package = %name, %warning, "manifest warning");
            }
            if manifest.name != name {
                return Err(ResolveError::NameMismatch {
                    expected: name.to_string(),
                    found: manifest.name,
                    root: dir,
                });
            }
            Ok(Package {
                manifest,
                root: dir,
                origin: PackageOrigin::Local,
            })
        }
        VersionConstraint::GitRef(reference) => {
            // The VCS client is an external collaborator; within the core a
            // ref resolves through the registry as an exact version tag.
            let Some(version) = git_ref_version(reference) else {
                return Err(ResolveError::NoCompatibleVersion {
                    name: name.to_string(),
                    constraint: narrowed.to_string(),
                    candidates: Vec::new(),
                    chain: pending.chain.clone(),
                });
            };
            fetch_remote(name, &version, registry, store, bus, pending, stats)
        }
        _ => {
            let candidates = match registry.list_versions(name) {
                Ok(candidates) => candidates,
                Err(RegistryError::NotFound { .. }) => Vec::new(),
                Err(source) => {
                    return Err(ResolveError::FetchFailed {
                        name: name.to_string(),
                        chain: pending.chain.clone(),
                        source,
                    });
                }
            };
            stats.versions_considered += candidates.len() as u64;

            let version = select_greatest(&candidates, records).ok_or_else(|| {
                ResolveError::NoCompatibleVersion {
                    name: name.to_string(),
                    constraint: narrowed.to_string(),
                    candidates: candidates.clone(),
                    chain: pending.chain.clone(),
                }
            })?;

            fetch_remote(name, &version, registry, store, bus, pending, stats)
        }
    }
}

/// The greatest candidate admitted by every recorded constraint.
///
/// Tie-break among precedence-equal candidates: stable before pre-release,
/// then lexicographic on the full version string.
fn select_greatest(candidates: &[Version], records: &[Recorded]) -> Option<Version> {
    candidates
        .iter()
        .filter(|v| records.iter().all(|r| r.constraint.admits(v)))
        .max_by(|a, b| {
            a.cmp_precedence(b)
                .then_with(|| b.is_pre_release().cmp(&a.is_pre_release()))
                .then_with(|| a.to_string().cmp(&b.to_string()))
        })
        .cloned()
}

fn fetch_remote(
    name: &str,
    version: &Version,
    registry: &dyn Registry,
    store: &PackageStore,
    bus: &HookBus,
    pending: &Pending,
    stats: &mut ResolverStats,
) -> Result<Package, ResolveError> {
    let fetched =
        registry
            .fetch(name, version)
            .map_err(|source| ResolveError::FetchFailed {
                name: name.to_string(),
                chain: pending.chain.clone(),
                source,
            })?;
    let root = store
        .materialize(name, version, &fetched.tarball)
        .map_err(|source| ResolveError::FetchFailed {
            name: name.to_string(),
            chain: pending.chain.clone(),
            source: source.into(),
        })?;
    stats.packages_fetched += 1;
    bus.emit(&BuildEvent::PackageFetched {
        name: name.to_string(),
        version: version.clone(),
    })?;

    let (manifest, warnings) = Manifest::load(&root).map_err(|source| ResolveError::Manifest {
        name: name.to_string(),
        chain: pending.chain.clone(),
        source,
    })?;
    for warning in warnings {
        warn!(package = %name, %warning, "manifest warning");
    }
    if manifest.name != name {
        return Err(ResolveError::NameMismatch {
            expected: name.to_string(),
            found: manifest.name,
            root,
        });
    }
    if !manifest.version.eq_precedence(version) {
        warn!(
            package = %name,
            registry = %version,
            manifest = %manifest.version,
            "registry and manifest disagree on version"
        );
    }

    Ok(Package {
        manifest,
        root,
        origin: PackageOrigin::Remote,
    })
}

fn git_ref_version(reference: &str) -> Option<Version> {
    Version::parse(reference.strip_prefix('v').unwrap_or(reference)).ok()
}
