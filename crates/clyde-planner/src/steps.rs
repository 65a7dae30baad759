//! Plan data model.

use clyde_cache::CacheKey;
use clyde_core::{CompilerInfo, ErrorCode};
use clyde_events::{HookError, StepId};
use clyde_manifest::{Language, PackageKind};
use clyde_resolver::{DependencyGraph, PackageId, PackageKey};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Fatal planning error.
#[derive(Debug, Error)]
pub enum PlanError {
    /// The package's source globs matched no files.
    #[error("[E0401] source globs of '{package}' matched no files: {}", .globs.join(", "))]
    EmptySources {
        /// Package name.
        package: String,
        /// The globs that matched nothing.
        globs: Vec<String>,
    },

    /// A library package has no public include directory.
    #[error("[E0402] library '{package}' has no include directory at {path}")]
    MissingIncludeDirectory {
        /// Package name.
        package: String,
        /// The expected `include/` location.
        path: PathBuf,
    },

    /// The probed compiler is neither GCC nor Clang.
    #[error("[E0403] unsupported compiler family: {name} ({version})")]
    UnsupportedCompilerFamily {
        /// Compiler executable name.
        name: String,
        /// Its version banner.
        version: String,
    },

    /// Reading a source or header during key precomputation failed.
    #[error("[E0404] planner failed to read {path}: {source}")]
    Io {
        /// Path involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A source glob did not parse.
    #[error("[E0405] invalid source glob '{pattern}' in '{package}': {source}")]
    InvalidGlob {
        /// Package name.
        package: String,
        /// The offending pattern.
        pattern: String,
        /// Underlying error.
        #[source]
        source: glob::PatternError,
    },

    /// A critical hook subscriber failed.
    #[error(transparent)]
    Hook(#[from] HookError),
}

impl PlanError {
    /// The stable error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::EmptySources { .. } => ErrorCode::E0401,
            Self::MissingIncludeDirectory { .. } => ErrorCode::E0402,
            Self::UnsupportedCompilerFamily { .. } => ErrorCode::E0403,
            Self::Io { .. } => ErrorCode::E0404,
            Self::InvalidGlob { .. } => ErrorCode::E0405,
            Self::Hook(_) => ErrorCode::E0705,
        }
    }
}

/// Non-fatal observation made at plan time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanWarning {
    /// Package the warning refers to.
    pub package: String,
    /// Human-readable description.
    pub message: String,
}

impl fmt::Display for PlanWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.package, self.message)
    }
}

/// One source file compiled to one object file.
#[derive(Debug, Clone)]
pub struct CompileStep {
    /// Monotonic step identity.
    pub id: StepId,
    /// Owning package.
    pub package: PackageKey,
    /// Owning package's graph id.
    pub package_id: PackageId,
    /// Absolute source path.
    pub source: PathBuf,
    /// Output object path beneath the package's `obj/` directory.
    pub object: PathBuf,
    /// Side-channel dependency file written next to the object.
    pub depfile: PathBuf,
    /// Effective compile flags, in order (include paths excluded).
    pub flags: Vec<String>,
    /// Resolved include path list, in search order.
    pub include_dirs: Vec<PathBuf>,
    /// Language the file is compiled as.
    pub language: Language,
    /// Trait pairs that parameterized the flags, carried for key derivation.
    pub traits: std::collections::BTreeMap<String, String>,
    /// Conservative object key: hashes every reachable public header.
    /// The executor promotes to a depfile-accurate key when one exists.
    pub conservative_key: CacheKey,
}

/// One package's archive or executable link.
#[derive(Debug, Clone)]
pub struct LinkStep {
    /// Monotonic step identity.
    pub id: StepId,
    /// Owning package.
    pub package: PackageKey,
    /// Owning package's graph id.
    pub package_id: PackageId,
    /// Library or application.
    pub kind: PackageKind,
    /// Language, which selects the link driver behavior.
    pub language: Language,
    /// Object files produced by this package's compile steps.
    pub objects: Vec<PathBuf>,
    /// Output artifact: `lib<name>.a` or the executable.
    pub artifact: PathBuf,
    /// Effective link flags, in order.
    pub link_flags: Vec<String>,
    /// Transitive library archives, link order (applications only).
    pub dep_archives: Vec<PathBuf>,
    /// The package's public include directory, bundled with the artifact.
    pub include_export: Option<PathBuf>,
}

/// Output directory assignment per package.
#[derive(Debug, Clone)]
pub struct PackageLayout {
    build_root: PathBuf,
    dirs: HashMap<PackageId, PathBuf>,
}

impl PackageLayout {
    /// Assign the root package to `<root>/.build/` and every dependency to
    /// `<root>/.build/deps/<name>/`.
    #[must_use]
    pub fn assign(graph: &DependencyGraph, build_root: PathBuf) -> Self {
        let mut dirs = HashMap::new();
        for (id, package) in graph.packages() {
            let dir = if id == graph.root_id() {
                build_root.clone()
            } else {
                build_root.join("deps").join(&package.manifest.name)
            };
            dirs.insert(id, dir);
        }
        Self { build_root, dirs }
    }

    /// The build root (`<root>/.build/`).
    #[must_use]
    pub fn build_root(&self) -> &Path {
        &self.build_root
    }

    /// A package's output directory.
    #[must_use]
    pub fn dir(&self, id: PackageId) -> &Path {
        &self.dirs[&id]
    }

    /// A package's object directory.
    #[must_use]
    pub fn obj_dir(&self, id: PackageId) -> PathBuf {
        self.dirs[&id].join("obj")
    }
}

/// The ordered build plan.
///
/// Step ids are assigned in the serial order of the plan: every compile step
/// of a package precedes its link step, and a library's link step precedes
/// every step of its dependents.
#[derive(Debug, Clone)]
pub struct BuildPlan {
    /// The probed compiler the plan was computed for.
    pub compiler: CompilerInfo,
    /// Compile steps, in plan order.
    pub compile_steps: Vec<CompileStep>,
    /// Link steps, in plan order.
    pub link_steps: Vec<LinkStep>,
    /// Output directory per package.
    pub layout: PackageLayout,
    /// Dependencies-first package order.
    pub package_order: Vec<PackageId>,
    /// Non-fatal hygiene warnings.
    pub warnings: Vec<PlanWarning>,
}

impl BuildPlan {
    /// Compile steps belonging to one package, in plan order.
    #[must_use]
    pub fn compile_steps_for(&self, id: PackageId) -> Vec<&CompileStep> {
        self.compile_steps
            .iter()
            .filter(|step| step.package_id == id)
            .collect()
    }

    /// The link step of one package.
    #[must_use]
    pub fn link_step_for(&self, id: PackageId) -> Option<&LinkStep> {
        self.link_steps.iter().find(|step| step.package_id == id)
    }

    /// Total number of steps.
    #[must_use]
    pub fn step_count(&self) -> usize {
        self.compile_steps.len() + self.link_steps.len()
    }
}
