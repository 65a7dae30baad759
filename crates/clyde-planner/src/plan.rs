//! The planner.

use crate::sources::{collect_headers, enumerate_sources};
use crate::steps::{BuildPlan, CompileStep, LinkStep, PackageLayout, PlanError, PlanWarning};
use clyde_cache::{ObjectKeyInputs, ToolIdentity, object_key};
use clyde_core::{CompilerFamily, CompilerInfo};
use clyde_events::{BuildEvent, HookBus, StepId};
use clyde_manifest::{Manifest, PackageKind};
use clyde_resolver::{DependencyGraph, PackageId};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

/// Flags every package gets before its manifest flags, per family.
const DEFAULT_CFLAGS: &[&str] = &["-Wall"];

/// Compute the build plan for a resolved graph.
///
/// # Errors
/// See [`PlanError`]; all planning errors are fatal.
pub fn plan(
    graph: &DependencyGraph,
    compiler: &CompilerInfo,
    bus: &HookBus,
) -> Result<BuildPlan, PlanError> {
    if compiler.family == CompilerFamily::Other {
        return Err(PlanError::UnsupportedCompilerFamily {
            name: compiler.name.clone(),
            version: compiler.version.clone(),
        });
    }

    let started = Instant::now();
    bus.emit(&BuildEvent::PrePlan {
        packages: graph.len(),
    })?;

    // Library packages must expose a public include directory.
    for (_, package) in graph.packages() {
        if package.manifest.kind == PackageKind::Library {
            let include = package.root.join("include");
            if !include.is_dir() {
                return Err(PlanError::MissingIncludeDirectory {
                    package: package.manifest.name.clone(),
                    path: include,
                });
            }
        }
    }

    let warnings = header_hygiene(graph);
    let layout = PackageLayout::assign(graph, graph.root().root.join(".build"));
    let package_order = graph.topo_order();
    let identity = ToolIdentity::from(compiler);

    let mut compile_steps = Vec::new();
    let mut link_steps = Vec::new();
    let mut next_id = 1u64;

    for &package_id in &package_order {
        let package = graph.package(package_id);
        let manifest = &package.manifest;
        let flags = effective_flags(manifest, compiler.family, DEFAULT_CFLAGS, FlagSet::Compile);
        let include_dirs = include_paths(graph, package_id);
        let sources = enumerate_sources(package)?;
        let headers = collect_headers(&include_dirs)?;
        let header_refs: Vec<(&Path, Vec<u8>)> = headers
            .iter()
            .map(|(path, bytes)| (path.as_path(), bytes.clone()))
            .collect();

        let obj_dir = layout.obj_dir(package_id);
        let mut objects = Vec::with_capacity(sources.len());
        for source in &sources {
            let relative = source.strip_prefix(&package.root).map_or_else(
                |_| PathBuf::from(source.file_name().unwrap_or(source.as_os_str())),
                Path::to_path_buf,
            );
            let object = obj_dir.join(&relative).with_extension("o");
            let depfile = object.with_extension("d");

            let source_bytes = std::fs::read(source).map_err(|e| PlanError::Io {
                path: source.clone(),
                source: e,
            })?;
            let conservative_key = object_key(&ObjectKeyInputs {
                source: &source_bytes,
                headers: &header_refs,
                compiler: &identity,
                flags: &flags,
                language: &manifest.language.to_string(),
                traits: &manifest.traits,
            });

            objects.push(object.clone());
            compile_steps.push(CompileStep {
                id: StepId(next_id),
                package: package.key(),
                package_id,
                source: source.clone(),
                object,
                depfile,
                flags: flags.clone(),
                include_dirs: include_dirs.clone(),
                language: manifest.language,
                traits: manifest.traits.clone(),
                conservative_key,
            });
            next_id += 1;
        }

        let link_flags = link_flags(graph, package_id, compiler.family);
        let short = manifest.short_name();
        let (artifact, include_export) = match manifest.kind {
            PackageKind::Library => (
                layout.dir(package_id).join(format!("lib{short}.a")),
                Some(package.root.join("include")),
            ),
            PackageKind::Application => (layout.dir(package_id).join(short), None),
        };
        let dep_archives = match manifest.kind {
            PackageKind::Application => transitive_archives(graph, package_id, &layout),
            PackageKind::Library => Vec::new(),
        };

        link_steps.push(LinkStep {
            id: StepId(next_id),
            package: package.key(),
            package_id,
            kind: manifest.kind,
            language: manifest.language,
            objects,
            artifact,
            link_flags,
            dep_archives,
            include_export,
        });
        next_id += 1;

        debug!(
            package = %manifest.name,
            sources = sources.len(),
            includes = include_dirs.len(),
            "package planned"
        );
    }

    bus.emit(&BuildEvent::BuildOrderComputed {
        compile_steps: compile_steps.len(),
        link_steps: link_steps.len(),
    })?;

    let duration = started.elapsed();
    bus.emit(&BuildEvent::PostPlan { duration })?;
    info!(
        packages = graph.len(),
        compile_steps = compile_steps.len(),
        link_steps = link_steps.len(),
        warnings = warnings.len(),
        duration_ms = duration.as_millis() as u64,
        "plan complete"
    );

    Ok(BuildPlan {
        compiler: compiler.clone(),
        compile_steps,
        link_steps,
        layout,
        package_order,
        warnings,
    })
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum FlagSet {
    Compile,
    Link,
}

/// Concatenate, in order: global defaults for the family, the manifest's
/// flags for the family, then overlays of every active variant.
fn effective_flags(
    manifest: &Manifest,
    family: CompilerFamily,
    defaults: &[&str],
    set: FlagSet,
) -> Vec<String> {
    let family_map = match set {
        FlagSet::Compile => &manifest.cflags,
        FlagSet::Link => &manifest.ldflags,
    };
    let mut flags: Vec<String> = defaults.iter().map(ToString::to_string).collect();
    if let Some(text) = family_map.get(family.as_str()) {
        flags.extend(text.split_whitespace().map(String::from));
    }
    for (variant, overlay) in &manifest.variants {
        if !manifest.variant_active(variant) {
            continue;
        }
        let overlay_map = match set {
            FlagSet::Compile => &overlay.cflags,
            FlagSet::Link => &overlay.ldflags,
        };
        if let Some(text) = overlay_map.get(family.as_str()) {
            flags.extend(text.split_whitespace().map(String::from));
        }
    }
    flags
}

/// Link flags: the package's own effective ldflags, then each transitive
/// dependency's, direct before transitive.
fn link_flags(graph: &DependencyGraph, id: PackageId, family: CompilerFamily) -> Vec<String> {
    let mut flags = effective_flags(&graph.package(id).manifest, family, &[], FlagSet::Link);
    for dep in graph.transitive_dependencies(id) {
        flags.extend(effective_flags(
            &graph.package(dep).manifest,
            family,
            &[],
            FlagSet::Link,
        ));
    }
    flags
}

/// Include search order: the package's own public and private directories
/// first, then every transitive dependency's public directory in topology
/// order, deduplicated by first occurrence.
fn include_paths(graph: &DependencyGraph, id: PackageId) -> Vec<PathBuf> {
    let package = graph.package(id);
    let mut dirs = Vec::new();
    for own in ["include", "private_include"] {
        let dir = package.root.join(own);
        if dir.is_dir() {
            dirs.push(dir);
        }
    }
    for dep in graph.transitive_dependencies(id) {
        let dep_package = graph.package(dep);
        if dep_package.manifest.kind == PackageKind::Library {
            let dir = dep_package.root.join("include");
            if !dirs.contains(&dir) {
                dirs.push(dir);
            }
        }
    }
    dirs
}

/// Archives of every transitive library dependency, dependents before
/// dependencies so the linker resolves symbols left to right.
fn transitive_archives(
    graph: &DependencyGraph,
    id: PackageId,
    layout: &PackageLayout,
) -> Vec<PathBuf> {
    graph
        .transitive_dependencies(id)
        .into_iter()
        .filter(|&dep| graph.package(dep).manifest.kind == PackageKind::Library)
        .map(|dep| {
            let short = graph.package(dep).manifest.short_name().to_string();
            layout.dir(dep).join(format!("lib{short}.a"))
        })
        .collect()
}

/// Warn on public headers that are not namespaced under
/// `include/<package-name>/`.
fn header_hygiene(graph: &DependencyGraph) -> Vec<PlanWarning> {
    let mut warnings = Vec::new();
    for (_, package) in graph.packages() {
        let include = package.root.join("include");
        let Ok(entries) = std::fs::read_dir(&include) else {
            continue;
        };
        for entry in entries.flatten() {
            if entry.file_type().is_ok_and(|t| t.is_file()) {
                warnings.push(PlanWarning {
                    package: package.manifest.name.clone(),
                    message: format!(
                        "public header '{}' is not namespaced under include/{}/",
                        entry.file_name().to_string_lossy(),
                        package.manifest.short_name()
                    ),
                });
            }
        }
    }
    warnings
}
