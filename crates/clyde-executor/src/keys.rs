//! Object key selection.
//!
//! Accurate cache keys require knowing which headers a source actually
//! includes. The compiler emits that list into a dependency file next to
//! the object; when one exists from a prior compile, the lookup is promoted
//! to the accurate key. First builds fall back to the plan's conservative
//! key, which hashes every reachable public header.

use clyde_cache::{CacheKey, ObjectKeyInputs, ToolIdentity, object_key};
use clyde_planner::CompileStep;
use clyde_toolchain::parse_depfile;
use std::path::Path;

/// The key to look up (and store) this step's object under.
#[must_use]
pub fn object_lookup_key(step: &CompileStep, compiler: &ToolIdentity) -> CacheKey {
    accurate_object_key(step, compiler).unwrap_or(step.conservative_key)
}

/// The depfile-accurate key, when a readable depfile from a prior compile
/// exists. Any unreadable prerequisite falls back to the conservative key.
#[must_use]
pub fn accurate_object_key(step: &CompileStep, compiler: &ToolIdentity) -> Option<CacheKey> {
    let contents = std::fs::read_to_string(&step.depfile).ok()?;
    let prerequisites = parse_depfile(&contents);

    let mut headers = Vec::new();
    for path in prerequisites {
        if path == step.source {
            continue;
        }
        let bytes = std::fs::read(&path).ok()?;
        headers.push((path, bytes));
    }
    let header_refs: Vec<(&Path, Vec<u8>)> = headers
        .iter()
        .map(|(path, bytes)| (path.as_path(), bytes.clone()))
        .collect();

    let source = std::fs::read(&step.source).ok()?;
    Some(object_key(&ObjectKeyInputs {
        source: &source,
        headers: &header_refs,
        compiler,
        flags: &step.flags,
        language: &step.language.to_string(),
        traits: &step.traits,
    }))
}
