//! Source glob expansion and header collection.

use crate::steps::PlanError;
use clyde_resolver::Package;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Expand `{a,b,c}` alternation sets into plain glob patterns.
///
/// The glob crate has no brace support; manifests use `src/**/*.{c,cc,cpp}`
/// shorthand, so alternations expand before matching. Nesting expands
/// left-to-right.
#[must_use]
pub fn expand_braces(pattern: &str) -> Vec<String> {
    let Some(open) = pattern.find('{') else {
        return vec![pattern.to_string()];
    };
    let Some(close) = pattern[open..].find('}').map(|i| open + i) else {
        return vec![pattern.to_string()];
    };
    let mut expanded = Vec::new();
    for option in pattern[open + 1..close].split(',') {
        let candidate = format!("{}{}{}", &pattern[..open], option, &pattern[close + 1..]);
        expanded.extend(expand_braces(&candidate));
    }
    expanded
}

/// Expand the manifest's source globs relative to the package root.
///
/// Matches are deduplicated and sorted, so enumeration is deterministic.
pub fn enumerate_sources(package: &Package) -> Result<Vec<PathBuf>, PlanError> {
    let mut found = BTreeSet::new();
    for pattern in &package.manifest.sources {
        for expanded in expand_braces(pattern) {
            let full = package.root.join(&expanded);
            let Some(full) = full.to_str() else {
                continue;
            };
            let matches =
                glob::glob(full).map_err(|source| PlanError::InvalidGlob {
                    package: package.manifest.name.clone(),
                    pattern: pattern.clone(),
                    source,
                })?;
            for entry in matches {
                let path = entry.map_err(|e| {
                    let path = e.path().to_path_buf();
                    PlanError::Io {
                        path,
                        source: e.into_error(),
                    }
                })?;
                if path.is_file() {
                    found.insert(path);
                }
            }
        }
    }
    if found.is_empty() {
        return Err(PlanError::EmptySources {
            package: package.manifest.name.clone(),
            globs: package.manifest.sources.clone(),
        });
    }
    Ok(found.into_iter().collect())
}

/// Every file under the given include directories, in directory order then
/// path order, with contents. This is the conservative cache-key input: all
/// reachable public headers, whether or not the source includes them.
pub fn collect_headers(include_dirs: &[PathBuf]) -> Result<Vec<(PathBuf, Vec<u8>)>, PlanError> {
    let mut headers = Vec::new();
    for dir in include_dirs {
        if !dir.is_dir() {
            continue;
        }
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| dir.clone());
                PlanError::Io {
                    path,
                    source: e.into(),
                }
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.into_path();
            let bytes = std::fs::read(&path).map_err(|source| PlanError::Io {
                path: path.clone(),
                source,
            })?;
            headers.push((path, bytes));
        }
    }
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn no_braces_passes_through() {
        assert_eq!(expand_braces("src/**/*.c"), vec!["src/**/*.c"]);
    }

    #[test]
    fn single_brace_set() {
        assert_eq!(
            expand_braces("src/**/*.{c,cc,cpp,cxx}"),
            vec!["src/**/*.c", "src/**/*.cc", "src/**/*.cpp", "src/**/*.cxx"]
        );
    }

    #[test]
    fn nested_sets_expand_cartesian() {
        assert_eq!(
            expand_braces("{a,b}/{x,y}.c"),
            vec!["a/x.c", "a/y.c", "b/x.c", "b/y.c"]
        );
    }

    #[test]
    fn unbalanced_brace_is_literal() {
        assert_eq!(expand_braces("src/{oops.c"), vec!["src/{oops.c"]);
    }
}
