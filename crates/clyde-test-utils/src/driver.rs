//! A scripted toolchain fake.
//!
//! Behaves like a deterministic compiler: it resolves `#include` directives
//! against the step's include path, writes a Makefile-style depfile next to
//! the object, and produces object and artifact bytes that are pure
//! functions of their inputs. Failures and delays are scriptable per file
//! or package, so executor tests can exercise every failure path without a
//! real toolchain installed.

use async_trait::async_trait;
use clyde_core::{CompilerFamily, CompilerInfo, Diagnostic, Severity};
use clyde_planner::{CompileStep, LinkStep};
use clyde_toolchain::{CompileResult, LinkResult, ToolchainDriver, ToolchainError};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Deterministic scripted stand-in for a real compiler driver.
#[derive(Debug)]
pub struct FakeDriver {
    info: CompilerInfo,
    compiles: AtomicUsize,
    links: AtomicUsize,
    fail_compiling: Mutex<HashSet<String>>,
    fail_linking: Mutex<HashSet<String>>,
    delay: Mutex<Option<Duration>>,
}

impl Default for FakeDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeDriver {
    /// A fake GCC 13 on x86-64 Linux.
    #[must_use]
    pub fn new() -> Self {
        Self {
            info: CompilerInfo {
                name: "gcc".to_string(),
                version: "gcc (GCC) 13.2.0".to_string(),
                target: "x86_64-linux-gnu".to_string(),
                family: CompilerFamily::Gcc,
            },
            compiles: AtomicUsize::new(0),
            links: AtomicUsize::new(0),
            fail_compiling: Mutex::new(HashSet::new()),
            fail_linking: Mutex::new(HashSet::new()),
            delay: Mutex::new(None),
        }
    }

    /// Script a compile failure for sources with this file name.
    pub fn fail_compile(&self, file_name: &str) {
        self.fail_compiling.lock().insert(file_name.to_string());
    }

    /// Script a link failure for this package name.
    pub fn fail_link(&self, package: &str) {
        self.fail_linking.lock().insert(package.to_string());
    }

    /// Sleep this long inside every compile and link call.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Number of compile invocations so far.
    #[must_use]
    pub fn compile_count(&self) -> usize {
        self.compiles.load(Ordering::SeqCst)
    }

    /// Number of link invocations so far.
    #[must_use]
    pub fn link_count(&self) -> usize {
        self.links.load(Ordering::SeqCst)
    }

    async fn maybe_delay(&self) {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl ToolchainDriver for FakeDriver {
    async fn probe(&self) -> Result<CompilerInfo, ToolchainError> {
        Ok(self.info.clone())
    }

    async fn compile(&self, step: &CompileStep) -> Result<CompileResult, ToolchainError> {
        self.maybe_delay().await;
        self.compiles.fetch_add(1, Ordering::SeqCst);

        let file_name = step
            .source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if self.fail_compiling.lock().contains(&file_name) {
            return Ok(CompileResult {
                object_path: step.object.clone(),
                diagnostics: vec![Diagnostic {
                    severity: Severity::Error,
                    file: step.source.clone(),
                    line: 1,
                    column: 1,
                    flag: None,
                    message: "expected ';' before '}' token".to_string(),
                }],
                duration: Duration::from_millis(1),
                success: false,
            });
        }

        let source =
            std::fs::read(&step.source).map_err(|source| ToolchainError::Io { source })?;
        let headers = resolve_includes(&step.source, &step.include_dirs);

        if let Some(parent) = step.object.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ToolchainError::Io { source })?;
        }

        // Object bytes are a pure function of the inputs a real compiler
        // would see, so identical builds produce identical objects.
        let mut object = b"OBJ\n".to_vec();
        object.extend(step.flags.join(" ").into_bytes());
        object.push(b'\n');
        object.extend(&source);
        for header in &headers {
            object.extend(std::fs::read(header).unwrap_or_default());
        }
        std::fs::write(&step.object, &object).map_err(|source| ToolchainError::Io { source })?;

        let mut depfile = format!("{}: {}", step.object.display(), step.source.display());
        for header in &headers {
            depfile.push_str(&format!(" {}", header.display()));
        }
        depfile.push('\n');
        std::fs::write(&step.depfile, depfile)
            .map_err(|source| ToolchainError::Io { source })?;

        Ok(CompileResult {
            object_path: step.object.clone(),
            diagnostics: Vec::new(),
            duration: Duration::from_millis(1),
            success: true,
        })
    }

    async fn link(&self, step: &LinkStep) -> Result<LinkResult, ToolchainError> {
        self.maybe_delay().await;
        self.links.fetch_add(1, Ordering::SeqCst);

        if self.fail_linking.lock().contains(&step.package.name) {
            return Ok(LinkResult {
                artifact_path: step.artifact.clone(),
                output: format!(
                    "ld: {}: undefined reference to `missing_symbol'",
                    step.package.name
                ),
                duration: Duration::from_millis(1),
                success: false,
            });
        }

        if let Some(parent) = step.artifact.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ToolchainError::Io { source })?;
        }

        let mut artifact = b"LNK\n".to_vec();
        for object in &step.objects {
            artifact.extend(std::fs::read(object).map_err(|source| ToolchainError::Io { source })?);
        }
        for archive in &step.dep_archives {
            artifact
                .extend(std::fs::read(archive).map_err(|source| ToolchainError::Io { source })?);
        }
        artifact.extend(step.link_flags.join(" ").into_bytes());
        std::fs::write(&step.artifact, &artifact)
            .map_err(|source| ToolchainError::Io { source })?;

        Ok(LinkResult {
            artifact_path: step.artifact.clone(),
            output: String::new(),
            duration: Duration::from_millis(1),
            success: true,
        })
    }
}

/// Resolve `#include <...>` / `#include "..."` directives transitively
/// against the include path, in appearance order.
fn resolve_includes(source: &Path, include_dirs: &[PathBuf]) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut seen = HashSet::new();
    let mut pending = vec![source.to_path_buf()];
    while let Some(file) = pending.pop() {
        let Ok(contents) = std::fs::read_to_string(&file) else {
            continue;
        };
        for line in contents.lines() {
            let trimmed = line.trim_start();
            let Some(rest) = trimmed.strip_prefix("#include") else {
                continue;
            };
            let rest = rest.trim_start();
            let name = rest
                .strip_prefix('<')
                .and_then(|r| r.split('>').next())
                .or_else(|| rest.strip_prefix('"').and_then(|r| r.split('"').next()));
            let Some(name) = name else { continue };
            for dir in include_dirs {
                let candidate = dir.join(name);
                if candidate.is_file() && seen.insert(candidate.clone()) {
                    found.push(candidate.clone());
                    pending.push(candidate);
                    break;
                }
            }
        }
    }
    found
}
