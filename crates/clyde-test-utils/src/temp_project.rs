//! Temporary project trees for integration tests.
//!
//! A [`TempProject`] is an isolated workspace directory holding one or more
//! package roots; it is removed when dropped.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// An isolated workspace for package fixtures.
#[derive(Debug)]
pub struct TempProject {
    dir: TempDir,
}

impl TempProject {
    /// Create an empty workspace.
    ///
    /// # Errors
    /// Fails if the temporary directory cannot be created.
    pub fn new() -> Result<Self> {
        Ok(Self {
            dir: tempfile::tempdir().context("failed to create temp workspace")?,
        })
    }

    /// The workspace root.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// A package directory inside the workspace (not created implicitly).
    #[must_use]
    pub fn package_dir(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Write a file, creating parent directories.
    ///
    /// # Errors
    /// Fails on I/O errors.
    pub fn create_file(&self, relative: &str, contents: &str) -> Result<PathBuf> {
        let path = self.dir.path().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        std::fs::write(&path, contents)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }

    /// Read a file back.
    ///
    /// # Errors
    /// Fails on I/O errors.
    pub fn read_file(&self, relative: &str) -> Result<Vec<u8>> {
        let path = self.dir.path().join(relative);
        std::fs::read(&path).with_context(|| format!("failed to read {}", path.display()))
    }

    /// Does a file exist in the workspace?
    #[must_use]
    pub fn file_exists(&self, relative: &str) -> bool {
        self.dir.path().join(relative).is_file()
    }
}

/// An application manifest with optional requirements.
#[must_use]
pub fn app_manifest(name: &str, version: &str, requires: &[(&str, &str)]) -> String {
    manifest(name, version, "application", requires)
}

/// A library manifest with optional requirements.
#[must_use]
pub fn lib_manifest(name: &str, version: &str, requires: &[(&str, &str)]) -> String {
    manifest(name, version, "library", requires)
}

fn manifest(name: &str, version: &str, kind: &str, requires: &[(&str, &str)]) -> String {
    let mut yaml = format!("name: {name}\nversion: {version}\ntype: {kind}\nlanguage: c\n");
    if !requires.is_empty() {
        yaml.push_str("requires:\n");
        for (dep, constraint) in requires {
            yaml.push_str(&format!("  {dep}: '{constraint}'\n"));
        }
    }
    yaml
}
