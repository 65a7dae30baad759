//! Artifact bundles.
//!
//! An artifact-tier entry is a tar archive holding the linked artifact plus
//! the package's public headers, preserving file modes so an executable
//! unpacks runnable.

use std::io::Read;
use std::path::{Path, PathBuf};

/// A packed artifact plus its public headers.
#[derive(Debug, Clone)]
pub struct ArtifactBundle {
    bytes: Vec<u8>,
}

impl ArtifactBundle {
    /// Pack an artifact file and, when present, an `include/` tree.
    ///
    /// # Errors
    /// Returns I/O errors from reading the inputs.
    pub fn pack(artifact: &Path, include_dir: Option<&Path>) -> std::io::Result<Self> {
        let mut builder = tar::Builder::new(Vec::new());
        builder.follow_symlinks(false);

        let file_name = artifact
            .file_name()
            .ok_or_else(|| std::io::Error::other("artifact path has no file name"))?;
        builder.append_path_with_name(artifact, file_name)?;

        if let Some(include_dir) = include_dir
            && include_dir.is_dir()
        {
            builder.append_dir_all("include", include_dir)?;
        }

        Ok(Self {
            bytes: builder.into_inner()?,
        })
    }

    /// Wrap raw archive bytes, validating that they parse as a tar archive.
    ///
    /// # Errors
    /// Returns an error for bytes that are not a readable archive.
    pub fn from_bytes(bytes: Vec<u8>) -> std::io::Result<Self> {
        let mut archive = tar::Archive::new(&bytes[..]);
        for entry in archive.entries()? {
            let mut entry = entry?;
            // Drain each entry so header and content corruption both surface.
            std::io::copy(&mut entry, &mut std::io::sink())?;
        }
        Ok(Self { bytes })
    }

    /// The archive bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Entry paths in archive order.
    ///
    /// # Errors
    /// Returns an error for unreadable archives.
    pub fn entry_names(&self) -> std::io::Result<Vec<PathBuf>> {
        let mut archive = tar::Archive::new(&self.bytes[..]);
        let mut names = Vec::new();
        for entry in archive.entries()? {
            names.push(entry?.path()?.into_owned());
        }
        Ok(names)
    }

    /// Unpack into a directory, preserving modes.
    ///
    /// # Errors
    /// Returns I/O errors from extraction.
    pub fn unpack_to(&self, dir: &Path) -> std::io::Result<()> {
        std::fs::create_dir_all(dir)?;
        let mut archive = tar::Archive::new(&self.bytes[..]);
        archive.set_preserve_permissions(true);
        archive.unpack(dir)
    }

    /// Read one entry's contents by exact path.
    ///
    /// # Errors
    /// Returns an error for unreadable archives.
    pub fn read_entry(&self, path: &Path) -> std::io::Result<Option<Vec<u8>>> {
        let mut archive = tar::Archive::new(&self.bytes[..]);
        for entry in archive.entries()? {
            let mut entry = entry?;
            if entry.path()? == path {
                let mut contents = Vec::new();
                entry.read_to_end(&mut contents)?;
                return Ok(Some(contents));
            }
        }
        Ok(None)
    }
}
