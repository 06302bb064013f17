//! All-or-nothing artifact writing.
//!
//! The artifact is written to a temporary file next to its destination and
//! renamed into place, so readers observe either the previous file or the
//! complete new one, never a truncated write. The temporary file is removed
//! when any step fails.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use crate::error::{CodegenError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOutcome {
    Written,
    /// Existing file already had identical content; left untouched.
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Freshness {
    UpToDate,
    Stale,
    Missing,
}

/// Safe file writer with atomic replace semantics. A destination that
/// already holds identical bytes is left untouched.
#[derive(Debug, Clone, Default)]
pub struct SafeCodeWriter;

impl SafeCodeWriter {
    pub fn new() -> Self {
        Self
    }

    /// Write `content` to `path` atomically.
    pub fn write(&self, path: &Path, content: &str) -> Result<WriteOutcome> {
        self.validate_path(path)?;

        if self.freshness(path, content)? == Freshness::UpToDate {
            tracing::debug!(path = %path.display(), "artifact unchanged, skipping write");
            return Ok(WriteOutcome::Unchanged);
        }

        self.atomic_write(path, content)
            .map_err(|source| CodegenError::write(path, source))?;
        Ok(WriteOutcome::Written)
    }

    /// Compare `content` with what is on disk at `path`.
    pub fn freshness(&self, path: &Path, content: &str) -> Result<Freshness> {
        match fs::read(path) {
            Ok(existing) => {
                if compute_bytes_hash(&existing) == compute_string_hash(content) {
                    Ok(Freshness::UpToDate)
                } else {
                    Ok(Freshness::Stale)
                }
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Freshness::Missing),
            Err(source) => Err(CodegenError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    fn validate_path(&self, path: &Path) -> Result<()> {
        if path
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(CodegenError::Config(format!(
                "output path {path:?} must not contain `..`"
            )));
        }
        if path.is_dir() {
            return Err(CodegenError::Config(format!(
                "output path {path:?} is a directory"
            )));
        }
        Ok(())
    }

    fn atomic_write(&self, path: &Path, content: &str) -> io::Result<()> {
        let parent = parent_dir(path);
        fs::create_dir_all(&parent)?;

        let mut temp_file = NamedTempFile::new_in(&parent)?;
        temp_file.write_all(content.as_bytes())?;
        temp_file.flush()?;
        temp_file.as_file().sync_all()?;

        temp_file.persist(path).map_err(|err| err.error)?;
        Ok(())
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Compute SHA-256 hash of string
pub fn compute_string_hash(content: &str) -> String {
    compute_bytes_hash(content.as_bytes())
}

fn compute_bytes_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("src/generated/codec.g.rs");

        let outcome = SafeCodeWriter::new().write(&path, "pub struct A;\n").unwrap();

        assert_eq!(outcome, WriteOutcome::Written);
        assert_eq!(fs::read_to_string(&path).unwrap(), "pub struct A;\n");
    }

    #[test]
    fn test_identical_content_is_not_rewritten() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("codec.g.rs");
        let writer = SafeCodeWriter::new();

        writer.write(&path, "pub struct A;\n").unwrap();
        let outcome = writer.write(&path, "pub struct A;\n").unwrap();

        assert_eq!(outcome, WriteOutcome::Unchanged);
    }

    #[test]
    fn test_changed_content_replaces_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("codec.g.rs");
        let writer = SafeCodeWriter::new();

        writer.write(&path, "pub struct A;\n").unwrap();
        let outcome = writer.write(&path, "pub struct B;\n").unwrap();

        assert_eq!(outcome, WriteOutcome::Written);
        assert_eq!(fs::read_to_string(&path).unwrap(), "pub struct B;\n");
        let leftovers = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1, "temporary files must not survive a write");
    }

    #[test]
    fn test_write_into_directory_path_fails() {
        let dir = TempDir::new().unwrap();
        let err = SafeCodeWriter::new().write(dir.path(), "x").unwrap_err();
        assert!(matches!(err, CodegenError::Config(_)));
    }

    #[test]
    fn test_parent_traversal_is_rejected() {
        let err = SafeCodeWriter::new()
            .write(Path::new("src/../../escape.rs"), "x")
            .unwrap_err();
        assert!(matches!(err, CodegenError::Config(_)));
    }

    #[test]
    fn test_write_failure_surfaces_and_leaves_no_file() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "regular file").unwrap();
        let path = blocker.join("codec.g.rs");

        let err = SafeCodeWriter::new().write(&path, "x").unwrap_err();

        assert!(matches!(err, CodegenError::Write { .. } | CodegenError::Read { .. }));
        assert!(!path.exists());
    }

    #[test]
    fn test_freshness() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("codec.g.rs");
        let writer = SafeCodeWriter::new();

        assert_eq!(writer.freshness(&path, "a").unwrap(), Freshness::Missing);
        fs::write(&path, "a").unwrap();
        assert_eq!(writer.freshness(&path, "a").unwrap(), Freshness::UpToDate);
        assert_eq!(writer.freshness(&path, "b").unwrap(), Freshness::Stale);
    }

    #[test]
    fn test_compute_string_hash() {
        let hash1 = compute_string_hash("test content");
        let hash2 = compute_string_hash("test content");
        let hash3 = compute_string_hash("different content");

        assert_eq!(hash1, hash2);
        assert_ne!(hash1, hash3);
    }
}
