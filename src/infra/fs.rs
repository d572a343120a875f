//! File-system access behind a trait seam.
//!
//! Validation and apply reach the disk only through [`FileSystem`], so tests
//! can substitute failing or read-only doubles without touching the real
//! tree. The production implementation writes atomically: content lands in a
//! temp file next to the target and is renamed into place.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub trait FileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String>;
    /// Write `content` to `path`, creating parent directories as needed.
    fn write(&self, path: &Path, content: &str) -> Result<()>;
    fn exists(&self, path: &Path) -> bool;
    /// Whether a write at `path` can be expected to succeed: the file itself
    /// when it exists, otherwise the nearest existing ancestor.
    fn is_writable(&self, path: &Path) -> bool;
}

/// Production implementation over `std::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).with_context(|| format!("read file: {}", path.display()))
    }

    fn write(&self, path: &Path, content: &str) -> Result<()> {
        let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
        if let Some(parent) = parent {
            fs::create_dir_all(parent)
                .with_context(|| format!("create parent dir: {}", parent.display()))?;
        }

        // Stage next to the target so the rename stays on one filesystem.
        let dir = parent.map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)
            .with_context(|| format!("create temp file in {}", dir.display()))?;
        tmp.write_all(content.as_bytes())
            .with_context(|| format!("write temp file for {}", path.display()))?;
        tmp.persist(path)
            .with_context(|| format!("persist file: {}", path.display()))?;
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_writable(&self, path: &Path) -> bool {
        match fs::metadata(nearest_existing(path)) {
            Ok(meta) => !meta.permissions().readonly(),
            Err(_) => false,
        }
    }
}

/// Walk up until a component that exists on disk; falls back to ".".
fn nearest_existing(path: &Path) -> &Path {
    let mut current = path;
    loop {
        if current.exists() {
            return current;
        }
        match current.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => current = parent,
            _ => return Path::new("."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn write_creates_missing_parents() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("a/b/c.txt");

        let fs_impl = RealFileSystem;
        fs_impl.write(&target, "hello").unwrap();

        assert!(fs_impl.exists(&target));
        assert_eq!(fs_impl.read_to_string(&target).unwrap(), "hello");
    }

    #[test]
    fn write_replaces_existing_content() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("f.txt");
        fs::write(&target, "old").unwrap();

        RealFileSystem.write(&target, "new").unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "new");
    }

    #[test]
    fn missing_path_probes_nearest_ancestor() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("not/yet/there.txt");
        assert!(RealFileSystem.is_writable(&target));
    }

    #[cfg(unix)]
    #[test]
    fn readonly_target_is_not_writable() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("locked.txt");
        fs::write(&target, "x").unwrap();

        let mut perms = fs::metadata(&target).unwrap().permissions();
        perms.set_readonly(true);
        fs::set_permissions(&target, perms).unwrap();

        assert!(!RealFileSystem.is_writable(&target));
    }
}
