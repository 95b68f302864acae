//! Scratch workspaces
//!
//! Each task gets a fresh directory under the scratch root. The manager owns
//! the directory, not its contents: [`ScratchManager::release`] deletes
//! whatever a task left behind, keeps going past entries it cannot remove
//! and reports them in a [`ReleaseReport`].

use crate::config::BatchConfig;
use crate::error::ScratchError;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Private directory owned by one task
///
/// Not `Clone`: a workspace is released exactly once.
#[derive(Debug, PartialEq, Eq)]
pub struct ScratchWorkspace {
    path: PathBuf,
}

impl ScratchWorkspace {
    /// Workspace directory
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Path that survived a release, with the reason
#[derive(Debug)]
pub struct ReleaseFailure {
    /// Entry that could not be removed
    pub path: PathBuf,
    /// Error returned by the filesystem
    pub error: io::Error,
}

/// Outcome of removing one directory tree
#[derive(Debug)]
pub struct ReleaseReport {
    /// Root of the removed tree
    pub root: PathBuf,
    /// Entries removed, root included
    pub removed: usize,
    /// Entries left behind
    pub failures: Vec<ReleaseFailure>,
}

impl ReleaseReport {
    /// Whether every entry was removed
    #[inline]
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Allocates and releases scratch workspaces
#[derive(Debug, Clone)]
pub struct ScratchManager {
    root: PathBuf,
    prefix: String,
}

impl ScratchManager {
    /// Create a manager for `root`, naming directories `<prefix><random>`
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            prefix: prefix.into(),
        }
    }

    /// Create a manager from batch configuration
    #[must_use]
    pub fn from_config(config: &BatchConfig) -> Self {
        Self::new(config.effective_scratch_root(), config.scratch_prefix.clone())
    }

    /// Scratch root
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a fresh, empty, uniquely named directory
    ///
    /// # Errors
    /// `ScratchError::Allocation` if the root or the directory cannot be
    /// created
    pub fn allocate(&self) -> Result<ScratchWorkspace, ScratchError> {
        let allocation = |source| ScratchError::Allocation {
            root: self.root.clone(),
            source,
        };
        fs::create_dir_all(&self.root).map_err(allocation)?;
        let path = tempfile::Builder::new()
            .prefix(&self.prefix)
            .tempdir_in(&self.root)
            .map_err(allocation)?
            .keep();
        tracing::debug!("Allocated scratch workspace {}", path.display());
        Ok(ScratchWorkspace { path })
    }

    /// Recursively delete a workspace
    ///
    /// Never fails; entries that could not be removed are listed in the
    /// report and logged.
    pub fn release(&self, workspace: ScratchWorkspace) -> ReleaseReport {
        let report = remove_tree(&workspace.path);
        for failure in &report.failures {
            tracing::warn!(
                "Could not remove {}: {}",
                failure.path.display(),
                failure.error
            );
        }
        report
    }
}

/// Delete a directory tree, continuing past failures
///
/// Children are visited before their parent, so a directory is removed
/// once it is empty. A tree that is already gone yields a clean report.
#[must_use]
pub fn remove_tree(root: &Path) -> ReleaseReport {
    let mut report = ReleaseReport {
        root: root.to_path_buf(),
        removed: 0,
        failures: Vec::new(),
    };

    for entry in WalkDir::new(root).contents_first(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(error) => {
                let path = error.path().unwrap_or(root).to_path_buf();
                let error = io::Error::from(error);
                if error.kind() != io::ErrorKind::NotFound {
                    report.failures.push(ReleaseFailure { path, error });
                }
                continue;
            }
        };

        let result = if entry.file_type().is_dir() {
            fs::remove_dir(entry.path())
        } else {
            fs::remove_file(entry.path())
        };
        match result {
            Ok(()) => report.removed += 1,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {}
            Err(error) => report.failures.push(ReleaseFailure {
                path: entry.path().to_path_buf(),
                error,
            }),
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_creates_unique_empty_dirs() {
        let root = tempfile::tempdir().unwrap();
        let manager = ScratchManager::new(root.path(), "bm-task-");

        let a = manager.allocate().unwrap();
        let b = manager.allocate().unwrap();

        assert_ne!(a.path(), b.path());
        assert!(a.path().is_dir());
        assert_eq!(fs::read_dir(a.path()).unwrap().count(), 0);
        assert!(a
            .path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("bm-task-"));
    }

    #[test]
    fn allocate_creates_missing_root() {
        let root = tempfile::tempdir().unwrap();
        let nested = root.path().join("a").join("b");
        let manager = ScratchManager::new(&nested, "t");
        let ws = manager.allocate().unwrap();
        assert!(ws.path().starts_with(&nested));
    }

    #[test]
    fn release_removes_nested_contents() {
        let root = tempfile::tempdir().unwrap();
        let manager = ScratchManager::new(root.path(), "bm-task-");
        let ws = manager.allocate().unwrap();
        let path = ws.path().to_path_buf();

        fs::create_dir_all(path.join("grids").join("deep")).unwrap();
        fs::write(path.join("grids").join("deep").join("g.bin"), b"x").unwrap();
        fs::write(path.join("store.json"), b"{}").unwrap();

        let report = manager.release(ws);
        assert!(report.is_clean());
        // root, grids, deep, g.bin, store.json
        assert_eq!(report.removed, 5);
        assert!(!path.exists());
    }

    #[test]
    fn remove_tree_missing_path_is_clean() {
        let root = tempfile::tempdir().unwrap();
        let report = remove_tree(&root.path().join("gone"));
        assert!(report.is_clean());
        assert_eq!(report.removed, 0);
    }

    #[test]
    fn remove_tree_single_file() {
        let root = tempfile::tempdir().unwrap();
        let file = root.path().join("lonely.txt");
        fs::write(&file, b"x").unwrap();
        let report = remove_tree(&file);
        assert!(report.is_clean());
        assert!(!file.exists());
    }

    /// Makes `dir` read-only; `None` when the process can write anyway (root)
    #[cfg(unix)]
    fn lock(dir: &Path) -> Option<fs::Permissions> {
        use std::os::unix::fs::PermissionsExt;
        let original = fs::metadata(dir).unwrap().permissions();
        fs::set_permissions(dir, fs::Permissions::from_mode(0o555)).unwrap();
        if fs::write(dir.join("write-check"), b"x").is_ok() {
            fs::remove_file(dir.join("write-check")).unwrap();
            fs::set_permissions(dir, original).unwrap();
            return None;
        }
        Some(original)
    }

    #[cfg(unix)]
    #[test]
    fn release_continues_past_undeletable_entries() {
        let root = tempfile::tempdir().unwrap();
        let manager = ScratchManager::new(root.path(), "bm-task-");
        let ws = manager.allocate().unwrap();
        let path = ws.path().to_path_buf();
        let locked = path.join("locked");
        fs::create_dir(&locked).unwrap();
        fs::write(locked.join("stuck.bin"), b"x").unwrap();
        fs::write(path.join("sibling.json"), b"{}").unwrap();
        let Some(original) = lock(&locked) else {
            return;
        };

        let report = manager.release(ws);
        fs::set_permissions(&locked, original).unwrap();

        assert!(!report.is_clean());
        let failed: Vec<_> = report.failures.iter().map(|f| f.path.clone()).collect();
        assert!(failed.contains(&locked.join("stuck.bin")));
        assert!(failed.contains(&path));
        assert!(!path.join("sibling.json").exists());
        assert!(locked.join("stuck.bin").exists());
    }
}
