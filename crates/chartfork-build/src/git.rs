//! The git checkout holding the chart repository

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use chartfork_repo::GitRef;
use chartfork_repo::git::{clone, run_git};

use crate::error::{BuildError, Result};

/// A git working tree
///
/// Pathspecs given to its methods are relative to the directory it was
/// opened at, which may sit below the top level.
#[derive(Debug, Clone)]
pub struct GitWorkspace {
    root: PathBuf,
    dir: PathBuf,
}

impl GitWorkspace {
    /// Open the working tree containing `path`
    pub fn open(path: &Path) -> Result<Self> {
        let root = run_git(Some(path), ["rev-parse", "--show-toplevel"])?;
        Ok(Self {
            root: PathBuf::from(root),
            dir: path.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Tracked files under `paths`, relative to the opened directory
    pub fn tracked_files(&self, paths: &[&str]) -> Result<Vec<PathBuf>> {
        let mut args = vec![OsStr::new("ls-files"), OsStr::new("-z"), OsStr::new("--")];
        args.extend(paths.iter().map(OsStr::new));
        let output = run_git(Some(&self.dir), args)?;

        Ok(output
            .split('\0')
            .filter(|f| !f.is_empty())
            .map(PathBuf::from)
            .collect())
    }

    /// Tracked files under `paths` with uncommitted changes, staged or not
    pub fn modified_files(&self, paths: &[&str]) -> Result<Vec<String>> {
        let mut args = vec![
            OsStr::new("status"),
            OsStr::new("--porcelain"),
            OsStr::new("--untracked-files=no"),
            OsStr::new("--"),
        ];
        args.extend(paths.iter().map(OsStr::new));
        let output = run_git(Some(&self.dir), args)?;

        Ok(output
            .lines()
            .filter_map(|line| line.get(3..))
            .map(str::to_string)
            .collect())
    }

    /// Fail when tracked files under `paths` carry uncommitted changes
    pub fn ensure_clean(&self, paths: &[&str]) -> Result<()> {
        let modified = self.modified_files(paths)?;
        if modified.is_empty() {
            return Ok(());
        }
        Err(BuildError::UncommittedChanges {
            paths: modified.join(", "),
        })
    }

    /// Restore tracked content under `paths` to `HEAD`
    ///
    /// Only paths git already tracks are checked out; untracked files are
    /// left in place.
    pub fn restore_tracked(&self, paths: &[&str]) -> Result<()> {
        for path in paths {
            if self.tracked_files(&[*path])?.is_empty() {
                continue;
            }
            tracing::debug!("restoring tracked files under {}", path);
            run_git(Some(&self.dir), ["checkout", "--quiet", "HEAD", "--", *path])?;
        }
        Ok(())
    }

    /// Clone `branch` of `url` into `dest`
    pub fn clone_branch(url: &str, branch: &str, dest: &Path) -> Result<Self> {
        clone(url, &GitRef::Branch(branch.to_string()), dest)?;
        Self::open(dest)
    }
}
