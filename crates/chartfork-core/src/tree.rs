//! Lock-step comparison of two directory trees
//!
//! Every path under either root is classified as present only on the left,
//! only on the right, or on both sides. Directories are reported like files
//! so callers can recreate or prune empty intermediate directories.
//!
//! The left tree is walked first, then the right one, each sorted by file
//! name, so the sequence of entries is stable for a given pair of trees.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::Result;

/// Where a path was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Only under the left root
    LeftOnly,
    /// Only under the right root
    RightOnly,
    /// Under both roots, with the same file type
    Both,
}

/// A path discovered while comparing two trees
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// Path relative to both roots
    pub relative: PathBuf,
    /// Mirrored path under the left root (may not exist)
    pub left: PathBuf,
    /// Mirrored path under the right root (may not exist)
    pub right: PathBuf,
    /// Classification of the path
    pub kind: EntryKind,
    /// Whether the entry is a directory
    pub is_dir: bool,
}

/// Compare `left` and `right`, invoking `handler` for every entry
///
/// A root that does not exist behaves like an empty tree. A path that is a
/// directory on one side and a file on the other is reported as left-only
/// and right-only rather than as present on both sides.
pub fn compare_trees<F>(left: &Path, right: &Path, mut handler: F) -> Result<()>
where
    F: FnMut(&TreeEntry) -> Result<()>,
{
    for (relative, is_dir) in walk(left)? {
        let mirror = right.join(&relative);
        let kind = if same_kind(&mirror, is_dir) {
            EntryKind::Both
        } else {
            EntryKind::LeftOnly
        };

        handler(&TreeEntry {
            left: left.join(&relative),
            right: mirror,
            relative,
            kind,
            is_dir,
        })?;
    }

    for (relative, is_dir) in walk(right)? {
        let mirror = left.join(&relative);
        if same_kind(&mirror, is_dir) {
            continue;
        }

        handler(&TreeEntry {
            left: mirror,
            right: right.join(&relative),
            relative,
            kind: EntryKind::RightOnly,
            is_dir,
        })?;
    }

    Ok(())
}

/// Collect `(relative path, is_dir)` for every entry under `root`
fn walk(root: &Path) -> Result<Vec<(PathBuf, bool)>> {
    if !root.is_dir() {
        return Ok(Vec::new());
    }

    let mut entries = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_path_buf();
        entries.push((relative, entry.file_type().is_dir()));
    }

    Ok(entries)
}

fn same_kind(path: &Path, is_dir: bool) -> bool {
    match std::fs::symlink_metadata(path) {
        Ok(meta) => meta.is_dir() == is_dir,
        Err(_) => false,
    }
}
