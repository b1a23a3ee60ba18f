//! Change-set protocol: record and replay local modifications
//!
//! A change-set describes how a working copy differs from its upstream
//! baseline, laid out on disk as:
//!
//! ```text
//! generated-changes/
//!   overlay/<path>            files only present in the working copy
//!   exclude/<path>            empty markers for files to delete
//!   patch/<path>.patch        unified diffs for modified files
//!   dependencies/<name>/
//!     dependency.yaml         resolved source of the dependency
//!     generated-changes/      the dependency's own change-set
//! ```
//!
//! Replay order is fixed: patch, then exclude, then overlay. A patch needs
//! the file before exclusion, and an overlaid file must never be removed by
//! a later exclusion.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{CoreError, Result};
use crate::fsutil;
use crate::patch::DiffTool;
use crate::tree::{EntryKind, compare_trees};

/// Name every change-set root must end in
pub const CHANGES_DIR: &str = "generated-changes";
/// Files copied verbatim on replay
pub const OVERLAY_DIR: &str = "overlay";
/// Markers for files deleted on replay
pub const EXCLUDE_DIR: &str = "exclude";
/// Unified diffs applied on replay
pub const PATCH_DIR: &str = "patch";
/// Nested change-sets, one per dependency
pub const DEPENDENCIES_DIR: &str = "dependencies";
/// Suffix appended to the mirrored path of a patch file
pub const PATCH_SUFFIX: &str = ".patch";
/// Descriptor holding the resolved source of a dependency
pub const DEPENDENCY_DESCRIPTOR: &str = "dependency.yaml";

/// Options for [`ChangeSet::generate`]
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    /// Relative paths recorded as full replacements instead of patches
    pub replace_paths: Vec<PathBuf>,
    /// Relative path prefixes ignored entirely
    pub skip_paths: Vec<PathBuf>,
}

impl GenerateOptions {
    fn is_replaced(&self, relative: &Path) -> bool {
        self.replace_paths.iter().any(|p| p == relative)
    }

    fn is_skipped(&self, relative: &Path) -> bool {
        self.skip_paths.iter().any(|p| relative.starts_with(p))
    }
}

/// Relative paths touched by generating or applying a change-set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSummary {
    pub overlay: Vec<PathBuf>,
    pub exclude: Vec<PathBuf>,
    pub patch: Vec<PathBuf>,
}

impl ChangeSummary {
    /// Whether nothing was recorded or replayed
    pub fn is_empty(&self) -> bool {
        self.overlay.is_empty() && self.exclude.is_empty() && self.patch.is_empty()
    }

    /// Total number of entries
    pub fn len(&self) -> usize {
        self.overlay.len() + self.exclude.len() + self.patch.len()
    }
}

impl std::fmt::Display for ChangeSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} patched, {} excluded, {} overlaid",
            self.patch.len(),
            self.exclude.len(),
            self.overlay.len()
        )
    }
}

/// A change-set rooted at a `generated-changes` directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSet {
    root: PathBuf,
}

impl ChangeSet {
    /// Open the change-set rooted at `root`
    ///
    /// The root does not have to exist yet, but its last component must be
    /// `generated-changes`.
    pub fn at(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if root.file_name().and_then(|n| n.to_str()) != Some(CHANGES_DIR) {
            return Err(CoreError::InvalidChangesRoot {
                path: root.display().to_string(),
                expected: CHANGES_DIR.to_string(),
            });
        }
        Ok(Self { root })
    }

    /// Open the change-set stored directly under `parent`
    pub fn in_dir(parent: &Path) -> Self {
        Self {
            root: parent.join(CHANGES_DIR),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn overlay_dir(&self) -> PathBuf {
        self.root.join(OVERLAY_DIR)
    }

    pub fn exclude_dir(&self) -> PathBuf {
        self.root.join(EXCLUDE_DIR)
    }

    pub fn patch_dir(&self) -> PathBuf {
        self.root.join(PATCH_DIR)
    }

    pub fn dependencies_dir(&self) -> PathBuf {
        self.root.join(DEPENDENCIES_DIR)
    }

    /// Directory holding everything recorded for dependency `name`
    pub fn dependency_dir(&self, name: &str) -> PathBuf {
        self.dependencies_dir().join(name)
    }

    /// Nested change-set of dependency `name`
    pub fn dependency(&self, name: &str) -> ChangeSet {
        Self::in_dir(&self.dependency_dir(name))
    }

    /// Path of the descriptor for dependency `name`
    pub fn descriptor_path(&self, name: &str) -> PathBuf {
        self.dependency_dir(name).join(DEPENDENCY_DESCRIPTOR)
    }

    /// Names of dependencies with a recorded directory, sorted
    pub fn dependency_names(&self) -> Result<Vec<String>> {
        let dir = self.dependencies_dir();
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut names = BTreeSet::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                names.insert(entry.file_name().to_string_lossy().to_string());
            }
        }
        Ok(names.into_iter().collect())
    }

    pub fn exists(&self) -> bool {
        self.root.exists()
    }

    /// Whether no overlay, exclude or patch entries are recorded
    ///
    /// Nested dependency change-sets are not considered.
    pub fn is_empty(&self) -> Result<bool> {
        for dir in [self.overlay_dir(), self.exclude_dir(), self.patch_dir()] {
            if !files_under(&dir)?.is_empty() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Delete the whole change-set, nested dependency change-sets included
    pub fn clear(&self) -> Result<()> {
        fsutil::remove_path(&self.root)
    }

    /// Record the changes that turn `from` (upstream) into `to` (working copy)
    ///
    /// Any previous change-set at this root is deleted first, including the
    /// nested dependency change-sets, so stale entries never survive.
    pub fn generate(
        &self,
        from: &Path,
        to: &Path,
        options: &GenerateOptions,
        tool: &DiffTool,
    ) -> Result<ChangeSummary> {
        self.clear()?;

        let overlay = self.overlay_dir();
        let exclude = self.exclude_dir();
        let patch = self.patch_dir();
        let mut summary = ChangeSummary::default();

        compare_trees(from, to, |entry| {
            let relative = &entry.relative;
            if options.is_skipped(relative) {
                return Ok(());
            }

            match (entry.kind, entry.is_dir) {
                (EntryKind::RightOnly, true) => {
                    std::fs::create_dir_all(overlay.join(relative))?;
                }
                (EntryKind::RightOnly, false) => {
                    copy_file(&entry.right, &overlay.join(relative))?;
                    summary.overlay.push(relative.clone());
                }
                (EntryKind::LeftOnly, true) => {
                    std::fs::create_dir_all(exclude.join(relative))?;
                }
                (EntryKind::LeftOnly, false) => {
                    write_file(&exclude.join(relative), b"")?;
                    summary.exclude.push(relative.clone());
                }
                (EntryKind::Both, true) => {}
                (EntryKind::Both, false) => {
                    if options.is_replaced(relative) {
                        if std::fs::read(&entry.left)? != std::fs::read(&entry.right)? {
                            write_file(&exclude.join(relative), b"")?;
                            copy_file(&entry.right, &overlay.join(relative))?;
                            summary.exclude.push(relative.clone());
                            summary.overlay.push(relative.clone());
                        }
                        return Ok(());
                    }

                    if let Some(diff) = tool.diff(&entry.left, &entry.right, relative)? {
                        write_file(&patch.join(patch_name(relative)), &diff)?;
                        summary.patch.push(relative.clone());
                    }
                }
            }
            Ok(())
        })?;

        tracing::debug!("recorded {} in {}", summary, self.root.display());
        Ok(summary)
    }

    /// Replay this change-set onto `target`
    ///
    /// Subtrees that were never recorded are simply skipped.
    pub fn apply(&self, target: &Path, tool: &DiffTool) -> Result<ChangeSummary> {
        let mut summary = ChangeSummary::default();

        let patch_dir = self.patch_dir();
        for file in files_under(&patch_dir)? {
            let relative = strip_patch_suffix(&file);
            tool.apply(&patch_dir.join(&file), &target.join(&relative))?;
            summary.patch.push(relative);
        }

        let exclude_dir = self.exclude_dir();
        if exclude_dir.is_dir() {
            let walker = WalkDir::new(&exclude_dir)
                .min_depth(1)
                .contents_first(true)
                .sort_by_file_name();
            for entry in walker {
                let entry = entry?;
                let relative = entry
                    .path()
                    .strip_prefix(&exclude_dir)
                    .unwrap_or(entry.path())
                    .to_path_buf();
                let victim = target.join(&relative);

                if entry.file_type().is_dir() {
                    if fsutil::is_empty_dir(&victim)? {
                        std::fs::remove_dir(&victim)?;
                        fsutil::remove_empty_parents(&victim, target)?;
                    }
                } else {
                    fsutil::remove_path(&victim)?;
                    fsutil::remove_empty_parents(&victim, target)?;
                    summary.exclude.push(relative);
                }
            }
        }

        let overlay_dir = self.overlay_dir();
        if overlay_dir.is_dir() {
            for entry in WalkDir::new(&overlay_dir).min_depth(1).sort_by_file_name() {
                let entry = entry?;
                let relative = entry
                    .path()
                    .strip_prefix(&overlay_dir)
                    .unwrap_or(entry.path())
                    .to_path_buf();

                if entry.file_type().is_dir() {
                    std::fs::create_dir_all(target.join(&relative))?;
                } else {
                    copy_file(entry.path(), &target.join(&relative))?;
                    summary.overlay.push(relative);
                }
            }
        }

        tracing::debug!("applied {} to {}", summary, target.display());
        Ok(summary)
    }
}

/// Relative file paths under `dir`, sorted; empty when `dir` is missing
fn files_under(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_dir() {
            files.push(
                entry
                    .path()
                    .strip_prefix(dir)
                    .unwrap_or(entry.path())
                    .to_path_buf(),
            );
        }
    }
    Ok(files)
}

fn patch_name(relative: &Path) -> PathBuf {
    let mut name = relative.as_os_str().to_owned();
    name.push(PATCH_SUFFIX);
    PathBuf::from(name)
}

fn strip_patch_suffix(file: &Path) -> PathBuf {
    let text = file.to_string_lossy();
    PathBuf::from(text.strip_suffix(PATCH_SUFFIX).unwrap_or(&text))
}

fn copy_file(src: &Path, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    fsutil::remove_path(dest)?;
    std::fs::copy(src, dest)?;
    Ok(())
}

fn write_file(dest: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(dest, content)?;
    Ok(())
}
