//! Drift validation of generated charts
//!
//! Generated `assets/` and `charts/` are compared with a reference
//! snapshot, usually the released branch. Trees are walked down to
//! `charts/<package>/<chart>/<version>`, where whole directories are
//! compared by content hash; anything present on only one side is new or
//! removed content, not drift.
//!
//! Release candidates are folded first: among `1.0.0-rc1`, `1.0.0-rc2`
//! only the last survives, renamed to `1.0.0`, so a candidate build
//! compares against the final release it turned into.

use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsString;
use std::path::{Component, Path};
use std::sync::LazyLock;

use chartfork_core::archive::create_archive;
use chartfork_core::chart::{self, LoadedChart};
use chartfork_core::{fsutil, hash_dir, hash_file};
use regex::Regex;

use crate::error::{BuildError, Result};
use crate::git::GitWorkspace;
use crate::package::{ASSETS_DIR, CHARTS_DIR, PACKAGES_DIR};
use crate::release::ReleaseRegistry;

/// Depth of `charts/<package>/<chart>/<version>`, compared as a whole
pub const COMPARE_DEPTH: usize = 4;

/// `charts/` first, so drift names the version directory
const MIRRORED_DIRS: [&str; 2] = [CHARTS_DIR, ASSETS_DIR];

static NUMERIC_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("valid regex"));

#[derive(Debug, Clone, Copy, Default)]
pub struct CompareOptions<'a> {
    /// Fold release candidates of the candidate tree before comparing
    pub drop_release_candidates: bool,
    /// Copy the candidate into `live_root` when nothing drifted
    pub keep_candidate_if_no_drift: bool,
    pub live_root: Option<&'a Path>,
    /// Versions pending release, skipped by the comparison
    pub registry: Option<&'a ReleaseRegistry>,
}

/// What a successful comparison did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriftReport {
    /// Release candidates renamed to their base version
    pub folded: Vec<String>,
    /// Entries skipped as pending release
    pub skipped: Vec<String>,
    /// Entries compared by hash
    pub compared: usize,
}

/// Compares a candidate tree of generated charts with a reference
#[derive(Debug, Clone, Default)]
pub struct DriftValidator {
    workspace: Option<GitWorkspace>,
}

impl DriftValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore tracked `packages/` content of `workspace` after comparing
    ///
    /// Uncommitted edits there are lost, see [`GitWorkspace::ensure_clean`].
    pub fn with_workspace(workspace: GitWorkspace) -> Self {
        Self {
            workspace: Some(workspace),
        }
    }

    /// Compare `candidate` against `reference`
    ///
    /// The first differing entry is reported as [`BuildError::Drift`].
    pub fn compare(
        &self,
        reference: &Path,
        candidate: &Path,
        options: &CompareOptions<'_>,
    ) -> Result<DriftReport> {
        let result = self.compare_trees(reference, candidate, options);

        if let Some(workspace) = &self.workspace {
            let restored = workspace.restore_tracked(&[PACKAGES_DIR]);
            match (&result, restored) {
                (Ok(_), Err(e)) => return Err(e),
                (Err(_), Err(e)) => tracing::warn!("could not restore {}: {}", PACKAGES_DIR, e),
                _ => {}
            }
        }
        result
    }

    fn compare_trees(
        &self,
        reference: &Path,
        candidate: &Path,
        options: &CompareOptions<'_>,
    ) -> Result<DriftReport> {
        let mut report = DriftReport::default();
        if options.drop_release_candidates {
            report.folded = fold_release_candidates(candidate)?;
        }

        for dir in MIRRORED_DIRS {
            compare_level(
                reference,
                candidate,
                Path::new(dir),
                1,
                options.registry,
                &mut report,
            )?;
        }
        tracing::info!(
            "no drift: {} entries compared, {} pending release",
            report.compared,
            report.skipped.len()
        );

        if options.keep_candidate_if_no_drift
            && let Some(live_root) = options.live_root
        {
            for dir in MIRRORED_DIRS {
                let generated = candidate.join(dir);
                if generated.is_dir() {
                    fsutil::copy_dir(&generated, &live_root.join(dir))?;
                }
            }
            tracing::info!("kept generated charts in {}", live_root.display());
        }

        Ok(report)
    }
}

fn compare_level(
    reference: &Path,
    candidate: &Path,
    relative: &Path,
    depth: usize,
    registry: Option<&ReleaseRegistry>,
    report: &mut DriftReport,
) -> Result<()> {
    let left = reference.join(relative);
    let right = candidate.join(relative);
    if !left.exists() || !right.exists() {
        return Ok(());
    }

    let rel_path = relative.to_string_lossy().replace('\\', "/");
    if registry.is_some_and(|r| is_pending_release(relative, r)) {
        tracing::debug!("skipping {}: pending release", rel_path);
        report.skipped.push(rel_path);
        return Ok(());
    }

    let same = match (left.is_dir(), right.is_dir()) {
        (true, true) if depth < COMPARE_DEPTH => {
            for name in child_names(&left, &right)? {
                compare_level(
                    reference,
                    candidate,
                    &relative.join(name),
                    depth + 1,
                    registry,
                    report,
                )?;
            }
            return Ok(());
        }
        (true, true) => hash_dir(&left)? == hash_dir(&right)?,
        (false, false) => hash_file(&left)? == hash_file(&right)?,
        _ => false,
    };

    report.compared += 1;
    if !same {
        return Err(BuildError::Drift { path: rel_path });
    }
    Ok(())
}

fn child_names(left: &Path, right: &Path) -> Result<BTreeSet<OsString>> {
    let mut names = BTreeSet::new();
    for dir in [left, right] {
        for entry in std::fs::read_dir(dir)? {
            names.insert(entry?.file_name());
        }
    }
    Ok(names)
}

/// Whether `relative` is a chart version or archive listed in `registry`
fn is_pending_release(relative: &Path, registry: &ReleaseRegistry) -> bool {
    let parts: Vec<_> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect();

    match parts.as_slice() {
        [CHARTS_DIR, _, chart, version] => registry.contains(chart, version),
        [ASSETS_DIR, _, file] => registry
            .entries()
            .any(|(chart, version)| *file == format!("{}-{}.tgz", chart, version)),
        _ => false,
    }
}

fn sorted_subdirs(dir: &Path) -> Result<Vec<String>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
    }
    names.sort();
    Ok(names)
}

/// Fold release candidates under `<root>/charts` into their base version
///
/// Returns the survivors as `charts/<package>/<chart>/<version>`. A group
/// whose base version already exists only has its candidates removed.
pub fn fold_release_candidates(root: &Path) -> Result<Vec<String>> {
    let charts_root = root.join(CHARTS_DIR);
    let mut folded = Vec::new();

    for package in sorted_subdirs(&charts_root)? {
        let assets = root.join(ASSETS_DIR).join(&package);

        for chart_name in sorted_subdirs(&charts_root.join(&package))? {
            let chart_dir = charts_root.join(&package).join(&chart_name);
            let versions = sorted_subdirs(&chart_dir)?;

            let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
            for version in &versions {
                let Ok(parsed) = semver::Version::parse(version) else {
                    continue;
                };
                if parsed.pre.is_empty() {
                    continue;
                }
                let base = semver::Version {
                    pre: semver::Prerelease::EMPTY,
                    ..parsed
                };
                groups
                    .entry(base.to_string())
                    .or_default()
                    .push(version.clone());
            }

            for (base, mut candidates) in groups {
                check_padding(&chart_name, &candidates)?;
                candidates.sort();
                let Some(winner) = candidates.pop() else {
                    continue;
                };

                for loser in &candidates {
                    tracing::debug!("dropping release candidate {} {}", chart_name, loser);
                    fsutil::remove_path(&chart_dir.join(loser))?;
                    fsutil::remove_path(&assets.join(format!("{}-{}.tgz", chart_name, loser)))?;
                }
                fsutil::remove_path(&assets.join(format!("{}-{}.tgz", chart_name, winner)))?;

                if versions.contains(&base) {
                    fsutil::remove_path(&chart_dir.join(&winner))?;
                    continue;
                }

                let target = chart_dir.join(&base);
                fsutil::move_dir(&chart_dir.join(&winner), &target)?;
                chart::set_version(&target, &base)?;
                let name = LoadedChart::load(&target)?.metadata.name;
                create_archive(&target, &name, &assets.join(format!("{}-{}.tgz", name, base)))?;

                tracing::info!("folded {} {} into {}", chart_name, winner, base);
                folded.push(format!("{}/{}/{}/{}", CHARTS_DIR, package, chart_name, base));
            }
        }
    }

    Ok(folded)
}

/// Reject pre-release groups whose numbers are not zero-padded alike
///
/// Lexicographic order only matches numeric order when every numeric run
/// at the same position has the same width (`rc09` < `rc10`, `rc9` > `rc10`).
fn check_padding(chart: &str, versions: &[String]) -> Result<()> {
    let runs: Vec<Vec<usize>> = versions
        .iter()
        .map(|v| {
            let pre = v.split_once('-').map_or("", |(_, rest)| rest);
            let pre = pre.split_once('+').map_or(pre, |(pre, _)| pre);
            NUMERIC_RUN.find_iter(pre).map(|m| m.len()).collect()
        })
        .collect();

    let Some(first) = runs.first() else {
        return Ok(());
    };
    if runs.iter().any(|widths| widths != first) {
        return Err(BuildError::UnpaddedPrerelease {
            chart: chart.to_string(),
            versions: versions.join(", "),
        });
    }
    Ok(())
}
