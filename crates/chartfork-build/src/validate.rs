//! Repository-wide validation
//!
//! Every package is regenerated into a scratch tree which is then compared
//! with the released snapshot.

use std::path::PathBuf;

use tempfile::TempDir;

use crate::config::RepoConfig;
use crate::drift::{CompareOptions, DriftReport, DriftValidator};
use crate::error::Result;
use crate::git::GitWorkspace;
use crate::package::{BuildContext, PACKAGES_DIR, Package};
use crate::release::{RELEASE_FILE, ReleaseRegistry};

#[derive(Debug, Clone, Default)]
pub struct ValidateOptions {
    /// Only validate this package
    pub package: Option<String>,
    /// Local snapshot to compare with, instead of the configured branch
    pub reference: Option<PathBuf>,
    pub drop_release_candidates: bool,
    /// Keep the regenerated charts in the repository when nothing drifted
    pub keep_candidate: bool,
}

/// Regenerate the charts of the repository and compare them with the
/// reference snapshot
///
/// The reference is `options.reference`, else a clone of the branch named
/// in `configuration.yaml`, else the repository itself. In a git checkout,
/// tracked files under `packages/` must be committed first: they are
/// restored to `HEAD` once the comparison is done.
pub async fn validate_repository(
    ctx: &BuildContext,
    config: &RepoConfig,
    options: &ValidateOptions,
) -> Result<DriftReport> {
    let repo_root = ctx.repo_root();
    let workspace = match GitWorkspace::open(repo_root) {
        Ok(workspace) => {
            workspace.ensure_clean(&[PACKAGES_DIR])?;
            Some(workspace)
        }
        Err(e) => {
            tracing::debug!("{} is not a git checkout: {}", repo_root.display(), e);
            None
        }
    };

    let candidate = TempDir::new()?;
    for mut package in Package::load_all(repo_root, options.package.as_deref())? {
        package.prepare(ctx).await?;
        let generated = package.generate_charts(candidate.path(), false);
        package.clean()?;
        generated?;
    }

    let mut _checkout: Option<TempDir> = None;
    let reference = match (&options.reference, &config.validate) {
        (Some(path), _) => path.clone(),
        (None, Some(remote)) => {
            let dir = TempDir::new()?;
            let dest = dir.path().join("reference");
            tracing::info!("cloning {}#{} as reference", remote.url, remote.branch);
            GitWorkspace::clone_branch(&remote.url, &remote.branch, &dest)?;
            _checkout = Some(dir);
            dest
        }
        (None, None) => repo_root.to_path_buf(),
    };

    let registry = ReleaseRegistry::load(&repo_root.join(RELEASE_FILE))?;
    let validator = match workspace {
        Some(workspace) => DriftValidator::with_workspace(workspace),
        None => DriftValidator::new(),
    };

    validator.compare(
        &reference,
        candidate.path(),
        &CompareOptions {
            drop_release_candidates: options.drop_release_candidates,
            keep_candidate_if_no_drift: options.keep_candidate,
            live_root: Some(repo_root),
            registry: Some(&registry),
        },
    )
}
