//! CLI commands

pub mod cache;
pub mod charts;
pub mod clean;
pub mod list;
pub mod patch;
pub mod prepare;
pub mod release;
pub mod validate;

use std::borrow::Cow;
use std::path::Path;
use std::time::Duration;

use chartfork_build::{BuildContext, RepoConfig};
use indicatif::{ProgressBar, ProgressStyle};

use crate::error::Result;

/// Configuration and build context of the repository at `repo_root`
pub(crate) fn build_context(repo_root: &Path) -> Result<(RepoConfig, BuildContext)> {
    let config = RepoConfig::load(repo_root)?;
    let ctx = BuildContext::new(repo_root, &config)?;
    Ok((config, ctx))
}

/// Spinner shown while a package is pulled or packaged
pub(crate) fn spinner(message: impl Into<Cow<'static, str>>) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        bar.set_style(style);
    }
    bar.set_message(message);
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}
