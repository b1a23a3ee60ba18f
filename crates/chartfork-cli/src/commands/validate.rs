//! Validate command - compare regenerated charts with the released snapshot

use std::path::{Path, PathBuf};

use chartfork_build::{ValidateOptions, validate_repository};
use console::style;

use crate::error::Result;

pub async fn run(
    repo_root: &Path,
    package: Option<&str>,
    reference: Option<PathBuf>,
    keep: bool,
    drop_release_candidates: bool,
) -> Result<()> {
    let (config, ctx) = super::build_context(repo_root)?;
    let options = ValidateOptions {
        package: package.map(str::to_string),
        reference,
        drop_release_candidates,
        keep_candidate: keep,
    };

    let bar = super::spinner("Regenerating charts");
    let report = validate_repository(&ctx, &config, &options).await;
    bar.finish_and_clear();
    let report = report?;

    for folded in &report.folded {
        println!("{} {}", style("Folded").cyan(), folded);
    }
    for skipped in &report.skipped {
        println!("{} {} (pending release)", style("Skipped").yellow(), skipped);
    }
    println!(
        "{} no drift in {} compared entries",
        style("Validation passed:").green().bold(),
        report.compared
    );
    Ok(())
}
