//! Patch command - record edits of prepared charts

use std::path::Path;

use chartfork_build::Package;
use console::style;

use crate::error::Result;

pub async fn run(repo_root: &Path, package: Option<&str>) -> Result<()> {
    let (_, ctx) = super::build_context(repo_root)?;

    for package in Package::load_all(repo_root, package)? {
        let bar = super::spinner(format!("Recording changes of {}", package.name));
        let recorded = package.generate_patch(&ctx).await;
        bar.finish_and_clear();
        recorded?;

        println!(
            "{} {} in {}",
            style("Recorded").green().bold(),
            package.name,
            package.chart.changes.root().display()
        );
    }
    Ok(())
}
