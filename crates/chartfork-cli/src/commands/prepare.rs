//! Prepare command - pull charts and apply their change-sets

use std::path::Path;

use chartfork_build::Package;
use console::style;

use crate::error::Result;

pub async fn run(repo_root: &Path, package: Option<&str>) -> Result<()> {
    let (_, ctx) = super::build_context(repo_root)?;

    for mut package in Package::load_all(repo_root, package)? {
        let bar = super::spinner(format!("Preparing {}", package.name));
        let prepared = package.prepare(&ctx).await;
        bar.finish_and_clear();
        prepared?;

        println!(
            "{} {} {}",
            style("Prepared").green().bold(),
            package.name,
            style(format!(
                "(upstream {})",
                package.chart.upstream_version.as_deref().unwrap_or("?")
            ))
            .dim()
        );
    }
    Ok(())
}
