//! Charts command - release prepared charts into assets/ and charts/

use std::path::Path;

use chartfork_build::Package;
use console::style;

use crate::error::Result;

pub async fn run(repo_root: &Path, package: Option<&str>, overwrite: bool) -> Result<()> {
    let (_, ctx) = super::build_context(repo_root)?;

    for mut package in Package::load_all(repo_root, package)? {
        let bar = super::spinner(format!("Generating charts of {}", package.name));
        let generated = match package.prepare(&ctx).await {
            Ok(()) => package.generate_charts(repo_root, !overwrite),
            Err(e) => Err(e),
        };
        bar.finish_and_clear();
        package.clean()?;

        for chart in generated? {
            let archive = chart
                .archive_path
                .strip_prefix(repo_root)
                .unwrap_or(&chart.archive_path);
            println!(
                "{} {} {} {}",
                style("Generated").green().bold(),
                chart.name,
                chart.version,
                style(archive.display()).dim()
            );
        }
    }
    Ok(())
}
