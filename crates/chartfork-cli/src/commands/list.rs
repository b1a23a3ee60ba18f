//! List command - show the packages of the repository

use std::path::Path;

use chartfork_build::Package;
use console::style;

use crate::error::Result;

pub fn run(repo_root: &Path, package: Option<&str>) -> Result<()> {
    let packages = Package::load_all(repo_root, package)?;
    if packages.is_empty() {
        println!("No packages found");
        return Ok(());
    }

    for package in packages {
        let mut flags = Vec::new();
        if let Some(version) = &package.manifest.version {
            flags.push(format!("version {}", version));
        }
        if !package.additional_charts.is_empty() {
            flags.push(format!("+{} charts", package.additional_charts.len()));
        }
        if package.manifest.do_not_release {
            flags.push("not released".to_string());
        }

        println!(
            "{}  {}  {}",
            style(&package.name).bold(),
            package.chart.source,
            style(flags.join(", ")).dim()
        );
    }
    Ok(())
}
