//! Clean command - delete package working directories

use std::path::Path;

use chartfork_build::Package;
use console::style;

use crate::error::Result;

pub fn run(repo_root: &Path, package: Option<&str>) -> Result<()> {
    for package in Package::load_all(repo_root, package)? {
        package.clean()?;
        println!("{} {}", style("Cleaned").green().bold(), package.name);
    }
    Ok(())
}
