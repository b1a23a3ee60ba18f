//! Release command - mark chart versions as pending release

use std::path::Path;

use chartfork_build::ReleaseRegistry;
use chartfork_build::release::RELEASE_FILE;
use console::style;

use crate::error::Result;

pub fn run(repo_root: &Path, chart: &str, version: &str) -> Result<()> {
    let path = repo_root.join(RELEASE_FILE);
    let mut registry = ReleaseRegistry::load(&path)?;

    if !registry.add(chart, version) {
        println!("{} {} {} is already listed", style("Unchanged").dim(), chart, version);
        return Ok(());
    }
    registry.save(&path)?;
    println!("{} {} {} to {}", style("Added").green().bold(), chart, version, RELEASE_FILE);
    Ok(())
}
