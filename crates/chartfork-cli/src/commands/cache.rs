//! Cache command - drop cached upstream checkouts

use std::path::Path;

use chartfork_build::RepoConfig;
use chartfork_repo::ContentCache;
use console::style;

use crate::error::Result;

pub fn clear(repo_root: &Path) -> Result<()> {
    let config = RepoConfig::load(repo_root)?;
    let Some(dir) = config.cache_dir() else {
        println!("Content cache is disabled");
        return Ok(());
    };

    ContentCache::new(&dir).clear()?;
    println!("{} {}", style("Cleared").green().bold(), dir.display());
    Ok(())
}
