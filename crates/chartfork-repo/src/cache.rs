//! On-disk content cache for immutable sources
//!
//! Entries are directories named by [`Source::cache_key`](crate::Source::cache_key).
//! They are written under a temporary name and renamed into place, so an
//! entry that exists is complete.

use std::path::{Path, PathBuf};

use chartfork_core::fsutil;

use crate::error::{RepoError, Result};

const PARTIAL_SUFFIX: &str = ".partial";

#[derive(Debug, Clone)]
pub struct ContentCache {
    dir: PathBuf,
}

impl ContentCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `<user cache dir>/chartfork`
    pub fn default_dir() -> Option<PathBuf> {
        dirs::cache_dir().map(|d| d.join("chartfork"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(RepoError::CacheError {
                message: format!("invalid cache key '{}'", key),
            });
        }
        Ok(self.dir.join(key))
    }

    /// Copy entry `key` to `dest`; `false` on a miss
    pub fn restore(&self, key: &str, dest: &Path) -> Result<bool> {
        let entry = self.entry(key)?;
        if !entry.is_dir() {
            return Ok(false);
        }

        if fsutil::is_empty_dir(&entry)? {
            tracing::warn!("discarding empty cache entry {}", entry.display());
            fsutil::remove_path(&entry)?;
            return Ok(false);
        }

        tracing::debug!("cache hit {}", key);
        fsutil::remove_path(dest)?;
        fsutil::copy_dir(&entry, dest)?;
        Ok(true)
    }

    /// Store a copy of `src` as entry `key`; an existing entry is kept
    pub fn store(&self, key: &str, src: &Path) -> Result<()> {
        let entry = self.entry(key)?;
        if entry.exists() {
            return Ok(());
        }

        let partial = self.dir.join(format!("{}{}", key, PARTIAL_SUFFIX));
        fsutil::remove_path(&partial)?;
        fsutil::copy_dir(src, &partial)?;
        std::fs::rename(&partial, &entry)?;
        tracing::debug!("cached {} as {}", src.display(), key);
        Ok(())
    }

    /// Remove every entry
    pub fn clear(&self) -> Result<()> {
        fsutil::remove_path(&self.dir)?;
        Ok(())
    }
}
