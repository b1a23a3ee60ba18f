//! Shared state for pulling sources

use std::path::{Path, PathBuf};

use crate::cache::ContentCache;
use crate::error::Result;

/// Everything a pull needs besides the locator itself
#[derive(Debug, Clone)]
pub struct PullContext {
    repo_root: PathBuf,
    client: reqwest::Client,
    cache: Option<ContentCache>,
}

impl PullContext {
    /// Context for the repository rooted at `repo_root`, without a cache
    pub fn new(repo_root: impl Into<PathBuf>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("chartfork/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            repo_root: repo_root.into(),
            client,
            cache: None,
        })
    }

    /// Use `cache` for immutable sources
    pub fn with_cache(mut self, cache: ContentCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn cache(&self) -> Option<&ContentCache> {
        self.cache.as_ref()
    }
}
