//! Helm repository indexes and the serialized dependency resolver
//!
//! Resolving a locked dependency against an HTTP Helm repository means
//! downloading that repository's `index.yaml` and looking up the download
//! URL of one exact version. Every such query goes through a single
//! [`IndexResolver`] lock, so remote repositories only ever see one
//! request at a time from this process. Results are cached for the whole
//! run, both per repository index and per dependency.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use url::Url;

use crate::error::{RepoError, Result};
use crate::source::Source;

/// Repository index (`index.yaml`)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryIndex {
    #[serde(default)]
    pub api_version: Option<String>,

    /// Chart versions indexed by chart name
    #[serde(default)]
    pub entries: HashMap<String, Vec<ChartEntry>>,
}

impl RepositoryIndex {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| RepoError::IndexParseError {
            message: e.to_string(),
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let yaml = std::str::from_utf8(bytes).map_err(|e| RepoError::IndexParseError {
            message: format!("Invalid UTF-8: {}", e),
        })?;
        Self::from_yaml(yaml)
    }

    /// Entry of chart `name` at exactly `version`
    pub fn get_version(&self, name: &str, version: &str) -> Option<&ChartEntry> {
        self.entries
            .get(name)?
            .iter()
            .find(|e| e.version == version)
    }
}

/// One chart version in an index
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChartEntry {
    pub name: String,

    pub version: String,

    /// Download URLs, absolute or relative to the repository URL
    #[serde(default)]
    pub urls: Vec<String>,

    /// SHA-256 of the chart archive
    #[serde(default)]
    pub digest: Option<String>,
}

impl ChartEntry {
    /// Absolute download URL, resolving relative URLs against `repo_url`
    pub fn download_url(&self, repo_url: &str) -> Result<String> {
        let url = self.urls.first().ok_or_else(|| RepoError::ChartNotFound {
            name: self.name.clone(),
            repo: repo_url.to_string(),
        })?;

        if let Ok(absolute) = Url::parse(url) {
            return Ok(absolute.to_string());
        }

        let base = Url::parse(&format!("{}/", repo_url.trim_end_matches('/'))).map_err(|e| {
            RepoError::InvalidRepositoryUrl {
                url: repo_url.to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(base.join(url)?.to_string())
    }
}

/// Retrieves repository indexes
#[async_trait]
pub trait IndexFetcher: Send + Sync {
    async fn fetch_index(&self, repo_url: &str) -> Result<RepositoryIndex>;
}

#[derive(Default)]
struct ResolverState {
    /// Resolved sources keyed by `repository|name|version`
    sources: HashMap<String, Source>,
    /// Indexes keyed by repository URL
    indexes: HashMap<String, Arc<RepositoryIndex>>,
}

/// Serialized, caching resolver of locked dependencies to archive sources
pub struct IndexResolver {
    fetcher: Box<dyn IndexFetcher>,
    state: Mutex<ResolverState>,
}

impl IndexResolver {
    pub fn new(fetcher: impl IndexFetcher + 'static) -> Self {
        Self {
            fetcher: Box::new(fetcher),
            state: Mutex::new(ResolverState::default()),
        }
    }

    /// Source of chart `name` at `version` in the Helm repository `repo_url`
    ///
    /// The chart is expected at `<name>/` inside the downloaded archive.
    pub async fn resolve(&self, name: &str, version: &str, repo_url: &str) -> Result<Source> {
        let key = format!("{}|{}|{}", repo_url.trim_end_matches('/'), name, version);
        let mut state = self.state.lock().await;

        if let Some(source) = state.sources.get(&key) {
            return Ok(source.clone());
        }

        let index = match state.indexes.get(repo_url) {
            Some(index) => Arc::clone(index),
            None => {
                tracing::info!("fetching index of {}", repo_url);
                let index = Arc::new(self.fetcher.fetch_index(repo_url).await?);
                state
                    .indexes
                    .insert(repo_url.to_string(), Arc::clone(&index));
                index
            }
        };

        let entry = index
            .get_version(name, version)
            .ok_or_else(|| RepoError::VersionNotFound {
                name: name.to_string(),
                version: version.to_string(),
                repo: repo_url.to_string(),
            })?;

        let source = Source::Archive {
            url: entry.download_url(repo_url)?,
            subdirectory: Some(name.to_string()),
            digest: entry.digest.clone().filter(|d| !d.trim().is_empty()),
        };
        tracing::debug!("resolved {}@{} to {}", name, version, source);

        state.sources.insert(key, source.clone());
        Ok(source)
    }
}

impl std::fmt::Debug for IndexResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexResolver").finish_non_exhaustive()
    }
}
