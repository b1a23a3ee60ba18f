//! Repository configuration (`configuration.yaml`)

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BuildError, Result};

/// Configuration file name at the repository root
pub const CONFIG_FILE: &str = "configuration.yaml";

/// Optional repository-wide settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoConfig {
    /// Reference snapshot generated charts are validated against
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validate: Option<ValidateConfig>,

    #[serde(default)]
    pub cache: CacheConfig,
}

/// Git branch holding the released `assets/` and `charts/`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateConfig {
    pub url: String,
    pub branch: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Cache location, `<user cache dir>/chartfork` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
        }
    }
}

fn default_true() -> bool {
    true
}

impl RepoConfig {
    /// Load the configuration of the repository at `repo_root`
    ///
    /// A missing file yields the defaults.
    pub fn load(repo_root: &Path) -> Result<Self> {
        let path = repo_root.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)?;
        serde_yaml::from_str(&content).map_err(|e| BuildError::InvalidConfig {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Directory of the content cache, `None` when caching is off
    pub fn cache_dir(&self) -> Option<PathBuf> {
        if !self.cache.enabled {
            return None;
        }
        self.cache
            .dir
            .clone()
            .or_else(|| dirs::cache_dir().map(|d| d.join("chartfork")))
    }
}
