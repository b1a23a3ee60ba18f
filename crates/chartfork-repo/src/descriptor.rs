//! Dependency descriptors
//!
//! A descriptor pins the resolved source of a dependency next to its
//! nested change-set, so later runs reuse it instead of resolving a
//! floating version again.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::source::Source;

/// Contents of `dependency.yaml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyDescriptor {
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subdirectory: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,

    /// SHA-256 of an archive download
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

impl DependencyDescriptor {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_yaml::to_string(self)?)?;
        Ok(())
    }

    pub fn to_source(&self) -> Result<Source> {
        Ok(Source::from_options(
            &self.url,
            self.subdirectory.as_deref(),
            self.commit.as_deref(),
            self.branch.as_deref(),
        )?
        .with_digest(self.digest.clone()))
    }
}

impl From<&Source> for DependencyDescriptor {
    fn from(source: &Source) -> Self {
        Self {
            url: source.url(),
            subdirectory: source.subdirectory().map(str::to_string),
            commit: source.commit().map(str::to_string),
            branch: source.branch().map(str::to_string),
            digest: source.digest().map(str::to_string),
        }
    }
}

/// A discovered dependency and where it comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyRecord {
    pub name: String,
    pub source: Source,
}

impl DependencyRecord {
    pub fn new(name: impl Into<String>, source: Source) -> Self {
        Self {
            name: name.into(),
            source,
        }
    }

    /// Whether the dependency is another package of this repository
    pub fn is_local_package(&self) -> bool {
        self.source.is_local_package()
    }
}
