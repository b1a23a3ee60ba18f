//! Release registry (`release.yaml`)
//!
//! Lists chart versions that are pending release. Validation skips them
//! since their content is expected to differ from the reference.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Registry file name at the repository root
pub const RELEASE_FILE: &str = "release.yaml";

/// Chart name to versions pending release
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReleaseRegistry {
    charts: BTreeMap<String, Vec<String>>,
}

impl ReleaseRegistry {
    /// Load `path`, an absent file being an empty registry
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_yaml::to_string(self)?)?;
        Ok(())
    }

    pub fn contains(&self, chart: &str, version: &str) -> bool {
        self.charts
            .get(chart)
            .is_some_and(|versions| versions.iter().any(|v| v == version))
    }

    /// Record `version` of `chart`; returns false if it was already listed
    pub fn add(&mut self, chart: &str, version: &str) -> bool {
        let versions = self.charts.entry(chart.to_string()).or_default();
        if versions.iter().any(|v| v == version) {
            return false;
        }
        versions.push(version.to_string());
        true
    }

    pub fn is_empty(&self) -> bool {
        self.charts.values().all(Vec::is_empty)
    }

    /// `(chart, version)` pairs in chart order
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.charts
            .iter()
            .flat_map(|(chart, versions)| versions.iter().map(move |v| (chart.as_str(), v.as_str())))
    }
}
