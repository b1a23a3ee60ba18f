//! Package manifests (`packages/<name>/package.yaml`)

use std::collections::HashSet;
use std::path::{Component, Path};

use chartfork_repo::Source;
use serde::{Deserialize, Serialize};

use crate::error::{BuildError, Result};

/// Manifest file name inside a package directory
pub const PACKAGE_FILE: &str = "package.yaml";

/// Default working directory of the main chart
pub const DEFAULT_WORKING_DIR: &str = "charts";

/// Contents of `package.yaml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageManifest {
    /// Main chart source locator
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subdirectory: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,

    /// Package version counter, prefixed to the upstream version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default = "default_working_dir")]
    pub working_dir: String,

    #[serde(default)]
    pub do_not_release: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignore_dependencies: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replace_paths: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_charts: Vec<AdditionalChartOptions>,
}

fn default_working_dir() -> String {
    DEFAULT_WORKING_DIR.to_string()
}

/// One entry of `additionalCharts`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalChartOptions {
    pub working_dir: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_options: Option<UpstreamOptions>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crd_options: Option<CrdOptions>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignore_dependencies: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replace_paths: Vec<String>,
}

/// Source of an additional chart pulled from its own upstream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamOptions {
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subdirectory: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

impl UpstreamOptions {
    pub fn source(&self) -> Result<Source> {
        Ok(Source::from_options(
            &self.url,
            self.subdirectory.as_deref(),
            self.commit.as_deref(),
            self.branch.as_deref(),
        )?)
    }
}

/// Companion chart carrying the main chart's CRDs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrdOptions {
    /// Chart skeleton, relative to the package directory
    pub template_directory: String,

    /// Directory of the companion chart receiving the CRD files
    #[serde(default = "default_crd_directory")]
    pub crd_directory: String,

    /// Make the main chart refuse to render when the CRDs are missing
    #[serde(default, rename = "addCRDValidationToMainChart")]
    pub add_crd_validation_to_main_chart: bool,
}

fn default_crd_directory() -> String {
    "templates".to_string()
}

impl PackageManifest {
    /// Load and validate the manifest at `path`
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let manifest: Self =
            serde_yaml::from_str(&content).map_err(|e| BuildError::InvalidManifest {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        manifest.validate(path)?;
        Ok(manifest)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_yaml::to_string(self)?)?;
        Ok(())
    }

    /// Source of the main chart
    pub fn source(&self) -> Result<Source> {
        Ok(Source::from_options(
            &self.url,
            self.subdirectory.as_deref(),
            self.commit.as_deref(),
            self.branch.as_deref(),
        )?)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        let invalid = |message: String| BuildError::InvalidManifest {
            path: path.display().to_string(),
            message,
        };

        if self.url.trim().is_empty() {
            return Err(invalid("url must not be empty".to_string()));
        }
        if let Some(version) = &self.version {
            semver::Version::parse(version)
                .map_err(|e| invalid(format!("version '{}': {}", version, e)))?;
        }

        let mut working_dirs = HashSet::new();
        working_dirs.insert(self.working_dir.as_str());
        check_working_dir(&self.working_dir).map_err(&invalid)?;

        for chart in &self.additional_charts {
            check_working_dir(&chart.working_dir).map_err(&invalid)?;
            if !working_dirs.insert(chart.working_dir.as_str()) {
                return Err(invalid(format!(
                    "working directory '{}' is used twice",
                    chart.working_dir
                )));
            }
            match (&chart.upstream_options, &chart.crd_options) {
                (Some(_), None) | (None, Some(_)) => {}
                _ => {
                    return Err(invalid(format!(
                        "additional chart '{}' needs exactly one of upstreamOptions or crdOptions",
                        chart.working_dir
                    )));
                }
            }
        }

        let crd_charts = self
            .additional_charts
            .iter()
            .filter(|c| c.crd_options.is_some())
            .count();
        if crd_charts > 1 {
            return Err(invalid("at most one additional chart may use crdOptions".to_string()));
        }
        Ok(())
    }

    /// Options of the CRD companion chart, if any
    pub fn crd_options(&self) -> Option<&CrdOptions> {
        self.additional_charts
            .iter()
            .find_map(|c| c.crd_options.as_ref())
    }
}

/// A working directory must be a plain relative path
fn check_working_dir(dir: &str) -> std::result::Result<(), String> {
    let path = Path::new(dir);
    let plain = !dir.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if !plain || dir == chartfork_core::CHANGES_DIR {
        return Err(format!("invalid working directory '{}'", dir));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn load(content: &str) -> Result<PackageManifest> {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(PACKAGE_FILE);
        std::fs::write(&path, content).unwrap();
        PackageManifest::load(&path)
    }

    #[test]
    fn test_full_manifest() {
        let manifest = load(
            r#"url: https://github.com/prometheus-community/helm-charts.git
subdirectory: charts/kube-prometheus-stack
commit: 0b8d3a2
version: 102.0.0
doNotRelease: false
ignoreDependencies:
  - grafana
replacePaths:
  - values.yaml
additionalCharts:
  - workingDir: charts-crd
    crdOptions:
      templateDirectory: crd-template
      crdDirectory: crd-manifest
      addCRDValidationToMainChart: true
  - workingDir: charts-exporter
    upstreamOptions:
      url: https://charts.example.com/exporter-1.0.0.tgz
"#,
        )
        .unwrap();

        assert_eq!(manifest.working_dir, "charts");
        assert_eq!(manifest.version.as_deref(), Some("102.0.0"));
        assert_eq!(manifest.ignore_dependencies, vec!["grafana"]);
        assert!(manifest.source().unwrap().commit().is_some());

        let crd = manifest.additional_charts[0].crd_options.as_ref().unwrap();
        assert_eq!(crd.crd_directory, "crd-manifest");
        assert!(crd.add_crd_validation_to_main_chart);

        let upstream = manifest.additional_charts[1]
            .upstream_options
            .as_ref()
            .unwrap();
        assert!(matches!(upstream.source().unwrap(), Source::Archive { .. }));
    }

    #[test]
    fn test_local_manifest_defaults() {
        let manifest = load("url: local\n").unwrap();
        assert!(manifest.source().unwrap().is_local());
        assert!(!manifest.do_not_release);
        assert!(manifest.additional_charts.is_empty());
    }

    #[test]
    fn test_rejects_ambiguous_additional_chart() {
        let err = load(
            "url: local\nadditionalCharts:\n  - workingDir: extra\n",
        )
        .unwrap_err();
        assert!(matches!(err, BuildError::InvalidManifest { .. }));
    }

    #[test]
    fn test_rejects_bad_working_dirs() {
        assert!(load("url: local\nworkingDir: ../outside\n").is_err());
        assert!(load("url: local\nworkingDir: generated-changes\n").is_err());
        assert!(
            load("url: local\nadditionalCharts:\n  - workingDir: charts\n    crdOptions:\n      templateDirectory: t\n")
                .is_err()
        );
    }

    #[test]
    fn test_rejects_invalid_package_version() {
        let err = load("url: local\nversion: one\n").unwrap_err();
        assert!(err.to_string().contains("version 'one'"));
    }
}
