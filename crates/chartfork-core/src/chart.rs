//! Helm chart metadata: `Chart.yaml`, `requirements.yaml` and lock files
//!
//! Reading goes through typed serde structs. Writing edits the raw YAML
//! document so that fields this crate does not model (annotations,
//! maintainers, conditions, aliases...) survive untouched.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use crate::error::{CoreError, Result};
use crate::fsutil;

pub const CHART_FILE: &str = "Chart.yaml";
pub const REQUIREMENTS_FILE: &str = "requirements.yaml";
pub const CHART_LOCK_FILE: &str = "Chart.lock";
pub const REQUIREMENTS_LOCK_FILE: &str = "requirements.lock";

/// Scheme prefix of dependencies stored next to the chart
pub const FILE_SCHEME: &str = "file://";

/// Subset of `Chart.yaml` this crate works with
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartMetadata {
    /// `v1` (dependencies in requirements.yaml) or `v2`
    #[serde(default = "default_api_version")]
    pub api_version: String,

    pub name: String,

    pub version: String,

    #[serde(default)]
    pub app_version: Option<String>,

    #[serde(default)]
    pub dependencies: Vec<ChartDependency>,
}

fn default_api_version() -> String {
    "v1".to_string()
}

/// A dependency entry as declared in a manifest or lock file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartDependency {
    pub name: String,

    /// Version constraint (manifest) or exact version (lock file)
    #[serde(default)]
    pub version: String,

    #[serde(default)]
    pub repository: Option<String>,
}

impl ChartDependency {
    /// Relative path of a `file://` repository, if this is one
    pub fn file_path(&self) -> Option<&str> {
        self.repository
            .as_deref()
            .and_then(|r| r.strip_prefix(FILE_SCHEME))
    }
}

/// `dependencies` section of `Chart.lock` / `requirements.lock`, or of a
/// v1 `requirements.yaml`
#[derive(Debug, Clone, Default, Deserialize)]
struct DependencyList {
    #[serde(default)]
    dependencies: Vec<ChartDependency>,
}

/// New repository and version for a dependency entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyUpdate {
    pub repository: String,
    pub version: String,
}

/// A chart directory with its parsed `Chart.yaml`
#[derive(Debug, Clone)]
pub struct LoadedChart {
    pub root: PathBuf,
    pub metadata: ChartMetadata,
}

impl LoadedChart {
    /// Load the chart rooted at `dir`
    pub fn load(dir: &Path) -> Result<Self> {
        let chart_file = dir.join(CHART_FILE);
        if !chart_file.is_file() {
            return Err(CoreError::ChartNotFound {
                path: dir.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(&chart_file)?;
        let metadata: ChartMetadata =
            serde_yaml::from_str(&content).map_err(|e| CoreError::InvalidChart {
                message: format!("{}: {}", chart_file.display(), e),
            })?;

        Ok(Self {
            root: dir.to_path_buf(),
            metadata,
        })
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn version(&self) -> &str {
        &self.metadata.version
    }

    /// Whether dependencies are declared in `requirements.yaml`
    pub fn uses_requirements_file(&self) -> bool {
        self.metadata.api_version == "v1"
    }

    /// Declared dependencies, from `Chart.yaml` (v2) or `requirements.yaml` (v1)
    pub fn dependencies(&self) -> Result<Vec<ChartDependency>> {
        if !self.uses_requirements_file() {
            return Ok(self.metadata.dependencies.clone());
        }

        let requirements = self.root.join(REQUIREMENTS_FILE);
        if !requirements.is_file() {
            return Ok(Vec::new());
        }
        let list: DependencyList = serde_yaml::from_str(&std::fs::read_to_string(requirements)?)?;
        Ok(list.dependencies)
    }

    /// Entries of `Chart.lock` (v2) or `requirements.lock` (v1); empty when
    /// there is no lock file
    pub fn locked_dependencies(&self) -> Result<Vec<ChartDependency>> {
        let lock = self.root.join(self.lock_file_name());
        if !lock.is_file() {
            return Ok(Vec::new());
        }
        let list: DependencyList = serde_yaml::from_str(&std::fs::read_to_string(lock)?)?;
        Ok(list.dependencies)
    }

    fn lock_file_name(&self) -> &'static str {
        if self.uses_requirements_file() {
            REQUIREMENTS_LOCK_FILE
        } else {
            CHART_LOCK_FILE
        }
    }

    fn manifest_file_name(&self) -> &'static str {
        if self.uses_requirements_file() {
            REQUIREMENTS_FILE
        } else {
            CHART_FILE
        }
    }

    /// Point dependency entries at their materialized copies
    ///
    /// Entries named in `updates` get the new repository and version; other
    /// entries are kept as they are. All entries end up sorted by name.
    pub fn rewrite_dependencies(&self, updates: &BTreeMap<String, DependencyUpdate>) -> Result<()> {
        let path = self.root.join(self.manifest_file_name());
        if !path.is_file() {
            return Ok(());
        }

        let mut doc = read_mapping(&path)?;
        let Some(Value::Sequence(entries)) = doc.get_mut("dependencies") else {
            return Ok(());
        };

        for entry in entries.iter_mut() {
            let Value::Mapping(map) = entry else { continue };
            let Some(name) = map.get("name").and_then(Value::as_str) else {
                continue;
            };
            if let Some(update) = updates.get(name) {
                map.insert(
                    Value::from("repository"),
                    Value::from(update.repository.clone()),
                );
                map.insert(Value::from("version"), Value::from(update.version.clone()));
            }
        }

        entries.sort_by(|a, b| {
            let key = |v: &Value| v.get("name").and_then(Value::as_str).map(str::to_string);
            key(a).cmp(&key(b))
        });

        write_mapping(&path, &doc)
    }

    /// Delete `Chart.lock` and `requirements.lock`
    pub fn remove_lock_files(&self) -> Result<()> {
        fsutil::remove_path(&self.root.join(CHART_LOCK_FILE))?;
        fsutil::remove_path(&self.root.join(REQUIREMENTS_LOCK_FILE))
    }
}

/// Set the `version` field of `<dir>/Chart.yaml`
pub fn set_version(dir: &Path, version: &str) -> Result<()> {
    set_field(dir, "version", version)
}

/// Set the `name` field of `<dir>/Chart.yaml`
pub fn set_name(dir: &Path, name: &str) -> Result<()> {
    set_field(dir, "name", name)
}

fn set_field(dir: &Path, key: &str, value: &str) -> Result<()> {
    let path = dir.join(CHART_FILE);
    if !path.is_file() {
        return Err(CoreError::ChartNotFound {
            path: dir.display().to_string(),
        });
    }

    let mut doc = read_mapping(&path)?;
    doc.insert(Value::from(key), Value::from(value));
    write_mapping(&path, &doc)
}

fn read_mapping(path: &Path) -> Result<Mapping> {
    let content = std::fs::read_to_string(path)?;
    match serde_yaml::from_str::<Value>(&content)? {
        Value::Mapping(map) => Ok(map),
        Value::Null => Ok(Mapping::new()),
        _ => Err(CoreError::InvalidChart {
            message: format!("{} is not a YAML mapping", path.display()),
        }),
    }
}

fn write_mapping(path: &Path, doc: &Mapping) -> Result<()> {
    std::fs::write(path, serde_yaml::to_string(doc)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CHART_V2: &str = r#"apiVersion: v2
name: rancher-monitoring
version: 45.1.0
appVersion: v0.65.1
annotations:
  catalog.cattle.io/certified: rancher
dependencies:
  - name: kube-state-metrics
    version: 4.x.x
    repository: https://prometheus-community.github.io/helm-charts
    condition: kubeStateMetrics.enabled
  - name: grafana
    version: 6.x.x
    repository: https://grafana.github.io/helm-charts
    condition: grafana.enabled
  - name: crds
    version: 0.0.0
    repository: file://./charts/crds
"#;

    fn chart_dir(temp: &TempDir, content: &str) -> PathBuf {
        let dir = temp.path().join("chart");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(CHART_FILE), content).unwrap();
        dir
    }

    #[test]
    fn test_load_v2_dependencies() {
        let temp = TempDir::new().unwrap();
        let chart = LoadedChart::load(&chart_dir(&temp, CHART_V2)).unwrap();

        assert_eq!(chart.name(), "rancher-monitoring");
        assert!(!chart.uses_requirements_file());

        let deps = chart.dependencies().unwrap();
        assert_eq!(deps.len(), 3);
        assert_eq!(deps[2].file_path(), Some("./charts/crds"));
        assert_eq!(deps[0].file_path(), None);
    }

    #[test]
    fn test_load_v1_requirements_and_lock() {
        let temp = TempDir::new().unwrap();
        let dir = chart_dir(&temp, "name: legacy\nversion: 1.2.3\n");
        std::fs::write(
            dir.join(REQUIREMENTS_FILE),
            "dependencies:\n  - name: redis\n    version: ~10.0\n    repository: https://charts.example.com\n",
        )
        .unwrap();
        std::fs::write(
            dir.join(REQUIREMENTS_LOCK_FILE),
            "dependencies:\n  - name: redis\n    version: 10.0.2\n    repository: https://charts.example.com\ndigest: sha256:abc\n",
        )
        .unwrap();

        let chart = LoadedChart::load(&dir).unwrap();
        assert!(chart.uses_requirements_file());
        assert_eq!(chart.dependencies().unwrap()[0].version, "~10.0");
        assert_eq!(chart.locked_dependencies().unwrap()[0].version, "10.0.2");
    }

    #[test]
    fn test_missing_chart() {
        let temp = TempDir::new().unwrap();
        let err = LoadedChart::load(temp.path()).unwrap_err();
        assert!(matches!(err, CoreError::ChartNotFound { .. }));
    }

    #[test]
    fn test_set_version_keeps_other_fields() {
        let temp = TempDir::new().unwrap();
        let dir = chart_dir(&temp, CHART_V2);

        set_version(&dir, "102.0.0+up45.1.0").unwrap();

        let chart = LoadedChart::load(&dir).unwrap();
        assert_eq!(chart.version(), "102.0.0+up45.1.0");
        assert_eq!(chart.metadata.app_version.as_deref(), Some("v0.65.1"));
        let raw = std::fs::read_to_string(dir.join(CHART_FILE)).unwrap();
        assert!(raw.contains("catalog.cattle.io/certified: rancher"));
    }

    #[test]
    fn test_rewrite_dependencies() {
        let temp = TempDir::new().unwrap();
        let dir = chart_dir(&temp, CHART_V2);
        std::fs::write(dir.join(CHART_LOCK_FILE), "dependencies: []\n").unwrap();

        let mut updates = BTreeMap::new();
        for (name, version) in [("kube-state-metrics", "4.24.0"), ("grafana", "6.50.7")] {
            updates.insert(
                name.to_string(),
                DependencyUpdate {
                    repository: format!("file://./charts/{}", name),
                    version: version.to_string(),
                },
            );
        }

        let chart = LoadedChart::load(&dir).unwrap();
        chart.rewrite_dependencies(&updates).unwrap();
        chart.remove_lock_files().unwrap();

        assert!(!dir.join(CHART_LOCK_FILE).exists());
        insta::assert_snapshot!(std::fs::read_to_string(dir.join(CHART_FILE)).unwrap());
    }
}
