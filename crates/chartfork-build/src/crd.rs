//! CRD companion charts
//!
//! Helm never upgrades files under `crds/`, so packages can split them into
//! a companion chart that installs them as regular templates. The released
//! main chart loses its `crds/` and optionally gets a guard template
//! refusing to render when those CRDs are not installed.

use std::collections::BTreeSet;
use std::path::Path;

use chartfork_core::fsutil;
use serde::Deserialize;
use walkdir::WalkDir;

use crate::error::{BuildError, Result};
use crate::manifest::CrdOptions;

/// Directory Helm reads CRDs from
pub const CRDS_DIR: &str = "crds";

/// Guard template written into the main chart
pub const CRD_VALIDATION_TEMPLATE: &str = "validate-install-crd.yaml";

/// Build the companion chart at `dest` from the prepared `main_chart`
///
/// The skeleton comes from `<package_dir>/<templateDirectory>`; the main
/// chart's `crds/` files are copied into `<dest>/<crdDirectory>`. The main
/// chart itself is left untouched so its change-set can still be recorded;
/// see [`strip_crds`].
pub fn prepare_crd_chart(
    package_dir: &Path,
    main_chart: &Path,
    dest: &Path,
    options: &CrdOptions,
) -> Result<()> {
    let invalid = |message: String| BuildError::InvalidCrdChart {
        chart: dest.display().to_string(),
        message,
    };

    let template = package_dir.join(&options.template_directory);
    if !template.is_dir() {
        return Err(invalid(format!(
            "template directory {} does not exist",
            template.display()
        )));
    }
    let crds = main_chart.join(CRDS_DIR);
    if !crds.is_dir() {
        return Err(invalid(format!(
            "{} has no {}/ directory",
            main_chart.display(),
            CRDS_DIR
        )));
    }

    fsutil::remove_path(dest)?;
    fsutil::copy_dir(&template, dest)?;
    fsutil::copy_dir(&crds, &dest.join(&options.crd_directory))?;
    tracing::info!("prepared CRD chart {}", dest.display());
    Ok(())
}

/// Remove `crds/` from a copy of the main chart about to be packaged,
/// adding the guard template when requested
pub fn strip_crds(main_chart: &Path, options: &CrdOptions) -> Result<()> {
    let crds = main_chart.join(CRDS_DIR);
    if !crds.is_dir() {
        return Ok(());
    }

    let apis = crd_api_versions(&crds)?;
    fsutil::remove_path(&crds)?;
    tracing::debug!("stripped {} CRD API versions from {}", apis.len(), main_chart.display());

    if options.add_crd_validation_to_main_chart {
        let templates = main_chart.join("templates");
        std::fs::create_dir_all(&templates)?;
        std::fs::write(
            templates.join(CRD_VALIDATION_TEMPLATE),
            validation_template(&apis),
        )?;
    }
    Ok(())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CrdDocument {
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    spec: Option<CrdSpec>,
}

#[derive(Deserialize)]
struct CrdSpec {
    group: String,
    names: CrdNames,
    /// `apiextensions.k8s.io/v1beta1` single version
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    versions: Vec<CrdVersion>,
}

#[derive(Deserialize)]
struct CrdNames {
    kind: String,
}

#[derive(Deserialize)]
struct CrdVersion {
    name: String,
}

/// `<group>/<version>/<Kind>` of every CRD defined under `dir`
pub fn crd_api_versions(dir: &Path) -> Result<BTreeSet<String>> {
    let mut apis = BTreeSet::new();

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        let is_yaml = entry
            .path()
            .extension()
            .is_some_and(|ext| ext == "yaml" || ext == "yml");
        if !entry.file_type().is_file() || !is_yaml {
            continue;
        }

        let content = std::fs::read_to_string(entry.path())?;
        for document in serde_yaml::Deserializer::from_str(&content) {
            let value = serde_yaml::Value::deserialize(document)?;
            if value.is_null() {
                continue;
            }
            let Ok(crd) = serde_yaml::from_value::<CrdDocument>(value) else {
                tracing::debug!("skipping non-CRD document in {}", entry.path().display());
                continue;
            };
            let (Some("CustomResourceDefinition"), Some(spec)) = (crd.kind.as_deref(), crd.spec)
            else {
                continue;
            };

            let versions = spec
                .versions
                .iter()
                .map(|v| v.name.clone())
                .chain(spec.version.clone());
            for version in versions {
                apis.insert(format!("{}/{}/{}", spec.group, version, spec.names.kind));
            }
        }
    }

    Ok(apis)
}

/// Helm template failing when any of `apis` is not served by the cluster
fn validation_template(apis: &BTreeSet<String>) -> String {
    let mut out = String::new();
    out.push_str(
        "#{{- if gt (len (lookup \"rbac.authorization.k8s.io/v1\" \"ClusterRole\" \"\" \"\")) 0 -}}\n",
    );
    out.push_str("# {{- $found := dict -}}\n");
    for api in apis {
        out.push_str(&format!("# {{{{- set $found \"{}\" false -}}}}\n", api));
    }
    out.push_str(
        "# {{- range .Capabilities.APIVersions -}}\n\
         # {{- if hasKey $found (toString .) -}}\n\
         # \t{{- set $found (toString .) true -}}\n\
         # {{- end -}}\n\
         # {{- end -}}\n\
         # {{- range $_, $exists := $found -}}\n\
         # {{- if (eq $exists false) -}}\n\
         # \t{{- required \"Required CRDs are missing. Please install the corresponding CRD chart before installing this chart.\" \"\" -}}\n\
         # {{- end -}}\n\
         # {{- end -}}\n\
         #{{- end -}}\n",
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CRDS: &str = r#"apiVersion: apiextensions.k8s.io/v1
kind: CustomResourceDefinition
metadata:
  name: alertmanagers.monitoring.coreos.com
spec:
  group: monitoring.coreos.com
  names:
    kind: Alertmanager
  versions:
    - name: v1
---
apiVersion: apiextensions.k8s.io/v1beta1
kind: CustomResourceDefinition
metadata:
  name: legacies.example.com
spec:
  group: example.com
  names:
    kind: Legacy
  version: v1alpha1
---
apiVersion: v1
kind: ConfigMap
metadata:
  name: not-a-crd
"#;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn options(validate: bool) -> CrdOptions {
        CrdOptions {
            template_directory: "crd-template".to_string(),
            crd_directory: "templates".to_string(),
            add_crd_validation_to_main_chart: validate,
        }
    }

    #[test]
    fn test_api_versions() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "crds/all.yaml", CRDS);
        write(temp.path(), "crds/README.md", "kind: CustomResourceDefinition\n");

        let apis = crd_api_versions(&temp.path().join("crds")).unwrap();
        assert_eq!(
            apis.into_iter().collect::<Vec<_>>(),
            vec![
                "example.com/v1alpha1/Legacy",
                "monitoring.coreos.com/v1/Alertmanager"
            ]
        );
    }

    #[test]
    fn test_prepare_copies_crds_then_strip_adds_guard() {
        let temp = TempDir::new().unwrap();
        let package = temp.path().join("packages/monitoring");
        write(&package, "crd-template/Chart.yaml", "apiVersion: v2\nname: monitoring-crd\nversion: 0.0.0\n");
        write(&package, "charts/Chart.yaml", "apiVersion: v2\nname: monitoring\nversion: 45.1.0\n");
        write(&package, "charts/crds/all.yaml", CRDS);

        let dest = package.join("charts-crd");
        prepare_crd_chart(&package, &package.join("charts"), &dest, &options(true)).unwrap();

        assert!(dest.join("Chart.yaml").is_file());
        assert!(dest.join("templates/all.yaml").is_file());
        assert!(package.join("charts/crds/all.yaml").is_file());

        strip_crds(&package.join("charts"), &options(true)).unwrap();
        assert!(!package.join("charts/crds").exists());

        let guard = std::fs::read_to_string(
            package.join("charts/templates").join(CRD_VALIDATION_TEMPLATE),
        )
        .unwrap();
        insta::assert_snapshot!(guard, @r#"
        #{{- if gt (len (lookup "rbac.authorization.k8s.io/v1" "ClusterRole" "" "")) 0 -}}
        # {{- $found := dict -}}
        # {{- set $found "example.com/v1alpha1/Legacy" false -}}
        # {{- set $found "monitoring.coreos.com/v1/Alertmanager" false -}}
        # {{- range .Capabilities.APIVersions -}}
        # {{- if hasKey $found (toString .) -}}
        # 	{{- set $found (toString .) true -}}
        # {{- end -}}
        # {{- end -}}
        # {{- range $_, $exists := $found -}}
        # {{- if (eq $exists false) -}}
        # 	{{- required "Required CRDs are missing. Please install the corresponding CRD chart before installing this chart." "" -}}
        # {{- end -}}
        # {{- end -}}
        #{{- end -}}
        "#);
    }

    #[test]
    fn test_missing_crds_directory() {
        let temp = TempDir::new().unwrap();
        let package = temp.path().join("packages/app");
        write(&package, "crd-template/Chart.yaml", "name: app-crd\nversion: 0.0.0\n");
        write(&package, "charts/Chart.yaml", "name: app\nversion: 1.0.0\n");

        let err = prepare_crd_chart(
            &package,
            &package.join("charts"),
            &package.join("charts-crd"),
            &options(false),
        )
        .unwrap_err();
        assert!(matches!(err, BuildError::InvalidCrdChart { .. }));
    }
}
