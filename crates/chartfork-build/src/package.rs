//! Packages and the lifecycle of their charts
//!
//! A package is a directory under `packages/` holding a `package.yaml`
//! and the change-sets of its charts. Its charts are materialized into
//! working directories next to the manifest:
//!
//! ```text
//! packages/<name>/
//!   package.yaml
//!   generated-changes/                     main chart change-set
//!     additional-charts/<dir>/generated-changes/
//!   charts/                                main chart working dir
//!   <additional working dirs>/
//! ```
//!
//! Released charts land in `assets/<name>/<chart>-<version>.tgz` and
//! `charts/<name>/<chart>/<version>/` of the output root.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chartfork_core::{
    ChangeSet, ChangeSummary, DiffTool, LoadedChart, PackageOptions, PackagedChart, fsutil,
    package_chart,
};
use chartfork_repo::{
    ContentCache, HttpIndexFetcher, IndexResolver, Materializer, PullContext, Source,
};

use crate::config::RepoConfig;
use crate::crd;
use crate::error::{BuildError, Result};
use crate::manifest::{CrdOptions, PACKAGE_FILE, PackageManifest};

/// Directory holding the packages
pub const PACKAGES_DIR: &str = "packages";
/// Released archives
pub const ASSETS_DIR: &str = "assets";
/// Released unarchived charts
pub const CHARTS_DIR: &str = "charts";
/// Change-sets of additional charts, inside the main change-set
pub const ADDITIONAL_CHARTS_DIR: &str = "additional-charts";

/// Everything the lifecycle needs besides the package itself
#[derive(Debug)]
pub struct BuildContext {
    repo_root: PathBuf,
    materializer: Materializer,
}

impl BuildContext {
    /// Context for the repository at `repo_root`
    ///
    /// Fails when GNU diff/patch are not available.
    pub fn new(repo_root: impl Into<PathBuf>, config: &RepoConfig) -> Result<Self> {
        let repo_root = repo_root.into();
        let tool = DiffTool::detect()?;

        let mut ctx = PullContext::new(repo_root.clone())?;
        if let Some(dir) = config.cache_dir() {
            tracing::debug!("using content cache {}", dir.display());
            ctx = ctx.with_cache(ContentCache::new(dir));
        }
        let resolver = Arc::new(IndexResolver::new(HttpIndexFetcher::new(
            ctx.client().clone(),
        )));

        Ok(Self::with_materializer(
            repo_root,
            Materializer::new(ctx, resolver, tool),
        ))
    }

    pub fn with_materializer(repo_root: impl Into<PathBuf>, materializer: Materializer) -> Self {
        Self {
            repo_root: repo_root.into(),
            materializer,
        }
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    pub fn materializer(&self) -> &Materializer {
        &self.materializer
    }
}

/// Version a chart is released as
///
/// With a package version the upstream version becomes build metadata:
/// `<package version>+up<upstream version>`.
pub fn release_version(package_version: Option<&str>, upstream: &str) -> String {
    match package_version {
        Some(version) => format!("{}+up{}", version, upstream),
        None => upstream.to_string(),
    }
}

/// A chart with its source, working directory and change-set
#[derive(Debug, Clone)]
pub struct Chart {
    pub working_dir: PathBuf,
    pub source: Source,
    pub ignore_dependencies: Vec<String>,
    pub replace_paths: Vec<PathBuf>,
    pub changes: ChangeSet,
    /// Version of the pulled chart, known once prepared
    pub upstream_version: Option<String>,
}

impl Chart {
    pub fn new(
        working_dir: PathBuf,
        source: Source,
        changes: ChangeSet,
        ignore_dependencies: &[String],
        replace_paths: &[String],
    ) -> Self {
        Self {
            working_dir,
            source,
            ignore_dependencies: ignore_dependencies.to_vec(),
            replace_paths: replace_paths.iter().map(PathBuf::from).collect(),
            changes,
            upstream_version: None,
        }
    }

    /// Pull the chart into its working directory, materialize its
    /// dependencies and apply its change-set
    pub async fn prepare(&mut self, ctx: &BuildContext) -> Result<()> {
        if !self.source.is_local() {
            fsutil::remove_path(&self.working_dir)?;
        }
        tracing::info!("preparing {} from {}", self.working_dir.display(), self.source);

        let version = ctx
            .materializer
            .prepare(
                &self.source,
                &self.changes,
                &self.working_dir,
                &self.ignore_dependencies,
            )
            .await?;
        self.upstream_version = Some(version);
        Ok(())
    }

    /// Record the working directory's changes against a fresh pull
    pub async fn generate_changes(&self, ctx: &BuildContext) -> Result<ChangeSummary> {
        if !self.source.is_local() && !self.working_dir.is_dir() {
            return Err(BuildError::NotPrepared {
                chart: self.working_dir.display().to_string(),
            });
        }

        Ok(ctx
            .materializer
            .record(
                &self.source,
                &self.working_dir,
                &self.changes,
                &self.changes,
                &self.replace_paths,
                &self.ignore_dependencies,
            )
            .await?)
    }

    /// Version this chart is released as within a package
    pub fn release_version(&self, package_version: Option<&str>) -> Result<String> {
        let upstream = self
            .upstream_version
            .as_deref()
            .ok_or_else(|| BuildError::NotPrepared {
                chart: self.working_dir.display().to_string(),
            })?;
        Ok(release_version(package_version, upstream))
    }

    /// Package the prepared chart into `output_root`
    pub fn generate_archive(
        &self,
        output_root: &Path,
        package: &str,
        package_version: Option<&str>,
        prevent_overwrite: bool,
    ) -> Result<PackagedChart> {
        let version = self.release_version(package_version)?;
        package_into(
            &self.working_dir,
            output_root,
            package,
            &version,
            prevent_overwrite,
        )
    }

    /// Delete the working directory, unless the chart lives there
    pub fn clean(&self) -> Result<()> {
        if self.source.is_local() {
            tracing::debug!("keeping local chart {}", self.working_dir.display());
            return Ok(());
        }
        fsutil::remove_path(&self.working_dir)?;
        Ok(())
    }
}

fn package_into(
    chart_dir: &Path,
    output_root: &Path,
    package: &str,
    version: &str,
    prevent_overwrite: bool,
) -> Result<PackagedChart> {
    let name = LoadedChart::load(chart_dir)?.metadata.name;
    let options = PackageOptions {
        archive_path: output_root
            .join(ASSETS_DIR)
            .join(package)
            .join(format!("{}-{}.tgz", name, version)),
        unarchived_dir: output_root
            .join(CHARTS_DIR)
            .join(package)
            .join(&name)
            .join(version),
        prevent_overwrite,
    };

    let packaged = package_chart(chart_dir, version, &options)?;
    tracing::info!("generated {}-{}", packaged.name, packaged.version);
    Ok(packaged)
}

/// A chart released alongside the main chart of a package
#[derive(Debug, Clone)]
pub enum AdditionalChart {
    /// Pulled from its own upstream, with its own change-set
    Upstream(Chart),
    /// Built from a skeleton and the main chart's CRDs
    Crd {
        working_dir: PathBuf,
        options: CrdOptions,
    },
}

impl AdditionalChart {
    pub fn working_dir(&self) -> &Path {
        match self {
            AdditionalChart::Upstream(chart) => &chart.working_dir,
            AdditionalChart::Crd { working_dir, .. } => working_dir,
        }
    }
}

/// A package of the repository
#[derive(Debug, Clone)]
pub struct Package {
    pub name: String,
    pub dir: PathBuf,
    pub manifest: PackageManifest,
    pub chart: Chart,
    pub additional_charts: Vec<AdditionalChart>,
}

impl Package {
    /// Load `packages/<name>` of the repository at `repo_root`
    pub fn load(repo_root: &Path, name: &str) -> Result<Self> {
        let dir = repo_root.join(PACKAGES_DIR).join(name);
        let manifest_path = dir.join(PACKAGE_FILE);
        if !manifest_path.is_file() {
            return Err(BuildError::PackageNotFound {
                name: name.to_string(),
            });
        }
        let manifest = PackageManifest::load(&manifest_path)?;

        let changes = ChangeSet::in_dir(&dir);
        let chart = Chart::new(
            dir.join(&manifest.working_dir),
            manifest.source()?,
            changes.clone(),
            &manifest.ignore_dependencies,
            &manifest.replace_paths,
        );

        let mut additional_charts = Vec::new();
        for options in &manifest.additional_charts {
            let working_dir = dir.join(&options.working_dir);
            let additional = match (&options.upstream_options, &options.crd_options) {
                (Some(upstream), _) => AdditionalChart::Upstream(Chart::new(
                    working_dir,
                    upstream.source()?,
                    ChangeSet::in_dir(
                        &changes
                            .root()
                            .join(ADDITIONAL_CHARTS_DIR)
                            .join(&options.working_dir),
                    ),
                    &options.ignore_dependencies,
                    &options.replace_paths,
                )),
                (None, Some(crd_options)) => AdditionalChart::Crd {
                    working_dir,
                    options: crd_options.clone(),
                },
                (None, None) => {
                    return Err(BuildError::InvalidManifest {
                        path: manifest_path.display().to_string(),
                        message: format!("additional chart '{}' has no source", options.working_dir),
                    });
                }
            };
            additional_charts.push(additional);
        }

        Ok(Self {
            name: name.to_string(),
            dir,
            manifest,
            chart,
            additional_charts,
        })
    }

    /// Names of the packages of the repository at `repo_root`
    ///
    /// With `filter`, only that package, which must exist.
    pub fn list(repo_root: &Path, filter: Option<&str>) -> Result<Vec<String>> {
        let packages_dir = repo_root.join(PACKAGES_DIR);

        if let Some(name) = filter {
            if !packages_dir.join(name).join(PACKAGE_FILE).is_file() {
                return Err(BuildError::PackageNotFound {
                    name: name.to_string(),
                });
            }
            return Ok(vec![name.to_string()]);
        }

        if !packages_dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&packages_dir)? {
            let entry = entry?;
            if entry.path().join(PACKAGE_FILE).is_file() {
                names.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Load every package selected by `filter`
    pub fn load_all(repo_root: &Path, filter: Option<&str>) -> Result<Vec<Self>> {
        Self::list(repo_root, filter)?
            .iter()
            .map(|name| Self::load(repo_root, name))
            .collect()
    }

    /// Prepare the main chart, then the additional charts
    pub async fn prepare(&mut self, ctx: &BuildContext) -> Result<()> {
        tracing::info!("preparing package {}", self.name);
        self.chart.prepare(ctx).await?;

        for additional in &mut self.additional_charts {
            match additional {
                AdditionalChart::Upstream(chart) => chart.prepare(ctx).await?,
                AdditionalChart::Crd {
                    working_dir,
                    options,
                } => crd::prepare_crd_chart(&self.dir, &self.chart.working_dir, working_dir, options)?,
            }
        }
        Ok(())
    }

    /// Record the change-sets of the main chart and every additional chart
    /// pulled from upstream
    pub async fn generate_patch(&self, ctx: &BuildContext) -> Result<()> {
        tracing::info!("generating patch for package {}", self.name);

        // Recording replaces the main change-set wholesale; the additional
        // charts' change-sets nested inside it are set aside meanwhile.
        let additional_root = self.chart.changes.root().join(ADDITIONAL_CHARTS_DIR);
        let stash = tempfile::TempDir::new()?;
        let stashed = stash.path().join(ADDITIONAL_CHARTS_DIR);
        if additional_root.exists() {
            fsutil::move_dir(&additional_root, &stashed)?;
        }

        let recorded = self.chart.generate_changes(ctx).await;
        if stashed.exists() {
            fsutil::move_dir(&stashed, &additional_root)?;
        }
        let summary = recorded?;
        tracing::info!("{}: {}", self.name, summary);

        for additional in &self.additional_charts {
            if let AdditionalChart::Upstream(chart) = additional {
                let summary = chart.generate_changes(ctx).await?;
                tracing::info!("{}: {}", chart.working_dir.display(), summary);
            }
        }
        Ok(())
    }

    /// Package every prepared chart into `output_root`
    ///
    /// Packages marked `doNotRelease` produce nothing.
    pub fn generate_charts(
        &self,
        output_root: &Path,
        prevent_overwrite: bool,
    ) -> Result<Vec<PackagedChart>> {
        if self.manifest.do_not_release {
            tracing::info!("skipping {}: doNotRelease is set", self.name);
            return Ok(Vec::new());
        }

        let package_version = self.manifest.version.as_deref();
        let version = self.chart.release_version(package_version)?;
        let mut packaged = Vec::new();

        match self.manifest.crd_options() {
            Some(options) => {
                let stage = tempfile::TempDir::new()?;
                let staged = stage.path().join(CHARTS_DIR);
                fsutil::copy_dir(&self.chart.working_dir, &staged)?;
                crd::strip_crds(&staged, options)?;
                packaged.push(package_into(
                    &staged,
                    output_root,
                    &self.name,
                    &version,
                    prevent_overwrite,
                )?);
            }
            None => packaged.push(package_into(
                &self.chart.working_dir,
                output_root,
                &self.name,
                &version,
                prevent_overwrite,
            )?),
        }

        for additional in &self.additional_charts {
            let chart = match additional {
                AdditionalChart::Upstream(chart) => chart.generate_archive(
                    output_root,
                    &self.name,
                    package_version,
                    prevent_overwrite,
                )?,
                AdditionalChart::Crd { working_dir, .. } => {
                    if !working_dir.is_dir() {
                        return Err(BuildError::NotPrepared {
                            chart: working_dir.display().to_string(),
                        });
                    }
                    package_into(
                        working_dir,
                        output_root,
                        &self.name,
                        &version,
                        prevent_overwrite,
                    )?
                }
            };
            packaged.push(chart);
        }

        Ok(packaged)
    }

    /// Delete every materialized working directory
    ///
    /// `package.yaml` and the change-sets stay, and so does the chart of a
    /// package without upstream.
    pub fn clean(&self) -> Result<()> {
        self.chart.clean()?;
        for additional in &self.additional_charts {
            match additional {
                AdditionalChart::Upstream(chart) => chart.clean()?,
                AdditionalChart::Crd { working_dir, .. } => fsutil::remove_path(working_dir)?,
            }
        }
        tracing::info!("cleaned package {}", self.name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn context(repo_root: &Path) -> Option<BuildContext> {
        BuildContext::new(
            repo_root,
            &RepoConfig {
                cache: crate::config::CacheConfig {
                    enabled: false,
                    dir: None,
                },
                ..RepoConfig::default()
            },
        )
        .ok()
    }

    #[test]
    fn test_release_version() {
        assert_eq!(release_version(Some("102.0.0"), "45.1.0"), "102.0.0+up45.1.0");
        assert_eq!(release_version(None, "45.1.0"), "45.1.0");
    }

    #[test]
    fn test_list_and_load() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        write(root, "packages/zeta/package.yaml", "url: local\n");
        write(
            root,
            "packages/alpha/package.yaml",
            "url: https://example.com/alpha-1.0.0.tgz\nadditionalCharts:\n  - workingDir: charts-crd\n    crdOptions:\n      templateDirectory: crd-template\n  - workingDir: extra\n    upstreamOptions:\n      url: local\n",
        );
        write(root, "packages/notes/README.md", "not a package\n");

        assert_eq!(Package::list(root, None).unwrap(), vec!["alpha", "zeta"]);
        assert_eq!(Package::list(root, Some("zeta")).unwrap(), vec!["zeta"]);
        assert!(matches!(
            Package::list(root, Some("notes")),
            Err(BuildError::PackageNotFound { .. })
        ));

        let alpha = Package::load(root, "alpha").unwrap();
        assert_eq!(alpha.chart.working_dir, root.join("packages/alpha/charts"));
        assert_eq!(
            alpha.chart.changes.root(),
            root.join("packages/alpha/generated-changes")
        );
        assert!(matches!(alpha.additional_charts[0], AdditionalChart::Crd { .. }));
        let AdditionalChart::Upstream(extra) = &alpha.additional_charts[1] else {
            panic!("expected an upstream chart");
        };
        assert_eq!(
            extra.changes.root(),
            root.join("packages/alpha/generated-changes/additional-charts/extra/generated-changes")
        );
    }

    #[test]
    fn test_generate_archive_requires_prepare() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "packages/app/package.yaml", "url: local\n");
        let package = Package::load(temp.path(), "app").unwrap();

        let err = package
            .chart
            .generate_archive(temp.path(), "app", None, false)
            .unwrap_err();
        assert!(matches!(err, BuildError::NotPrepared { .. }));
    }

    #[tokio::test]
    async fn test_local_package_lifecycle() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        let Some(ctx) = context(root) else {
            return;
        };
        write(root, "packages/app/package.yaml", "url: local\nversion: 1.0.0\n");
        write(root, "packages/app/charts/Chart.yaml", "apiVersion: v2\nname: app\nversion: 0.3.0\n");
        write(root, "packages/app/charts/values.yaml", "replicas: 1\n");

        let mut package = Package::load(root, "app").unwrap();
        package.prepare(&ctx).await.unwrap();
        assert_eq!(package.chart.upstream_version.as_deref(), Some("0.3.0"));

        package.generate_patch(&ctx).await.unwrap();
        assert!(!package.chart.changes.exists());

        let out = root.join("out");
        let packaged = package.generate_charts(&out, true).unwrap();
        assert_eq!(packaged.len(), 1);
        assert_eq!(packaged[0].version, "1.0.0+up0.3.0");
        assert!(out.join("assets/app/app-1.0.0+up0.3.0.tgz").is_file());
        assert!(out.join("charts/app/app/1.0.0+up0.3.0/values.yaml").is_file());

        let again = package.generate_charts(&out, true).unwrap_err();
        assert!(matches!(again, BuildError::Core(_)));

        package.clean().unwrap();
        assert!(root.join("packages/app/charts/Chart.yaml").is_file());
    }

    #[tokio::test]
    async fn test_crd_companion_chart() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        let Some(ctx) = context(root) else {
            return;
        };
        write(
            root,
            "packages/monitoring/package.yaml",
            "url: local\nadditionalCharts:\n  - workingDir: charts-crd\n    crdOptions:\n      templateDirectory: crd-template\n      crdDirectory: crd-manifest\n      addCRDValidationToMainChart: true\n",
        );
        write(
            root,
            "packages/monitoring/charts/Chart.yaml",
            "apiVersion: v2\nname: monitoring\nversion: 45.1.0\n",
        );
        write(
            root,
            "packages/monitoring/charts/crds/crd.yaml",
            "kind: CustomResourceDefinition\nspec:\n  group: monitoring.coreos.com\n  names:\n    kind: Prometheus\n  versions:\n    - name: v1\n",
        );
        write(
            root,
            "packages/monitoring/crd-template/Chart.yaml",
            "apiVersion: v2\nname: monitoring-crd\nversion: 0.0.0\n",
        );

        let mut package = Package::load(root, "monitoring").unwrap();
        package.prepare(&ctx).await.unwrap();
        assert!(
            root.join("packages/monitoring/charts-crd/crd-manifest/crd.yaml")
                .is_file()
        );

        let out = root.join("out");
        let packaged = package.generate_charts(&out, false).unwrap();
        let names: Vec<_> = packaged.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["monitoring", "monitoring-crd"]);
        assert_eq!(packaged[1].version, "45.1.0");

        let main = out.join("charts/monitoring/monitoring/45.1.0");
        assert!(!main.join("crds").exists());
        assert!(main.join("templates").join(crd::CRD_VALIDATION_TEMPLATE).is_file());
        assert!(
            root.join("packages/monitoring/charts/crds/crd.yaml").is_file(),
            "the working directory keeps its CRDs"
        );

        package.clean().unwrap();
        assert!(!root.join("packages/monitoring/charts-crd").exists());
    }

    #[test]
    fn test_do_not_release() {
        let temp = TempDir::new().unwrap();
        write(
            temp.path(),
            "packages/app/package.yaml",
            "url: local\ndoNotRelease: true\n",
        );
        let package = Package::load(temp.path(), "app").unwrap();
        assert!(package.generate_charts(temp.path(), false).unwrap().is_empty());
    }
}
