//! Recursive dependency materialization
//!
//! A chart's dependencies are resolved to sources, prepared like any other
//! chart (pull, their own dependencies, their own change-set) and copied
//! into the parent's `charts/` directory. The parent manifest is then
//! rewritten to point at those local copies.
//!
//! Nested change-sets are plain directories: the change-set of dependency
//! `name` lives at `<parent change-set>/dependencies/<name>/generated-changes`,
//! so recursion follows the layout on disk.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use chartfork_core::chart::{self, ChartDependency, DependencyUpdate, LoadedChart};
use chartfork_core::{ChangeSet, ChangeSummary, DiffTool, GenerateOptions, fsutil};

use crate::context::PullContext;
use crate::descriptor::{DependencyDescriptor, DependencyRecord};
use crate::error::{RepoError, Result};
use crate::index::IndexResolver;
use crate::oci;
use crate::source::{OCI_SCHEME, Source};

/// Directory dependencies are materialized into, relative to the chart
pub const CHARTS_SUBDIR: &str = "charts";

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Resolves, prepares and records chart dependencies
#[derive(Debug)]
pub struct Materializer {
    ctx: PullContext,
    resolver: Arc<IndexResolver>,
    tool: DiffTool,
}

impl Materializer {
    pub fn new(ctx: PullContext, resolver: Arc<IndexResolver>, tool: DiffTool) -> Self {
        Self {
            ctx,
            resolver,
            tool,
        }
    }

    pub fn ctx(&self) -> &PullContext {
        &self.ctx
    }

    pub fn tool(&self) -> &DiffTool {
        &self.tool
    }

    /// Resolve the dependencies declared by the chart at `chart_dir`
    ///
    /// A descriptor recorded in `changes` takes precedence over anything the
    /// manifest says. Results are sorted by name.
    pub async fn discover(
        &self,
        chart_dir: &Path,
        changes: &ChangeSet,
        parent_source: &Source,
        ignore: &[String],
    ) -> Result<Vec<DependencyRecord>> {
        let chart = LoadedChart::load(chart_dir)?;
        let locked: HashMap<String, ChartDependency> = chart
            .locked_dependencies()?
            .into_iter()
            .map(|d| (d.name.clone(), d))
            .collect();

        let mut records = BTreeMap::new();
        for dependency in chart.dependencies()? {
            if ignore.contains(&dependency.name) {
                tracing::debug!("ignoring dependency {}", dependency.name);
                continue;
            }
            if records.contains_key(&dependency.name) {
                continue;
            }

            let source = self
                .resolve(&dependency, locked.get(&dependency.name), changes, parent_source)
                .await?;
            records.insert(
                dependency.name.clone(),
                DependencyRecord::new(dependency.name.clone(), source),
            );
        }

        Ok(records.into_values().collect())
    }

    async fn resolve(
        &self,
        dependency: &ChartDependency,
        lock: Option<&ChartDependency>,
        changes: &ChangeSet,
        parent_source: &Source,
    ) -> Result<Source> {
        let name = &dependency.name;

        let descriptor = changes.descriptor_path(name);
        if descriptor.is_file() {
            return DependencyDescriptor::load(&descriptor)?.to_source();
        }

        if let Some(relative) = dependency.file_path() {
            return parent_source.with_subdirectory(relative);
        }

        let version = match lock {
            Some(lock) => lock.version.clone(),
            None if semver::Version::parse(&dependency.version).is_ok() => {
                dependency.version.clone()
            }
            None => return Err(RepoError::DependencyNotLocked { name: name.clone() }),
        };

        let repository = lock
            .and_then(|l| l.repository.clone())
            .or_else(|| dependency.repository.clone())
            .unwrap_or_default();

        if repository.starts_with(OCI_SCHEME) {
            return Ok(Source::Oci {
                reference: oci::chart_reference(&repository, name, &version),
                subdirectory: Some(name.clone()),
            });
        }

        if repository.starts_with("http://") || repository.starts_with("https://") {
            return self.resolver.resolve(name, &version, &repository).await;
        }

        Err(RepoError::UnsupportedRepository {
            name: name.clone(),
            repository,
        })
    }

    /// Reject dependencies that resolve to the chart owning them
    ///
    /// A dependency whose content encloses `owner_source` (a `file://.` or
    /// `file://..` reference) or a local package containing `owner_dir`
    /// would recurse forever.
    pub fn check_cycles(
        &self,
        owner_dir: &Path,
        owner_source: &Source,
        records: &[DependencyRecord],
    ) -> Result<()> {
        let owner = std::path::absolute(owner_dir)?;

        for record in records {
            let encloses_owner = record.source.encloses(owner_source);
            let contains_owner = match record.source.package_dir(self.ctx.repo_root()) {
                Some(package_dir) => owner.starts_with(std::path::absolute(&package_dir)?),
                None => false,
            };
            if encloses_owner || contains_owner {
                return Err(RepoError::CircularDependency {
                    cycle: format!(
                        "{} -> {} ({})",
                        owner_dir.display(),
                        record.name,
                        record.source
                    ),
                });
            }
        }
        Ok(())
    }

    /// Materialize `records` into `<parent_dir>/charts` and rewrite the
    /// parent manifest to reference the local copies
    ///
    /// Records are checked for cycles against `parent_source` before any of
    /// them is pulled. Every dependency is staged first; `charts/` is only
    /// touched once all of them succeeded.
    pub fn materialize<'a>(
        &'a self,
        parent_dir: &'a Path,
        parent_source: &'a Source,
        records: &'a [DependencyRecord],
        changes: &'a ChangeSet,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if records.is_empty() {
                return Ok(());
            }
            self.check_cycles(parent_dir, parent_source, records)?;

            let staging = tempfile::TempDir::new()?;
            for record in records {
                let dest = staging.path().join(&record.name);
                if record.is_local_package() {
                    record.source.pull(&self.ctx, &dest).await?;
                    chart::set_name(&dest, &record.name)?;
                } else {
                    self.prepare(&record.source, &changes.dependency(&record.name), &dest, &[])
                        .await?;
                }
            }

            let charts_dir = parent_dir.join(CHARTS_SUBDIR);
            let mut updates = BTreeMap::new();
            for record in records {
                remove_existing(&charts_dir, &record.name)?;
                let target = charts_dir.join(&record.name);
                fsutil::move_dir(&staging.path().join(&record.name), &target)?;

                let version = LoadedChart::load(&target)?.metadata.version;
                tracing::info!("materialized {} {} from {}", record.name, version, record.source);
                updates.insert(
                    record.name.clone(),
                    DependencyUpdate {
                        repository: format!("file://./{}/{}", CHARTS_SUBDIR, record.name),
                        version,
                    },
                );
            }

            let parent = LoadedChart::load(parent_dir)?;
            parent.rewrite_dependencies(&updates)?;
            parent.remove_lock_files()?;
            Ok(())
        })
    }

    /// Pull `source` into `dest`, materialize its dependencies and replay
    /// `changes` on top, returning the upstream chart version
    ///
    /// A local source is already in place and only has its version read.
    pub fn prepare<'a>(
        &'a self,
        source: &'a Source,
        changes: &'a ChangeSet,
        dest: &'a Path,
        ignore: &'a [String],
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            source.pull(&self.ctx, dest).await?;
            let version = LoadedChart::load(dest)?.metadata.version;
            if source.is_local() {
                return Ok(version);
            }

            let records = self.discover(dest, changes, source, ignore).await?;
            self.materialize(dest, source, &records, changes).await?;

            let summary = changes.apply(dest, &self.tool)?;
            if !summary.is_empty() {
                tracing::info!("applied {} to {}", summary, dest.display());
            }
            Ok(version)
        })
    }

    /// Regenerate the change-set turning a fresh pull of `source` into
    /// `working_dir`, writing it to `out`
    ///
    /// Descriptors recorded in `existing` are reused. `existing` and `out`
    /// may be the same change-set: everything is staged in a temporary
    /// directory and `out` is only replaced at the end, together with the
    /// nested change-sets of every non-local dependency.
    pub fn record<'a>(
        &'a self,
        source: &'a Source,
        working_dir: &'a Path,
        existing: &'a ChangeSet,
        out: &'a ChangeSet,
        replace_paths: &'a [PathBuf],
        ignore: &'a [String],
    ) -> BoxFuture<'a, Result<ChangeSummary>> {
        Box::pin(async move {
            if source.is_local() {
                tracing::warn!(
                    "{} has no upstream, nothing to record",
                    working_dir.display()
                );
                return Ok(ChangeSummary::default());
            }
            if !working_dir.is_dir() {
                return Err(RepoError::DependencyNotMaterialized {
                    name: source.to_string(),
                    path: working_dir.display().to_string(),
                });
            }

            let temp = tempfile::TempDir::new()?;
            let baseline = temp.path().join("baseline");
            source.pull(&self.ctx, &baseline).await?;

            let records = self.discover(&baseline, existing, source, ignore).await?;
            self.check_cycles(working_dir, source, &records)?;

            let staged = ChangeSet::in_dir(&temp.path().join("staged"));
            for record in &records {
                DependencyDescriptor::from(&record.source)
                    .save(&staged.descriptor_path(&record.name))?;
                if record.is_local_package() {
                    continue;
                }

                let dependency_dir = working_dir.join(CHARTS_SUBDIR).join(&record.name);
                if !dependency_dir.is_dir() {
                    return Err(RepoError::DependencyNotMaterialized {
                        name: record.name.clone(),
                        path: dependency_dir.display().to_string(),
                    });
                }
                self.record(
                    &record.source,
                    &dependency_dir,
                    &existing.dependency(&record.name),
                    &staged.dependency(&record.name),
                    &[],
                    &[],
                )
                .await?;
            }

            self.materialize(&baseline, source, &records, &staged).await?;

            let own = ChangeSet::in_dir(&temp.path().join("own"));
            let options = GenerateOptions {
                replace_paths: replace_paths.to_vec(),
                skip_paths: records
                    .iter()
                    .map(|r| Path::new(CHARTS_SUBDIR).join(&r.name))
                    .collect(),
            };
            let summary = own.generate(&baseline, working_dir, &options, &self.tool)?;

            if staged.dependencies_dir().exists() {
                fsutil::move_dir(&staged.dependencies_dir(), &own.dependencies_dir())?;
            }

            if own.exists() {
                fsutil::move_dir(own.root(), out.root())?;
            } else {
                out.clear()?;
            }

            tracing::info!("recorded {} for {}", summary, working_dir.display());
            Ok(summary)
        })
    }
}

/// Remove `charts/<name>` and any packaged `charts/<name>-<version>.tgz`
fn remove_existing(charts_dir: &Path, name: &str) -> Result<()> {
    fsutil::remove_path(&charts_dir.join(name))?;
    if !charts_dir.is_dir() {
        return Ok(());
    }

    let prefix = format!("{}-", name);
    for entry in std::fs::read_dir(charts_dir)? {
        let entry = entry?;
        let file_name = entry.file_name().to_string_lossy().to_string();
        let packaged = file_name
            .strip_prefix(&prefix)
            .and_then(|rest| rest.strip_suffix(".tgz"))
            .is_some_and(|version| version.starts_with(|c: char| c.is_ascii_digit()));
        if packaged {
            fsutil::remove_path(&entry.path())?;
        }
    }
    Ok(())
}
