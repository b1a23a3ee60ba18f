//! Source locators: where a chart's upstream content comes from
//!
//! The set of source kinds is closed. A locator is built once from the
//! `url` / `subdirectory` / `commit` / `branch` options found in
//! `package.yaml` or a dependency descriptor and never changes afterwards.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use chartfork_core::fsutil;
use sha2::{Digest, Sha256};

use crate::context::PullContext;
use crate::error::{RepoError, Result};
use crate::{git, http, oci};

/// `url` value of a chart that lives in its working directory
pub const LOCAL_URL: &str = "local";
/// `url` prefix of a chart provided by another package of the repository
pub const PACKAGES_PREFIX: &str = "packages/";
/// `url` prefix of OCI registry references
pub const OCI_SCHEME: &str = "oci://";
/// Directory a local package materializes its chart into by default
pub const DEFAULT_PACKAGE_CHART_DIR: &str = "charts";

/// Git revision a git source is pinned to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitRef {
    /// Immutable commit hash
    Commit(String),
    /// Moving branch head
    Branch(String),
}

/// Where a chart is pulled from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// A git repository at a commit or branch
    Git {
        url: String,
        reference: GitRef,
        subdirectory: Option<String>,
    },
    /// A `.tgz` / `.tar.gz` download
    Archive {
        url: String,
        subdirectory: Option<String>,
        /// SHA-256 the download must match, as published in a Helm index
        digest: Option<String>,
    },
    /// An OCI registry reference, without the `oci://` scheme
    Oci {
        reference: String,
        subdirectory: Option<String>,
    },
    /// Another package of this repository (`packages/<package>`)
    LocalPackage {
        package: String,
        subdirectory: Option<String>,
    },
    /// The chart already lives in its working directory
    Local,
}

impl Source {
    /// Build a locator from manifest options
    pub fn from_options(
        url: &str,
        subdirectory: Option<&str>,
        commit: Option<&str>,
        branch: Option<&str>,
    ) -> Result<Self> {
        let url = url.trim();
        let subdirectory = subdirectory
            .map(|s| s.trim().trim_matches('/').to_string())
            .filter(|s| !s.is_empty());

        if url.is_empty() {
            return Err(RepoError::InvalidSource {
                message: "url must not be empty".to_string(),
            });
        }

        if url == LOCAL_URL {
            return Ok(Source::Local);
        }

        if let Some(package) = url.strip_prefix(PACKAGES_PREFIX) {
            let package = package.trim_end_matches('/');
            if package.is_empty() || package.contains('/') {
                return Err(RepoError::InvalidSource {
                    message: format!("'{}' does not name a package", url),
                });
            }
            return Ok(Source::LocalPackage {
                package: package.to_string(),
                subdirectory,
            });
        }

        if let Some(reference) = url.strip_prefix(OCI_SCHEME) {
            return Ok(Source::Oci {
                reference: reference.to_string(),
                subdirectory,
            });
        }

        if url.ends_with(".tgz") || url.ends_with(".tar.gz") {
            return Ok(Source::Archive {
                url: url.to_string(),
                subdirectory,
                digest: None,
            });
        }

        let reference = match (commit, branch) {
            (Some(commit), None) => GitRef::Commit(commit.to_string()),
            (None, Some(branch)) => GitRef::Branch(branch.to_string()),
            (Some(_), Some(_)) => {
                return Err(RepoError::InvalidSource {
                    message: format!("{}: commit and branch are mutually exclusive", url),
                });
            }
            (None, None) => {
                return Err(RepoError::InvalidSource {
                    message: format!("{}: git sources need a commit or a branch", url),
                });
            }
        };

        Ok(Source::Git {
            url: url.to_string(),
            reference,
            subdirectory,
        })
    }

    /// The `url` option this locator was built from
    pub fn url(&self) -> String {
        match self {
            Source::Git { url, .. } | Source::Archive { url, .. } => url.clone(),
            Source::Oci { reference, .. } => format!("{}{}", OCI_SCHEME, reference),
            Source::LocalPackage { package, .. } => format!("{}{}", PACKAGES_PREFIX, package),
            Source::Local => LOCAL_URL.to_string(),
        }
    }

    pub fn subdirectory(&self) -> Option<&str> {
        match self {
            Source::Git { subdirectory, .. }
            | Source::Archive { subdirectory, .. }
            | Source::Oci { subdirectory, .. }
            | Source::LocalPackage { subdirectory, .. } => subdirectory.as_deref(),
            Source::Local => None,
        }
    }

    pub fn commit(&self) -> Option<&str> {
        match self {
            Source::Git {
                reference: GitRef::Commit(commit),
                ..
            } => Some(commit),
            _ => None,
        }
    }

    pub fn branch(&self) -> Option<&str> {
        match self {
            Source::Git {
                reference: GitRef::Branch(branch),
                ..
            } => Some(branch),
            _ => None,
        }
    }

    pub fn is_local_package(&self) -> bool {
        matches!(self, Source::LocalPackage { .. })
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Source::Local)
    }

    /// Expected SHA-256 of an archive download
    pub fn digest(&self) -> Option<&str> {
        match self {
            Source::Archive { digest, .. } => digest.as_deref(),
            _ => None,
        }
    }

    /// This locator expecting `digest`; only archives carry one
    pub fn with_digest(self, digest: Option<String>) -> Self {
        match self {
            Source::Archive {
                url, subdirectory, ..
            } => Source::Archive {
                url,
                subdirectory,
                digest,
            },
            other => other,
        }
    }

    /// `packages/<package>` under `repo_root` for local package sources
    pub fn package_dir(&self, repo_root: &Path) -> Option<PathBuf> {
        match self {
            Source::LocalPackage { package, .. } => {
                Some(repo_root.join(PACKAGES_PREFIX).join(package))
            }
            _ => None,
        }
    }

    /// Key into the content cache
    ///
    /// Only commit-pinned git sources have one: every other kind can change
    /// content behind the same locator.
    pub fn cache_key(&self) -> Option<String> {
        match self {
            Source::Git {
                url,
                reference: GitRef::Commit(commit),
                ..
            } => {
                let mut hasher = Sha256::new();
                hasher.update(url.as_bytes());
                hasher.update(b"@");
                hasher.update(commit.as_bytes());
                Some(hex::encode(hasher.finalize()))
            }
            _ => None,
        }
    }

    /// Whether the content pulled for `inner` lies within this locator's
    /// content
    ///
    /// Both must share the same origin; no subdirectory means the root.
    pub fn encloses(&self, inner: &Source) -> bool {
        if self.is_local() || inner.is_local() || self.origin() != inner.origin() {
            return false;
        }
        let outer = Path::new(self.subdirectory().unwrap_or_default());
        Path::new(inner.subdirectory().unwrap_or_default()).starts_with(outer)
    }

    /// This locator with its subdirectory dropped
    fn origin(&self) -> Source {
        match self {
            Source::Git { url, reference, .. } => Source::Git {
                url: url.clone(),
                reference: reference.clone(),
                subdirectory: None,
            },
            Source::Archive { url, digest, .. } => Source::Archive {
                url: url.clone(),
                subdirectory: None,
                digest: digest.clone(),
            },
            Source::Oci { reference, .. } => Source::Oci {
                reference: reference.clone(),
                subdirectory: None,
            },
            Source::LocalPackage { package, .. } => Source::LocalPackage {
                package: package.clone(),
                subdirectory: None,
            },
            Source::Local => Source::Local,
        }
    }

    /// Locator for `relative`, resolved against this locator's subdirectory
    ///
    /// Used for `file://` dependencies, which live in the same source as
    /// their parent chart.
    pub fn with_subdirectory(&self, relative: &str) -> Result<Self> {
        let joined = join_relative(self.subdirectory().unwrap_or_default(), relative)?;
        let subdirectory = Some(joined).filter(|s| !s.is_empty());

        Ok(match self {
            Source::Git { url, reference, .. } => Source::Git {
                url: url.clone(),
                reference: reference.clone(),
                subdirectory,
            },
            Source::Archive { url, digest, .. } => Source::Archive {
                url: url.clone(),
                subdirectory,
                digest: digest.clone(),
            },
            Source::Oci { reference, .. } => Source::Oci {
                reference: reference.clone(),
                subdirectory,
            },
            Source::LocalPackage { package, .. } => Source::LocalPackage {
                package: package.clone(),
                subdirectory,
            },
            Source::Local => {
                return Err(RepoError::InvalidSource {
                    message: format!(
                        "cannot resolve '{}' against a chart without upstream",
                        relative
                    ),
                });
            }
        })
    }

    /// Pull this source into `dest`
    ///
    /// On success `dest` holds exactly the (subdirectory-rooted) content,
    /// without version-control metadata. A local source is already in
    /// place, so nothing happens.
    pub async fn pull(&self, ctx: &PullContext, dest: &Path) -> Result<()> {
        tracing::info!("pulling {} into {}", self, dest.display());

        match self {
            Source::Local => Ok(()),
            Source::LocalPackage {
                package,
                subdirectory,
            } => {
                let root = ctx.repo_root().join(PACKAGES_PREFIX).join(package);
                let chart = root.join(
                    subdirectory
                        .as_deref()
                        .unwrap_or(DEFAULT_PACKAGE_CHART_DIR),
                );
                if !chart.is_dir() {
                    return Err(RepoError::PackageNotPrepared {
                        package: package.clone(),
                        path: chart.display().to_string(),
                    });
                }
                fsutil::remove_path(dest)?;
                fsutil::copy_dir(&chart, dest)?;
                Ok(())
            }
            Source::Git {
                url,
                reference,
                subdirectory,
            } => {
                let temp = tempfile::TempDir::new()?;
                let checkout = temp.path().join("checkout");
                let cached = match (ctx.cache(), self.cache_key()) {
                    (Some(cache), Some(key)) => cache.restore(&key, &checkout)?,
                    _ => false,
                };

                if !cached {
                    git::clone(url, reference, &checkout)?;
                    fsutil::remove_path(&checkout.join(".git"))?;
                    if let (Some(cache), Some(key)) = (ctx.cache(), self.cache_key()) {
                        cache.store(&key, &checkout)?;
                    }
                }

                place(&checkout, subdirectory.as_deref(), dest, false)
            }
            Source::Archive {
                url,
                subdirectory,
                digest,
            } => {
                let data = http::download(ctx.client(), url).await?;
                if let Some(expected) = digest {
                    http::verify_digest(url, &data, expected)?;
                }
                let temp = tempfile::TempDir::new()?;
                chartfork_core::extract_bytes(&data, temp.path())?;
                place(temp.path(), subdirectory.as_deref(), dest, true)
            }
            Source::Oci {
                reference,
                subdirectory,
            } => {
                let data = oci::pull_chart(reference).await?;
                let temp = tempfile::TempDir::new()?;
                chartfork_core::extract_bytes(&data, temp.path())?;
                place(temp.path(), subdirectory.as_deref(), dest, true)
            }
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url())?;
        match self {
            Source::Git {
                reference: GitRef::Commit(commit),
                ..
            } => write!(f, "@{}", commit)?,
            Source::Git {
                reference: GitRef::Branch(branch),
                ..
            } => write!(f, "#{}", branch)?,
            _ => {}
        }
        if let Some(sub) = self.subdirectory() {
            write!(f, "[{}]", sub)?;
        }
        Ok(())
    }
}

/// Copy `root/<subdirectory>` to `dest`, replacing whatever was there
///
/// Without a subdirectory, an extracted archive holding a single top-level
/// directory (the usual `<chart>/` layout) is rooted at that directory.
fn place(root: &Path, subdirectory: Option<&str>, dest: &Path, unwrap_single: bool) -> Result<()> {
    let src = match subdirectory {
        Some(sub) => root.join(sub),
        None if unwrap_single => single_child_dir(root)?.unwrap_or_else(|| root.to_path_buf()),
        None => root.to_path_buf(),
    };

    if !src.is_dir() {
        return Err(RepoError::InvalidSource {
            message: format!(
                "subdirectory '{}' not found in source",
                subdirectory.unwrap_or_default()
            ),
        });
    }

    fsutil::remove_path(dest)?;
    fsutil::copy_dir(&src, dest)?;
    fsutil::remove_path(&dest.join(".git"))?;
    Ok(())
}

fn single_child_dir(root: &Path) -> Result<Option<PathBuf>> {
    let mut children = std::fs::read_dir(root)?.collect::<std::io::Result<Vec<_>>>()?;
    if children.len() != 1 {
        return Ok(None);
    }
    let child = children.remove(0);
    Ok(child.file_type()?.is_dir().then(|| child.path()))
}

/// Join `relative` onto `base`, resolving `.` and `..`
fn join_relative(base: &str, relative: &str) -> Result<String> {
    let mut parts: Vec<String> = Vec::new();

    for component in Path::new(base).join(relative).components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().to_string()),
            Component::CurDir => {}
            Component::ParentDir => {
                if parts.pop().is_none() {
                    return Err(RepoError::InvalidSource {
                        message: format!("'{}' escapes the source root", relative),
                    });
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(RepoError::InvalidSource {
                    message: format!("'{}' must be relative", relative),
                });
            }
        }
    }

    Ok(parts.join("/"))
}
