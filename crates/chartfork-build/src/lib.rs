//! chartfork build - packages, releases and validation
//!
//! This crate drives the lifecycle of the packages of a chart repository:
//!
//! - **Packages**: `package.yaml` manifests, their main chart and
//!   additional charts (upstream or CRD companions)
//! - **Lifecycle**: prepare, record changes, package charts, clean
//! - **Validation**: regenerated charts compared with a released snapshot,
//!   release candidates folded, pending releases skipped
//!
//! # Example
//!
//! ```no_run
//! use chartfork_build::{BuildContext, Package, RepoConfig};
//! use std::path::Path;
//!
//! # async fn run() -> chartfork_build::Result<()> {
//! let root = Path::new(".");
//! let ctx = BuildContext::new(root, &RepoConfig::load(root)?)?;
//! for mut package in Package::load_all(root, None)? {
//!     package.prepare(&ctx).await?;
//!     package.generate_charts(root, true)?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod crd;
pub mod drift;
pub mod error;
pub mod git;
pub mod manifest;
pub mod package;
pub mod release;
pub mod validate;

pub use config::{CacheConfig, RepoConfig, ValidateConfig};
pub use drift::{COMPARE_DEPTH, CompareOptions, DriftReport, DriftValidator};
pub use error::{BuildError, Result};
pub use git::GitWorkspace;
pub use manifest::{AdditionalChartOptions, CrdOptions, PackageManifest, UpstreamOptions};
pub use package::{AdditionalChart, BuildContext, Chart, Package, release_version};
pub use release::ReleaseRegistry;
pub use validate::{ValidateOptions, validate_repository};
