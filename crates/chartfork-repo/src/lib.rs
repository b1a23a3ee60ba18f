//! chartfork repository access
//!
//! This crate knows where chart content comes from and how dependencies
//! become local directories:
//!
//! - **Sources**: git repositories, `.tgz` archives, OCI registries, other
//!   packages of the same repository, or charts kept in place
//! - **Helm indexes**: locked dependencies resolved against `index.yaml`,
//!   one remote query at a time
//! - **Content cache**: commit-pinned git checkouts reused across runs
//! - **Materializer**: recursive dependency preparation and recording of
//!   nested change-sets

pub mod cache;
pub mod context;
pub mod dependency;
pub mod descriptor;
pub mod error;
pub mod git;
pub mod http;
pub mod index;
pub mod oci;
pub mod source;

pub use cache::ContentCache;
pub use context::PullContext;
pub use dependency::{CHARTS_SUBDIR, Materializer};
pub use descriptor::{DependencyDescriptor, DependencyRecord};
pub use error::{RepoError, Result};
pub use http::HttpIndexFetcher;
pub use index::{ChartEntry, IndexFetcher, IndexResolver, RepositoryIndex};
pub use source::{GitRef, Source};
