//! chartfork core - change-sets and chart plumbing
//!
//! This crate provides the building blocks every other chartfork crate
//! relies on:
//! - `tree`: lock-step comparison of two directory trees
//! - `changes`: recording and replaying overlay / exclude / patch change-sets
//! - `patch`: the GNU diff/patch collaborator
//! - `chart`: Helm `Chart.yaml` metadata and dependency manifests
//! - `archive`: reproducible chart packaging
//! - `hash`: content hashing of files and directory trees

pub mod archive;
pub mod changes;
pub mod chart;
pub mod error;
pub mod fsutil;
pub mod hash;
pub mod patch;
pub mod tree;

pub use archive::{PackageOptions, PackagedChart, extract_archive, extract_bytes, package_chart};
pub use changes::{CHANGES_DIR, ChangeSet, ChangeSummary, GenerateOptions};
pub use chart::{ChartDependency, ChartMetadata, DependencyUpdate, LoadedChart};
pub use error::{CoreError, Result};
pub use hash::{hash_dir, hash_file};
pub use patch::DiffTool;
pub use tree::{EntryKind, TreeEntry, compare_trees};
