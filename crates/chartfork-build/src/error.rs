//! Error types for the package lifecycle and drift validation

use chartfork_core::CoreError;
use chartfork_repo::RepoError;
use thiserror::Error;

/// Build operation errors
#[derive(Debug, Error)]
pub enum BuildError {
    // ============ Package Errors ============
    #[error("Package not found: {name}")]
    PackageNotFound { name: String },

    #[error("Invalid package manifest {path}: {message}")]
    InvalidManifest { path: String, message: String },

    #[error("Chart {chart} has not been prepared")]
    NotPrepared { chart: String },

    #[error("CRD chart {chart}: {message}")]
    InvalidCrdChart { chart: String, message: String },

    // ============ Validation Errors ============
    #[error("Generated charts drifted from the reference at {path}")]
    Drift { path: String },

    #[error("Pre-release versions of {chart} are not zero-padded to the same width: {versions}")]
    UnpaddedPrerelease { chart: String, versions: String },

    #[error("Uncommitted changes under packages/ would be discarded by validation: {paths}")]
    UncommittedChanges { paths: String },

    #[error("Invalid configuration {path}: {message}")]
    InvalidConfig { path: String, message: String },

    // ============ Wrapped Errors ============
    #[error(transparent)]
    Repo(#[from] RepoError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type for build operations
pub type Result<T> = std::result::Result<T, BuildError>;
