//! CLI error types with exit code handling
//!
//! Library errors are mapped into [`CliError`], which carries a help text
//! for the user and decides the process exit code.

use chartfork_build::BuildError;
use chartfork_core::CoreError;
use chartfork_repo::RepoError;
use miette::Diagnostic;
use thiserror::Error;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CliError {
    /// Generated charts differ from the reference
    #[error("Drift detected at {path}")]
    #[diagnostic(code(chartfork::cli::drift))]
    Drift {
        path: String,
        #[help]
        help: Option<String>,
    },

    /// Validation could not run to completion
    #[error("Validation failed: {message}")]
    #[diagnostic(code(chartfork::cli::validation))]
    Validation {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Package loading or lifecycle error
    #[error("Package error: {message}")]
    #[diagnostic(code(chartfork::cli::package))]
    Package {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Pulling or resolving a chart failed
    #[error("Source error: {message}")]
    #[diagnostic(code(chartfork::cli::source))]
    Source {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// GNU diff/patch missing or unsuitable
    #[error("{message}")]
    #[diagnostic(
        code(chartfork::cli::tool),
        help("install GNU diffutils and GNU patch and make sure they come first on PATH")
    )]
    Tool { message: String },

    /// IO error (file not found, permissions, etc.)
    #[error("IO error: {message}")]
    #[diagnostic(code(chartfork::cli::io))]
    Io { message: String },

    /// Wrapped error for passthrough (stores the formatted message)
    #[error("{message}")]
    #[diagnostic(code(chartfork::cli::error))]
    Other { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Drift { .. } => exit_codes::DRIFT,
            CliError::Validation { .. } => exit_codes::ERROR,
            CliError::Package { .. } => exit_codes::PACKAGE_ERROR,
            CliError::Source { .. } => exit_codes::SOURCE_ERROR,
            CliError::Tool { .. } => exit_codes::UNAVAILABLE,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Other { .. } => exit_codes::ERROR,
        }
    }

    /// Create a package error
    pub fn package(message: impl Into<String>) -> Self {
        Self::Package {
            message: message.into(),
            help: None,
        }
    }

    /// Create a package error with help text
    pub fn package_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Package {
            message: message.into(),
            help: Some(help.into()),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::UnsupportedTool { .. } => CliError::Tool {
                message: err.to_string(),
            },
            CoreError::ToolFailed { .. } | CoreError::BinaryDiff { .. } => CliError::Package {
                message: err.to_string(),
                help: Some("the change-set no longer applies cleanly; re-prepare from upstream and record it again".to_string()),
            },
            CoreError::DestinationExists { .. } => CliError::package_with_help(
                err.to_string(),
                "pass --overwrite to replace released charts",
            ),
            CoreError::Io(e) => CliError::from(e),
            other => CliError::package(other.to_string()),
        }
    }
}

impl From<RepoError> for CliError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Core(core) => CliError::from(core),
            RepoError::CircularDependency { .. } => CliError::package(err.to_string()),
            RepoError::PackageNotPrepared { .. } => CliError::package_with_help(
                err.to_string(),
                "local package dependencies must exist before their dependents are prepared",
            ),
            RepoError::DependencyNotLocked { .. } => CliError::Source {
                message: err.to_string(),
                help: Some("run `helm dependency update` upstream or pin an exact version".to_string()),
            },
            RepoError::Io(e) => CliError::from(e),
            other => CliError::Source {
                message: other.to_string(),
                help: None,
            },
        }
    }
}

impl From<BuildError> for CliError {
    fn from(err: BuildError) -> Self {
        match err {
            BuildError::Drift { path } => CliError::Drift {
                path,
                help: Some(
                    "record local edits with `chartfork patch`, bump the package version, or list the version in release.yaml"
                        .to_string(),
                ),
            },
            BuildError::UnpaddedPrerelease { .. } => CliError::Validation {
                message: err.to_string(),
                help: Some("zero-pad pre-release numbers so they sort, e.g. rc01 ... rc10".to_string()),
            },
            BuildError::UncommittedChanges { .. } => CliError::Validation {
                message: err.to_string(),
                help: Some("commit or stash your changes under packages/ first".to_string()),
            },
            BuildError::NotPrepared { .. } => {
                CliError::package_with_help(err.to_string(), "run `chartfork prepare` first")
            }
            BuildError::Repo(repo) => CliError::from(repo),
            BuildError::Core(core) => CliError::from(core),
            BuildError::Io(e) => CliError::from(e),
            other => CliError::package(other.to_string()),
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let drift = CliError::from(BuildError::Drift {
            path: "charts/app/app/1.0.0".to_string(),
        });
        assert_eq!(drift.exit_code(), exit_codes::DRIFT);

        let tool = CliError::from(BuildError::Core(CoreError::UnsupportedTool {
            tool: "diff".to_string(),
            banner: "diff (BSD)".to_string(),
        }));
        assert_eq!(tool.exit_code(), exit_codes::UNAVAILABLE);

        let cycle = CliError::from(BuildError::Repo(RepoError::CircularDependency {
            cycle: "app -> app".to_string(),
        }));
        assert_eq!(cycle.exit_code(), exit_codes::PACKAGE_ERROR);

        let dirty = CliError::from(BuildError::UncommittedChanges {
            paths: "packages/app/package.yaml".to_string(),
        });
        assert_eq!(dirty.exit_code(), exit_codes::ERROR);

        let missing = CliError::from(BuildError::PackageNotFound {
            name: "app".to_string(),
        });
        assert!(missing.to_string().contains("Package not found: app"));
    }
}
