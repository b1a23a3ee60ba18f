//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Chart not found: {path}")]
    ChartNotFound { path: String },

    #[error("Invalid chart: {message}")]
    InvalidChart { message: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to walk directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Invalid version: {0}")]
    InvalidVersion(#[from] semver::Error),

    #[error("Change-set root must end in '{expected}': {path}")]
    InvalidChangesRoot { path: String, expected: String },

    #[error("Unsupported {tool}: a GNU-compatible implementation is required (found: {banner})")]
    UnsupportedTool { tool: String, banner: String },

    #[error("{tool} exited with status {status}: {output}")]
    ToolFailed {
        tool: String,
        status: i32,
        output: String,
    },

    #[error("Cannot produce a textual patch for binary file {path}; list it in replacePaths")]
    BinaryDiff { path: String },

    #[error("Destination already exists and is not empty: {path}")]
    DestinationExists { path: String },
}

pub type Result<T> = std::result::Result<T, CoreError>;
