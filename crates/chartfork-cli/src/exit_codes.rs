//! Standard exit codes for CLI operations
//!
//! These exit codes follow Unix conventions and sysexits.h where applicable.

/// Success - operation completed without errors
pub const SUCCESS: i32 = 0;

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// Drift - generated charts differ from the reference snapshot
pub const DRIFT: i32 = 2;

/// Package error - invalid package.yaml, unknown or unprepared package
pub const PACKAGE_ERROR: i32 = 3;

/// Source error - a chart or dependency could not be pulled or resolved
pub const SOURCE_ERROR: i32 = 4;

/// IO error - file not found, permission denied, etc.
pub const IO_ERROR: i32 = 5;

/// Required external tool missing or unsuitable (sysexits.h EX_UNAVAILABLE)
pub const UNAVAILABLE: i32 = 69;
