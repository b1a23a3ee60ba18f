//! Wrapper around the GNU `diff` and `patch` executables
//!
//! BSD-family variants produce patches with incompatible semantics, so the
//! version banner of both tools is checked once up front and anything that
//! is not GNU is rejected.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use crate::error::{CoreError, Result};

/// `diff` exit status meaning "inputs differ"
const DIFF_FOUND: i32 = 1;

/// Handle on verified GNU diff/patch executables
#[derive(Debug, Clone)]
pub struct DiffTool {
    diff: PathBuf,
    patch: PathBuf,
}

impl DiffTool {
    /// Locate `diff` and `patch` on `PATH` and verify both are GNU
    pub fn detect() -> Result<Self> {
        Self::with_executables("diff", "patch")
    }

    /// Use explicit executables, verifying both are GNU
    pub fn with_executables(diff: impl Into<PathBuf>, patch: impl Into<PathBuf>) -> Result<Self> {
        let tool = Self {
            diff: diff.into(),
            patch: patch.into(),
        };
        verify_gnu(&tool.diff, "diff")?;
        verify_gnu(&tool.patch, "patch")?;
        Ok(tool)
    }

    /// Produce a unified diff turning `from` into `to`
    ///
    /// Returns `None` when the files are identical. Header lines are
    /// rewritten to `a/<relative>` and `b/<relative>` so the output carries
    /// no wall-clock timestamps or absolute paths.
    pub fn diff(&self, from: &Path, to: &Path, relative: &Path) -> Result<Option<Vec<u8>>> {
        let output = run(
            &self.diff,
            [
                OsStr::new("-u"),
                OsStr::new("--"),
                from.as_os_str(),
                to.as_os_str(),
            ],
        )?;

        if output.stdout.starts_with(b"Binary files") {
            return Err(CoreError::BinaryDiff {
                path: relative.display().to_string(),
            });
        }

        match output.status.code() {
            Some(0) => Ok(None),
            Some(DIFF_FOUND) => Ok(Some(normalize_headers(&output.stdout, relative))),
            code => Err(tool_failed("diff", code, &output)),
        }
    }

    /// Apply `patch_file` to the file at `target`
    ///
    /// The target is named explicitly rather than read back from the patch
    /// header, which GNU patch cuts at the first whitespace.
    pub fn apply(&self, patch_file: &Path, target: &Path) -> Result<()> {
        let output = run(
            &self.patch,
            [
                OsStr::new("--batch"),
                OsStr::new("--no-backup-if-mismatch"),
                OsStr::new("-i"),
                patch_file.as_os_str(),
                OsStr::new("--"),
                target.as_os_str(),
            ],
        )?;

        if !output.status.success() {
            return Err(tool_failed("patch", output.status.code(), &output));
        }
        Ok(())
    }
}

fn verify_gnu(executable: &Path, tool: &str) -> Result<()> {
    let output = run(executable, [OsStr::new("--version")])?;
    let banner = String::from_utf8_lossy(&output.stdout);
    let first_line = banner.lines().next().unwrap_or_default().to_string();

    if !output.status.success() || !banner.contains("GNU") {
        return Err(CoreError::UnsupportedTool {
            tool: tool.to_string(),
            banner: first_line,
        });
    }

    tracing::debug!("using {}", first_line);
    Ok(())
}

fn run<I, S>(executable: &Path, args: I) -> Result<Output>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    Command::new(executable).args(args).output().map_err(|e| {
        CoreError::ToolFailed {
            tool: executable.display().to_string(),
            status: -1,
            output: e.to_string(),
        }
    })
}

fn tool_failed(tool: &str, code: Option<i32>, output: &Output) -> CoreError {
    let mut message = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.is_empty() {
        if !message.is_empty() {
            message.push('\n');
        }
        message.push_str(&stderr);
    }

    CoreError::ToolFailed {
        tool: tool.to_string(),
        status: code.unwrap_or(-1),
        output: message.trim_end().to_string(),
    }
}

/// Replace the `---`/`+++` header of a single-file unified diff
///
/// Only the first two lines are touched: a removed content line such as
/// `-- x` also starts with `---` further down.
fn normalize_headers(raw: &[u8], relative: &Path) -> Vec<u8> {
    let relative = relative.to_string_lossy().replace('\\', "/");
    let mut out = Vec::with_capacity(raw.len());
    let mut rest = raw;

    for (prefix, side) in [(b"--- ", "a"), (b"+++ ", "b")] {
        let line_end = rest
            .iter()
            .position(|&b| b == b'\n')
            .map(|i| i + 1)
            .unwrap_or(rest.len());
        let line = &rest[..line_end];

        if line.starts_with(prefix) {
            out.extend_from_slice(prefix);
            out.extend_from_slice(format!("{}/{}\n", side, relative).as_bytes());
        } else {
            out.extend_from_slice(line);
        }
        rest = &rest[line_end..];
    }

    out.extend_from_slice(rest);
    out
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::TempDir;

    /// GNU diff/patch, or `None` on hosts that lack them
    pub(crate) fn gnu_tool() -> Option<DiffTool> {
        DiffTool::detect().ok()
    }

    #[test]
    fn test_normalize_headers_strips_timestamps() {
        let raw = b"--- /tmp/a/values.yaml\t2024-05-01 10:00:00.000000000 +0000\n\
+++ /tmp/b/values.yaml\t2024-05-01 10:00:01.000000000 +0000\n\
@@ -1 +1 @@\n\
--- old\n\
+new\n";

        let normalized = normalize_headers(raw, Path::new("values.yaml"));
        let text = String::from_utf8(normalized).unwrap();

        assert_eq!(
            text,
            "--- a/values.yaml\n+++ b/values.yaml\n@@ -1 +1 @@\n--- old\n+new\n"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_non_gnu_tool_is_rejected() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let fake = temp.path().join("diff");
        std::fs::write(&fake, "#!/bin/sh\necho 'Apple diff (based on FreeBSD diff)'\n").unwrap();
        std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755)).unwrap();

        let err = DiffTool::with_executables(&fake, &fake).unwrap_err();
        match err {
            CoreError::UnsupportedTool { tool, banner } => {
                assert_eq!(tool, "diff");
                assert!(banner.contains("Apple"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_diff_identical_is_none() {
        let Some(tool) = gnu_tool() else { return };
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a");
        let b = temp.path().join("b");
        std::fs::write(&a, "same\n").unwrap();
        std::fs::write(&b, "same\n").unwrap();

        assert!(tool.diff(&a, &b, Path::new("f")).unwrap().is_none());
    }

    #[test]
    fn test_diff_and_apply() {
        let Some(tool) = gnu_tool() else { return };
        let temp = TempDir::new().unwrap();
        let from = temp.path().join("from");
        let to = temp.path().join("to");
        std::fs::create_dir_all(&from).unwrap();
        std::fs::create_dir_all(&to).unwrap();
        std::fs::write(from.join("values.yaml"), "replicas: 1\nimage: nginx\n").unwrap();
        std::fs::write(to.join("values.yaml"), "replicas: 3\nimage: nginx\n").unwrap();

        let patch = tool
            .diff(
                &from.join("values.yaml"),
                &to.join("values.yaml"),
                Path::new("values.yaml"),
            )
            .unwrap()
            .unwrap();
        let text = String::from_utf8(patch.clone()).unwrap();
        assert!(text.starts_with("--- a/values.yaml\n+++ b/values.yaml\n"));

        let patch_file = temp.path().join("values.yaml.patch");
        std::fs::write(&patch_file, patch).unwrap();
        tool.apply(&patch_file, &from.join("values.yaml")).unwrap();

        assert_eq!(
            std::fs::read_to_string(from.join("values.yaml")).unwrap(),
            "replicas: 3\nimage: nginx\n"
        );
    }
}
