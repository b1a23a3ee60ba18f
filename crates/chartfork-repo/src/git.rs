//! Cloning git sources with the `git` executable

use std::ffi::OsStr;
use std::path::Path;
use std::process::Command;

use crate::error::{RepoError, Result};
use crate::source::GitRef;

/// Clone `url` at `reference` into `dest`
pub fn clone(url: &str, reference: &GitRef, dest: &Path) -> Result<()> {
    let dest_arg = dest.as_os_str();

    match reference {
        GitRef::Branch(branch) => {
            run_git(
                None,
                [
                    OsStr::new("clone"),
                    OsStr::new("--quiet"),
                    OsStr::new("--depth"),
                    OsStr::new("1"),
                    OsStr::new("--branch"),
                    OsStr::new(branch),
                    OsStr::new(url),
                    dest_arg,
                ],
            )?;
        }
        GitRef::Commit(commit) => {
            run_git(
                None,
                [
                    OsStr::new("clone"),
                    OsStr::new("--quiet"),
                    OsStr::new("--no-checkout"),
                    OsStr::new(url),
                    dest_arg,
                ],
            )?;
            run_git(
                Some(dest),
                [
                    OsStr::new("checkout"),
                    OsStr::new("--quiet"),
                    OsStr::new(commit),
                ],
            )?;
        }
    }

    Ok(())
}

/// Run git non-interactively, returning its trimmed stdout
pub fn run_git<I, S>(cwd: Option<&Path>, args: I) -> Result<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let args: Vec<_> = args.into_iter().map(|a| a.as_ref().to_owned()).collect();
    let mut command = Command::new("git");
    command.args(&args).env("GIT_TERMINAL_PROMPT", "0");
    if let Some(cwd) = cwd {
        command.current_dir(cwd);
    }

    let rendered = format!(
        "git {}",
        args.iter()
            .map(|a| a.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    );
    tracing::debug!("{}", rendered);

    let output = command.output().map_err(|e| RepoError::GitFailed {
        command: rendered.clone(),
        output: e.to_string(),
    })?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(RepoError::GitFailed {
            command: rendered,
            output: format!("{}{}", stdout, stderr).trim_end().to_string(),
        });
    }

    Ok(stdout.trim_end().to_string())
}
