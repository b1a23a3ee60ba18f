//! Integration tests for CLI commands

use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

/// Helper to run chartfork in `repo_root`
fn chartfork(repo_root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_chartfork"))
        .arg("--repo-root")
        .arg(repo_root)
        .args(args)
        .env_remove("CHARTFORK_PACKAGE")
        .env("RUST_LOG", "warn")
        .output()
        .expect("Failed to execute chartfork")
}

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

/// Whether GNU diff and GNU patch are on PATH
fn gnu_tools() -> bool {
    ["diff", "patch"].iter().all(|tool| {
        Command::new(tool)
            .arg("--version")
            .output()
            .map(|out| String::from_utf8_lossy(&out.stdout).contains("GNU"))
            .unwrap_or(false)
    })
}

/// A repository with two packages whose charts live in place
fn repository() -> TempDir {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    write(
        root,
        "configuration.yaml",
        &format!("cache:\n  dir: {}\n", root.join(".cache").display()),
    );
    write(root, "packages/app/package.yaml", "url: local\nversion: 2.0.0\n");
    write(
        root,
        "packages/app/charts/Chart.yaml",
        "apiVersion: v2\nname: app\nversion: 0.1.0\n",
    );
    write(root, "packages/app/charts/values.yaml", "replicas: 1\n");
    write(
        root,
        "packages/tools/package.yaml",
        "url: local\ndoNotRelease: true\n",
    );
    write(
        root,
        "packages/tools/charts/Chart.yaml",
        "apiVersion: v2\nname: tools\nversion: 1.0.0\n",
    );
    temp
}

mod list_command {
    use super::*;

    #[test]
    fn test_list_packages() {
        let repo = repository();
        let output = chartfork(repo.path(), &["list"]);

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        let lines: Vec<_> = stdout.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("app"));
        assert!(lines[0].contains("version 2.0.0"));
        assert!(lines[1].contains("not released"));
    }

    #[test]
    fn test_list_single_package_from_env() {
        let repo = repository();
        let output = Command::new(env!("CARGO_BIN_EXE_chartfork"))
            .arg("--repo-root")
            .arg(repo.path())
            .arg("list")
            .env("CHARTFORK_PACKAGE", "tools")
            .output()
            .unwrap();

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert_eq!(stdout.lines().count(), 1);
        assert!(stdout.starts_with("tools"));
    }

    #[test]
    fn test_unknown_package() {
        let repo = repository();
        let output = chartfork(repo.path(), &["list", "--package", "missing"]);

        assert_eq!(output.status.code(), Some(3));
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("Package not found: missing"));
    }

    #[test]
    fn test_empty_repository() {
        let temp = TempDir::new().unwrap();
        let output = chartfork(temp.path(), &["list"]);
        assert!(output.status.success());
        assert!(String::from_utf8_lossy(&output.stdout).contains("No packages found"));
    }
}

mod release_command {
    use super::*;

    #[test]
    fn test_release_adds_once() {
        let repo = repository();

        let first = chartfork(repo.path(), &["release", "app", "2.0.0+up0.1.0"]);
        assert!(first.status.success());
        let again = chartfork(repo.path(), &["release", "app", "2.0.0+up0.1.0"]);
        assert!(again.status.success());
        assert!(String::from_utf8_lossy(&again.stdout).contains("already listed"));

        let registry = std::fs::read_to_string(repo.path().join("release.yaml")).unwrap();
        insta::assert_snapshot!(registry, @r"
        app:
        - 2.0.0+up0.1.0
        ");
    }
}

mod lifecycle_commands {
    use super::*;

    #[test]
    fn test_charts_then_validate() {
        if !gnu_tools() {
            return;
        }
        let repo = repository();
        let root = repo.path();

        let output = chartfork(root, &["charts"]);
        assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
        assert!(root.join("assets/app/app-2.0.0+up0.1.0.tgz").is_file());
        assert!(root.join("charts/app/app/2.0.0+up0.1.0/values.yaml").is_file());
        assert!(!root.join("assets/tools").exists());
        assert!(root.join("packages/app/charts/Chart.yaml").is_file());

        let again = chartfork(root, &["charts"]);
        assert_eq!(again.status.code(), Some(3));
        assert!(chartfork(root, &["charts", "--overwrite"]).status.success());

        let output = chartfork(root, &["validate"]);
        assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
        assert!(String::from_utf8_lossy(&output.stdout).contains("Validation passed"));

        write(root, "packages/app/charts/values.yaml", "replicas: 2\n");
        let output = chartfork(root, &["validate"]);
        assert_eq!(output.status.code(), Some(2));
        assert!(String::from_utf8_lossy(&output.stderr).contains("Drift detected at charts/app/app/2.0.0+up0.1.0"));

        chartfork(root, &["release", "app", "2.0.0+up0.1.0"]);
        let output = chartfork(root, &["validate"]);
        assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
        assert!(String::from_utf8_lossy(&output.stdout).contains("pending release"));
    }

    #[test]
    fn test_prepare_patch_clean_local_package() {
        if !gnu_tools() {
            return;
        }
        let repo = repository();
        let root = repo.path();

        let output = chartfork(root, &["prepare", "-p", "app"]);
        assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
        assert!(String::from_utf8_lossy(&output.stdout).contains("upstream 0.1.0"));

        assert!(chartfork(root, &["patch", "-p", "app"]).status.success());
        assert!(!root.join("packages/app/generated-changes").exists());

        assert!(chartfork(root, &["clean"]).status.success());
        assert!(root.join("packages/app/charts/values.yaml").is_file());
    }
}

mod cache_command {
    use super::*;

    #[test]
    fn test_clear_cache() {
        let repo = repository();
        write(repo.path(), ".cache/0a1b/Chart.yaml", "name: cached\n");

        let output = chartfork(repo.path(), &["clear-cache"]);
        assert!(output.status.success());
        assert!(!repo.path().join(".cache/0a1b").exists());
    }
}
