//! End-to-end lifecycle tests against a local git upstream
//!
//! Skipped when git or GNU diff/patch are not installed.

use std::path::Path;

use chartfork_build::{
    BuildContext, BuildError, CacheConfig, Package, RepoConfig, ValidateOptions,
    validate_repository,
};
use chartfork_core::hash_dir;
use chartfork_repo::git::run_git;
use tempfile::TempDir;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

/// Create a git repository holding `charts/app`, returning its commit
fn upstream(dir: &Path) -> String {
    write(
        dir,
        "charts/app/Chart.yaml",
        "apiVersion: v2\nname: app\nversion: 1.2.0\n",
    );
    write(dir, "charts/app/values.yaml", "replicas: 1\nimage: app:1.2.0\n");
    write(
        dir,
        "charts/app/templates/deployment.yaml",
        "kind: Deployment\nreplicas: {{ .Values.replicas }}\n",
    );

    run_git(Some(dir), ["init", "--quiet"]).unwrap();
    run_git(Some(dir), ["add", "."]).unwrap();
    run_git(
        Some(dir),
        [
            "-c",
            "user.name=test",
            "-c",
            "user.email=test@example.com",
            "-c",
            "commit.gpgsign=false",
            "commit",
            "--quiet",
            "-m",
            "app 1.2.0",
        ],
    )
    .unwrap();
    run_git(Some(dir), ["rev-parse", "HEAD"]).unwrap()
}

struct Fixture {
    _temp: TempDir,
    root: std::path::PathBuf,
    config: RepoConfig,
    ctx: BuildContext,
}

/// A chart repository with package `app` pinned to a local upstream
fn fixture() -> Option<Fixture> {
    run_git(None, ["--version"]).ok()?;

    let temp = TempDir::new().unwrap();
    let upstream_dir = temp.path().join("upstream");
    let commit = upstream(&upstream_dir);

    let root = temp.path().join("repo");
    write(
        &root,
        "packages/app/package.yaml",
        &format!(
            "url: file://{}\nsubdirectory: charts/app\ncommit: {}\nversion: 100.0.0\n",
            upstream_dir.display(),
            commit
        ),
    );

    let config = RepoConfig {
        validate: None,
        cache: CacheConfig {
            enabled: true,
            dir: Some(temp.path().join("cache")),
        },
    };
    let ctx = BuildContext::new(&root, &config).ok()?;
    Some(Fixture {
        _temp: temp,
        root,
        config,
        ctx,
    })
}

#[tokio::test]
async fn test_unchanged_package_validates_without_drift() {
    let Some(fixture) = fixture() else {
        return;
    };
    let root = &fixture.root;

    let mut package = Package::load(root, "app").unwrap();
    package.prepare(&fixture.ctx).await.unwrap();

    let fresh = root.join("fresh");
    package
        .chart
        .source
        .pull(fixture.ctx.materializer().ctx(), &fresh)
        .await
        .unwrap();
    assert_eq!(
        hash_dir(&package.chart.working_dir).unwrap(),
        hash_dir(&fresh).unwrap()
    );

    package.generate_patch(&fixture.ctx).await.unwrap();
    assert!(!package.chart.changes.exists());

    let released = package.generate_charts(root, true).unwrap();
    assert_eq!(released[0].version, "100.0.0+up1.2.0");
    package.clean().unwrap();
    assert!(!package.chart.working_dir.exists());

    let report = validate_repository(&fixture.ctx, &fixture.config, &ValidateOptions::default())
        .await
        .unwrap();
    assert_eq!(report.compared, 2);
    assert!(!root.join("packages/app/charts").exists());
}

#[tokio::test]
async fn test_recorded_changes_survive_and_are_detected_as_drift() {
    let Some(fixture) = fixture() else {
        return;
    };
    let root = &fixture.root;

    let mut package = Package::load(root, "app").unwrap();
    package.prepare(&fixture.ctx).await.unwrap();
    package.generate_charts(&root.join("released"), true).unwrap();

    let working = package.chart.working_dir.clone();
    write(&working, "values.yaml", "replicas: 3\nimage: app:1.2.0\n");
    write(&working, "templates/service.yaml", "kind: Service\n");
    std::fs::remove_file(working.join("templates/deployment.yaml")).unwrap();
    let edited = hash_dir(&working).unwrap();

    package.generate_patch(&fixture.ctx).await.unwrap();
    let changes = &package.chart.changes;
    assert!(changes.patch_dir().join("values.yaml.patch").is_file());
    assert!(changes.overlay_dir().join("templates/service.yaml").is_file());
    assert!(changes.exclude_dir().join("templates/deployment.yaml").is_file());

    package.clean().unwrap();
    let mut package = Package::load(root, "app").unwrap();
    package.prepare(&fixture.ctx).await.unwrap();
    assert_eq!(hash_dir(&package.chart.working_dir).unwrap(), edited);
    package.clean().unwrap();

    let err = validate_repository(
        &fixture.ctx,
        &fixture.config,
        &ValidateOptions {
            reference: Some(root.join("released")),
            ..ValidateOptions::default()
        },
    )
    .await
    .unwrap_err();
    match err {
        BuildError::Drift { path } => {
            assert_eq!(path, "charts/app/app/100.0.0+up1.2.0")
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_uncommitted_package_edits_block_validation() {
    let Some(fixture) = fixture() else {
        return;
    };
    let root = &fixture.root;

    run_git(Some(root), ["init", "--quiet"]).unwrap();
    run_git(Some(root), ["add", "."]).unwrap();
    run_git(
        Some(root),
        [
            "-c",
            "user.name=test",
            "-c",
            "user.email=test@example.com",
            "-c",
            "commit.gpgsign=false",
            "commit",
            "--quiet",
            "-m",
            "packages",
        ],
    )
    .unwrap();

    let manifest = root.join("packages/app/package.yaml");
    let edited = format!("{}doNotRelease: true\n", std::fs::read_to_string(&manifest).unwrap());
    std::fs::write(&manifest, &edited).unwrap();

    let err = validate_repository(&fixture.ctx, &fixture.config, &ValidateOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, BuildError::UncommittedChanges { .. }), "{err}");
    assert_eq!(std::fs::read_to_string(&manifest).unwrap(), edited);
    assert!(!root.join("packages/app/charts").exists());
}
