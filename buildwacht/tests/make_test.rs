//! Driver tests on a real directory: build, rebuild, edit, suspend

use buildwacht::{Project, ProjectOptions};
use buildwacht::commands::{make::make, status::status, suspend::suspend};
use filetime::{FileTime, set_file_mtime};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const CONFIG: &str = r"
modules:
  - name: docs
    source_roots: [src]
    output_root: out
compile:
  source_extension: txt
  output_extension: out
";

fn write_source(root: &Path, relative: &str, content: &str, seconds: i64) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, content).unwrap();
    set_file_mtime(&path, FileTime::from_unix_time(seconds, 0)).unwrap();
}

fn workspace() -> (TempDir, ProjectOptions) {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("buildwacht.yml"), CONFIG).unwrap();
    write_source(temp.path(), "src/a.txt", "alpha", 1_000);
    write_source(temp.path(), "src/nested/b.txt", "beta", 1_000);
    write_source(temp.path(), "src/notes.md", "not compiled", 1_000);
    let options = ProjectOptions::new(temp.path());
    (temp, options)
}

#[tokio::test]
async fn test_second_build_is_empty() {
    let (temp, options) = workspace();

    let first = make(&options, false, false).await.unwrap();
    assert_eq!(first.compiled, 2);
    assert_eq!(fs::read_to_string(temp.path().join("out/a.out")).unwrap(), "alpha");
    assert_eq!(fs::read_to_string(temp.path().join("out/nested/b.out")).unwrap(), "beta");
    assert!(!temp.path().join("out/notes.out").exists());

    let second = make(&options, false, false).await.unwrap();
    assert_eq!(second.compiled, 0);
    assert_eq!(second.deleted, 0);
}

#[tokio::test]
async fn test_edited_source_is_recompiled() {
    let (temp, options) = workspace();
    let _ = make(&options, false, false).await.unwrap();

    write_source(temp.path(), "src/a.txt", "alpha two", 2_000);
    let report = status(&options).await.unwrap();
    assert_eq!(report.pending, vec![temp.path().join("src/a.txt")]);
    assert_eq!(report.deletions.len(), 1);
    assert_eq!(report.outputs.len(), 2);

    let summary = make(&options, false, false).await.unwrap();
    assert_eq!(summary.compiled, 1);
    assert_eq!(summary.deleted, 1);
    assert_eq!(fs::read_to_string(temp.path().join("out/a.out")).unwrap(), "alpha two");

    let report = status(&options).await.unwrap();
    assert!(report.pending.is_empty());
    assert!(report.deletions.is_empty());
}

#[tokio::test]
async fn test_force_compiles_everything() {
    let (_temp, options) = workspace();
    let _ = make(&options, false, false).await.unwrap();

    let forced = make(&options, false, true).await.unwrap();
    assert_eq!(forced.compiled, 2);
    assert!(!forced.rebuild);
}

#[tokio::test]
async fn test_suspend_forces_one_rebuild() {
    let (_temp, options) = workspace();
    let _ = make(&options, false, false).await.unwrap();

    suspend(&options).unwrap();
    assert!(status(&options).await.unwrap().rebuild_required);

    let rebuilt = make(&options, false, false).await.unwrap();
    assert!(rebuilt.rebuild);
    assert_eq!(rebuilt.compiled, 2);

    let next = make(&options, false, false).await.unwrap();
    assert!(!next.rebuild);
    assert_eq!(next.compiled, 0);
}

#[tokio::test]
async fn test_custom_system_dir() {
    let (temp, mut options) = workspace();
    let system_dir = temp.path().join("state");
    options.system_dir = Some(system_dir.clone());

    let _ = make(&options, false, false).await.unwrap();
    assert!(system_dir.join("sources.json").exists());
    assert!(system_dir.join("outputs.json").exists());
    assert!(system_dir.join("file_ids.json").exists());
    assert!(!temp.path().join(".buildwacht").exists());
}

#[tokio::test]
async fn test_cache_dir_exists_before_initial_scan() {
    let (_temp, options) = workspace();

    let project = Project::open(&options, true).unwrap();
    assert!(project.workspace().cache_dir().is_dir());
    project.wait_for_scan().await.unwrap();
    assert!(!project.monitor().pending_files(project.workspace().id()).is_empty());
    project.close().unwrap();
}

#[tokio::test]
async fn test_workspace_id_is_stable_across_sessions() {
    let (_temp, options) = workspace();

    let first = Project::open(&options, false).unwrap();
    let id = first.workspace().id();
    let cache_dir = first.workspace().cache_dir().to_path_buf();
    first.close().unwrap();

    let second = Project::open(&options, false).unwrap();
    assert_eq!(second.workspace().id(), id);
    assert_eq!(second.workspace().cache_dir(), cache_dir.as_path());
    second.close().unwrap();
}

#[tokio::test]
async fn test_missing_config_fails() {
    let temp = TempDir::new().unwrap();
    let result = make(&ProjectOptions::new(temp.path()), false, false).await;
    assert!(matches!(result, Err(buildwacht::BuildError::Io { .. })));
}
