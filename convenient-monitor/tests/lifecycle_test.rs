//! Integration tests for workspace lifecycle: initial scan, waits, debounced rescans

use convenient_monitor::{
    BuildStateMonitor, Lifecycle, MemoryAttributeStore, MemoryFileSystem, ModuleRoots, MonitorConfig, ScanOutcome,
    SourceMetadata, StaticProjectModel,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

const MODEL: &str = r"
modules:
  - name: app
    source_roots: [src]
    output_root: out
";

fn setup() -> (TempDir, Arc<MemoryFileSystem>, Lifecycle) {
    let tmp = TempDir::new().unwrap();
    let fs = Arc::new(MemoryFileSystem::new());
    let _ = fs.add_dir("/ws");
    let monitor = Arc::new(BuildStateMonitor::new(
        MonitorConfig::with_system_dir(tmp.path()),
        fs.clone(),
        Arc::new(MemoryAttributeStore::new()),
        Arc::new(MemoryAttributeStore::new()),
    ));
    (tmp, fs, Lifecycle::new(monitor, Handle::current()))
}

fn module(source_roots: &[&str]) -> ModuleRoots {
    ModuleRoots {
        name: "app".into(),
        source_roots: source_roots.iter().map(Into::into).collect(),
        output_root: Some("out".into()),
        ..ModuleRoots::default()
    }
}

#[tokio::test]
async fn test_open_scans_in_background() {
    let (_tmp, fs, lifecycle) = setup();
    let source = fs.add_file("/ws/src/A.java", 1);
    let model = Arc::new(StaticProjectModel::from_yaml_str("/ws", MODEL).unwrap());

    let workspace = lifecycle.open_workspace(Path::new("/ws"), model).unwrap();
    let outcome = lifecycle
        .ensure_initialization_completed(workspace.id(), &CancellationToken::new())
        .await;

    assert_eq!(outcome, ScanOutcome::Completed);
    assert!(lifecycle.monitor().is_pending(workspace.id(), source.id));
    assert!(lifecycle.monitor().scans().is_idle(workspace.id()));
}

#[tokio::test]
async fn test_wait_on_closed_workspace_returns() {
    let (_tmp, _fs, lifecycle) = setup();
    let model = Arc::new(StaticProjectModel::from_yaml_str("/ws", MODEL).unwrap());
    let workspace = lifecycle.open_workspace(Path::new("/ws"), model).unwrap();

    lifecycle.close_workspace(workspace.id());
    let outcome = lifecycle
        .ensure_initialization_completed(workspace.id(), &CancellationToken::new())
        .await;
    assert_eq!(outcome, ScanOutcome::WorkspaceClosed);
    assert_eq!(lifecycle.monitor().tracked_workspaces(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_root_changes_are_debounced() {
    let (_tmp, fs, lifecycle) = setup();
    let _ = fs.add_file("/ws/src/A.java", 1);
    let added = fs.add_file("/ws/extra/B.java", 1);
    let model = Arc::new(StaticProjectModel::from_yaml_str("/ws", MODEL).unwrap());
    let workspace = lifecycle.open_workspace(Path::new("/ws"), model.clone()).unwrap();
    let ws = workspace.id();
    let _ = lifecycle.ensure_initialization_completed(ws, &CancellationToken::new()).await;
    let scans = lifecycle.monitor().scans().clone();

    // Three notifications within the debounce window
    lifecycle.before_roots_change(ws);
    model.set_modules(vec![module(&["src", "extra"])]);
    lifecycle.roots_changed(ws);
    for _ in 0..2 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        lifecycle.before_roots_change(ws);
        lifecycle.roots_changed(ws);
    }
    assert!(scans.is_idle(ws));
    assert!(!lifecycle.monitor().is_pending(ws, added.id));

    tokio::time::sleep(Duration::from_millis(600)).await;
    let outcome = lifecycle.ensure_initialization_completed(ws, &CancellationToken::new()).await;
    assert_eq!(outcome, ScanOutcome::Completed);
    // Added by the first notification, carried over to the last one
    assert!(lifecycle.monitor().is_pending(ws, added.id));
}

#[tokio::test(start_paused = true)]
async fn test_removed_root_marks_known_sources() {
    let (_tmp, fs, lifecycle) = setup();
    let kept = fs.add_file("/ws/src/A.java", 1);
    let dropped = fs.add_file("/ws/legacy/L.java", 1);
    let model = Arc::new(StaticProjectModel::from_yaml_str("/ws", MODEL).unwrap());
    model.set_modules(vec![module(&["src", "legacy"])]);
    let workspace = lifecycle.open_workspace(Path::new("/ws"), model.clone()).unwrap();
    let ws = workspace.id();
    let _ = lifecycle.ensure_initialization_completed(ws, &CancellationToken::new()).await;

    // Pretend both were compiled
    for file in [&kept, &dropped] {
        let mut metadata = SourceMetadata::default();
        metadata.set_timestamp(ws, 1);
        lifecycle.monitor().metadata().save_source(file.id, &metadata).unwrap();
        lifecycle.monitor().clear_pending(ws, file.id);
    }

    lifecycle.before_roots_change(ws);
    model.set_modules(vec![module(&["src"])]);
    lifecycle.roots_changed(ws);
    tokio::time::sleep(Duration::from_millis(600)).await;
    let _ = lifecycle.ensure_initialization_completed(ws, &CancellationToken::new()).await;

    assert!(lifecycle.monitor().is_pending(ws, dropped.id));
    assert!(!lifecycle.monitor().is_pending(ws, kept.id));
}

#[tokio::test(start_paused = true)]
async fn test_suspended_workspace_ignores_root_changes() {
    let (_tmp, fs, lifecycle) = setup();
    let added = fs.add_file("/ws/extra/B.java", 1);
    let model = Arc::new(StaticProjectModel::from_yaml_str("/ws", MODEL).unwrap());
    let workspace = lifecycle.open_workspace(Path::new("/ws"), model.clone()).unwrap();
    let ws = workspace.id();
    let _ = lifecycle.ensure_initialization_completed(ws, &CancellationToken::new()).await;
    lifecycle.monitor().suspend(&workspace).unwrap();

    lifecycle.before_roots_change(ws);
    model.set_modules(vec![module(&["src", "extra"])]);
    lifecycle.roots_changed(ws);
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(lifecycle.monitor().scans().is_idle(ws));

    // Nothing was scheduled, so watching again finds nothing to compile
    lifecycle.monitor().watch(ws);
    assert!(!lifecycle.monitor().is_pending(ws, added.id));
}

#[tokio::test]
async fn test_cache_dir_exists_before_initial_scan() {
    let (_tmp, _fs, lifecycle) = setup();
    let model = Arc::new(StaticProjectModel::from_yaml_str("/ws", MODEL).unwrap());

    let workspace = lifecycle.open_workspace(Path::new("/ws"), model).unwrap();
    assert!(workspace.cache_dir().is_dir());

    let outcome = lifecycle
        .ensure_initialization_completed(workspace.id(), &CancellationToken::new())
        .await;
    assert_eq!(outcome, ScanOutcome::Completed);
}

#[tokio::test]
async fn test_shutdown_closes_everything() {
    let (_tmp, _fs, lifecycle) = setup();
    let model = Arc::new(StaticProjectModel::from_yaml_str("/ws", MODEL).unwrap());
    let workspace = lifecycle.open_workspace(Path::new("/ws"), model).unwrap();
    let _ = lifecycle
        .ensure_initialization_completed(workspace.id(), &CancellationToken::new())
        .await;

    lifecycle.shutdown();
    assert!(!workspace.is_open());
    assert!(lifecycle.monitor().open_workspaces().is_empty());
}
