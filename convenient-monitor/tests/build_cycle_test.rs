//! Integration tests for the collect / compile / update cycle
//!
//! These tests drive a monitor over an in-memory tree and check:
//! 1. Up-to-date sources are neither compiled nor purged
//! 2. Recompiled sources move their old outputs into the deletion ledger
//! 3. Zombie ledger entries are purged instead of deleted
//! 4. Sources edited during a build stay pending

use convenient_monitor::{
    BuildStateMonitor, CompileContext, Compiler, FileNode, FileSystem, MemoryAttributeStore, MemoryFileSystem,
    MonitorConfig, OutputItem, SourceMetadata, StaticProjectModel, Workspace,
};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tracing_test::traced_test;

const MODEL: &str = r"
modules:
  - name: core
    source_roots: [src]
    output_root: out
";

struct Javac;

impl Compiler for Javac {
    fn description(&self) -> &str {
        "javac"
    }

    fn is_compilable_file(&self, file: &FileNode, _ctx: &CompileContext) -> bool {
        file.path.extension().is_some_and(|e| e == "java")
    }
}

fn setup() -> (TempDir, Arc<MemoryFileSystem>, BuildStateMonitor, Arc<Workspace>) {
    let tmp = TempDir::new().unwrap();
    let fs = Arc::new(MemoryFileSystem::new());
    let _ = fs.add_dir("/proj");
    let monitor = BuildStateMonitor::new(
        MonitorConfig::with_system_dir(tmp.path()),
        fs.clone(),
        Arc::new(MemoryAttributeStore::new()),
        Arc::new(MemoryAttributeStore::new()),
    );
    let model = Arc::new(StaticProjectModel::from_yaml_str("/proj", MODEL).unwrap());
    let workspace = monitor.register_workspace(Path::new("/proj"), model).unwrap();
    let _ = workspace.ensure_cache_dir().unwrap();
    (tmp, fs, monitor, workspace)
}

/// Compile every collected source by writing `out/<stem>.class`
fn build(fs: &MemoryFileSystem, monitor: &BuildStateMonitor, workspace: &Arc<Workspace>, now: i64) -> Vec<FileNode> {
    let ctx = CompileContext::new(workspace.clone(), now);
    let collected = monitor.collect_files(&ctx, &Javac, all_sources(fs), false, false).unwrap();

    for candidate in &collected.to_delete {
        fs.remove(&candidate.output.path);
    }
    let outputs: Vec<OutputItem> = collected
        .to_compile
        .iter()
        .map(|source| {
            let stem = source.path.file_stem().unwrap().to_string_lossy().into_owned();
            let output = fs.add_file(format!("/proj/out/{stem}.class"), now);
            OutputItem::new(source.clone(), output.path)
        })
        .collect();
    monitor
        .update(&ctx, &Javac, Some(Path::new("/proj/out")), &outputs, &[])
        .unwrap();
    collected.to_compile
}

fn all_sources(fs: &MemoryFileSystem) -> Vec<FileNode> {
    let Some(root) = fs.find_by_path(Path::new("/proj/src")) else {
        return Vec::new();
    };
    convenient_monitor::DepthFirst::new(fs, [root]).filter(|n| !n.is_dir).collect()
}

#[test]
fn test_first_build_compiles_everything_then_nothing() {
    let (_tmp, fs, monitor, workspace) = setup();
    let _ = fs.add_file("/proj/src/A.java", 10);
    let _ = fs.add_file("/proj/src/B.java", 10);

    let outcome = monitor.scan_sources_for_compilable_files(&workspace, &CancellationToken::new());
    assert_eq!(outcome, convenient_monitor::ScanOutcome::Completed);
    assert_eq!(build(&fs, &monitor, &workspace, 100).len(), 2);
    assert!(monitor.pending_files(workspace.id()).is_empty());

    // Scenario A: nothing changed since the last build
    let outcome = monitor.scan_sources_for_compilable_files(&workspace, &CancellationToken::new());
    assert_eq!(outcome, convenient_monitor::ScanOutcome::Completed);
    assert!(build(&fs, &monitor, &workspace, 200).is_empty());
    assert!(monitor.pending_deletions(workspace.id()).is_empty());
}

#[test]
fn test_recompiled_source_schedules_previous_output() {
    let (_tmp, fs, monitor, workspace) = setup();
    let ws = workspace.id();
    let source = fs.add_file("/proj/src/Y.java", 10);
    let old_output = fs.add_file("/proj/out/Y1.class", 11);

    let mut metadata = SourceMetadata::default();
    metadata.set_timestamp(ws, 10);
    metadata.add_output(ws, old_output.id, &old_output.path);
    monitor.metadata().save_source(source.id, &metadata).unwrap();
    assert!(monitor.load_and_mark_pending(ws, &source));

    // Scenario B
    let new_output = fs.add_file("/proj/out/Y2.class", 50);
    let ctx = CompileContext::new(workspace.clone(), 40);
    monitor
        .update(&ctx, &Javac, Some(Path::new("/proj/out")), &[OutputItem::new(source.clone(), &new_output.path)], &[])
        .unwrap();

    assert!(!monitor.is_pending(ws, source.id));
    let output_meta = monitor.metadata().load_output(new_output.id).unwrap();
    assert_eq!(output_meta.source_url, Some(source.url()));
    assert_eq!(output_meta.artifact_name.as_deref(), Some("Y2"));

    let deletions = monitor.pending_deletions(ws);
    assert_eq!(deletions.len(), 1);
    assert_eq!(deletions[0].0, "/proj/out/Y1.class");
    assert_eq!(deletions[0].1.source_url, source.url());
}

#[test]
fn test_zombie_entries_never_reach_to_delete() {
    let (_tmp, fs, monitor, workspace) = setup();
    let ws = workspace.id();
    let source = fs.add_file("/proj/src/Z.java", 10);
    let output = fs.add_file("/proj/out/Z.class", 11);
    let mut metadata = SourceMetadata::default();
    metadata.add_output(ws, output.id, &output.path);

    // Scheduled, then the source turned out fine after all
    assert!(monitor.mark_pending(ws, &source, Some(metadata)));
    monitor.clear_pending(ws, source.id);
    assert_eq!(monitor.pending_deletions(ws).len(), 1);

    let ctx = CompileContext::new(workspace.clone(), 100);
    let collected = monitor.collect_files(&ctx, &Javac, [source], false, false).unwrap();
    assert!(collected.to_compile.is_empty());
    assert!(collected.to_delete.is_empty());
    assert!(monitor.pending_deletions(ws).is_empty());
    assert!(fs.find_by_path(&output.path).is_some());
}

#[test]
fn test_deleted_source_output_is_removed_by_build() {
    let (_tmp, fs, monitor, workspace) = setup();
    let ws = workspace.id();
    let source = fs.add_file("/proj/src/Gone.java", 10);
    let _ = monitor.mark_pending(ws, &source, None);
    assert_eq!(build(&fs, &monitor, &workspace, 100).len(), 1);

    monitor.file_deleted(&source);
    fs.remove(&source.path);
    assert_eq!(monitor.pending_deletions(ws).len(), 1);

    assert!(build(&fs, &monitor, &workspace, 200).is_empty());
    assert!(fs.find_by_path(Path::new("/proj/out/Gone.class")).is_none());

    // The next build finds the output gone and purges the entry
    let _ = build(&fs, &monitor, &workspace, 300);
    assert!(monitor.pending_deletions(ws).is_empty());
}

#[test]
fn test_source_edited_during_build_stays_pending() {
    let (_tmp, fs, monitor, workspace) = setup();
    let ws = workspace.id();
    let source = fs.add_file("/proj/src/D.java", 10);
    let _ = monitor.mark_pending(ws, &source, None);

    let ctx = CompileContext::new(workspace.clone(), 100);
    let collected = monitor.collect_files(&ctx, &Javac, [source.clone()], false, false).unwrap();
    assert_eq!(collected.to_compile.len(), 1);

    // Scenario D: the user saves while the compiler runs
    assert!(fs.touch(&source.path, 150));
    let output = fs.add_file("/proj/out/D.class", 120);
    monitor
        .update(&ctx, &Javac, Some(Path::new("/proj/out")), &[OutputItem::new(source.clone(), &output.path)], &[])
        .unwrap();
    assert!(monitor.is_pending(ws, source.id));

    // The next build picks it up again and schedules the stale output
    let ctx = CompileContext::new(workspace.clone(), 200);
    let collected = monitor.collect_files(&ctx, &Javac, [source.clone()], false, false).unwrap();
    assert_eq!(collected.to_compile, vec![source]);
    assert_eq!(collected.to_delete.len(), 1);
}

#[test]
fn test_rebuild_collects_all_compilable_files() {
    let (_tmp, fs, monitor, workspace) = setup();
    let _ = fs.add_file("/proj/src/A.java", 10);
    let _ = fs.add_file("/proj/src/README.md", 10);

    let ctx = CompileContext::new(workspace.clone(), 100);
    let collected = monitor.collect_files(&ctx, &Javac, all_sources(&fs), false, true).unwrap();
    assert_eq!(collected.to_compile.len(), 1);
    assert_eq!(monitor.pending_files(workspace.id()).len(), 1);
}

#[test]
fn test_must_recompile_files_are_marked() {
    let (_tmp, fs, monitor, workspace) = setup();
    let again = fs.add_file("/proj/src/Again.java", 10);
    let vanished = FileNode::new(convenient_monitor::FileId(4242), "/proj/src/Vanished.java", false);

    let ctx = CompileContext::new(workspace.clone(), 100);
    monitor.update(&ctx, &Javac, None, &[], &[again.clone(), vanished.clone()]).unwrap();
    assert!(monitor.is_pending(workspace.id(), again.id));
    assert!(!monitor.is_pending(workspace.id(), vanished.id));
}

#[test]
fn test_closed_workspace_rejects_collect() {
    let (_tmp, _fs, monitor, workspace) = setup();
    let ctx = CompileContext::new(workspace.clone(), 100);
    monitor.close_workspace(workspace.id());

    let result = monitor.collect_files(&ctx, &Javac, Vec::new(), false, false);
    assert!(matches!(result, Err(convenient_monitor::MonitorError::WorkspaceClosed(_))));
}

#[traced_test]
#[test]
fn test_diagnostics_are_logged() {
    let (_tmp, fs, monitor, workspace) = setup();
    let source = fs.add_file("/proj/src/L.java", 10);
    let output = fs.add_file("/proj/out/L.class", 11);
    let mut metadata = SourceMetadata::default();
    metadata.add_output(workspace.id(), output.id, &output.path);

    let _ = monitor.mark_pending(workspace.id(), &source, Some(metadata));
    monitor.clear_pending(workspace.id(), source.id);
    let ctx = CompileContext::new(workspace.clone(), 100);
    let _ = monitor.collect_files(&ctx, &Javac, Vec::new(), false, false).unwrap();

    assert!(logs_contain("Scheduled recompilation"));
    assert!(logs_contain("ADD path to delete"));
    assert!(logs_contain("Unschedule recompilation"));
    assert!(logs_contain("Found zombie entry"));
}
