//! Incremental build: collect, delete stale outputs, compile, record

use crate::error::BuildResult;
use crate::project::{Project, ProjectOptions};
use convenient_monitor::{CompileContext, FileNode, OutputItem};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

/// What a build did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MakeSummary {
    /// Sources compiled
    pub compiled: usize,
    /// Stale outputs deleted
    pub deleted: usize,
    /// Sources that failed and stay pending
    pub failed: usize,
    /// True if this was a full rebuild
    pub rebuild: bool,
}

/// Run one build of the workspace
pub async fn make(options: &ProjectOptions, rebuild: bool, force: bool) -> BuildResult<MakeSummary> {
    let started = Instant::now();
    let project = Project::open(options, true)?;
    project.wait_for_scan().await?;

    let summary = build(&project, rebuild, force)?;
    project.close()?;

    info!(
        compiled = summary.compiled,
        deleted = summary.deleted,
        failed = summary.failed,
        elapsed = ?started.elapsed(),
        "Build finished"
    );
    Ok(summary)
}

fn build(project: &Project, rebuild: bool, force: bool) -> BuildResult<MakeSummary> {
    let monitor = project.monitor();
    let workspace = project.workspace();
    let compiler = project.compiler();

    let marker = monitor.rebuild_required(workspace);
    let rebuild = rebuild || marker;
    if marker {
        info!(workspace = %workspace.id(), "Rebuild marker found, rebuilding everything");
    }

    let ctx = CompileContext::new(workspace.clone(), now_millis());
    let collected = monitor.collect_files(&ctx, compiler, project.source_files(), force, rebuild)?;

    let mut summary = MakeSummary {
        rebuild,
        ..MakeSummary::default()
    };
    for candidate in &collected.to_delete {
        let path = &candidate.output.path;
        match fs::remove_file(path) {
            Ok(()) => summary.deleted += 1,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Could not delete stale output");
                continue;
            }
        }
        let _ = monitor.unmark_output_for_deletion(workspace.id(), path);
    }

    let mut by_root: BTreeMap<PathBuf, Vec<OutputItem>> = BTreeMap::new();
    let mut unrooted: Vec<OutputItem> = Vec::new();
    let mut failed: Vec<FileNode> = Vec::new();
    for source in &collected.to_compile {
        match compiler.compile(source) {
            Ok(Some(copied)) => by_root
                .entry(copied.output_root)
                .or_default()
                .push(OutputItem::new(source.clone(), copied.output)),
            Ok(None) => unrooted.push(OutputItem {
                source: source.clone(),
                output_path: None,
            }),
            Err(e) => {
                warn!(source = %source.path.display(), error = %e, "Compilation failed");
                failed.push(source.clone());
            }
        }
    }
    summary.compiled = collected.to_compile.len() - failed.len();
    summary.failed = failed.len();

    for (root, items) in &by_root {
        monitor.update(&ctx, compiler, Some(root), items, &[])?;
    }
    monitor.update(&ctx, compiler, None, &unrooted, &failed)?;
    monitor.update_output_roots_layout(workspace)?;
    if marker {
        monitor.clear_rebuild_marker(workspace)?;
    }
    Ok(summary)
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .and_then(|d| i64::try_from(d.as_millis()).ok())
        .unwrap_or(i64::MAX)
}
