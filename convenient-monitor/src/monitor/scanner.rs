//! Walking source roots to fill the recompilation set

use super::BuildStateMonitor;
use crate::error::{Interrupted, ScanOutcome};
use crate::vfs::{DepthFirst, FileNode};
use crate::workspace::{OutputRootsLayout, Workspace};
use std::path::PathBuf;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Stop a traversal once the workspace closes or the token fires
pub(crate) fn checkpoint(workspace: &Workspace, cancel: &CancellationToken) -> Result<(), Interrupted> {
    workspace.check_open()?;
    if cancel.is_cancelled() {
        return Err(Interrupted::Cancelled);
    }
    Ok(())
}

impl BuildStateMonitor {
    /// Walk `roots` and mark sources pending
    ///
    /// With `is_new_roots`, a file is marked when its recorded timestamp for
    /// this workspace differs from the one on disk, or when nothing is recorded
    /// at all. Otherwise the roots are going away and every file the tracker
    /// has seen before is marked, so its outputs get invalidated. Files that
    /// are already pending are left alone in both modes.
    pub fn scan_source_content(
        &self,
        workspace: &Workspace,
        roots: &[FileNode],
        is_new_roots: bool,
        cancel: &CancellationToken,
    ) -> Result<(), Interrupted> {
        if roots.is_empty() {
            return Ok(());
        }
        let ws = workspace.id();
        debug!(workspace = %ws, roots = roots.len(), is_new_roots, "Scanning source content");

        let model = workspace.model();
        let walk = DepthFirst::new(self.fs.as_ref(), roots.iter().cloned()).with_ignore(|node| model.is_ignored(node));
        for node in walk {
            checkpoint(workspace, cancel)?;
            if node.is_dir || self.is_pending(ws, node.id) {
                continue;
            }

            let metadata = self.metadata.load_source(node.id);
            if is_new_roots {
                let recorded = metadata.as_ref().and_then(|m| m.timestamp(ws));
                if recorded.is_none() || recorded != self.fs.timestamp(&node) {
                    let _ = self.mark_pending(ws, &node, metadata);
                }
            } else if metadata.is_some() {
                let _ = self.mark_pending(ws, &node, metadata);
            }
        }
        Ok(())
    }

    /// Full scan of a workspace: source roots, then generated roots, then
    /// outputs of roots that moved since the layout was last saved
    ///
    /// Suspended workspaces are skipped.
    pub fn run_scan(&self, workspace: &Workspace, cancel: &CancellationToken) -> ScanOutcome {
        let ws = workspace.id();
        if self.is_suspended(ws) {
            debug!(workspace = %ws, "Workspace suspended, skipping scan");
            return ScanOutcome::Completed;
        }

        let started = Instant::now();
        let outcome = ScanOutcome::from(self.scan_all_roots(workspace, cancel));
        info!(
            workspace = %ws,
            pending = self.pending_files(ws).len(),
            elapsed = ?started.elapsed(),
            ?outcome,
            "Workspace scan finished"
        );
        outcome
    }

    /// [`run_scan`](Self::run_scan), counted as in flight for its duration
    pub fn scan_sources_for_compilable_files(&self, workspace: &Workspace, cancel: &CancellationToken) -> ScanOutcome {
        let _guard = self.scans.start(workspace.id());
        self.run_scan(workspace, cancel)
    }

    fn scan_all_roots(&self, workspace: &Workspace, cancel: &CancellationToken) -> Result<(), Interrupted> {
        let modules = workspace.model().modules();

        let source_roots = self.existing_nodes(modules.iter().flat_map(|m| &m.source_roots));
        self.scan_source_content(workspace, &source_roots, true, cancel)?;

        let generated_roots = self.existing_nodes(modules.iter().flat_map(|m| &m.generated_roots));
        self.scan_source_content(workspace, &generated_roots, true, cancel)?;

        self.mark_old_output_roots(workspace, &OutputRootsLayout::from_modules(&modules), cancel)
    }

    /// Resolve paths to existing nodes, dropping the ones that do not exist
    pub(crate) fn existing_nodes<'p>(&self, paths: impl IntoIterator<Item = &'p PathBuf>) -> Vec<FileNode> {
        paths.into_iter().filter_map(|path| self.fs.find_by_path(path)).collect()
    }
}
