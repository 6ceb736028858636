//! Recompilation set and deletion scheduling

use super::BuildStateMonitor;
use crate::metadata::{PENDING_TIMESTAMP, SourceMetadata};
use crate::types::{FileId, WorkspaceId};
use crate::vfs::FileNode;
use convenient_ledger::DeletionEntry;
use std::path::Path;
use tracing::{debug, warn};

impl BuildStateMonitor {
    /// Mark `file` as needing recompilation in `ws`
    ///
    /// Only the first mark has side effects: with prior metadata, the source's
    /// timestamp is invalidated and its known outputs are scheduled for
    /// deletion. Returns false if the file was already pending.
    pub fn mark_pending(&self, ws: WorkspaceId, file: &FileNode, metadata: Option<SourceMetadata>) -> bool {
        let newly_marked = self.state.lock().table.insert_pending(ws, file.id.normalized());
        if !newly_marked {
            return false;
        }
        debug!(workspace = %ws, path = %file.path.display(), "Scheduled recompilation");

        if let Some(mut metadata) = metadata {
            metadata.set_timestamp(ws, PENDING_TIMESTAMP);
            self.schedule_outputs_for_deletion(ws, &file.url(), &metadata, None);
            if let Err(e) = self.metadata.save_source(file.id, &metadata) {
                warn!(workspace = %ws, path = %file.path.display(), error = %e, "Failed to save source metadata");
            }
        }
        true
    }

    /// [`mark_pending`](Self::mark_pending) with the file's stored metadata
    pub fn load_and_mark_pending(&self, ws: WorkspaceId, file: &FileNode) -> bool {
        let metadata = self.metadata.load_source(file.id);
        self.mark_pending(ws, file, metadata)
    }

    /// Remove `file` from the recompilation set of `ws`
    pub fn clear_pending(&self, ws: WorkspaceId, file: FileId) {
        if self.state.lock().table.remove_pending(ws, file.normalized()) {
            debug!(workspace = %ws, file = %file, "Unschedule recompilation");
        }
    }

    /// True if `file` is in the recompilation set of `ws`
    pub fn is_pending(&self, ws: WorkspaceId, file: FileId) -> bool {
        self.state.lock().table.is_pending(ws, file.normalized())
    }

    /// True if `file` is marked for compilation in `ws`
    pub fn is_marked_for_compilation(&self, ws: WorkspaceId, file: &FileNode) -> bool {
        self.is_pending(ws, file.id)
    }

    /// Recompilation set of `ws`, sorted
    pub fn pending_files(&self, ws: WorkspaceId) -> Vec<FileId> {
        self.state.lock().table.pending(ws)
    }

    /// Put every still-existing output recorded in `metadata` into the ledger.
    /// Outputs under `root_being_deleted` are taken out of it instead.
    pub(crate) fn schedule_outputs_for_deletion(
        &self,
        ws: WorkspaceId,
        source_url: &str,
        metadata: &SourceMetadata,
        root_being_deleted: Option<&Path>,
    ) {
        self.schedule_paths_for_deletion(ws, source_url, metadata.outputs(ws), root_being_deleted);
    }

    pub(crate) fn schedule_paths_for_deletion<'p>(
        &self,
        ws: WorkspaceId,
        source_url: &str,
        outputs: impl IntoIterator<Item = (FileId, &'p Path)>,
        root_being_deleted: Option<&Path>,
    ) {
        let mut outputs = outputs.into_iter().peekable();
        if outputs.peek().is_none() {
            return;
        }

        let ledger = self.acquire_ledger(ws);
        for (_, path) in outputs {
            let Some(output) = self.fs.find_by_path(path) else {
                continue;
            };
            let output_path = output.path.to_string_lossy();
            if root_being_deleted.is_some_and(|root| output.is_under(root)) {
                if ledger.remove(&output_path).is_some() {
                    debug!(workspace = %ws, path = %output_path, "REMOVE path to delete");
                }
            } else {
                let artifact_name = self.metadata.load_output(output.id).and_then(|o| o.artifact_name);
                let _ = ledger.put(&output_path, Some(DeletionEntry::new(source_url, artifact_name)));
                debug!(workspace = %ws, path = %output_path, source = source_url, "ADD path to delete");
            }
        }
    }

    /// Take `output_path` out of the deletion ledger of `ws`, typically
    /// right after the driver deleted it. Returns true if it was scheduled.
    pub fn unmark_output_for_deletion(&self, ws: WorkspaceId, output_path: &Path) -> bool {
        let output_path = output_path.to_string_lossy();
        let removed = self.acquire_ledger(ws).remove(&output_path).is_some();
        if removed {
            debug!(workspace = %ws, path = %output_path, "REMOVE path to delete");
        }
        removed
    }

    pub(crate) fn mark_output_for_deletion(
        &self,
        ws: WorkspaceId,
        output_path: &Path,
        artifact_name: Option<String>,
        source_url: &str,
    ) {
        let output_path = output_path.to_string_lossy();
        let _ = self
            .acquire_ledger(ws)
            .put(&output_path, Some(DeletionEntry::new(source_url, artifact_name)));
        debug!(workspace = %ws, path = %output_path, source = source_url, "ADD path to delete");
    }
}
