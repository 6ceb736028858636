//! Choosing what to compile and what to delete before a build

use super::BuildStateMonitor;
use crate::compiler::{CollectedFiles, CompileContext, Compiler, DeletionCandidate};
use crate::error::{MonitorError, MonitorResult};
use crate::types::FileId;
use crate::vfs::FileNode;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, trace};

impl BuildStateMonitor {
    /// Split a build's candidate files into sources to compile and outputs
    /// to delete
    ///
    /// Sources are selected first: a forced build (or a pending forced-compile
    /// request) takes every compilable candidate and marks it pending, a
    /// normal build takes only candidates already pending. Then, unless this
    /// is a full rebuild, the deletion ledger is reconciled against that
    /// selection. Entries whose source is present, compilable, unselected and
    /// not pending are zombies and are purged instead of deleted, as are
    /// entries whose output no longer exists.
    pub fn collect_files(
        &self,
        ctx: &CompileContext,
        compiler: &dyn Compiler,
        candidates: impl IntoIterator<Item = FileNode>,
        force_compile: bool,
        is_rebuild: bool,
    ) -> MonitorResult<CollectedFiles> {
        let workspace = ctx.workspace();
        let ws = workspace.id();
        if !workspace.is_open() {
            return Err(MonitorError::WorkspaceClosed(ws));
        }

        let forced = force_compile || is_rebuild || self.is_force_compiling();
        let mut collected = CollectedFiles::default();
        let mut selected: HashSet<FileId> = HashSet::new();

        if forced || self.state.lock().table.has_pending(ws) {
            debug!(workspace = %ws, compiler = compiler.description(), forced, "Analysing potentially recompilable files");
            for file in candidates {
                if !self.fs.is_valid(&file) {
                    debug!(path = %file.path.display(), "Skipping invalid file");
                    continue;
                }
                let pending = self.is_pending(ws, file.id);
                if !forced && !pending {
                    continue;
                }
                if !compiler.is_compilable_file(&file, ctx) || workspace.model().is_excluded_from_compilation(&file) {
                    trace!(path = %file.path.display(), "Not compilable or excluded");
                    continue;
                }
                let _ = selected.insert(file.id.normalized());
                if !pending {
                    let _ = self.load_and_mark_pending(ws, &file);
                }
                collected.to_compile.push(file);
            }
        }

        // Must run after selection: forced selection marks files pending,
        // which the zombie test below depends on
        if !is_rebuild {
            let ledger = self.acquire_ledger(ws);
            let mut zombies = Vec::new();

            for (output_path, entry) in ledger.entries() {
                let source = ctx.resolve_source(self.fs.as_ref(), &entry.source_url);
                let source_present = source.is_some();

                if let Some(source) = &source {
                    if !compiler.is_compilable_file(source, ctx) {
                        // Produced by another compiler
                        continue;
                    }
                    if !selected.contains(&source.id.normalized()) {
                        if !self.is_pending(ws, source.id) {
                            debug!(path = %output_path, "Found zombie entry (output is marked, but source is present and up-to-date)");
                            zombies.push(output_path);
                        }
                        continue;
                    }
                }

                match self.fs.find_by_path(Path::new(&output_path)) {
                    Some(output) => {
                        debug!(path = %output_path, "Found file to delete");
                        collected.to_delete.push(DeletionCandidate {
                            output,
                            artifact_name: entry.artifact_name,
                            source_present,
                        });
                    }
                    None => {
                        debug!(path = %output_path, "Found zombie entry marked for deletion");
                        zombies.push(output_path);
                    }
                }
            }

            for path in &zombies {
                if ledger.remove(path).is_some() {
                    debug!(workspace = %ws, path = %path, "REMOVE path to delete");
                }
            }
        }

        Ok(collected)
    }
}
