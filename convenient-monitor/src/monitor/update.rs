//! Committing the results of a build

use super::BuildStateMonitor;
use crate::compiler::{CompileContext, Compiler, OutputItem};
use crate::error::MonitorResult;
use crate::metadata::{OutputMetadata, PENDING_TIMESTAMP, SourceMetadata};
use crate::types::FileId;
use crate::vfs::FileNode;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use tracing::{debug, warn};

/// A source seen in this update, with the outputs it had before
struct Touched {
    source: FileNode,
    metadata: SourceMetadata,
    previous: BTreeMap<FileId, PathBuf>,
}

impl BuildStateMonitor {
    /// Record a finished build
    ///
    /// Every valid source in `succeeded` gets its outputs replaced by the ones
    /// reported here, its timestamp refreshed and its pending mark cleared.
    /// A source is marked pending again if it changed after the build started
    /// (and is not generated) or if one of its outputs cannot be found.
    /// Outputs reported for sources that no longer exist go straight to the
    /// deletion ledger. Finally every valid file in `must_recompile` is
    /// marked pending.
    ///
    /// `output_root` is the root the reported output paths are relative to;
    /// artifact names are derived from it.
    pub fn update(
        &self,
        ctx: &CompileContext,
        compiler: &dyn Compiler,
        output_root: Option<&Path>,
        succeeded: &[OutputItem],
        must_recompile: &[FileNode],
    ) -> MonitorResult<()> {
        self.force_compiling.store(false, Ordering::Release);
        let ws = ctx.workspace().id();

        if !succeeded.is_empty() {
            let mut touched: Vec<Touched> = Vec::new();
            let mut index: HashMap<FileId, usize> = HashMap::new();
            let mut force_recompile: HashSet<FileId> = HashSet::new();

            for item in succeeded {
                let source = &item.source;
                let slot = if self.fs.is_valid(source) {
                    Some(match index.get(&source.id) {
                        Some(&slot) => slot,
                        None => {
                            let mut metadata = self.metadata.load_source(source.id).unwrap_or_default();
                            let previous = metadata.take_outputs(ws);
                            touched.push(Touched {
                                source: source.clone(),
                                metadata,
                                previous,
                            });
                            let _ = index.insert(source.id, touched.len() - 1);
                            touched.len() - 1
                        }
                    })
                } else {
                    None
                };

                // Nothing to record for sources that produce no file
                let Some(output_path) = &item.output_path else {
                    continue;
                };
                let Some(output) = self.fs.find_by_path(output_path) else {
                    warn!(workspace = %ws, path = %output_path.display(), "Output file was not found after compilation");
                    if slot.is_some() {
                        let _ = force_recompile.insert(source.id);
                    }
                    continue;
                };
                if output.path == source.path {
                    continue;
                }

                let artifact_name = output_root
                    .and_then(|root| relative_output_path(root, &output.path))
                    .and_then(|relative| compiler.artifact_name(&relative));
                match slot {
                    Some(slot) => {
                        touched[slot].metadata.add_output(ws, output.id, &output.path);
                        self.metadata.save_output(
                            output.id,
                            &OutputMetadata {
                                source_url: Some(source.url()),
                                artifact_name,
                            },
                        )?;
                    }
                    None => self.mark_output_for_deletion(ws, &output.path, artifact_name, &source.url()),
                }
            }

            for Touched {
                source,
                mut metadata,
                previous,
            } in touched
            {
                let stale = previous.iter().filter(|(id, _)| !metadata.has_output(ws, **id));
                self.schedule_paths_for_deletion(ws, &source.url(), stale.map(|(id, path)| (*id, path.as_path())), None);

                let stamp = self.fs.timestamp(&source).unwrap_or(PENDING_TIMESTAMP);
                metadata.set_timestamp(ws, stamp);
                self.metadata.save_source(source.id, &metadata)?;
                debug!(workspace = %ws, path = %source.path.display(), "Unschedule recompilation (successfully compiled)");
                self.clear_pending(ws, source.id);

                let changed_during_build = stamp > ctx.start_stamp() && !ctx.is_generated(&source);
                if changed_during_build || force_recompile.contains(&source.id) {
                    // Must follow clear_pending so the new outputs are scheduled for deletion
                    let _ = self.mark_pending(ws, &source, Some(metadata));
                }
            }
        }

        for file in must_recompile {
            if self.fs.is_valid(file) {
                let _ = self.load_and_mark_pending(ws, file);
            }
        }
        Ok(())
    }
}

fn relative_output_path(root: &Path, output: &Path) -> Option<String> {
    let relative = output.strip_prefix(root).ok()?;
    Some(relative.to_string_lossy().replace('\\', "/"))
}
