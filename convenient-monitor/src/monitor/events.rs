//! Reacting to file system events between builds

use super::BuildStateMonitor;
use crate::vfs::{DepthFirst, FileNode};
use crate::workspace::Workspace;
use std::sync::Arc;
use tracing::trace;

impl BuildStateMonitor {
    /// A file was created or its content changed: mark it pending in every
    /// tracked workspace whose source roots contain it
    pub fn file_content_changed(&self, file: &FileNode) {
        if file.is_dir {
            return;
        }
        for workspace in self.watching_workspaces(file) {
            let _ = self.load_and_mark_pending(workspace.id(), file);
        }
    }

    /// A file or directory is about to be deleted
    ///
    /// Must be called while the subtree still exists. Deleted sources get
    /// their outputs scheduled for deletion and leave the recompilation set.
    /// Outputs outside the deleted subtree are the ones scheduled; those
    /// inside it disappear with it. Deleted outputs whose source still exists
    /// mark that source pending.
    pub fn file_deleted(&self, root: &FileNode) {
        let workspaces: Vec<Arc<Workspace>> = self
            .open_workspaces()
            .into_iter()
            .filter(|w| !self.is_suspended(w.id()))
            .collect();
        if workspaces.is_empty() {
            return;
        }

        for node in DepthFirst::new(self.fs.as_ref(), [root.clone()]) {
            if node.is_dir {
                continue;
            }

            if let Some(metadata) = self.metadata.load_source(node.id) {
                let url = node.url();
                for workspace in &workspaces {
                    let ws = workspace.id();
                    if metadata.timestamp(ws).is_some() {
                        trace!(workspace = %ws, path = %node.path.display(), "Deleted source");
                        self.schedule_outputs_for_deletion(ws, &url, &metadata, Some(&root.path));
                        self.clear_pending(ws, node.id);
                    }
                }
            } else if let Some(source_url) = self.metadata.load_output(node.id).and_then(|o| o.source_url)
                && let Some(source) = self.fs.find_by_url(&source_url)
                && !source.is_under(&root.path)
            {
                for workspace in self.watching_workspaces(&source) {
                    let _ = self.load_and_mark_pending(workspace.id(), &source);
                }
            }
        }
    }

    fn watching_workspaces(&self, file: &FileNode) -> Vec<Arc<Workspace>> {
        self.open_workspaces()
            .into_iter()
            .filter(|w| !self.is_suspended(w.id()))
            .filter(|w| {
                let model = w.model();
                !model.is_ignored(file) && model.source_roots().iter().any(|root| file.is_under(root))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use crate::compiler::{CompileContext, OutputItem};
    use crate::test_support::{Fixture, JavaCompiler};
    use crate::vfs::FileNode;
    use std::path::Path;

    fn compile(fx: &Fixture, source: &FileNode, output: &FileNode) {
        let ctx = CompileContext::new(fx.ws.clone(), 1_000);
        fx.monitor
            .update(
                &ctx,
                &JavaCompiler,
                Some(Path::new("/ws/out")),
                &[OutputItem::new(source.clone(), &output.path)],
                &[],
            )
            .unwrap();
    }

    #[test]
    fn test_changed_source_is_marked() {
        let fx = Fixture::new();
        let source = fx.fs.add_file("/ws/src/A.java", 1);
        let elsewhere = fx.fs.add_file("/tmp/B.java", 1);

        fx.monitor.file_content_changed(&source);
        fx.monitor.file_content_changed(&elsewhere);

        assert!(fx.monitor.is_pending(fx.ws.id(), source.id));
        assert!(!fx.monitor.is_pending(fx.ws.id(), elsewhere.id));
    }

    #[test]
    fn test_changes_are_ignored_while_suspended() {
        let fx = Fixture::new();
        let source = fx.fs.add_file("/ws/src/A.java", 1);
        fx.monitor.suspend(&fx.ws).unwrap();

        fx.monitor.file_content_changed(&source);
        assert!(!fx.monitor.is_pending(fx.ws.id(), source.id));
    }

    #[test]
    fn test_deleted_source_schedules_outputs() {
        let fx = Fixture::new();
        let source = fx.fs.add_file("/ws/src/A.java", 1);
        let output = fx.fs.add_file("/ws/out/A.class", 2);
        compile(&fx, &source, &output);
        let _ = fx.monitor.mark_pending(fx.ws.id(), &source, None);

        fx.monitor.file_deleted(&source);
        fx.fs.remove(&source.path);

        assert!(!fx.monitor.is_pending(fx.ws.id(), source.id));
        let deletions = fx.monitor.pending_deletions(fx.ws.id());
        assert_eq!(deletions.len(), 1);
        assert_eq!(deletions[0].0, "/ws/out/A.class");
        assert_eq!(deletions[0].1.source_url, source.url());
    }

    #[test]
    fn test_outputs_inside_deleted_root_are_unscheduled() {
        let fx = Fixture::new();
        let source = fx.fs.add_file("/ws/src/pkg/A.java", 1);
        let output = fx.fs.add_file("/ws/src/pkg/A.class", 2);
        compile(&fx, &source, &output);
        let _ = fx.monitor.acquire_ledger(fx.ws.id()).put(
            "/ws/src/pkg/A.class",
            Some(convenient_ledger::DeletionEntry::new(source.url(), None::<String>)),
        );

        let dir = fx.fs.add_dir("/ws/src/pkg");
        fx.monitor.file_deleted(&dir);
        assert!(fx.monitor.pending_deletions(fx.ws.id()).is_empty());
    }

    #[test]
    fn test_deleted_output_marks_source() {
        let fx = Fixture::new();
        let source = fx.fs.add_file("/ws/src/A.java", 1);
        let output = fx.fs.add_file("/ws/out/A.class", 2);
        compile(&fx, &source, &output);
        assert!(!fx.monitor.is_pending(fx.ws.id(), source.id));

        fx.monitor.file_deleted(&output);
        assert!(fx.monitor.is_pending(fx.ws.id(), source.id));
    }
}
