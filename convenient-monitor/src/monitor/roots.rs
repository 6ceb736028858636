//! Reconciling moved output roots

use super::BuildStateMonitor;
use super::scanner::checkpoint;
use crate::error::{Interrupted, MonitorResult};
use crate::vfs::{DepthFirst, FileNode};
use crate::workspace::{OutputRootsLayout, Workspace};
use std::collections::BTreeSet;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

impl BuildStateMonitor {
    /// Output-roots layout saved by the last
    /// [`update_output_roots_layout`](Self::update_output_roots_layout)
    pub fn last_output_roots_layout(&self, workspace: &Workspace) -> MonitorResult<Option<OutputRootsLayout>> {
        OutputRootsLayout::load(&self.layout_file(workspace))
    }

    /// Persist the workspace's current output roots
    pub fn update_output_roots_layout(&self, workspace: &Workspace) -> MonitorResult<()> {
        let layout = OutputRootsLayout::from_modules(&workspace.model().modules());
        layout.save(&self.layout_file(workspace))?;
        debug!(workspace = %workspace.id(), modules = layout.modules.len(), "Saved output roots layout");
        Ok(())
    }

    /// Mark the sources of every output found under roots that `current` no
    /// longer uses
    ///
    /// A module's old production or test root counts as unused when the
    /// module is gone or maps that root elsewhere. Without a saved layout
    /// nothing is marked.
    pub fn mark_old_output_roots(
        &self,
        workspace: &Workspace,
        current: &OutputRootsLayout,
        cancel: &CancellationToken,
    ) -> Result<(), Interrupted> {
        let last = match self.last_output_roots_layout(workspace) {
            Ok(Some(last)) => last,
            Ok(None) => return Ok(()),
            Err(e) => {
                warn!(workspace = %workspace.id(), error = %e, "Failed to read output roots layout");
                return Ok(());
            }
        };

        let mut old_roots: BTreeSet<PathBuf> = BTreeSet::new();
        for (module, previous) in &last.modules {
            match current.modules.get(module) {
                None => old_roots.extend(previous.production.iter().chain(&previous.test).cloned()),
                Some(now) => {
                    if let Some(root) = &previous.production
                        && now.production.as_ref() != Some(root)
                    {
                        let _ = old_roots.insert(root.clone());
                    }
                    if let Some(root) = &previous.test
                        && now.test.as_ref() != Some(root)
                    {
                        let _ = old_roots.insert(root.clone());
                    }
                }
            }
        }

        for root in self.existing_nodes(&old_roots) {
            debug!(workspace = %workspace.id(), root = %root.path.display(), "Processing old output root");
            self.process_old_output_root(workspace, root, cancel)?;
        }
        Ok(())
    }

    fn process_old_output_root(
        &self,
        workspace: &Workspace,
        root: FileNode,
        cancel: &CancellationToken,
    ) -> Result<(), Interrupted> {
        for node in DepthFirst::new(self.fs.as_ref(), [root]) {
            checkpoint(workspace, cancel)?;
            if node.is_dir {
                continue;
            }
            let Some(source_url) = self.metadata.load_output(node.id).and_then(|o| o.source_url) else {
                continue;
            };
            if let Some(source) = self.fs.find_by_url(&source_url) {
                let _ = self.load_and_mark_pending(workspace.id(), &source);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::OutputMetadata;
    use crate::test_support::Fixture;
    use crate::workspace::ModuleRoots;

    fn record_output(fx: &Fixture, source: &FileNode, output: &FileNode) {
        let metadata = OutputMetadata {
            source_url: Some(source.url()),
            artifact_name: None,
        };
        fx.monitor.metadata().save_output(output.id, &metadata).unwrap();
    }

    #[test]
    fn test_moved_output_root_marks_sources() {
        let fx = Fixture::new();
        let source = fx.fs.add_file("/ws/src/A.java", 1);
        let output = fx.fs.add_file("/ws/out/A.class", 2);
        let orphan = fx.fs.add_file("/ws/out/Orphan.class", 2);
        record_output(&fx, &source, &output);
        fx.monitor.update_output_roots_layout(&fx.ws).unwrap();

        fx.model.set_modules(vec![ModuleRoots {
            name: "app".into(),
            source_roots: vec!["src".into()],
            output_root: Some("build/classes".into()),
            test_output_root: Some("out-test".into()),
            generated_roots: vec!["gen".into()],
        }]);
        let current = OutputRootsLayout::from_modules(&fx.ws.model().modules());
        fx.monitor
            .mark_old_output_roots(&fx.ws, &current, &CancellationToken::new())
            .unwrap();

        assert!(fx.monitor.is_pending(fx.ws.id(), source.id));
        assert!(!fx.monitor.is_pending(fx.ws.id(), orphan.id));
    }

    #[test]
    fn test_removed_module_marks_sources() {
        let fx = Fixture::new();
        let source = fx.fs.add_file("/ws/src/T.java", 1);
        let output = fx.fs.add_file("/ws/out-test/T.class", 2);
        record_output(&fx, &source, &output);
        fx.monitor.update_output_roots_layout(&fx.ws).unwrap();

        fx.monitor
            .mark_old_output_roots(&fx.ws, &OutputRootsLayout::default(), &CancellationToken::new())
            .unwrap();
        assert!(fx.monitor.is_pending(fx.ws.id(), source.id));
    }

    #[test]
    fn test_unchanged_layout_marks_nothing() {
        let fx = Fixture::new();
        let source = fx.fs.add_file("/ws/src/A.java", 1);
        let output = fx.fs.add_file("/ws/out/A.class", 2);
        record_output(&fx, &source, &output);
        fx.monitor.update_output_roots_layout(&fx.ws).unwrap();

        let current = OutputRootsLayout::from_modules(&fx.ws.model().modules());
        fx.monitor
            .mark_old_output_roots(&fx.ws, &current, &CancellationToken::new())
            .unwrap();
        assert!(fx.monitor.pending_files(fx.ws.id()).is_empty());
    }

    #[test]
    fn test_no_saved_layout_marks_nothing() {
        let fx = Fixture::new();
        assert!(fx.monitor.last_output_roots_layout(&fx.ws).unwrap().is_none());
        fx.monitor
            .mark_old_output_roots(&fx.ws, &OutputRootsLayout::default(), &CancellationToken::new())
            .unwrap();
        assert_eq!(fx.monitor.tracked_workspaces(), 0);
    }
}
