//! One driver session over a workspace on disk

use crate::compiler::CopyCompiler;
use crate::config::BuildConfig;
use crate::error::{BuildError, BuildResult};
use convenient_monitor::{
    BuildStateMonitor, DepthFirst, FileAttributeStore, FileNode, Lifecycle, LocalFileSystem,
    MonitorConfig, ProjectModel, ScanOutcome, StaticProjectModel, Workspace,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Directory under the workspace used when no system directory is given
pub const DEFAULT_SYSTEM_DIR: &str = ".buildwacht";

/// File id table under the system directory
pub const FILE_IDS_FILE: &str = "file_ids.json";

/// Where a session reads and writes
#[derive(Debug, Clone)]
pub struct ProjectOptions {
    /// Workspace root
    pub workspace: PathBuf,
    /// Build-state directory; defaults to `<workspace>/.buildwacht`
    pub system_dir: Option<PathBuf>,
}

impl ProjectOptions {
    /// Options for `workspace` with the default system directory
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
            system_dir: None,
        }
    }

    fn resolved_system_dir(&self, root: &Path) -> PathBuf {
        self.system_dir.clone().unwrap_or_else(|| root.join(DEFAULT_SYSTEM_DIR))
    }
}

/// An open workspace with its tracker, stores and compiler
pub struct Project {
    lifecycle: Lifecycle,
    fs: Arc<LocalFileSystem>,
    workspace: Arc<Workspace>,
    compiler: CopyCompiler,
    sources: Arc<FileAttributeStore>,
    outputs: Arc<FileAttributeStore>,
}

impl Project {
    /// Load the configuration, open the attribute stores and register the
    /// workspace. The workspace cache directory is created before any scan.
    /// With `scan`, the initial scan starts in the background.
    pub fn open(options: &ProjectOptions, scan: bool) -> BuildResult<Self> {
        let root = std::path::absolute(&options.workspace).map_err(|e| BuildError::io(&options.workspace, e))?;
        let config = BuildConfig::load(&root)?;
        let system_dir = options.resolved_system_dir(&root);
        debug!(root = %root.display(), system_dir = %system_dir.display(), "Opening project");

        let fs = Arc::new(LocalFileSystem::open(system_dir.join(FILE_IDS_FILE))?);
        let sources = Arc::new(FileAttributeStore::open(system_dir.join("sources.json"))?);
        let outputs = Arc::new(FileAttributeStore::open(system_dir.join("outputs.json"))?);
        let monitor = Arc::new(BuildStateMonitor::new(
            MonitorConfig::with_system_dir(&system_dir),
            fs.clone(),
            sources.clone(),
            outputs.clone(),
        ));

        let model = Arc::new(StaticProjectModel::new(&root, config.model));
        let compiler = CopyCompiler::new(config.compile, model.modules());
        let lifecycle = Lifecycle::new(Arc::clone(&monitor), Handle::current());
        let workspace = if scan {
            lifecycle.open_workspace(&root, model)?
        } else {
            let workspace = monitor.register_workspace(&root, model)?;
            let _ = workspace.ensure_cache_dir()?;
            workspace
        };

        Ok(Self {
            lifecycle,
            fs,
            workspace,
            compiler,
            sources,
            outputs,
        })
    }

    /// Wait for the initial scan
    pub async fn wait_for_scan(&self) -> BuildResult<()> {
        let outcome = self
            .lifecycle
            .ensure_initialization_completed(self.workspace.id(), &CancellationToken::new())
            .await;
        match outcome {
            ScanOutcome::Completed => Ok(()),
            other => Err(BuildError::Task(format!("initial scan ended with {other:?}"))),
        }
    }

    /// The tracker
    pub fn monitor(&self) -> &Arc<BuildStateMonitor> {
        self.lifecycle.monitor()
    }

    /// The workspace
    pub fn workspace(&self) -> &Arc<Workspace> {
        &self.workspace
    }

    /// The compiler
    pub fn compiler(&self) -> &CopyCompiler {
        &self.compiler
    }

    /// Every file under the source and generated roots
    pub fn source_files(&self) -> Vec<FileNode> {
        let fs = self.monitor().fs();
        let model = self.workspace.model();
        let roots: Vec<FileNode> = model
            .modules()
            .iter()
            .flat_map(|m| m.source_roots.iter().chain(&m.generated_roots))
            .filter_map(|root| fs.find_by_path(root))
            .collect();
        DepthFirst::new(fs, roots)
            .with_ignore(|node| model.is_ignored(node))
            .filter(|node| !node.is_dir)
            .collect()
    }

    /// Output roots of every module
    pub fn output_roots(&self) -> Vec<PathBuf> {
        self.workspace
            .model()
            .modules()
            .into_iter()
            .flat_map(|m| m.output_root.into_iter().chain(m.test_output_root))
            .collect()
    }

    /// Close the workspace, flushing the deletion ledger, the file id table
    /// and both attribute stores
    pub fn close(self) -> BuildResult<()> {
        self.lifecycle.shutdown();
        self.fs.flush()?;
        self.sources.flush()?;
        self.outputs.flush()?;
        info!(workspace = %self.workspace.id(), "Build state saved");
        Ok(())
    }
}

impl std::fmt::Debug for Project {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Project")
            .field("workspace", &self.workspace)
            .field("compiler", &self.compiler)
            .finish_non_exhaustive()
    }
}
