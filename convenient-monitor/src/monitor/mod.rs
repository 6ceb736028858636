//! The build-state tracker service
//!
//! [`BuildStateMonitor`] owns every piece of mutable tracker state behind one
//! mutex. Critical sections are kept to map lookups and updates; metadata I/O
//! and ledger mutation happen outside the lock.

mod collect;
mod events;
mod recompile;
mod roots;
mod scanner;
mod update;

use crate::attributes::AttributeStore;
use crate::config::MonitorConfig;
use crate::error::{MonitorError, MonitorResult};
use crate::metadata::MetadataStore;
use crate::scan::ScanCoordinator;
use crate::state::{TrackerState, WorkspaceTable};
use crate::types::WorkspaceId;
use crate::vfs::{FileNode, FileSystem};
use crate::workspace::{ProjectModel, Workspace, WorkspaceRegistry};
use convenient_ledger::{DeletionEntry, LedgerCache, LedgerHandle, LedgerStats};
use parking_lot::Mutex;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// Tracks which sources need recompiling and which outputs are stale,
/// for every open workspace
pub struct BuildStateMonitor {
    config: MonitorConfig,
    fs: Arc<dyn FileSystem>,
    metadata: MetadataStore,
    workspaces: Arc<WorkspaceRegistry>,
    state: Mutex<TrackerState>,
    scans: Arc<ScanCoordinator>,
    force_compiling: AtomicBool,
}

impl BuildStateMonitor {
    /// Create a monitor over a file system and two attribute stores
    pub fn new(
        config: MonitorConfig,
        fs: Arc<dyn FileSystem>,
        sources: Arc<dyn AttributeStore>,
        outputs: Arc<dyn AttributeStore>,
    ) -> Self {
        let workspaces = Arc::new(WorkspaceRegistry::new());
        let ledgers = {
            let workspaces = Arc::clone(&workspaces);
            let file_name = config.ledger_file_name.clone();
            LedgerCache::new(config.ledger_capacity, move |ws: &WorkspaceId| {
                let workspace = workspaces.get(*ws)?;
                let cache_dir = workspace.cache_dir();
                cache_dir.is_dir().then(|| cache_dir.join(&file_name))
            })
        };

        Self {
            config,
            fs,
            metadata: MetadataStore::new(sources, outputs),
            workspaces,
            state: Mutex::new(TrackerState {
                table: WorkspaceTable::default(),
                ledgers,
            }),
            scans: Arc::new(ScanCoordinator::new()),
            force_compiling: AtomicBool::new(false),
        }
    }

    /// Configuration
    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// File system the monitor reads
    pub fn fs(&self) -> &dyn FileSystem {
        self.fs.as_ref()
    }

    /// Source and output metadata
    pub fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    /// Scan accounting
    pub fn scans(&self) -> &Arc<ScanCoordinator> {
        &self.scans
    }

    /// Register a workspace rooted at `root`
    ///
    /// The workspace id is the file id of the root directory. Registering the
    /// same root again replaces the previous entry.
    pub fn register_workspace(&self, root: &Path, model: Arc<dyn ProjectModel>) -> MonitorResult<Arc<Workspace>> {
        let root_node = self
            .fs
            .find_by_path(root)
            .filter(|node| node.is_dir)
            .ok_or_else(|| MonitorError::RootNotFound(root.to_path_buf()))?;
        let workspace = Arc::new(Workspace::new(
            WorkspaceId::from(root_node.id),
            root_node.path,
            model,
            &self.config,
        ));
        self.workspaces.register(Arc::clone(&workspace));
        info!(workspace = %workspace.id(), root = %workspace.root().display(), "Registered workspace");
        Ok(workspace)
    }

    /// Look up an open workspace
    pub fn workspace(&self, ws: WorkspaceId) -> MonitorResult<Arc<Workspace>> {
        self.workspaces.get(ws).ok_or(MonitorError::UnknownWorkspace(ws))
    }

    /// All registered workspaces that are still open
    pub fn open_workspaces(&self) -> Vec<Arc<Workspace>> {
        self.workspaces.open_workspaces()
    }

    /// Close a workspace: in-flight scans stop, its state is dropped and its
    /// ledger flushed
    pub fn close_workspace(&self, ws: WorkspaceId) {
        self.scans.finish(ws, true);
        if let Some(workspace) = self.workspaces.unregister(ws) {
            workspace.close();
        }
        {
            let mut state = self.state.lock();
            let _ = state.table.remove(ws);
            let _ = state.ledgers.remove(&ws);
        }
        info!(workspace = %ws, "Closed workspace");
    }

    /// Flush and drop every cached ledger
    pub fn dispose(&self) {
        self.state.lock().ledgers.clear();
    }

    /// Stop tracking `ws` until [`watch`](Self::watch): write the rebuild
    /// marker and drop its recompilation set and cached paths. The deletion
    /// ledger leaves memory but is flushed first, so outputs of removed
    /// sources are still deleted after the workspace is watched again.
    pub fn suspend(&self, workspace: &Workspace) -> MonitorResult<()> {
        let ws = workspace.id();
        {
            let mut state = self.state.lock();
            if !state.table.set_suspended(ws, true) {
                return Ok(());
            }
            state.table.drop_data(ws);
            let _ = state.ledgers.remove(&ws);
        }

        let marker = self.rebuild_marker(workspace);
        let _ = workspace.ensure_cache_dir()?;
        let _marker = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&marker)
            .map_err(|e| MonitorError::io(&marker, e))?;

        let layout = self.layout_file(workspace);
        match fs::remove_file(&layout) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(MonitorError::io(&layout, e)),
        }

        info!(workspace = %ws, "Suspended workspace, next build is a full rebuild");
        Ok(())
    }

    /// Resume tracking `ws`; does not scan
    pub fn watch(&self, ws: WorkspaceId) {
        if self.state.lock().table.set_suspended(ws, false) {
            debug!(workspace = %ws, "Watching workspace");
        }
    }

    /// True between [`suspend`](Self::suspend) and [`watch`](Self::watch)
    pub fn is_suspended(&self, ws: WorkspaceId) -> bool {
        self.state.lock().table.is_suspended(ws)
    }

    /// Path of the full-rebuild marker
    pub fn rebuild_marker(&self, workspace: &Workspace) -> PathBuf {
        workspace.cache_dir().join(&self.config.rebuild_marker_name)
    }

    /// True if the next build must be a full rebuild
    pub fn rebuild_required(&self, workspace: &Workspace) -> bool {
        self.rebuild_marker(workspace).exists()
    }

    /// Remove the rebuild marker after a full rebuild
    pub fn clear_rebuild_marker(&self, workspace: &Workspace) -> MonitorResult<()> {
        let marker = self.rebuild_marker(workspace);
        match fs::remove_file(&marker) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(MonitorError::io(&marker, e)),
        }
    }

    pub(crate) fn layout_file(&self, workspace: &Workspace) -> PathBuf {
        workspace.cache_dir().join(&self.config.layout_file_name)
    }

    /// Directory for data generated during builds of `workspace`
    pub fn generated_path(&self, workspace: &Workspace) -> PathBuf {
        self.state.lock().table.generated_path(workspace.id(), || {
            workspace.cache_dir().join(&self.config.generated_dir_name)
        })
    }

    /// Force every workspace's next collection to consider all candidates
    ///
    /// The flag is process-wide and cleared by the next
    /// [`update`](Self::update) of any workspace.
    pub fn compilation_settings_changed(&self) {
        self.force_compiling.store(true, Ordering::Release);
        info!("Compilation settings changed, forcing compilation");
    }

    /// True if a forced compilation is requested
    pub fn is_force_compiling(&self) -> bool {
        self.force_compiling.load(Ordering::Acquire)
    }

    /// Artifact names of the outputs `source` currently produces in `ws`
    pub fn compiled_artifact_names(&self, ws: WorkspaceId, source: &FileNode) -> Vec<String> {
        let Some(metadata) = self.metadata.load_source(source.id) else {
            return Vec::new();
        };
        metadata
            .outputs(ws)
            .filter_map(|(_, path)| self.fs.find_by_path(path))
            .filter_map(|output| self.metadata.load_output(output.id)?.artifact_name)
            .collect()
    }

    /// Source that produced `output`, if it still exists
    pub fn source_for_output(&self, output: &FileNode) -> Option<FileNode> {
        let url = self.metadata.load_output(output.id)?.source_url?;
        self.fs.find_by_url(&url)
    }

    /// Snapshot of the deletion ledger of `ws`
    pub fn pending_deletions(&self, ws: WorkspaceId) -> Vec<(String, DeletionEntry)> {
        self.acquire_ledger(ws).entries()
    }

    /// Ledger cache counters
    pub fn ledger_stats(&self) -> LedgerStats {
        self.state.lock().ledgers.stats()
    }

    /// Workspaces with tracked state
    pub fn tracked_workspaces(&self) -> usize {
        self.state.lock().table.len()
    }

    /// Take a reference on the ledger of `ws`. The tracker lock is held only
    /// while the cache is consulted.
    pub(crate) fn acquire_ledger(&self, ws: WorkspaceId) -> LedgerHandle {
        self.state.lock().ledgers.acquire(ws)
    }
}

impl std::fmt::Debug for BuildStateMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildStateMonitor")
            .field("config", &self.config)
            .field("force_compiling", &self.is_force_compiling())
            .finish_non_exhaustive()
    }
}
