//! Workspace lifecycle: initial scans, debounced root-change rescans, close
//!
//! Scans run on the blocking pool of a tokio runtime. A root-change
//! notification does not scan right away; it (re)arms a timer, and only the
//! last notification within the debounce window triggers a rescan. Roots
//! added or removed by the notifications it replaced are carried over.

use crate::error::{Interrupted, MonitorResult, ScanOutcome};
use crate::monitor::BuildStateMonitor;
use crate::types::WorkspaceId;
use crate::workspace::{OutputRootsLayout, ProjectModel, Workspace};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

struct PendingRescan {
    generation: u64,
    task: JoinHandle<()>,
    new_roots: BTreeSet<PathBuf>,
    old_roots: BTreeSet<PathBuf>,
}

struct WorkspaceWatch {
    workspace: Arc<Workspace>,
    cancel: CancellationToken,
    roots_before: Option<BTreeSet<PathBuf>>,
    rescan: Option<PendingRescan>,
    generation: u64,
}

type Watches = Arc<Mutex<HashMap<WorkspaceId, WorkspaceWatch>>>;

/// Drives a [`BuildStateMonitor`] through workspace open, root changes and close
pub struct Lifecycle {
    monitor: Arc<BuildStateMonitor>,
    runtime: Handle,
    watches: Watches,
}

impl Lifecycle {
    /// Run background work on `runtime`
    pub fn new(monitor: Arc<BuildStateMonitor>, runtime: Handle) -> Self {
        Self {
            monitor,
            runtime,
            watches: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The monitor being driven
    pub fn monitor(&self) -> &Arc<BuildStateMonitor> {
        &self.monitor
    }

    /// Register a workspace and start its initial scan in the background
    ///
    /// The cache directory exists before the scan starts, so the scan already
    /// writes to the persisted deletion ledger. The scan is counted as in
    /// flight before this returns, so a following
    /// [`ensure_initialization_completed`](Self::ensure_initialization_completed)
    /// always waits for it.
    pub fn open_workspace(&self, root: &Path, model: Arc<dyn ProjectModel>) -> MonitorResult<Arc<Workspace>> {
        let workspace = self.monitor.register_workspace(root, model)?;
        let _ = workspace.ensure_cache_dir()?;
        let ws = workspace.id();
        let cancel = CancellationToken::new();

        let previous = self.watches.lock().insert(
            ws,
            WorkspaceWatch {
                workspace: Arc::clone(&workspace),
                cancel: cancel.clone(),
                roots_before: None,
                rescan: None,
                generation: 0,
            },
        );
        if let Some(previous) = previous {
            stop(previous);
        }

        let guard = self.monitor.scans().start(ws);
        let monitor = Arc::clone(&self.monitor);
        let scanned = Arc::clone(&workspace);
        let _scan = self.runtime.spawn_blocking(move || {
            let _guard = guard;
            monitor.run_scan(&scanned, &cancel)
        });

        info!(workspace = %ws, root = %root.display(), "Opened workspace, initial scan started");
        Ok(workspace)
    }

    /// Wait until no scan of `ws` is in flight
    ///
    /// Returns early, without the scans having finished, when the workspace
    /// closes or `cancel` fires.
    pub async fn ensure_initialization_completed(&self, ws: WorkspaceId, cancel: &CancellationToken) -> ScanOutcome {
        let Ok(workspace) = self.monitor.workspace(ws) else {
            return ScanOutcome::WorkspaceClosed;
        };
        self.monitor.scans().wait_idle(ws, || workspace.is_open(), cancel).await
    }

    /// Remember the scan roots of `ws` before its configuration changes
    pub fn before_roots_change(&self, ws: WorkspaceId) {
        if self.monitor.is_suspended(ws) {
            return;
        }
        if let Some(watch) = self.watches.lock().get_mut(&ws) {
            watch.roots_before = Some(roots_for_scan(&watch.workspace));
        }
    }

    /// The scan roots of `ws` changed: schedule a rescan of added and removed
    /// roots after the debounce delay, replacing any rescan not yet started
    pub fn roots_changed(&self, ws: WorkspaceId) {
        if self.monitor.is_suspended(ws) {
            return;
        }
        let delay = self.monitor.config().rescan_debounce();

        let mut watches = self.watches.lock();
        let Some(watch) = watches.get_mut(&ws) else {
            return;
        };

        let after = roots_for_scan(&watch.workspace);
        let before = watch.roots_before.take();
        let mut new_roots: BTreeSet<PathBuf> = match &before {
            Some(before) => after.difference(before).cloned().collect(),
            None => after.clone(),
        };
        let mut old_roots: BTreeSet<PathBuf> = before
            .map(|before| before.difference(&after).cloned().collect())
            .unwrap_or_default();

        if let Some(previous) = watch.rescan.take() {
            previous.task.abort();
            new_roots.extend(previous.new_roots.into_iter().filter(|root| after.contains(root)));
            old_roots.extend(previous.old_roots.into_iter().filter(|root| !after.contains(root)));
            debug!(workspace = %ws, "Rescheduling pending rescan");
        }

        watch.generation += 1;
        let generation = watch.generation;
        let task = self.runtime.spawn(rescan_after(
            delay,
            Arc::clone(&self.monitor),
            Arc::clone(&self.watches),
            ws,
            generation,
        ));
        debug!(workspace = %ws, new_roots = new_roots.len(), old_roots = old_roots.len(), "Roots changed, rescan scheduled");
        watch.rescan = Some(PendingRescan {
            generation,
            task,
            new_roots,
            old_roots,
        });
    }

    /// Compilation settings changed: force the next collection everywhere
    pub fn compilation_settings_changed(&self) {
        self.monitor.compilation_settings_changed();
    }

    /// Stop background work for `ws` and close it in the monitor
    pub fn close_workspace(&self, ws: WorkspaceId) {
        let watch = self.watches.lock().remove(&ws);
        if let Some(watch) = watch {
            stop(watch);
        }
        self.monitor.close_workspace(ws);
    }

    /// Close every workspace and flush all ledgers
    pub fn shutdown(&self) {
        let ids: Vec<WorkspaceId> = self.watches.lock().keys().copied().collect();
        for ws in ids {
            self.close_workspace(ws);
        }
        self.monitor.dispose();
    }
}

impl std::fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lifecycle")
            .field("workspaces", &self.watches.lock().len())
            .finish_non_exhaustive()
    }
}

fn stop(watch: WorkspaceWatch) {
    watch.cancel.cancel();
    if let Some(rescan) = watch.rescan {
        rescan.task.abort();
    }
}

/// Source and generated roots of every module
fn roots_for_scan(workspace: &Workspace) -> BTreeSet<PathBuf> {
    workspace
        .model()
        .modules()
        .into_iter()
        .flat_map(|m| m.source_roots.into_iter().chain(m.generated_roots))
        .collect()
}

async fn rescan_after(
    delay: Duration,
    monitor: Arc<BuildStateMonitor>,
    watches: Watches,
    ws: WorkspaceId,
    generation: u64,
) {
    tokio::time::sleep(delay).await;

    let (workspace, cancel, new_roots, old_roots) = {
        let mut watches = watches.lock();
        let Some(watch) = watches.get_mut(&ws) else {
            return;
        };
        // Superseded while waking up
        if watch.rescan.as_ref().is_none_or(|r| r.generation != generation) {
            return;
        }
        let Some(rescan) = watch.rescan.take() else {
            return;
        };
        (Arc::clone(&watch.workspace), watch.cancel.clone(), rescan.new_roots, rescan.old_roots)
    };

    let guard = monitor.scans().start(ws);
    let scan = tokio::task::spawn_blocking(move || {
        let _guard = guard;
        let outcome = ScanOutcome::from(rescan_roots(&monitor, &workspace, &new_roots, &old_roots, &cancel));
        info!(workspace = %ws, ?outcome, "Root-change rescan finished");
    });
    if let Err(e) = scan.await {
        warn!(workspace = %ws, error = %e, "Root-change rescan failed");
    }
}

fn rescan_roots(
    monitor: &BuildStateMonitor,
    workspace: &Workspace,
    new_roots: &BTreeSet<PathBuf>,
    old_roots: &BTreeSet<PathBuf>,
    cancel: &CancellationToken,
) -> Result<(), Interrupted> {
    let added = monitor.existing_nodes(new_roots);
    monitor.scan_source_content(workspace, &added, true, cancel)?;

    let removed = monitor.existing_nodes(old_roots);
    monitor.scan_source_content(workspace, &removed, false, cancel)?;

    let current = OutputRootsLayout::from_modules(&workspace.model().modules());
    monitor.mark_old_output_roots(workspace, &current, cancel)
}
