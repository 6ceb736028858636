//! Scan-in-flight accounting
//!
//! Each workspace has a counter of running scans. While it is above zero the
//! recompilation set is still being filled and must not be trusted. Waiters
//! are woken whenever a counter drops to zero or is cleared.

use crate::error::ScanOutcome;
use crate::types::WorkspaceId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::pin::pin;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Per-workspace counters of running scans
#[derive(Debug, Default)]
pub struct ScanCoordinator {
    in_flight: Mutex<HashMap<WorkspaceId, usize>>,
    idle: Notify,
}

impl ScanCoordinator {
    /// New coordinator with no scans running
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a scan as started and return a guard that finishes it on drop
    pub fn start(self: &Arc<Self>, ws: WorkspaceId) -> ScanGuard {
        self.begin(ws);
        ScanGuard {
            coordinator: Arc::clone(self),
            ws,
        }
    }

    /// Count a scan as started
    pub fn begin(&self, ws: WorkspaceId) {
        let mut in_flight = self.in_flight.lock();
        let counter = in_flight.entry(ws).or_insert(0);
        *counter += 1;
        trace!(workspace = %ws, in_flight = *counter, "Scan started");
    }

    /// Count a scan as finished. `clear` forgets every scan of the workspace.
    pub fn finish(&self, ws: WorkspaceId, clear: bool) {
        let mut in_flight = self.in_flight.lock();
        let remaining = match in_flight.remove(&ws) {
            Some(count) if !clear => count.saturating_sub(1),
            _ => 0,
        };
        if remaining > 0 {
            let _ = in_flight.insert(ws, remaining);
        } else {
            drop(in_flight);
            trace!(workspace = %ws, "No scans in flight");
            self.idle.notify_waiters();
        }
    }

    /// Number of scans running for `ws`
    pub fn in_flight(&self, ws: WorkspaceId) -> usize {
        self.in_flight.lock().get(&ws).copied().unwrap_or(0)
    }

    /// True if no scan is running for `ws`
    pub fn is_idle(&self, ws: WorkspaceId) -> bool {
        self.in_flight(ws) == 0
    }

    /// Wait until no scan is running for `ws`
    ///
    /// Returns early when `is_open` turns false or `cancel` fires; in that case
    /// scans may still be running.
    pub async fn wait_idle(&self, ws: WorkspaceId, is_open: impl Fn() -> bool, cancel: &CancellationToken) -> ScanOutcome {
        loop {
            let mut notified = pin!(self.idle.notified());
            // Register before checking so a concurrent finish cannot be missed
            notified.as_mut().enable();

            if !is_open() {
                return ScanOutcome::WorkspaceClosed;
            }
            if self.is_idle(ws) {
                return ScanOutcome::Completed;
            }
            if cancel.is_cancelled() {
                return ScanOutcome::Cancelled;
            }

            tokio::select! {
                () = &mut notified => {}
                () = cancel.cancelled() => return ScanOutcome::Cancelled,
            }
        }
    }
}

/// Finishes one scan when dropped
#[derive(Debug)]
pub struct ScanGuard {
    coordinator: Arc<ScanCoordinator>,
    ws: WorkspaceId,
}

impl Drop for ScanGuard {
    fn drop(&mut self) {
        self.coordinator.finish(self.ws, false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[test]
    fn test_counting() {
        let scans = Arc::new(ScanCoordinator::new());
        let ws = WorkspaceId(1);

        let first = scans.start(ws);
        let second = scans.start(ws);
        assert_eq!(scans.in_flight(ws), 2);

        drop(first);
        assert_eq!(scans.in_flight(ws), 1);
        drop(second);
        assert!(scans.is_idle(ws));
    }

    #[test]
    fn test_clear_then_late_finish() {
        let scans = Arc::new(ScanCoordinator::new());
        let ws = WorkspaceId(1);
        let guard = scans.start(ws);

        scans.finish(ws, true);
        assert!(scans.is_idle(ws));
        drop(guard);
        assert!(scans.is_idle(ws));
    }

    #[tokio::test]
    async fn test_wait_resolves_on_last_finish() {
        let scans = Arc::new(ScanCoordinator::new());
        let ws = WorkspaceId(2);
        let guard = scans.start(ws);

        let finisher = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            drop(guard);
        });

        let outcome = scans.wait_idle(ws, || true, &CancellationToken::new()).await;
        assert_eq!(outcome, ScanOutcome::Completed);
        finisher.await.unwrap();
    }

    #[tokio::test]
    async fn test_wait_cancelled() {
        let scans = Arc::new(ScanCoordinator::new());
        let ws = WorkspaceId(3);
        let _guard = scans.start(ws);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let _ = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        assert_eq!(scans.wait_idle(ws, || true, &cancel).await, ScanOutcome::Cancelled);
        assert_eq!(scans.in_flight(ws), 1);
    }

    #[tokio::test]
    async fn test_wait_sees_closed_workspace() {
        let scans = Arc::new(ScanCoordinator::new());
        let ws = WorkspaceId(4);
        let _guard = scans.start(ws);
        let open = Arc::new(AtomicBool::new(true));

        let closer = {
            let scans = Arc::clone(&scans);
            let open = Arc::clone(&open);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                open.store(false, Ordering::Release);
                scans.finish(ws, true);
            })
        };

        let outcome = scans
            .wait_idle(ws, || open.load(Ordering::Acquire), &CancellationToken::new())
            .await;
        assert_eq!(outcome, ScanOutcome::WorkspaceClosed);
        closer.await.unwrap();
    }
}
