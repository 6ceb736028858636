//! Lock-guarded tracker state
//!
//! Everything here sits behind the monitor's single mutex: the per-workspace
//! table (recompilation sets, suspension, generated-data paths) and the
//! deletion-ledger cache.

use crate::types::{FileId, WorkspaceId};
use convenient_ledger::LedgerCache;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

#[derive(Debug)]
pub(crate) struct WorkspaceSlot {
    pub(crate) suspended: bool,
    pub(crate) pending: HashSet<FileId>,
    pub(crate) generated_path: Option<PathBuf>,
}

impl WorkspaceSlot {
    fn new() -> Self {
        Self {
            suspended: false,
            pending: HashSet::new(),
            generated_path: None,
        }
    }

    fn is_idle(&self) -> bool {
        !self.suspended && self.pending.is_empty() && self.generated_path.is_none()
    }
}

/// Arena of workspace slots indexed by id
///
/// Slots that hold nothing are released so the table only grows with
/// workspaces that have state.
#[derive(Debug, Default)]
pub(crate) struct WorkspaceTable {
    index: HashMap<WorkspaceId, usize>,
    slots: Vec<Option<WorkspaceSlot>>,
    free: Vec<usize>,
}

impl WorkspaceTable {
    pub(crate) fn get(&self, id: WorkspaceId) -> Option<&WorkspaceSlot> {
        let index = *self.index.get(&id)?;
        self.slots.get(index)?.as_ref()
    }

    fn get_mut(&mut self, id: WorkspaceId) -> Option<&mut WorkspaceSlot> {
        let index = *self.index.get(&id)?;
        self.slots.get_mut(index)?.as_mut()
    }

    fn slot_mut(&mut self, id: WorkspaceId) -> &mut WorkspaceSlot {
        let index = match self.index.get(&id) {
            Some(&index) => index,
            None => {
                let index = match self.free.pop() {
                    Some(index) => {
                        self.slots[index] = Some(WorkspaceSlot::new());
                        index
                    }
                    None => {
                        self.slots.push(Some(WorkspaceSlot::new()));
                        self.slots.len() - 1
                    }
                };
                let _ = self.index.insert(id, index);
                index
            }
        };
        self.slots[index].get_or_insert_with(WorkspaceSlot::new)
    }

    fn compact(&mut self, id: WorkspaceId) {
        if self.get(id).is_some_and(WorkspaceSlot::is_idle) {
            let _ = self.remove(id);
        }
    }

    /// Drop all state of a workspace
    pub(crate) fn remove(&mut self, id: WorkspaceId) -> Option<WorkspaceSlot> {
        let index = self.index.remove(&id)?;
        self.free.push(index);
        self.slots.get_mut(index)?.take()
    }

    /// Insert into the recompilation set; true if newly added
    pub(crate) fn insert_pending(&mut self, id: WorkspaceId, file: FileId) -> bool {
        self.slot_mut(id).pending.insert(file)
    }

    /// Remove from the recompilation set; true if it was present
    pub(crate) fn remove_pending(&mut self, id: WorkspaceId, file: FileId) -> bool {
        let removed = self.get_mut(id).is_some_and(|slot| slot.pending.remove(&file));
        self.compact(id);
        removed
    }

    pub(crate) fn is_pending(&self, id: WorkspaceId, file: FileId) -> bool {
        self.get(id).is_some_and(|slot| slot.pending.contains(&file))
    }

    pub(crate) fn has_pending(&self, id: WorkspaceId) -> bool {
        self.get(id).is_some_and(|slot| !slot.pending.is_empty())
    }

    pub(crate) fn pending(&self, id: WorkspaceId) -> Vec<FileId> {
        let mut pending: Vec<FileId> = self
            .get(id)
            .map(|slot| slot.pending.iter().copied().collect())
            .unwrap_or_default();
        pending.sort();
        pending
    }

    pub(crate) fn is_suspended(&self, id: WorkspaceId) -> bool {
        self.get(id).is_some_and(|slot| slot.suspended)
    }

    /// Set the suspended flag; true if it changed
    pub(crate) fn set_suspended(&mut self, id: WorkspaceId, suspended: bool) -> bool {
        let slot = self.slot_mut(id);
        let changed = slot.suspended != suspended;
        slot.suspended = suspended;
        self.compact(id);
        changed
    }

    /// Forget the recompilation set and generated-data path, keeping the flag
    pub(crate) fn drop_data(&mut self, id: WorkspaceId) {
        if let Some(slot) = self.get_mut(id) {
            slot.pending.clear();
            slot.generated_path = None;
        }
        self.compact(id);
    }

    pub(crate) fn generated_path(&mut self, id: WorkspaceId, compute: impl FnOnce() -> PathBuf) -> PathBuf {
        self.slot_mut(id).generated_path.get_or_insert_with(compute).clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.index.len()
    }
}

/// Everything guarded by the monitor's lock
pub(crate) struct TrackerState {
    pub(crate) table: WorkspaceTable,
    pub(crate) ledgers: LedgerCache<WorkspaceId>,
}
