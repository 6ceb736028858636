//! Bounded cache of reference-counted ledgers
//!
//! [`LedgerCache::acquire`] hands out a [`LedgerHandle`]. Every handle counts
//! as one reference; dropping the last handle of a dirty ledger rewrites its
//! backing file. The cache keeps at most `capacity` ledgers and evicts the
//! least recently used one that has no outstanding handle. When every cached
//! ledger is referenced the eviction is deferred until a later call.
//!
//! The cache itself is not synchronized: callers keep it behind their own
//! lock, which then also covers eviction. Handles may be used and dropped
//! from any thread.

use crate::codec;
use crate::ledger::{DeletionEntry, Ledger};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use tracing::{debug, warn};

/// Maps a cache key to the ledger's backing file, or `None` for an
/// in-memory-only ledger
pub type StoreResolver<K> = Box<dyn Fn(&K) -> Option<PathBuf> + Send + Sync>;

/// Cache activity counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerStats {
    /// Ledgers created, from disk or empty
    pub loads: u64,
    /// Successful writes of a backing file
    pub flushes: u64,
    /// Failed writes of a backing file
    pub flush_failures: u64,
    /// Ledgers dropped to honor the capacity
    pub evictions: u64,
}

#[derive(Debug, Default)]
struct Counters {
    loads: AtomicU64,
    flushes: AtomicU64,
    flush_failures: AtomicU64,
    evictions: AtomicU64,
}

struct LedgerSlot {
    store_file: Option<PathBuf>,
    ledger: Mutex<Ledger>,
    refs: AtomicUsize,
    /// Removed from the cache while handles were still live
    closed: AtomicBool,
    counters: Arc<Counters>,
}

impl LedgerSlot {
    fn load(store_file: Option<PathBuf>, counters: Arc<Counters>) -> Self {
        let ledger = match &store_file {
            Some(path) => match codec::load(path) {
                Ok(entries) => Ledger::from_entries(entries),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to load deletion ledger, starting empty");
                    Ledger::default()
                }
            },
            None => Ledger::default(),
        };
        let _ = counters.loads.fetch_add(1, Ordering::Relaxed);

        Self {
            store_file,
            ledger: Mutex::new(ledger),
            refs: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            counters,
        }
    }

    fn is_referenced(&self) -> bool {
        self.refs.load(Ordering::Acquire) > 0
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Write the ledger if it changed. Failures are logged and leave the
    /// ledger dirty so a later release retries.
    fn flush_if_dirty(&self, ledger: &mut Ledger) {
        if !ledger.is_dirty() {
            return;
        }
        let Some(path) = &self.store_file else {
            return;
        };

        match codec::save(path, ledger.entries()) {
            Ok(()) => {
                ledger.mark_clean();
                let _ = self.counters.flushes.fetch_add(1, Ordering::Relaxed);
                debug!(path = %path.display(), entries = ledger.len(), "Flushed deletion ledger");
            }
            Err(e) => {
                let _ = self.counters.flush_failures.fetch_add(1, Ordering::Relaxed);
                warn!(path = %path.display(), error = %e, "Failed to flush deletion ledger, keeping it in memory");
            }
        }
    }
}

/// Bounded least-recently-used cache of ledgers
pub struct LedgerCache<K> {
    capacity: usize,
    resolver: StoreResolver<K>,
    /// Most recently used first
    slots: VecDeque<(K, Arc<LedgerSlot>)>,
    counters: Arc<Counters>,
}

impl<K: Clone + Eq + fmt::Debug> LedgerCache<K> {
    /// Create a cache holding at most `capacity` ledgers (at least one)
    pub fn new<F>(capacity: usize, resolver: F) -> Self
    where
        F: Fn(&K) -> Option<PathBuf> + Send + Sync + 'static,
    {
        Self {
            capacity: capacity.max(1),
            resolver: Box::new(resolver),
            slots: VecDeque::new(),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Get the ledger for `key`, loading it on first use, and take a reference
    ///
    /// A ledger that was removed while handles were still live is reused, so
    /// there is never more than one in-memory copy per key.
    pub fn acquire(&mut self, key: K) -> LedgerHandle {
        self.sweep_closed();
        let slot = match self.slots.iter().position(|(k, _)| *k == key) {
            Some(index) => {
                // Move to the front
                let entry = self.slots.remove(index);
                match entry {
                    Some(entry) => {
                        let slot = Arc::clone(&entry.1);
                        self.slots.push_front(entry);
                        slot
                    }
                    None => self.insert(key.clone()),
                }
            }
            None => self.insert(key.clone()),
        };

        let _ = slot.refs.fetch_add(1, Ordering::AcqRel);
        if slot.closed.swap(false, Ordering::AcqRel) {
            debug!(key = ?key, "Reopened deletion ledger that was still referenced");
        }
        self.evict_over_capacity();
        LedgerHandle { slot }
    }

    fn insert(&mut self, key: K) -> Arc<LedgerSlot> {
        let store_file = (self.resolver)(&key);
        if store_file.is_none() {
            debug!(key = ?key, "No backing directory, using an in-memory deletion ledger");
        }
        let slot = Arc::new(LedgerSlot::load(store_file, Arc::clone(&self.counters)));
        self.slots.push_front((key, Arc::clone(&slot)));
        slot
    }

    /// Drop removed ledgers whose last handle is gone. The release already
    /// flushed them.
    fn sweep_closed(&mut self) {
        self.slots.retain(|(key, slot)| {
            let _ledger = slot.ledger.lock();
            let keep = !slot.is_closed() || slot.is_referenced();
            if !keep {
                debug!(key = ?key, "Dropped removed deletion ledger");
            }
            keep
        });
    }

    fn evict_over_capacity(&mut self) {
        while self.slots.len() > self.capacity {
            let Some(index) = self.slots.iter().rposition(|(_, slot)| !slot.is_referenced()) else {
                debug!(cached = self.slots.len(), capacity = self.capacity, "All ledgers referenced, eviction deferred");
                return;
            };
            if let Some((key, slot)) = self.slots.remove(index) {
                slot.flush_if_dirty(&mut slot.ledger.lock());
                let _ = self.counters.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(key = ?key, "Evicted deletion ledger");
            }
        }
    }

    /// Drop a ledger from the cache, flushing it if dirty
    ///
    /// A ledger with live handles stays cached, marked closed, until its last
    /// release flushes it. Acquiring it again before that reuses it.
    pub fn remove(&mut self, key: &K) -> bool {
        let Some(index) = self.slots.iter().position(|(k, _)| k == key) else {
            return false;
        };
        let referenced = match self.slots.get(index) {
            Some((_, slot)) => {
                let mut ledger = slot.ledger.lock();
                if slot.is_referenced() {
                    slot.closed.store(true, Ordering::Release);
                    true
                } else {
                    slot.flush_if_dirty(&mut ledger);
                    false
                }
            }
            None => return false,
        };
        if referenced {
            debug!(key = ?key, "Deletion ledger still referenced, closing on last release");
        } else {
            let _ = self.slots.remove(index);
        }
        true
    }

    /// Drop every ledger, flushing the dirty ones. Referenced ledgers are
    /// closed the same way [`remove`](Self::remove) closes them.
    pub fn clear(&mut self) {
        self.slots.retain(|(_, slot)| {
            let mut ledger = slot.ledger.lock();
            if slot.is_referenced() {
                slot.closed.store(true, Ordering::Release);
                true
            } else {
                slot.flush_if_dirty(&mut ledger);
                false
            }
        });
    }

    /// True if a ledger for `key` is cached and not removed
    pub fn contains(&self, key: &K) -> bool {
        self.slots.iter().any(|(k, slot)| k == key && !slot.is_closed())
    }

    /// Number of cached ledgers, counting removed ones that are still referenced
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True if nothing is cached
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Configured capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Snapshot of the activity counters
    pub fn stats(&self) -> LedgerStats {
        LedgerStats {
            loads: self.counters.loads.load(Ordering::Relaxed),
            flushes: self.counters.flushes.load(Ordering::Relaxed),
            flush_failures: self.counters.flush_failures.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
        }
    }
}

impl<K: fmt::Debug> fmt::Debug for LedgerCache<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LedgerCache")
            .field("capacity", &self.capacity)
            .field("keys", &self.slots.iter().map(|(k, _)| k).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// One reference to a cached ledger
///
/// Dropping the handle releases the reference. The release that brings the
/// count to zero writes the ledger if it is dirty.
pub struct LedgerHandle {
    slot: Arc<LedgerSlot>,
}

impl LedgerHandle {
    /// Schedule `output_path` for deletion; `None` unschedules it
    pub fn put(&self, output_path: &str, entry: Option<DeletionEntry>) -> Option<DeletionEntry> {
        self.slot.ledger.lock().put(output_path, entry)
    }

    /// Unschedule `output_path`
    pub fn remove(&self, output_path: &str) -> Option<DeletionEntry> {
        self.slot.ledger.lock().remove(output_path)
    }

    /// Look up the entry for `output_path`
    pub fn get(&self, output_path: &str) -> Option<DeletionEntry> {
        self.slot.ledger.lock().get(output_path).cloned()
    }

    /// Snapshot of all entries, ordered by output path
    pub fn entries(&self) -> Vec<(String, DeletionEntry)> {
        self.slot
            .ledger
            .lock()
            .entries()
            .iter()
            .map(|(path, entry)| (path.clone(), entry.clone()))
            .collect()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.slot.ledger.lock().len()
    }

    /// True if there are no entries
    pub fn is_empty(&self) -> bool {
        self.slot.ledger.lock().is_empty()
    }

    /// True if the ledger has unflushed changes
    pub fn is_dirty(&self) -> bool {
        self.slot.ledger.lock().is_dirty()
    }

    /// Backing file, if the ledger is persisted
    pub fn store_file(&self) -> Option<&Path> {
        self.slot.store_file.as_deref()
    }

    /// Release the reference explicitly
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for LedgerHandle {
    fn drop(&mut self) {
        let mut ledger = self.slot.ledger.lock();
        if self.slot.refs.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.slot.flush_if_dirty(&mut ledger);
        }
    }
}

impl fmt::Debug for LedgerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LedgerHandle")
            .field("store_file", &self.slot.store_file)
            .field("refs", &self.slot.refs.load(Ordering::Relaxed))
            .finish()
    }
}
