//! Keyed byte-blob stores for per-file metadata
//!
//! The tracker persists one opaque blob per file id and makes no assumption
//! about how a store achieves durability.

use crate::error::{MonitorError, MonitorResult};
use crate::types::FileId;
use convenient_ledger::codec::atomic_write;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Durable key-value store keyed by file identity
pub trait AttributeStore: Send + Sync {
    /// Blob stored for `file`, if any
    fn get(&self, file: FileId) -> Option<Vec<u8>>;

    /// Replace the blob stored for `file`
    fn set(&self, file: FileId, data: Vec<u8>) -> io::Result<()>;
}

/// Store that lives only as long as the process
#[derive(Debug, Default)]
pub struct MemoryAttributeStore {
    blobs: RwLock<HashMap<FileId, Vec<u8>>>,
}

impl MemoryAttributeStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs
    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    /// True if nothing is stored
    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }
}

impl AttributeStore for MemoryAttributeStore {
    fn get(&self, file: FileId) -> Option<Vec<u8>> {
        self.blobs.read().get(&file).cloned()
    }

    fn set(&self, file: FileId, data: Vec<u8>) -> io::Result<()> {
        let _ = self.blobs.write().insert(file, data);
        Ok(())
    }
}

/// Store kept in memory and written as one JSON document on [`flush`](Self::flush)
///
/// Blobs are hex encoded. Writes between flushes are lost on a crash, which
/// the tracker tolerates: it rescans and repairs on the next start.
#[derive(Debug)]
pub struct FileAttributeStore {
    path: PathBuf,
    blobs: RwLock<BTreeMap<i32, String>>,
    dirty: AtomicBool,
}

impl FileAttributeStore {
    /// Open a store, loading `path` if it exists
    pub fn open(path: impl Into<PathBuf>) -> MonitorResult<Self> {
        let path = path.into();
        let blobs = match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).map_err(|e| MonitorError::Config {
                path: path.clone(),
                message: e.to_string(),
            })?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(MonitorError::io(&path, e)),
        };
        debug!(path = %path.display(), "Opened attribute store");

        Ok(Self {
            path,
            blobs: RwLock::new(blobs),
            dirty: AtomicBool::new(false),
        })
    }

    /// Backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write all blobs if anything changed
    ///
    /// A failed write leaves the store dirty so the next flush retries.
    pub fn flush(&self) -> MonitorResult<()> {
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        let result = self.write_all();
        if result.is_err() {
            self.dirty.store(true, Ordering::Release);
        }
        result
    }

    /// True if blobs changed since the last successful flush
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    fn write_all(&self) -> MonitorResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| MonitorError::io(parent, e))?;
        }
        let json = serde_json::to_vec(&*self.blobs.read()).map_err(|e| MonitorError::Metadata(e.to_string()))?;
        atomic_write(&self.path, &json).map_err(|e| MonitorError::io(&self.path, e))?;
        debug!(path = %self.path.display(), "Flushed attribute store");
        Ok(())
    }
}

impl AttributeStore for FileAttributeStore {
    fn get(&self, file: FileId) -> Option<Vec<u8>> {
        let blobs = self.blobs.read();
        hex::decode(blobs.get(&file.0)?).ok()
    }

    fn set(&self, file: FileId, data: Vec<u8>) -> io::Result<()> {
        let _ = self.blobs.write().insert(file.0, hex::encode(data));
        self.dirty.store(true, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_store_persists_after_flush() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("attrs/sources.json");

        let store = FileAttributeStore::open(&path).unwrap();
        store.set(FileId(3), vec![1, 2, 255]).unwrap();
        store.flush().unwrap();

        let reopened = FileAttributeStore::open(&path).unwrap();
        assert_eq!(reopened.get(FileId(3)), Some(vec![1, 2, 255]));
        assert_eq!(reopened.get(FileId(4)), None);
    }

    #[test]
    fn test_unflushed_writes_are_not_persisted() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("outputs.json");

        let store = FileAttributeStore::open(&path).unwrap();
        store.set(FileId(1), vec![9]).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_failed_flush_stays_dirty() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("state");
        fs::write(&blocker, "not a directory").unwrap();
        let path = blocker.join("sources.json");

        let store = FileAttributeStore::open(&path).unwrap();
        assert!(!store.is_dirty());
        store.set(FileId(2), vec![4]).unwrap();
        assert!(store.flush().is_err());
        assert!(store.is_dirty());

        fs::remove_file(&blocker).unwrap();
        store.flush().unwrap();
        assert!(!store.is_dirty());
        assert_eq!(FileAttributeStore::open(&path).unwrap().get(FileId(2)), Some(vec![4]));
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryAttributeStore::new();
        store.set(FileId(1), vec![7]).unwrap();
        store.set(FileId(1), vec![8]).unwrap();
        assert_eq!(store.get(FileId(1)), Some(vec![8]));
        assert_eq!(store.len(), 1);
    }
}
