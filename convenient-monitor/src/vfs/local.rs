//! File system backed by the local disk

use super::{FileNode, FileSystem};
use crate::error::{MonitorError, MonitorResult};
use crate::types::FileId;
use convenient_ledger::codec::atomic_write;
use filetime::FileTime;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, trace, warn};

/// Ids handed out so far, by normalized path
#[derive(Debug, Serialize, Deserialize)]
struct IdTable {
    next: i32,
    ids: BTreeMap<PathBuf, FileId>,
}

impl Default for IdTable {
    fn default() -> Self {
        Self {
            next: 1,
            ids: BTreeMap::new(),
        }
    }
}

/// Reads files from disk
///
/// Every path seen gets the next free positive id, so two paths never share
/// one. A file deleted and recreated at the same location keeps its id. When
/// opened with a table file, the assignment survives restarts once
/// [`flush`](Self::flush) has written it.
#[derive(Debug, Default)]
pub struct LocalFileSystem {
    table_file: Option<PathBuf>,
    table: RwLock<IdTable>,
    dirty: AtomicBool,
}

impl LocalFileSystem {
    /// Local file system whose ids live only as long as the process
    pub fn new() -> Self {
        Self::default()
    }

    /// Local file system whose ids are loaded from and flushed to `table_file`
    pub fn open(table_file: impl Into<PathBuf>) -> MonitorResult<Self> {
        let table_file = table_file.into();
        let table: IdTable = match fs::read_to_string(&table_file) {
            Ok(content) => serde_json::from_str(&content).map_err(|e| MonitorError::Config {
                path: table_file.clone(),
                message: e.to_string(),
            })?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => IdTable::default(),
            Err(e) => return Err(MonitorError::io(&table_file, e)),
        };
        debug!(path = %table_file.display(), files = table.ids.len(), "Loaded file id table");

        Ok(Self {
            table_file: Some(table_file),
            table: RwLock::new(table),
            dirty: AtomicBool::new(false),
        })
    }

    /// Id for a path, assigning the next free one on first sight. `None` once
    /// every positive id is taken.
    pub fn id_for(&self, path: &Path) -> Option<FileId> {
        let path = normalize(path);
        if let Some(id) = self.table.read().ids.get(&path) {
            return Some(*id);
        }

        let mut table = self.table.write();
        if let Some(id) = table.ids.get(&path) {
            return Some(*id);
        }
        let id = FileId(table.next);
        let Some(next) = table.next.checked_add(1) else {
            warn!(path = %path.display(), "File ids exhausted");
            return None;
        };
        table.next = next;
        let _ = table.ids.insert(path, id);
        self.dirty.store(true, Ordering::Release);
        Some(id)
    }

    /// Number of paths with an assigned id
    pub fn known_files(&self) -> usize {
        self.table.read().ids.len()
    }

    /// Write the id table if new ids were handed out. A no-op without a
    /// table file.
    pub fn flush(&self) -> MonitorResult<()> {
        let Some(path) = &self.table_file else {
            return Ok(());
        };
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        let result = self.write_table(path);
        if result.is_err() {
            self.dirty.store(true, Ordering::Release);
        }
        result
    }

    fn write_table(&self, path: &Path) -> MonitorResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| MonitorError::io(parent, e))?;
        }
        let table = self.table.read();
        let json = serde_json::to_vec(&*table).map_err(|e| MonitorError::Metadata(e.to_string()))?;
        atomic_write(path, &json).map_err(|e| MonitorError::io(path, e))?;
        debug!(path = %path.display(), files = table.ids.len(), "Flushed file id table");
        Ok(())
    }
}

/// Lexically drop `.` components and resolve `..` where possible
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

impl FileSystem for LocalFileSystem {
    fn find_by_path(&self, path: &Path) -> Option<FileNode> {
        let path = normalize(path);
        let metadata = fs::metadata(&path).ok()?;
        let id = self.id_for(&path)?;
        Some(FileNode::new(id, path, metadata.is_dir()))
    }

    fn children(&self, dir: &FileNode) -> Vec<FileNode> {
        let entries = match fs::read_dir(&dir.path) {
            Ok(entries) => entries,
            Err(e) => {
                trace!(path = %dir.path.display(), error = %e, "Cannot list directory");
                return Vec::new();
            }
        };

        let mut children: Vec<FileNode> = entries
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let path = entry.path();
                let is_dir = entry.file_type().ok()?.is_dir();
                let id = self.id_for(&path)?;
                Some(FileNode::new(id, path, is_dir))
            })
            .collect();
        children.sort_by(|a, b| a.path.cmp(&b.path));
        children
    }

    fn timestamp(&self, file: &FileNode) -> Option<i64> {
        let metadata = fs::metadata(&file.path).ok()?;
        let mtime = FileTime::from_last_modification_time(&metadata);
        Some(mtime.unix_seconds() * 1000 + i64::from(mtime.nanoseconds() / 1_000_000))
    }
}
