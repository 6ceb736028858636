//! In-memory file system

use super::{FileNode, FileSystem};
use crate::types::FileId;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI32, Ordering};

#[derive(Debug, Clone)]
struct Entry {
    id: FileId,
    is_dir: bool,
    timestamp: i64,
}

/// A deterministic file tree held in memory
///
/// Parent directories are created implicitly. Ids are handed out
/// sequentially unless given explicitly.
#[derive(Debug)]
pub struct MemoryFileSystem {
    entries: RwLock<BTreeMap<PathBuf, Entry>>,
    next_id: AtomicI32,
}

impl Default for MemoryFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFileSystem {
    /// Empty file system
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            next_id: AtomicI32::new(1),
        }
    }

    fn allocate_id(&self) -> FileId {
        FileId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn ensure_parents(&self, entries: &mut BTreeMap<PathBuf, Entry>, path: &Path) {
        for ancestor in path.ancestors().skip(1) {
            if ancestor.as_os_str().is_empty() || entries.contains_key(ancestor) {
                continue;
            }
            let _ = entries.insert(
                ancestor.to_path_buf(),
                Entry {
                    id: self.allocate_id(),
                    is_dir: true,
                    timestamp: 0,
                },
            );
        }
    }

    /// Create a directory (and its parents)
    pub fn add_dir(&self, path: impl AsRef<Path>) -> FileNode {
        let path = path.as_ref();
        let mut entries = self.entries.write();
        self.ensure_parents(&mut entries, path);
        let entry = entries.entry(path.to_path_buf()).or_insert_with(|| Entry {
            id: self.allocate_id(),
            is_dir: true,
            timestamp: 0,
        });
        FileNode::new(entry.id, path, true)
    }

    /// Create or overwrite a file with the given modification time
    pub fn add_file(&self, path: impl AsRef<Path>, timestamp: i64) -> FileNode {
        let id = self.find_by_path(path.as_ref()).map_or_else(|| self.allocate_id(), |node| node.id);
        self.add_file_with_id(path, id, timestamp)
    }

    /// Create or overwrite a file with an explicit id
    pub fn add_file_with_id(&self, path: impl AsRef<Path>, id: FileId, timestamp: i64) -> FileNode {
        let path = path.as_ref();
        let mut entries = self.entries.write();
        self.ensure_parents(&mut entries, path);
        let _ = entries.insert(
            path.to_path_buf(),
            Entry {
                id,
                is_dir: false,
                timestamp,
            },
        );
        FileNode::new(id, path, false)
    }

    /// Change a file's modification time; returns false if it does not exist
    pub fn touch(&self, path: impl AsRef<Path>, timestamp: i64) -> bool {
        match self.entries.write().get_mut(path.as_ref()) {
            Some(entry) => {
                entry.timestamp = timestamp;
                true
            }
            None => false,
        }
    }

    /// Remove a file or a whole directory subtree
    pub fn remove(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        self.entries.write().retain(|p, _| !p.starts_with(path));
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// True if the tree is empty
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl FileSystem for MemoryFileSystem {
    fn find_by_path(&self, path: &Path) -> Option<FileNode> {
        self.entries
            .read()
            .get(path)
            .map(|entry| FileNode::new(entry.id, path, entry.is_dir))
    }

    fn children(&self, dir: &FileNode) -> Vec<FileNode> {
        self.entries
            .read()
            .iter()
            .filter(|(path, _)| path.parent() == Some(dir.path.as_path()))
            .map(|(path, entry)| FileNode::new(entry.id, path.clone(), entry.is_dir))
            .collect()
    }

    fn timestamp(&self, file: &FileNode) -> Option<i64> {
        self.entries.read().get(&file.path).map(|entry| entry.timestamp)
    }
}
