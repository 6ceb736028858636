//! Virtual file system abstraction
//!
//! The tracker never touches `std::fs` for source trees directly; it asks a
//! [`FileSystem`] for nodes, children and timestamps. [`LocalFileSystem`]
//! reads the real disk, [`MemoryFileSystem`] is a deterministic in-memory
//! tree for drivers and tests.

pub mod local;
pub mod memory;
pub mod walk;

pub use local::LocalFileSystem;
pub use memory::MemoryFileSystem;
pub use walk::DepthFirst;

use crate::types::FileId;
use std::path::{Path, PathBuf};
use url::Url;

/// A file or directory as seen by a [`FileSystem`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileNode {
    /// Stable file identity
    pub id: FileId,
    /// Absolute path
    pub path: PathBuf,
    /// True for directories
    pub is_dir: bool,
}

impl FileNode {
    /// Create a node
    pub fn new(id: FileId, path: impl Into<PathBuf>, is_dir: bool) -> Self {
        Self {
            id,
            path: path.into(),
            is_dir,
        }
    }

    /// `file://` URL of this node
    pub fn url(&self) -> String {
        path_to_url(&self.path)
    }

    /// Last path component
    pub fn name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }

    /// True if this node is `other` or lies below it
    pub fn is_under(&self, other: &Path) -> bool {
        self.path.starts_with(other)
    }
}

/// Convert an absolute path to a `file://` URL
pub fn path_to_url(path: &Path) -> String {
    Url::from_file_path(path).map_or_else(|()| format!("file://{}", path.display()), String::from)
}

/// Convert a `file://` URL back to a path
pub fn url_to_path(url: &str) -> Option<PathBuf> {
    Url::parse(url).ok()?.to_file_path().ok()
}

/// Read access to a tree of files
pub trait FileSystem: Send + Sync {
    /// Resolve a path, `None` if nothing exists there
    fn find_by_path(&self, path: &Path) -> Option<FileNode>;

    /// Resolve a `file://` URL
    fn find_by_url(&self, url: &str) -> Option<FileNode> {
        self.find_by_path(&url_to_path(url)?)
    }

    /// Children of a directory, ordered by name
    fn children(&self, dir: &FileNode) -> Vec<FileNode>;

    /// Modification time in milliseconds, `None` if the file is gone
    fn timestamp(&self, file: &FileNode) -> Option<i64>;

    /// True if the node still exists with the same identity
    fn is_valid(&self, file: &FileNode) -> bool {
        self.find_by_path(&file.path).is_some_and(|current| current.id == file.id)
    }
}
