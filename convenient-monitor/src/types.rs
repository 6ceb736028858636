//! Identity types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a file, stable for the lifetime of the file system that issued it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileId(pub i32);

impl FileId {
    /// Key used in recompilation sets: the id without its sign.
    ///
    /// An id and its negation therefore collide. `i32::MIN` maps to itself.
    pub fn normalized(self) -> Self {
        Self(self.0.wrapping_abs())
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a workspace: the file id of its root directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkspaceId(pub i32);

impl From<FileId> for WorkspaceId {
    fn from(root: FileId) -> Self {
        Self(root.0)
    }
}

impl fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
