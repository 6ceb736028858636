//! Error types for the build-state tracker

use crate::types::{FileId, WorkspaceId};
use convenient_ledger::LedgerError;
use std::io;
use std::path::PathBuf;

/// Errors surfaced to build drivers
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// Filesystem operation failed
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Path involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Writing a metadata blob to the attribute store failed
    #[error("Failed to store attributes of file {file}: {source}")]
    AttributeStore {
        /// File whose attributes were written
        file: FileId,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Workspace id is not registered
    #[error("Unknown workspace: {0}")]
    UnknownWorkspace(WorkspaceId),

    /// Workspace was closed while an operation was running
    #[error("Workspace closed: {0}")]
    WorkspaceClosed(WorkspaceId),

    /// Workspace root directory does not exist
    #[error("Workspace root not found: {0}")]
    RootNotFound(PathBuf),

    /// Configuration file could not be parsed
    #[error("Invalid configuration in {path}: {message}")]
    Config {
        /// Configuration file
        path: PathBuf,
        /// Parser message
        message: String,
    },

    /// Persisted metadata could not be decoded
    #[error("Corrupt metadata: {0}")]
    Metadata(String),

    /// Deletion ledger error
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl MonitorError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for tracker operations
pub type MonitorResult<T> = Result<T, MonitorError>;

/// Why a scan stopped early
///
/// This is control flow, not a failure: scan entry points turn it into a
/// [`ScanOutcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Interrupted {
    /// The workspace was closed mid-scan
    #[error("workspace closed")]
    WorkspaceClosed,
    /// The cancellation token fired
    #[error("scan cancelled")]
    Cancelled,
}

/// How a scan, or a wait for scans, ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Ran to completion
    Completed,
    /// Stopped by cancellation
    Cancelled,
    /// Stopped because the workspace closed
    WorkspaceClosed,
}

impl From<Result<(), Interrupted>> for ScanOutcome {
    fn from(result: Result<(), Interrupted>) -> Self {
        match result {
            Ok(()) => Self::Completed,
            Err(Interrupted::Cancelled) => Self::Cancelled,
            Err(Interrupted::WorkspaceClosed) => Self::WorkspaceClosed,
        }
    }
}
