//! Errors of the build driver

use convenient_monitor::MonitorError;
use std::io;
use std::path::PathBuf;

/// Everything that can stop a `buildwacht` command
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// Build-state tracker failed
    #[error(transparent)]
    Monitor(#[from] MonitorError),

    /// File operation failed
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Path involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// `buildwacht.yml` is missing or malformed
    #[error("Invalid configuration in {path}: {message}")]
    Config {
        /// Configuration file
        path: PathBuf,
        /// Parser message
        message: String,
    },

    /// A background task died
    #[error("Background task failed: {0}")]
    Task(String),
}

impl BuildError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for driver commands
pub type BuildResult<T> = Result<T, BuildError>;
