//! Deletion ledgers for incremental builds
//!
//! A deletion ledger records, per workspace, which previously produced build
//! outputs are candidates for deletion together with the source that produced
//! them. Ledgers are persisted to one binary file per workspace and kept in a
//! small bounded cache.
//!
//! # Features
//!
//! - Length-prefixed binary ledger files, rewritten atomically
//! - Reference-counted handles that flush on the last release
//! - Dirty tracking so clean ledgers are never rewritten
//! - Damaged files keep the complete records before the damage
//! - Least-recently-used eviction that never drops a ledger still in use
//!
//! # Example
//!
//! ```no_run
//! use convenient_ledger::{DeletionEntry, LedgerCache};
//! use std::path::PathBuf;
//!
//! let mut cache: LedgerCache<u32> =
//!     LedgerCache::new(3, |id: &u32| Some(PathBuf::from(format!("/tmp/ledger-{id}.dat"))));
//!
//! let handle = cache.acquire(7);
//! handle.put("out/Foo.class", Some(DeletionEntry::new("file:///src/Foo.java", Some("Foo"))));
//! drop(handle); // last release flushes the dirty ledger
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(unused_results)]

pub mod cache;
pub mod codec;
pub mod ledger;

pub use cache::{LedgerCache, LedgerHandle, LedgerStats, StoreResolver};
pub use ledger::{DeletionEntry, Ledger};

use std::io;
use std::path::PathBuf;

/// Default number of ledgers held in a [`LedgerCache`]
pub const DEFAULT_CAPACITY: usize = 3;

/// Error types for ledger persistence
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Reading or writing the backing file failed
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Backing file involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Backing file content could not be decoded
    #[error("Corrupt ledger data: {0}")]
    Corrupt(String),
}

impl LedgerError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;
