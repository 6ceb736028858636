//! Incremental build-state tracking
//!
//! This crate keeps track, per open workspace, of which source files must be
//! recompiled and which previously produced outputs have gone stale. A build
//! driver asks it what to compile and delete before a build
//! ([`BuildStateMonitor::collect_files`]) and reports the results afterwards
//! ([`BuildStateMonitor::update`]). Between builds, scans and file events keep
//! the recompilation set current.
//!
//! # Features
//!
//! - Recompilation sets and deletion ledgers behind one service object
//! - Incremental and full scans over a pluggable [`FileSystem`]
//! - Source and output metadata kept in any [`AttributeStore`]
//! - Repair of the recompilation set when output roots move
//! - Async initialization waits and debounced root-change rescans
//!
//! # Example
//!
//! ```no_run
//! use convenient_monitor::{
//!     BuildStateMonitor, FileAttributeStore, LocalFileSystem, MonitorConfig, StaticProjectModel,
//! };
//! use std::path::Path;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = MonitorConfig::with_system_dir("/tmp/buildwacht");
//! let monitor = BuildStateMonitor::new(
//!     config,
//!     Arc::new(LocalFileSystem::open("/tmp/buildwacht/file_ids.json")?),
//!     Arc::new(FileAttributeStore::open("/tmp/buildwacht/sources.json")?),
//!     Arc::new(FileAttributeStore::open("/tmp/buildwacht/outputs.json")?),
//! );
//!
//! let model = Arc::new(StaticProjectModel::load("/work/app", Path::new("/work/app/buildwacht.yml"))?);
//! let workspace = monitor.register_workspace(Path::new("/work/app"), model)?;
//! let outcome = monitor.scan_sources_for_compilable_files(&workspace, &CancellationToken::new());
//! println!("{outcome:?}: {} pending", monitor.pending_files(workspace.id()).len());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(unused_results)]

pub mod attributes;
pub mod compiler;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod metadata;
pub mod monitor;
pub mod scan;
mod state;
pub mod types;
pub mod vfs;
pub mod workspace;

pub use attributes::{AttributeStore, FileAttributeStore, MemoryAttributeStore};
pub use compiler::{CollectedFiles, CompileContext, Compiler, DeletionCandidate, OutputItem};
pub use config::MonitorConfig;
pub use error::{Interrupted, MonitorError, MonitorResult, ScanOutcome};
pub use lifecycle::Lifecycle;
pub use metadata::{MetadataStore, OutputMetadata, PENDING_TIMESTAMP, SourceMetadata};
pub use monitor::BuildStateMonitor;
pub use scan::{ScanCoordinator, ScanGuard};
pub use types::{FileId, WorkspaceId};
pub use vfs::{DepthFirst, FileNode, FileSystem, LocalFileSystem, MemoryFileSystem};
pub use workspace::{
    ModuleRoots, OutputRoots, OutputRootsLayout, ProjectModel, ProjectModelConfig, StaticProjectModel, Workspace,
    WorkspaceRegistry,
};
