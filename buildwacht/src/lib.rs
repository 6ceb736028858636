//! Buildwacht: an incremental build driver on top of `convenient-monitor`
//!
//! The driver reads `buildwacht.yml` from the workspace root, keeps build
//! state under a system directory and "compiles" sources by copying them
//! into their module's output root.

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(unused_results)]

pub mod commands;
pub mod compiler;
pub mod config;
pub mod error;
pub mod project;

pub use compiler::{CopiedOutput, CopyCompiler};
pub use config::{BuildConfig, CompileSettings};
pub use error::{BuildError, BuildResult};
pub use project::{Project, ProjectOptions};
