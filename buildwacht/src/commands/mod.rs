//! Buildwacht command-line interface
//!
//! - `make`: incremental build of the workspace
//! - `status`: what the next build would compile and delete
//! - `suspend`: drop tracked state and request a full rebuild

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod make;
pub mod status;
pub mod suspend;

/// Buildwacht - incremental build driver
#[derive(Parser)]
#[command(name = "buildwacht")]
#[command(about = "Incremental build driver that tracks stale sources and outputs")]
#[command(version)]
pub struct Cli {
    /// Workspace root containing buildwacht.yml
    #[arg(short, long, global = true, default_value = ".")]
    pub workspace: PathBuf,

    /// Build-state directory (default: <workspace>/.buildwacht)
    #[arg(long, global = true)]
    pub system_dir: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Build what changed since the last build
    Make {
        /// Compile every source
        #[arg(long)]
        rebuild: bool,

        /// Consider every candidate, not only pending sources
        #[arg(long)]
        force: bool,
    },

    /// Show pending sources and scheduled deletions
    Status,

    /// Stop tracking until the next full rebuild
    Suspend,
}
