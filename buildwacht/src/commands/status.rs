//! Report what the next build would do

use crate::error::BuildResult;
use crate::project::{Project, ProjectOptions};
use convenient_ledger::DeletionEntry;
use convenient_monitor::{CompileContext, Compiler};
use std::path::PathBuf;
use walkdir::WalkDir;

/// Snapshot of the build state after a scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusReport {
    /// Compilable sources marked for compilation, sorted
    pub pending: Vec<PathBuf>,
    /// Outputs scheduled for deletion
    pub deletions: Vec<(String, DeletionEntry)>,
    /// Files currently under the output roots, sorted
    pub outputs: Vec<PathBuf>,
    /// True if the next build is a full rebuild
    pub rebuild_required: bool,
}

impl StatusReport {
    /// Print the report to stdout
    pub fn print(&self) {
        if self.rebuild_required {
            println!("Full rebuild required");
        }
        println!("Pending sources: {}", self.pending.len());
        for path in &self.pending {
            println!("  {}", path.display());
        }
        println!("Scheduled deletions: {}", self.deletions.len());
        for (path, entry) in &self.deletions {
            match &entry.artifact_name {
                Some(name) => println!("  {path} ({name})"),
                None => println!("  {path}"),
            }
        }
        println!("Outputs on disk: {}", self.outputs.len());
    }
}

/// Scan the workspace and report its state
pub async fn status(options: &ProjectOptions) -> BuildResult<StatusReport> {
    let project = Project::open(options, true)?;
    project.wait_for_scan().await?;

    let monitor = project.monitor();
    let workspace = project.workspace();
    let ws = workspace.id();

    let ctx = CompileContext::new(workspace.clone(), 0);
    let mut pending: Vec<PathBuf> = project
        .source_files()
        .into_iter()
        .filter(|file| monitor.is_pending(ws, file.id) && project.compiler().is_compilable_file(file, &ctx))
        .map(|file| file.path)
        .collect();
    pending.sort();

    let mut outputs: Vec<PathBuf> = project
        .output_roots()
        .iter()
        .flat_map(|root| WalkDir::new(root).into_iter().filter_map(Result::ok))
        .filter(|entry| entry.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .collect();
    outputs.sort();
    outputs.dedup();

    let report = StatusReport {
        pending,
        deletions: monitor.pending_deletions(ws),
        outputs,
        rebuild_required: monitor.rebuild_required(workspace),
    };
    project.close()?;
    Ok(report)
}
