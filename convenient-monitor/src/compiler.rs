//! Types exchanged with the build driver and its compilers

use crate::vfs::{FileNode, FileSystem};
use crate::workspace::Workspace;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// A translating compiler as seen by the tracker
pub trait Compiler: Send + Sync {
    /// Human-readable name for logs
    fn description(&self) -> &str;

    /// True if this compiler handles `file`
    fn is_compilable_file(&self, file: &FileNode, ctx: &CompileContext) -> bool;

    /// Artifact name for an output, given its path relative to the output root
    /// with forward slashes. Defaults to the path without extension, with
    /// slashes turned into dots.
    fn artifact_name(&self, relative_output_path: &str) -> Option<String> {
        let trimmed = relative_output_path.trim_start_matches('/');
        let stem = trimmed.rsplit_once('.').map_or(trimmed, |(stem, _)| stem);
        if stem.is_empty() {
            None
        } else {
            Some(stem.replace('/', "."))
        }
    }
}

type GeneratedPredicate = Box<dyn Fn(&FileNode) -> bool + Send + Sync>;

/// State of one build
pub struct CompileContext {
    workspace: Arc<Workspace>,
    start_stamp: i64,
    generated: GeneratedPredicate,
    source_cache: Mutex<HashMap<String, Option<FileNode>>>,
}

impl CompileContext {
    /// Context for a build of `workspace` that started at `start_stamp`
    /// (milliseconds, same clock as file timestamps)
    pub fn new(workspace: Arc<Workspace>, start_stamp: i64) -> Self {
        Self {
            workspace,
            start_stamp,
            generated: Box::new(|_| false),
            source_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Classify files produced by the build itself as generated
    #[must_use]
    pub fn with_generated(mut self, generated: impl Fn(&FileNode) -> bool + Send + Sync + 'static) -> Self {
        self.generated = Box::new(generated);
        self
    }

    /// Workspace being built
    pub fn workspace(&self) -> &Arc<Workspace> {
        &self.workspace
    }

    /// Build start time
    pub fn start_stamp(&self) -> i64 {
        self.start_stamp
    }

    /// True if `file` was generated during this build
    pub fn is_generated(&self, file: &FileNode) -> bool {
        (self.generated)(file)
    }

    /// Resolve a source URL, remembering the answer for the rest of the build
    pub fn resolve_source(&self, fs: &dyn FileSystem, url: &str) -> Option<FileNode> {
        if let Some(cached) = self.source_cache.lock().get(url) {
            return cached.clone();
        }
        let resolved = fs.find_by_url(url);
        let _ = self.source_cache.lock().insert(url.to_string(), resolved.clone());
        resolved
    }
}

impl std::fmt::Debug for CompileContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompileContext")
            .field("workspace", &self.workspace.id())
            .field("start_stamp", &self.start_stamp)
            .finish_non_exhaustive()
    }
}

/// One output reported by a successful compile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputItem {
    /// Compiled source
    pub source: FileNode,
    /// Produced file; `None` when the source produced nothing
    pub output_path: Option<PathBuf>,
}

impl OutputItem {
    /// Item for a source that produced `output_path`
    pub fn new(source: FileNode, output_path: impl Into<PathBuf>) -> Self {
        Self {
            source,
            output_path: Some(output_path.into()),
        }
    }
}

/// An existing output that must be deleted before compiling
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionCandidate {
    /// The output file
    pub output: FileNode,
    /// Artifact name recorded for it
    pub artifact_name: Option<String>,
    /// True if the producing source still exists
    pub source_present: bool,
}

/// Result of [`BuildStateMonitor::collect_files`](crate::BuildStateMonitor::collect_files)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectedFiles {
    /// Sources to compile
    pub to_compile: Vec<FileNode>,
    /// Outputs to delete
    pub to_delete: Vec<DeletionCandidate>,
}
