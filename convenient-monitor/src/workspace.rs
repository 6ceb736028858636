//! Workspaces, their module model and the registry of open workspaces

use crate::config::MonitorConfig;
use crate::error::{Interrupted, MonitorError, MonitorResult};
use crate::types::WorkspaceId;
use crate::vfs::FileNode;
use convenient_ledger::codec::atomic_write;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Roots of one module
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleRoots {
    /// Module name, unique within a workspace
    pub name: String,
    /// Source roots
    #[serde(default)]
    pub source_roots: Vec<PathBuf>,
    /// Production output root
    #[serde(default)]
    pub output_root: Option<PathBuf>,
    /// Test output root
    #[serde(default)]
    pub test_output_root: Option<PathBuf>,
    /// Roots holding generated sources
    #[serde(default)]
    pub generated_roots: Vec<PathBuf>,
}

impl ModuleRoots {
    fn resolve_against(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        self.source_roots.iter_mut().for_each(resolve);
        self.generated_roots.iter_mut().for_each(resolve);
        self.output_root.iter_mut().for_each(resolve);
        self.test_output_root.iter_mut().for_each(resolve);
    }
}

/// What the tracker needs to know about a workspace's structure
pub trait ProjectModel: Send + Sync {
    /// Current modules
    fn modules(&self) -> Vec<ModuleRoots>;

    /// Files the user excluded from compilation
    fn is_excluded_from_compilation(&self, file: &FileNode) -> bool;

    /// Files and directories never looked at (VCS metadata and the like)
    fn is_ignored(&self, file: &FileNode) -> bool;

    /// Source roots of every module
    fn source_roots(&self) -> Vec<PathBuf> {
        self.modules().into_iter().flat_map(|m| m.source_roots).collect()
    }
}

/// Production and test output roots of one module
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRoots {
    /// Production output root
    pub production: Option<PathBuf>,
    /// Test output root
    pub test: Option<PathBuf>,
}

/// Output roots of every module, keyed by module name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRootsLayout {
    /// Roots per module
    pub modules: BTreeMap<String, OutputRoots>,
}

impl OutputRootsLayout {
    /// Layout of the given modules
    pub fn from_modules(modules: &[ModuleRoots]) -> Self {
        let modules = modules
            .iter()
            .map(|m| {
                (
                    m.name.clone(),
                    OutputRoots {
                        production: m.output_root.clone(),
                        test: m.test_output_root.clone(),
                    },
                )
            })
            .collect();
        Self { modules }
    }

    /// Load a persisted layout; `None` if the file does not exist
    pub fn load(path: &Path) -> MonitorResult<Option<Self>> {
        match fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content)
                .map(Some)
                .map_err(|e| MonitorError::Config {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(MonitorError::io(path, e)),
        }
    }

    /// Persist the layout, creating the parent directory
    pub fn save(&self, path: &Path) -> MonitorResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| MonitorError::io(parent, e))?;
        }
        let json = serde_json::to_vec_pretty(self).map_err(|e| MonitorError::Metadata(e.to_string()))?;
        atomic_write(path, &json).map_err(|e| MonitorError::io(path, e))
    }
}

/// Project model document as written in YAML
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectModelConfig {
    /// Modules of the workspace
    pub modules: Vec<ModuleRoots>,
    /// Files or directories excluded from compilation
    pub excluded: Vec<PathBuf>,
    /// File names that are never scanned
    pub ignored_names: Vec<String>,
}

impl Default for ProjectModelConfig {
    fn default() -> Self {
        Self {
            modules: Vec::new(),
            excluded: Vec::new(),
            ignored_names: [".git", ".hg", ".svn", ".DS_Store"].map(String::from).to_vec(),
        }
    }
}

/// A project model read from configuration
///
/// Relative paths are resolved against the workspace root. Modules can be
/// replaced at runtime to reconfigure roots.
#[derive(Debug)]
pub struct StaticProjectModel {
    root: PathBuf,
    config: RwLock<ProjectModelConfig>,
}

impl StaticProjectModel {
    /// Build from a parsed document
    pub fn new(root: impl Into<PathBuf>, mut config: ProjectModelConfig) -> Self {
        let root = root.into();
        for module in &mut config.modules {
            module.resolve_against(&root);
        }
        for path in &mut config.excluded {
            if path.is_relative() {
                *path = root.join(&*path);
            }
        }
        Self {
            root,
            config: RwLock::new(config),
        }
    }

    /// Parse a YAML document
    pub fn from_yaml_str(root: impl Into<PathBuf>, content: &str) -> Result<Self, String> {
        let config: ProjectModelConfig = if content.trim().is_empty() {
            ProjectModelConfig::default()
        } else {
            serde_yaml::from_str(content).map_err(|e| e.to_string())?
        };
        Ok(Self::new(root, config))
    }

    /// Load a YAML file
    pub fn load(root: impl Into<PathBuf>, path: &Path) -> MonitorResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| MonitorError::io(path, e))?;
        Self::from_yaml_str(root, &content).map_err(|message| MonitorError::Config {
            path: path.to_path_buf(),
            message,
        })
    }

    /// Replace the module list
    pub fn set_modules(&self, mut modules: Vec<ModuleRoots>) {
        for module in &mut modules {
            module.resolve_against(&self.root);
        }
        self.config.write().modules = modules;
    }
}

impl ProjectModel for StaticProjectModel {
    fn modules(&self) -> Vec<ModuleRoots> {
        self.config.read().modules.clone()
    }

    fn is_excluded_from_compilation(&self, file: &FileNode) -> bool {
        self.config.read().excluded.iter().any(|p| file.is_under(p))
    }

    fn is_ignored(&self, file: &FileNode) -> bool {
        let config = self.config.read();
        file.name().is_some_and(|name| config.ignored_names.iter().any(|n| n == name))
    }
}

/// One open workspace
pub struct Workspace {
    id: WorkspaceId,
    name: String,
    root: PathBuf,
    cache_dir: PathBuf,
    model: Arc<dyn ProjectModel>,
    open: AtomicBool,
}

impl Workspace {
    /// Create an open workspace whose cache directory lives under `config.system_dir`
    pub fn new(id: WorkspaceId, root: impl Into<PathBuf>, model: Arc<dyn ProjectModel>, config: &MonitorConfig) -> Self {
        let root = root.into();
        let name = root
            .file_name()
            .map_or_else(|| "workspace".to_string(), |n| n.to_string_lossy().into_owned());
        let cache_dir = config.system_dir.join(format!("{name}.{:08x}", id.0));
        Self {
            id,
            name,
            root,
            cache_dir,
            model,
            open: AtomicBool::new(true),
        }
    }

    /// Workspace id
    pub fn id(&self) -> WorkspaceId {
        self.id
    }

    /// Name of the root directory
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding this workspace's build-state files
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Create the cache directory if needed
    pub fn ensure_cache_dir(&self) -> MonitorResult<&Path> {
        fs::create_dir_all(&self.cache_dir).map_err(|e| MonitorError::io(&self.cache_dir, e))?;
        Ok(&self.cache_dir)
    }

    /// Project model
    pub fn model(&self) -> &dyn ProjectModel {
        self.model.as_ref()
    }

    /// False once the workspace has been closed
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Fail with [`Interrupted::WorkspaceClosed`] once closed
    pub fn check_open(&self) -> Result<(), Interrupted> {
        if self.is_open() {
            Ok(())
        } else {
            Err(Interrupted::WorkspaceClosed)
        }
    }

    pub(crate) fn close(&self) {
        self.open.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("id", &self.id)
            .field("root", &self.root)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

/// Open workspaces by id
#[derive(Debug, Default)]
pub struct WorkspaceRegistry {
    workspaces: RwLock<HashMap<WorkspaceId, Arc<Workspace>>>,
}

impl WorkspaceRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a workspace
    pub fn register(&self, workspace: Arc<Workspace>) {
        let _ = self.workspaces.write().insert(workspace.id(), workspace);
    }

    /// Remove a workspace
    pub fn unregister(&self, id: WorkspaceId) -> Option<Arc<Workspace>> {
        self.workspaces.write().remove(&id)
    }

    /// Look up a workspace
    pub fn get(&self, id: WorkspaceId) -> Option<Arc<Workspace>> {
        self.workspaces.read().get(&id).cloned()
    }

    /// All open workspaces
    pub fn open_workspaces(&self) -> Vec<Arc<Workspace>> {
        self.workspaces.read().values().filter(|w| w.is_open()).cloned().collect()
    }
}
