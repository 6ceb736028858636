//! `buildwacht.yml`: the project model plus compile settings

use crate::error::{BuildError, BuildResult};
use convenient_monitor::ProjectModelConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// File name looked up in the workspace root
pub const CONFIG_FILE_NAME: &str = "buildwacht.yml";

/// How sources map to outputs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileSettings {
    /// Extension of compilable sources, without the dot
    pub source_extension: String,
    /// Extension given to outputs, without the dot
    pub output_extension: String,
}

impl Default for CompileSettings {
    fn default() -> Self {
        Self {
            source_extension: "txt".to_string(),
            output_extension: "out".to_string(),
        }
    }
}

/// Parsed `buildwacht.yml`
///
/// ```yaml
/// modules:
///   - name: app
///     source_roots: [src]
///     output_root: out
/// compile:
///   source_extension: txt
///   output_extension: out
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Modules, exclusions and ignored names
    #[serde(flatten)]
    pub model: ProjectModelConfig,
    /// Compile settings
    #[serde(default)]
    pub compile: CompileSettings,
}

impl BuildConfig {
    /// Location of the configuration for `workspace`
    pub fn path_in(workspace: &Path) -> PathBuf {
        workspace.join(CONFIG_FILE_NAME)
    }

    /// Load the configuration of `workspace`
    pub fn load(workspace: &Path) -> BuildResult<Self> {
        let path = Self::path_in(workspace);
        let content = fs::read_to_string(&path).map_err(|e| BuildError::io(&path, e))?;
        Self::from_yaml_str(&content).map_err(|message| BuildError::Config { path, message })
    }

    /// Parse YAML text
    pub fn from_yaml_str(content: &str) -> Result<Self, String> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(|e| e.to_string())
    }
}
