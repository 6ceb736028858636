//! Tracker configuration

use crate::error::{MonitorError, MonitorResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Settings for a [`BuildStateMonitor`](crate::BuildStateMonitor)
///
/// Every field has a default, so an empty YAML document is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Parent of the per-workspace cache directories
    pub system_dir: PathBuf,
    /// Number of deletion ledgers kept in memory
    pub ledger_capacity: usize,
    /// Quiet period before a root-change rescan runs
    pub rescan_debounce_ms: u64,
    /// File name of the deletion ledger inside a cache directory
    pub ledger_file_name: String,
    /// File name of the full-rebuild marker inside a cache directory
    pub rebuild_marker_name: String,
    /// File name of the persisted output-roots layout inside a cache directory
    pub layout_file_name: String,
    /// Directory name for generated data inside a cache directory
    pub generated_dir_name: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            system_dir: PathBuf::from(".buildwacht"),
            ledger_capacity: convenient_ledger::DEFAULT_CAPACITY,
            rescan_debounce_ms: 500,
            ledger_file_name: "paths_to_delete.dat".to_string(),
            rebuild_marker_name: "rebuild_required".to_string(),
            layout_file_name: "output_roots.json".to_string(),
            generated_dir_name: "generated".to_string(),
        }
    }
}

impl MonitorConfig {
    /// Defaults with a different system directory
    pub fn with_system_dir(system_dir: impl Into<PathBuf>) -> Self {
        Self {
            system_dir: system_dir.into(),
            ..Self::default()
        }
    }

    /// Load from a YAML file
    pub fn load(path: &Path) -> MonitorResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| MonitorError::io(path, e))?;
        Self::from_yaml_str(&content).map_err(|message| MonitorError::Config {
            path: path.to_path_buf(),
            message,
        })
    }

    /// Parse from YAML text
    pub fn from_yaml_str(content: &str) -> Result<Self, String> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(|e| e.to_string())
    }

    /// Debounce window for root-change rescans
    pub fn rescan_debounce(&self) -> Duration {
        Duration::from_millis(self.rescan_debounce_ms)
    }
}
