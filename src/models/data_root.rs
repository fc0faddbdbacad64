use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One of the four top-level directories every data root contains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSubtree {
    Config,
    Files,
    Cache,
    Logs,
}

impl DataSubtree {
    pub const ALL: [DataSubtree; 4] = [
        DataSubtree::Config,
        DataSubtree::Files,
        DataSubtree::Cache,
        DataSubtree::Logs,
    ];

    pub fn dir_name(self) -> &'static str {
        match self {
            DataSubtree::Config => "config",
            DataSubtree::Files => "files",
            DataSubtree::Cache => "cache",
            DataSubtree::Logs => "logs",
        }
    }

    /// Location of this subtree under `root`
    pub fn path(self, root: &Path) -> PathBuf {
        root.join(self.dir_name())
    }
}

/// Snapshot of where the application's data lives right now.
///
/// Computed fresh on every query; the pointer file owned by the
/// `DataRootRegistry` is the only persisted state behind it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DataRootInfo {
    pub current_path: PathBuf,
    pub config_path: PathBuf,
    pub files_path: PathBuf,
    pub cache_path: PathBuf,
    pub logs_path: PathBuf,
    pub is_custom: bool,
    pub default_path: PathBuf,
    pub total_size_bytes: u64,
}

impl DataRootInfo {
    pub fn new(current_path: PathBuf, default_path: PathBuf, total_size_bytes: u64) -> Self {
        Self {
            config_path: DataSubtree::Config.path(&current_path),
            files_path: DataSubtree::Files.path(&current_path),
            cache_path: DataSubtree::Cache.path(&current_path),
            logs_path: DataSubtree::Logs.path(&current_path),
            is_custom: current_path != default_path,
            current_path,
            default_path,
            total_size_bytes,
        }
    }
}

/// Outcome of checking a candidate destination folder.
///
/// `valid == false` always carries an `error`; warnings never make a
/// destination invalid on their own.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ValidationResult {
    pub valid: bool,
    pub warnings: Vec<String>,
    pub error: Option<String>,
}

impl ValidationResult {
    pub fn accepted(warnings: Vec<String>) -> Self {
        Self {
            valid: true,
            warnings,
            error: None,
        }
    }

    pub fn rejected(error: impl Into<String>, warnings: Vec<String>) -> Self {
        Self {
            valid: false,
            warnings,
            error: Some(error.into()),
        }
    }
}
