//! Data-root registry
//!
//! The active data root is recorded in a small pointer file that lives in the
//! platform config directory, outside every data root. Nothing caches it:
//! each query re-reads the pointer, and the relocator's finalize step is the
//! only code that rewrites it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::adapters::FileSystem;
use crate::config::MigrationConfig;
use crate::error::RegistryError;
use crate::models::{DataRootInfo, DataSubtree};

const POINTER_FILE: &str = "data_root.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DataRootPointer {
    path: PathBuf,
    previous_path: Option<PathBuf>,
    switched_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct DataRootRegistry {
    pointer_path: PathBuf,
    default_root: PathBuf,
}

impl DataRootRegistry {
    pub fn new(pointer_path: PathBuf, default_root: PathBuf) -> Self {
        Self {
            pointer_path,
            default_root,
        }
    }

    /// Registry rooted in the platform's config and data directories
    pub fn for_platform(config: &MigrationConfig) -> Result<Self, RegistryError> {
        let config_dir = dirs::config_dir()
            .ok_or(RegistryError::NoPlatformDir("config"))?
            .join(&config.app_identifier);
        let data_dir = dirs::data_dir()
            .ok_or(RegistryError::NoPlatformDir("data"))?
            .join(&config.app_identifier);

        Ok(Self::new(config_dir.join(POINTER_FILE), data_dir))
    }

    pub fn pointer_path(&self) -> &Path {
        &self.pointer_path
    }

    pub fn default_root(&self) -> &Path {
        &self.default_root
    }

    /// Active data root, read fresh from the pointer file
    pub fn current(&self) -> Result<PathBuf, RegistryError> {
        match self.read_pointer()? {
            Some(pointer) => {
                if !pointer.path.exists() {
                    warn!("Data root {:?} from pointer does not exist", pointer.path);
                }
                Ok(pointer.path)
            }
            None => Ok(self.default_root.clone()),
        }
    }

    /// Root that was active before the last switch, if any
    pub fn previous(&self) -> Result<Option<PathBuf>, RegistryError> {
        Ok(self.read_pointer()?.and_then(|p| p.previous_path))
    }

    pub fn is_custom(&self) -> Result<bool, RegistryError> {
        Ok(self.current()? != self.default_root)
    }

    /// Compute a fresh [`DataRootInfo`] snapshot
    pub fn info(&self, fs: &dyn FileSystem) -> Result<DataRootInfo, RegistryError> {
        let current = self.current()?;
        let total_size_bytes = DataSubtree::ALL
            .iter()
            .map(|sub| fs.tree_size(&sub.path(&current)))
            .sum();

        Ok(DataRootInfo::new(
            current,
            self.default_root.clone(),
            total_size_bytes,
        ))
    }

    /// Point the application at `new_root`.
    ///
    /// The pointer is replaced with a single atomic rename; if this returns
    /// an error the previous root is still the active one.
    pub(crate) fn switch_to(&self, fs: &dyn FileSystem, new_root: &Path) -> Result<(), RegistryError> {
        let previous = self.current()?;
        let pointer = DataRootPointer {
            path: new_root.to_path_buf(),
            previous_path: Some(previous.clone()),
            switched_at: Utc::now(),
        };
        let contents = serde_json::to_vec_pretty(&pointer)?;

        fs.write_atomic(&self.pointer_path, &contents)
            .map_err(|source| RegistryError::Io {
                path: self.pointer_path.clone(),
                source,
            })?;

        info!("Data root switched from {:?} to {:?}", previous, new_root);
        Ok(())
    }

    /// Forget any custom location so the platform default is active again.
    ///
    /// Does not move data; meant for recovering from a root that vanished.
    pub fn reset_to_default(&self) -> Result<(), RegistryError> {
        match fs::remove_file(&self.pointer_path) {
            Ok(()) => {
                info!("Data root reset to default {:?}", self.default_root);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(RegistryError::Io {
                path: self.pointer_path.clone(),
                source,
            }),
        }
    }

    fn read_pointer(&self) -> Result<Option<DataRootPointer>, RegistryError> {
        let content = match fs::read_to_string(&self.pointer_path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(RegistryError::Io {
                    path: self.pointer_path.clone(),
                    source,
                })
            }
        };
        Ok(Some(serde_json::from_str(&content)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::LocalFileSystem;
    use tempfile::tempdir;

    fn registry(dir: &Path) -> DataRootRegistry {
        DataRootRegistry::new(
            dir.join("bootstrap").join(POINTER_FILE),
            dir.join("default"),
        )
    }

    #[test]
    fn test_defaults_without_pointer() {
        let dir = tempdir().unwrap();
        let registry = registry(dir.path());

        assert_eq!(registry.current().unwrap(), dir.path().join("default"));
        assert!(!registry.is_custom().unwrap());
        assert_eq!(registry.previous().unwrap(), None);
    }

    #[test]
    fn test_switch_and_reset() {
        let dir = tempdir().unwrap();
        let registry = registry(dir.path());
        let custom = dir.path().join("custom");
        fs::create_dir_all(&custom).unwrap();

        registry.switch_to(&LocalFileSystem, &custom).unwrap();
        assert_eq!(registry.current().unwrap(), custom);
        assert!(registry.is_custom().unwrap());
        assert_eq!(registry.previous().unwrap(), Some(dir.path().join("default")));

        registry.reset_to_default().unwrap();
        assert_eq!(registry.current().unwrap(), dir.path().join("default"));
        registry.reset_to_default().unwrap();
    }

    #[test]
    fn test_info_sums_subtrees() {
        let dir = tempdir().unwrap();
        let registry = registry(dir.path());
        let root = registry.current().unwrap();
        fs::create_dir_all(root.join("files/papers")).unwrap();
        fs::create_dir_all(root.join("logs")).unwrap();
        fs::write(root.join("files/papers/a.pdf"), vec![1u8; 300]).unwrap();
        fs::write(root.join("logs/marginalia.log"), vec![1u8; 20]).unwrap();
        fs::write(root.join("stray.txt"), vec![1u8; 999]).unwrap();

        let info = registry.info(&LocalFileSystem).unwrap();
        assert_eq!(info.total_size_bytes, 320);
        assert_eq!(info.current_path, root);
        assert!(!info.is_custom);
    }

    #[test]
    fn test_corrupt_pointer_is_an_error() {
        let dir = tempdir().unwrap();
        let registry = registry(dir.path());
        fs::create_dir_all(registry.pointer_path().parent().unwrap()).unwrap();
        fs::write(registry.pointer_path(), "garbage").unwrap();

        assert!(matches!(registry.current(), Err(RegistryError::Json(_))));
    }
}
