//! Migration settings
//!
//! Read from the `migration` object of the application's `settings.json`;
//! every field has a default so a missing file or key is not an error.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MigrationConfig {
    /// Directory name under the platform data/config dirs
    pub app_identifier: String,
    /// Free space wanted at the destination, as a multiple of the data size
    pub space_headroom_factor: f64,
    /// Staging directory created inside the destination during a copy
    pub staging_dir_name: String,
    /// Legacy library database, relative to the data root's `files/`
    pub legacy_db_file: String,
    /// Target library database, relative to the data root's `files/`
    pub target_db_file: String,
    /// Emit a copy progress event every N files
    pub progress_every: u64,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            app_identifier: "com.marginalia".to_string(),
            space_headroom_factor: 1.5,
            staging_dir_name: ".marginalia-staging".to_string(),
            legacy_db_file: "library.sqlite".to_string(),
            target_db_file: ".marginalia.sqlite".to_string(),
            progress_every: 1,
        }
    }
}

#[derive(Deserialize, Default)]
struct SettingsFile {
    #[serde(default)]
    migration: Option<MigrationConfig>,
}

impl MigrationConfig {
    /// Load from a settings file, falling back to defaults when it is absent
    pub fn load(settings_path: &Path) -> Result<Self, ConfigError> {
        if !settings_path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(settings_path).map_err(|source| ConfigError::Io {
            path: settings_path.to_path_buf(),
            source,
        })?;

        let settings: SettingsFile = serde_json::from_str(&content)?;
        let mut config = settings.migration.unwrap_or_default();

        if config.progress_every == 0 {
            config.progress_every = 1;
        }
        if !(config.space_headroom_factor >= 1.0) {
            config.space_headroom_factor = 1.0;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = MigrationConfig::load(&dir.path().join("settings.json")).unwrap();
        assert_eq!(config, MigrationConfig::default());
    }

    #[test]
    fn test_partial_migration_section() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{"theme": "dark", "migration": {"space_headroom_factor": 2.0, "progress_every": 0}}"#,
        )
        .unwrap();

        let config = MigrationConfig::load(&path).unwrap();
        assert_eq!(config.space_headroom_factor, 2.0);
        assert_eq!(config.progress_every, 1);
        assert_eq!(config.staging_dir_name, ".marginalia-staging");
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{not json").unwrap();
        assert!(MigrationConfig::load(&path).is_err());
    }
}
