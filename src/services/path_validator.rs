//! Pre-flight checks for a relocation destination
//!
//! Validation only reads: metadata, directory listings, free space and the
//! mount table. It never creates, writes or removes anything.

use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

use crate::adapters::{FileSystem, VolumeKind};
use crate::config::MigrationConfig;
use crate::models::{DataSubtree, ValidationResult};
use crate::storage::DataRootRegistry;

pub const SAME_LOCATION_ERROR: &str =
    "The destination is the same location as the current data folder";

pub struct PathValidator<'a> {
    registry: &'a DataRootRegistry,
    fs: &'a dyn FileSystem,
    config: &'a MigrationConfig,
}

impl<'a> PathValidator<'a> {
    pub fn new(
        registry: &'a DataRootRegistry,
        fs: &'a dyn FileSystem,
        config: &'a MigrationConfig,
    ) -> Self {
        Self {
            registry,
            fs,
            config,
        }
    }

    pub fn validate(&self, candidate: &Path) -> ValidationResult {
        let mut warnings = Vec::new();

        if candidate.as_os_str().is_empty() || !candidate.is_absolute() {
            return ValidationResult::rejected("The destination must be an absolute path", warnings);
        }

        let info = match self.registry.info(self.fs) {
            Ok(info) => info,
            Err(e) => {
                return ValidationResult::rejected(
                    format!("Could not determine the current data folder: {}", e),
                    warnings,
                )
            }
        };

        let current = normalize(&info.current_path);
        let destination = normalize(candidate);
        debug!("Validating {:?} (current data folder {:?})", destination, current);

        if destination == current {
            return ValidationResult::rejected(SAME_LOCATION_ERROR, warnings);
        }
        if destination.starts_with(&current) {
            return ValidationResult::rejected(
                "The destination is inside the current data folder",
                warnings,
            );
        }

        let probe = match nearest_existing_ancestor(&destination) {
            Some(probe) => probe,
            None => {
                return ValidationResult::rejected(
                    "The destination does not exist and cannot be created",
                    warnings,
                )
            }
        };
        let exists = probe == destination;

        let metadata = match self.fs.metadata(&probe) {
            Ok(metadata) => metadata,
            Err(e) => {
                return ValidationResult::rejected(
                    format!("The destination volume could not be read: {}", e),
                    warnings,
                )
            }
        };

        if !metadata.is_dir() {
            let error = if exists {
                "The destination is not a folder".to_string()
            } else {
                format!(
                    "The destination cannot be created because {} is not a folder",
                    probe.display()
                )
            };
            return ValidationResult::rejected(error, warnings);
        }

        let writable = match self.fs.is_writable(&probe) {
            Ok(writable) => writable,
            Err(e) => {
                return ValidationResult::rejected(
                    format!("The destination permissions could not be checked: {}", e),
                    warnings,
                )
            }
        };
        if !writable {
            let error = if exists {
                "The destination folder is not writable".to_string()
            } else {
                format!(
                    "The destination cannot be created because {} is not writable",
                    probe.display()
                )
            };
            return ValidationResult::rejected(error, warnings);
        }

        match self.fs.volume_kind(&probe) {
            Ok(VolumeKind::Network) => warnings.push(
                "The destination is on a network volume; a dropped connection during the copy will stop the move"
                    .to_string(),
            ),
            Ok(VolumeKind::Removable) => warnings.push(
                "The destination is on a removable drive; keep it connected until the move finishes"
                    .to_string(),
            ),
            Ok(VolumeKind::Local) | Ok(VolumeKind::Unknown) => {}
            Err(e) => {
                return ValidationResult::rejected(
                    format!("The destination volume could not be read: {}", e),
                    warnings,
                )
            }
        }

        if exists {
            if let Err(error) = self.inspect_contents(&destination, &mut warnings) {
                return ValidationResult::rejected(error, warnings);
            }
        }

        let needed = info.total_size_bytes;
        match self.fs.available_space(&probe) {
            Ok(free) if free < needed => {
                return ValidationResult::rejected(
                    format!(
                        "Not enough free space at the destination: {} needed, {} available",
                        format_bytes(needed),
                        format_bytes(free)
                    ),
                    warnings,
                );
            }
            Ok(free) if (free as f64) < needed as f64 * self.config.space_headroom_factor => {
                warnings.push(format!(
                    "Low disk space: {} free at the destination, {} recommended for {} of data",
                    format_bytes(free),
                    format_bytes((needed as f64 * self.config.space_headroom_factor) as u64),
                    format_bytes(needed)
                ));
            }
            Ok(_) => {}
            Err(e) => warnings.push(format!(
                "Could not determine free space at the destination: {}",
                e
            )),
        }

        ValidationResult::accepted(warnings)
    }

    /// Reject folders that already hold a data root; warn about anything else
    fn inspect_contents(&self, destination: &Path, warnings: &mut Vec<String>) -> Result<(), String> {
        let entries = fs::read_dir(destination)
            .map_err(|e| format!("The destination folder could not be read: {}", e))?;

        let mut other_items = 0usize;
        let mut has_staging = false;
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();

            if let Some(sub) = DataSubtree::ALL.iter().find(|s| s.dir_name() == name) {
                return Err(format!(
                    "The destination already contains a '{}' folder; choose an empty folder or remove it first",
                    sub.dir_name()
                ));
            }
            if name == self.config.staging_dir_name.as_str() {
                has_staging = true;
            } else {
                other_items += 1;
            }
        }

        if has_staging {
            warnings.push(
                "An incomplete copy from an earlier attempt was found and will be overwritten"
                    .to_string(),
            );
        }
        if other_items > 0 {
            warnings.push(format!(
                "The destination folder is not empty ({} existing item{})",
                other_items,
                if other_items == 1 { "" } else { "s" }
            ));
        }
        Ok(())
    }
}

/// Lexically clean `path` and resolve symlinks on the part that exists
pub(crate) fn normalize(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                cleaned.pop();
            }
            other => cleaned.push(other.as_os_str()),
        }
    }

    let mut existing = cleaned.clone();
    let mut missing = Vec::new();
    while !existing.exists() {
        match existing.file_name() {
            Some(name) => {
                missing.push(name.to_os_string());
                existing.pop();
            }
            None => break,
        }
    }

    let mut resolved = existing.canonicalize().unwrap_or(existing);
    for part in missing.iter().rev() {
        resolved.push(part);
    }
    resolved
}

fn nearest_existing_ancestor(path: &Path) -> Option<PathBuf> {
    path.ancestors()
        .find(|p| !p.as_os_str().is_empty() && p.exists())
        .map(Path::to_path_buf)
}

pub(crate) fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::LocalFileSystem;
    use crate::test_support::{populate_root, test_registry, FakeVolumeFs, LockedFs};
    use std::fs::File;
    use tempfile::tempdir;

    const MB: u64 = 1024 * 1024;

    fn roomy() -> FakeVolumeFs {
        FakeVolumeFs {
            free: 100 * 1024 * MB,
            kind: VolumeKind::Local,
        }
    }

    /// Every path below `dir` with its size, for before/after comparisons
    fn snapshot(dir: &Path) -> Vec<(PathBuf, u64)> {
        LocalFileSystem
            .walk(dir)
            .unwrap()
            .into_iter()
            .map(|e| (e.relative, e.len))
            .collect()
    }

    #[test]
    fn test_same_location_is_rejected() {
        let dir = tempdir().unwrap();
        let registry = test_registry(dir.path());
        let current = registry.current().unwrap();
        populate_root(&current, 4);
        let config = MigrationConfig::default();
        let fs = roomy();

        let validator = PathValidator::new(&registry, &fs, &config);
        let result = validator.validate(&current);
        assert!(!result.valid);
        assert_eq!(result.error.as_deref(), Some(SAME_LOCATION_ERROR));

        let with_dots = current.join("files").join("..");
        assert_eq!(validator.validate(&with_dots).error.as_deref(), Some(SAME_LOCATION_ERROR));
    }

    #[test]
    fn test_inside_current_root_is_rejected() {
        let dir = tempdir().unwrap();
        let registry = test_registry(dir.path());
        let current = registry.current().unwrap();
        populate_root(&current, 4);
        let config = MigrationConfig::default();
        let fs = roomy();

        let result = PathValidator::new(&registry, &fs, &config).validate(&current.join("files/new"));
        assert!(!result.valid);
        assert!(result.error.unwrap().contains("inside"));
    }

    #[test]
    fn test_low_space_is_a_warning() {
        let dir = tempdir().unwrap();
        let registry = test_registry(dir.path());
        let current = registry.current().unwrap();
        fs::create_dir_all(current.join("files")).unwrap();
        File::create(current.join("files/library.sqlite"))
            .unwrap()
            .set_len(4 * MB)
            .unwrap();

        let destination = dir.path().join("dest");
        fs::create_dir_all(&destination).unwrap();
        File::create(destination.join("a.bin")).unwrap().set_len(6 * MB).unwrap();
        File::create(destination.join("b.bin")).unwrap().set_len(4 * MB).unwrap();

        let config = MigrationConfig::default();
        let fs = FakeVolumeFs {
            free: 5 * MB,
            kind: VolumeKind::Local,
        };
        let result = PathValidator::new(&registry, &fs, &config).validate(&destination);

        assert!(result.valid, "{:?}", result.error);
        assert!(result.error.is_none());
        assert!(result.warnings.iter().any(|w| w.contains("not empty (2 existing items)")));
        assert!(result.warnings.iter().any(|w| w.starts_with("Low disk space")));
    }

    #[test]
    fn test_insufficient_space_is_rejected() {
        let dir = tempdir().unwrap();
        let registry = test_registry(dir.path());
        let current = registry.current().unwrap();
        fs::create_dir_all(current.join("cache")).unwrap();
        File::create(current.join("cache/big.bin")).unwrap().set_len(8 * MB).unwrap();

        let config = MigrationConfig::default();
        let fs = FakeVolumeFs {
            free: 5 * MB,
            kind: VolumeKind::Local,
        };
        let result = PathValidator::new(&registry, &fs, &config).validate(&dir.path().join("dest"));
        assert!(!result.valid);
        assert!(result.error.unwrap().starts_with("Not enough free space"));
    }

    #[test]
    fn test_missing_destination_under_writable_parent_is_valid() {
        let dir = tempdir().unwrap();
        let registry = test_registry(dir.path());
        populate_root(&registry.current().unwrap(), 4);
        let config = MigrationConfig::default();
        let fs = roomy();

        let result = PathValidator::new(&registry, &fs, &config)
            .validate(&dir.path().join("not/yet/there"));
        assert!(result.valid);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_existing_data_folder_is_a_conflict() {
        let dir = tempdir().unwrap();
        let registry = test_registry(dir.path());
        populate_root(&registry.current().unwrap(), 4);
        let destination = dir.path().join("dest");
        fs::create_dir_all(destination.join("files")).unwrap();
        let config = MigrationConfig::default();
        let fs = roomy();

        let result = PathValidator::new(&registry, &fs, &config).validate(&destination);
        assert!(!result.valid);
        assert!(result.error.unwrap().contains("'files'"));
    }

    #[test]
    fn test_leftover_staging_is_a_warning() {
        let dir = tempdir().unwrap();
        let registry = test_registry(dir.path());
        populate_root(&registry.current().unwrap(), 4);
        let config = MigrationConfig::default();
        let destination = dir.path().join("dest");
        fs::create_dir_all(destination.join(&config.staging_dir_name)).unwrap();
        let fs = roomy();

        let result = PathValidator::new(&registry, &fs, &config).validate(&destination);
        assert!(result.valid);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("earlier attempt"));
    }

    #[test]
    fn test_file_destination_is_rejected() {
        let dir = tempdir().unwrap();
        let registry = test_registry(dir.path());
        let file = dir.path().join("a-file");
        fs::write(&file, "x").unwrap();
        let config = MigrationConfig::default();
        let fs = roomy();

        let validator = PathValidator::new(&registry, &fs, &config);
        assert!(!validator.validate(&file).valid);
        assert!(validator
            .validate(&file.join("child"))
            .error
            .unwrap()
            .contains("is not a folder"));
    }

    #[test]
    fn test_unwritable_destination_is_rejected() {
        let dir = tempdir().unwrap();
        let registry = test_registry(dir.path());
        let destination = dir.path().join("locked");
        fs::create_dir_all(&destination).unwrap();

        let config = MigrationConfig::default();
        let result = PathValidator::new(&registry, &LockedFs, &config).validate(&destination);

        assert!(!result.valid);
        assert_eq!(result.error.as_deref(), Some("The destination folder is not writable"));
    }

    #[test]
    fn test_missing_destination_under_unwritable_parent_is_rejected() {
        let dir = tempdir().unwrap();
        let registry = test_registry(dir.path());
        let parent = dir.path().join("owned-by-someone-else");
        fs::create_dir_all(&parent).unwrap();

        let config = MigrationConfig::default();
        let result =
            PathValidator::new(&registry, &LockedFs, &config).validate(&parent.join("marginalia"));

        assert!(!result.valid);
        let error = result.error.unwrap();
        assert!(error.starts_with("The destination cannot be created because"), "{}", error);
        assert!(error.ends_with("is not writable"), "{}", error);
    }

    #[test]
    fn test_network_volume_warns() {
        let dir = tempdir().unwrap();
        let registry = test_registry(dir.path());
        let config = MigrationConfig::default();
        let fs = FakeVolumeFs {
            free: 100 * MB,
            kind: VolumeKind::Network,
        };

        let result = PathValidator::new(&registry, &fs, &config).validate(&dir.path().join("nas"));
        assert!(result.valid);
        assert!(result.warnings[0].contains("network volume"));
    }

    #[test]
    fn test_relative_path_is_rejected() {
        let dir = tempdir().unwrap();
        let registry = test_registry(dir.path());
        let config = MigrationConfig::default();
        let fs = roomy();

        let result = PathValidator::new(&registry, &fs, &config).validate(Path::new("relative/dir"));
        assert!(!result.valid);
    }

    #[test]
    fn test_validation_never_touches_the_filesystem() {
        let dir = tempdir().unwrap();
        let registry = test_registry(dir.path());
        let config = MigrationConfig::default();
        populate_root(&registry.current().unwrap(), 8);
        fs::create_dir_all(dir.path().join("occupied")).unwrap();
        fs::write(dir.path().join("occupied/x.txt"), "x").unwrap();
        fs::create_dir_all(dir.path().join("empty")).unwrap();

        let before = snapshot(dir.path());
        let validator = PathValidator::new(&registry, &LocalFileSystem, &config);
        for candidate in [
            dir.path().join("empty"),
            dir.path().join("occupied"),
            dir.path().join("new/nested/dir"),
            dir.path().join("default"),
            dir.path().join("occupied/x.txt"),
        ] {
            validator.validate(&candidate);
        }

        assert_eq!(snapshot(dir.path()), before);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(5 * MB), "5.0 MB");
        assert_eq!(format_bytes(1536), "1.5 KB");
    }
}
