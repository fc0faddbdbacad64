//! Data-folder relocation
//!
//! Copies the four subtrees of the current data root into a staging
//! directory inside the destination, promotes them with renames, and only
//! then rewrites the data-root pointer. Until that last write succeeds the
//! original root stays active and untouched.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::adapters::FileSystem;
use crate::config::MigrationConfig;
use crate::models::{DataSubtree, RelocationPhase, RelocationStatus};
use crate::storage::DataRootRegistry;

/// Everything below the data root that a relocation copies, relative to it
#[derive(Debug, Default)]
struct CopyPlan {
    dirs: Vec<PathBuf>,
    files: Vec<PathBuf>,
}

pub struct FileRelocator {
    registry: Arc<DataRootRegistry>,
    fs: Arc<dyn FileSystem>,
    config: MigrationConfig,
}

impl FileRelocator {
    pub fn new(
        registry: Arc<DataRootRegistry>,
        fs: Arc<dyn FileSystem>,
        config: MigrationConfig,
    ) -> Self {
        Self {
            registry,
            fs,
            config,
        }
    }

    /// Move the data root to `destination`.
    ///
    /// `emit` sees every status change, ending with exactly one terminal
    /// status (`completed` or `failed`), which is also returned.
    pub fn relocate(
        &self,
        destination: &Path,
        mut emit: impl FnMut(&RelocationStatus),
    ) -> RelocationStatus {
        let mut status = RelocationStatus::preparing();
        emit(&status);

        match self.run(destination, &mut status, &mut emit) {
            Ok(()) => {
                status.phase = RelocationPhase::Completed;
                status.current_file = None;
                info!(
                    "Relocation to {:?} completed: {} files copied",
                    destination, status.processed_files
                );
            }
            Err(message) => {
                error!("Relocation to {:?} failed: {}", destination, message);
                status.phase = RelocationPhase::Failed;
                status.error = Some(message);
            }
        }

        emit(&status);
        status
    }

    fn run(
        &self,
        destination: &Path,
        status: &mut RelocationStatus,
        emit: &mut impl FnMut(&RelocationStatus),
    ) -> Result<(), String> {
        let source = self
            .registry
            .current()
            .map_err(|e| format!("Could not read the current data folder: {}", e))?;
        let staging = destination.join(&self.config.staging_dir_name);
        info!("Relocating data folder {:?} -> {:?}", source, destination);

        // Preparing
        for sub in DataSubtree::ALL {
            if self.fs.metadata(&sub.path(destination)).is_ok() {
                return Err(format!(
                    "The destination already contains a '{}' folder",
                    sub.dir_name()
                ));
            }
        }

        if self.fs.metadata(&staging).is_ok() {
            warn!("Removing incomplete copy left in {:?}", staging);
            self.fs
                .remove_dir_all(&staging)
                .map_err(|e| format!("Failed to clear {:?}: {}", staging, e))?;
        }

        let plan = self.scan(&source, &HashSet::new())?;
        for sub in DataSubtree::ALL {
            let dir = sub.path(&staging);
            self.fs
                .create_dir_all(&dir)
                .map_err(|e| format!("Failed to create {:?}: {}", dir, e))?;
        }
        self.create_dirs(&staging, &plan.dirs)?;

        status.total_files = plan.files.len() as u64;
        info!("Found {} files to copy from {:?}", status.total_files, source);
        emit(status);

        // Copying
        status.phase = RelocationPhase::Copying;
        emit(status);

        let seen: HashSet<PathBuf> = plan.files.iter().cloned().collect();
        self.copy_files(&source, &staging, &plan.files, status, emit)?;

        // Files written while the copy ran (logs, thumbnails) get one more pass
        let late = self.scan(&source, &seen)?;
        if !late.files.is_empty() {
            info!("Copying {} files created during the relocation", late.files.len());
            status.total_files += late.files.len() as u64;
            emit(status);
            self.create_dirs(&staging, &late.dirs)?;
            self.copy_files(&source, &staging, &late.files, status, emit)?;
        }

        // Finalizing
        status.phase = RelocationPhase::Finalizing;
        status.current_file = None;
        emit(status);

        let mut promoted = Vec::new();
        for sub in DataSubtree::ALL {
            let from = sub.path(&staging);
            let to = sub.path(destination);
            if let Err(e) = self.fs.rename(&from, &to) {
                self.restore_staging(&staging, destination, &promoted);
                return Err(format!("Failed to move {:?} into place: {}", to, e));
            }
            promoted.push(sub);
        }

        if let Err(e) = self.fs.remove_empty_dir(&staging) {
            warn!("Failed to remove staging directory {:?}: {}", staging, e);
        }

        if let Err(e) = self.registry.switch_to(self.fs.as_ref(), destination) {
            self.restore_staging(&staging, destination, &promoted);
            return Err(format!("Failed to switch to the new data folder: {}", e));
        }

        Ok(())
    }

    /// Entries under the four subtrees of `root`, minus files in `skip`
    fn scan(&self, root: &Path, skip: &HashSet<PathBuf>) -> Result<CopyPlan, String> {
        let mut plan = CopyPlan::default();
        for sub in DataSubtree::ALL {
            let entries = self
                .fs
                .walk(&sub.path(root))
                .map_err(|e| format!("Failed to read {:?}: {}", sub.path(root), e))?;

            for entry in entries {
                let relative = Path::new(sub.dir_name()).join(&entry.relative);
                if entry.is_dir {
                    plan.dirs.push(relative);
                } else if !skip.contains(&relative) {
                    plan.files.push(relative);
                }
            }
        }
        Ok(plan)
    }

    fn create_dirs(&self, staging: &Path, dirs: &[PathBuf]) -> Result<(), String> {
        for dir in dirs {
            let path = staging.join(dir);
            self.fs
                .create_dir_all(&path)
                .map_err(|e| format!("Failed to create {:?}: {}", path, e))?;
        }
        Ok(())
    }

    fn copy_files(
        &self,
        source: &Path,
        staging: &Path,
        files: &[PathBuf],
        status: &mut RelocationStatus,
        emit: &mut impl FnMut(&RelocationStatus),
    ) -> Result<(), String> {
        let every = self.config.progress_every.max(1);

        for relative in files {
            status.current_file = Some(relative.clone());
            self.fs
                .copy_file(&source.join(relative), &staging.join(relative))
                .map_err(|e| format!("Failed to copy {}: {}", relative.display(), e))?;

            status.processed_files += 1;
            if status.processed_files % every == 0 || status.processed_files == status.total_files {
                emit(status);
            }
        }
        Ok(())
    }

    /// Put promoted subtrees back under staging after a failed cutover
    fn restore_staging(&self, staging: &Path, destination: &Path, promoted: &[DataSubtree]) {
        if promoted.is_empty() {
            return;
        }
        if let Err(e) = self.fs.create_dir_all(staging) {
            warn!("Failed to recreate staging directory {:?}: {}", staging, e);
        }
        for sub in promoted {
            match self.fs.rename(&sub.path(destination), &sub.path(staging)) {
                Ok(()) => debug!("Moved {:?} back into staging", sub.path(destination)),
                Err(e) => warn!(
                    "Failed to move {:?} back into staging: {}",
                    sub.path(destination),
                    e
                ),
            }
        }
    }
}
