//! Migration coordinator
//!
//! The façade the desktop layer talks to. It answers readiness queries,
//! runs the validator before any relocation, drives the relocator and the
//! record migrator on the blocking pool, and is the only writer of the
//! relocation status and the last migration report.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::file_relocator::FileRelocator;
use super::path_validator::PathValidator;
use super::record_migrator::{readiness, RecordMigrator};
use crate::adapters::{FileSystem, LocalFileSystem};
use crate::config::MigrationConfig;
use crate::error::{CoordinatorError, OperationKind};
use crate::models::{
    DataRootInfo, MigrationProgress, MigrationReport, MigrationStatus, RelocationPhase,
    RelocationStatus, ValidationResult,
};
use crate::storage::{DataRootRegistry, SqliteStoreProvider, StoreProvider, TargetStore};

/// Restarts the host application once a relocation has completed
pub trait RestartTrigger: Send + Sync {
    fn restart(&self);
}

/// Marks an operation kind as running until dropped
struct InFlight {
    flag: Arc<AtomicBool>,
}

impl InFlight {
    fn claim(flag: &Arc<AtomicBool>, kind: OperationKind) -> Result<Self, CoordinatorError> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| CoordinatorError::AlreadyRunning(kind))?;
        Ok(Self { flag: flag.clone() })
    }

    /// Claim `own`, then back off if `other` is running.
    ///
    /// Both sides store to their own flag and then load the other's, so every
    /// access here must be SeqCst for at least one side to see the other.
    fn claim_exclusive(
        own: &Arc<AtomicBool>,
        own_kind: OperationKind,
        other: &AtomicBool,
        other_kind: OperationKind,
    ) -> Result<Self, CoordinatorError> {
        let guard = Self::claim(own, own_kind)?;
        if other.load(Ordering::SeqCst) {
            return Err(CoordinatorError::AlreadyRunning(other_kind));
        }
        Ok(guard)
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// A running relocation: its status stream and its terminal status.
///
/// The stream closes right after the terminal status has been sent.
pub struct RelocationHandle {
    events: UnboundedReceiver<RelocationStatus>,
    outcome: JoinHandle<RelocationStatus>,
}

impl RelocationHandle {
    pub async fn next_status(&mut self) -> Option<RelocationStatus> {
        self.events.recv().await
    }

    pub async fn wait(self) -> Result<RelocationStatus, CoordinatorError> {
        self.outcome
            .await
            .map_err(|e| CoordinatorError::Task(e.to_string()))
    }

    pub fn into_parts(self) -> (UnboundedReceiver<RelocationStatus>, JoinHandle<RelocationStatus>) {
        (self.events, self.outcome)
    }
}

pub struct MigrationCoordinator {
    registry: Arc<DataRootRegistry>,
    fs: Arc<dyn FileSystem>,
    config: MigrationConfig,
    stores: Arc<dyn StoreProvider>,
    restart: Arc<dyn RestartTrigger>,
    relocating: Arc<AtomicBool>,
    migrating: Arc<AtomicBool>,
    relocation: Arc<Mutex<Option<RelocationStatus>>>,
    last_report: Arc<Mutex<Option<MigrationReport>>>,
}

impl MigrationCoordinator {
    pub fn new(
        registry: Arc<DataRootRegistry>,
        config: MigrationConfig,
        stores: Arc<dyn StoreProvider>,
        restart: Arc<dyn RestartTrigger>,
    ) -> Self {
        Self {
            registry,
            fs: Arc::new(LocalFileSystem),
            config,
            stores,
            restart,
            relocating: Arc::new(AtomicBool::new(false)),
            migrating: Arc::new(AtomicBool::new(false)),
            relocation: Arc::new(Mutex::new(None)),
            last_report: Arc::new(Mutex::new(None)),
        }
    }

    /// Coordinator over the SQLite libraries inside the current data root
    pub fn with_sqlite_stores(
        registry: Arc<DataRootRegistry>,
        config: MigrationConfig,
        restart: Arc<dyn RestartTrigger>,
    ) -> Self {
        let stores = Arc::new(SqliteStoreProvider::new(registry.clone(), config.clone()));
        Self::new(registry, config, stores, restart)
    }

    pub fn with_filesystem(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    pub fn registry(&self) -> &DataRootRegistry {
        &self.registry
    }

    pub fn data_root_info(&self) -> Result<DataRootInfo, CoordinatorError> {
        Ok(self.registry.info(self.fs.as_ref())?)
    }

    pub fn validate_path(&self, candidate: &Path) -> ValidationResult {
        PathValidator::new(&self.registry, self.fs.as_ref(), &self.config).validate(candidate)
    }

    /// Latest status of the current or most recent relocation
    pub fn relocation_status(&self) -> Result<Option<RelocationStatus>, CoordinatorError> {
        let status = self
            .relocation
            .lock()
            .map_err(|_| CoordinatorError::StatePoisoned)?;
        Ok(status.clone())
    }

    /// True once a relocation completed and the application has not restarted
    pub fn restart_pending(&self) -> Result<bool, CoordinatorError> {
        Ok(matches!(
            self.relocation_status()?,
            Some(RelocationStatus {
                phase: RelocationPhase::Completed,
                ..
            })
        ))
    }

    /// Validate `destination` and start copying the data root there.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start_relocation(&self, destination: PathBuf) -> Result<RelocationHandle, CoordinatorError> {
        let guard = InFlight::claim_exclusive(
            &self.relocating,
            OperationKind::Relocation,
            &self.migrating,
            OperationKind::RecordMigration,
        )?;
        if self.restart_pending()? {
            return Err(CoordinatorError::RestartPending);
        }

        let validation = self.validate_path(&destination);
        if !validation.valid {
            let reason = validation
                .error
                .unwrap_or_else(|| "destination rejected".to_string());
            return Err(CoordinatorError::InvalidDestination(reason));
        }
        for warning in &validation.warnings {
            warn!("Relocating to {:?}: {}", destination, warning);
        }

        {
            let mut latest = self
                .relocation
                .lock()
                .map_err(|_| CoordinatorError::StatePoisoned)?;
            *latest = Some(RelocationStatus::preparing());
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let latest = self.relocation.clone();
        let relocator = FileRelocator::new(self.registry.clone(), self.fs.clone(), self.config.clone());

        info!("Starting relocation to {:?}", destination);
        let outcome = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            relocator.relocate(&destination, |status| {
                match latest.lock() {
                    Ok(mut slot) => *slot = Some(status.clone()),
                    Err(_) => warn!("Relocation status lock poisoned"),
                }
                // A dropped receiver only means nobody is listening
                let _ = tx.send(status.clone());
            })
        });

        Ok(RelocationHandle {
            events: rx,
            outcome,
        })
    }

    /// Compare the legacy and target libraries. Never creates either one.
    pub fn migration_status(&self) -> MigrationStatus {
        let legacy = match self.stores.legacy() {
            Ok(legacy) => legacy,
            Err(e) => {
                return MigrationStatus {
                    can_migrate: false,
                    source_record_count: 0,
                    target_record_count: 0,
                    message: format!("The legacy library could not be opened: {}", e),
                }
            }
        };

        match self.stores.target_readonly() {
            Ok(target) => readiness(
                legacy.as_ref(),
                target.as_deref().map(|t| t as &dyn TargetStore),
            ),
            Err(e) => MigrationStatus {
                can_migrate: false,
                source_record_count: legacy.paper_count().unwrap_or(0),
                target_record_count: 0,
                message: format!("The new library is not reachable: {}", e),
            },
        }
    }

    /// Copy every legacy record into the target library
    pub async fn run_migration(
        &self,
        progress: Option<UnboundedSender<MigrationProgress>>,
    ) -> Result<MigrationReport, CoordinatorError> {
        let guard = InFlight::claim_exclusive(
            &self.migrating,
            OperationKind::RecordMigration,
            &self.relocating,
            OperationKind::Relocation,
        )?;

        let stores = self.stores.clone();
        let report = tokio::task::spawn_blocking(move || -> Result<MigrationReport, CoordinatorError> {
            let _guard = guard;
            let legacy = stores.legacy()?;
            let target = stores.target()?;

            let mut migrator = RecordMigrator::new(legacy.as_ref(), target.as_ref());
            if let Some(progress) = progress {
                migrator = migrator.with_progress(progress);
            }
            Ok(migrator.run())
        })
        .await
        .map_err(|e| CoordinatorError::Task(e.to_string()))??;

        let mut last = self
            .last_report
            .lock()
            .map_err(|_| CoordinatorError::StatePoisoned)?;
        *last = Some(report.clone());
        Ok(report)
    }

    pub fn last_report(&self) -> Result<Option<MigrationReport>, CoordinatorError> {
        let report = self
            .last_report
            .lock()
            .map_err(|_| CoordinatorError::StatePoisoned)?;
        Ok(report.clone())
    }

    /// Restart the application so it picks up the new data root
    pub fn restart(&self) -> Result<(), CoordinatorError> {
        if self.relocating.load(Ordering::SeqCst) {
            return Err(CoordinatorError::AlreadyRunning(OperationKind::Relocation));
        }
        if self.migrating.load(Ordering::SeqCst) {
            return Err(CoordinatorError::AlreadyRunning(OperationKind::RecordMigration));
        }

        info!("Restarting application");
        self.restart.restart();
        Ok(())
    }
}
