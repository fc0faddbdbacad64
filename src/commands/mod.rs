//! Tauri commands exposed by the migration plugin

pub mod migration;

use std::sync::{Arc, Mutex};
use tauri::{AppHandle, Runtime};
use tracing_appender::non_blocking::WorkerGuard;

use crate::services::{MigrationCoordinator, RestartTrigger};

/// State managed by the plugin
pub struct MigrationState {
    pub coordinator: Arc<MigrationCoordinator>,
    /// Keeps the log file writer flushing for the life of the app
    _log_guard: Mutex<Option<WorkerGuard>>,
}

impl MigrationState {
    pub fn new(coordinator: Arc<MigrationCoordinator>, log_guard: Option<WorkerGuard>) -> Self {
        Self {
            coordinator,
            _log_guard: Mutex::new(log_guard),
        }
    }
}

/// Restarts through the Tauri app handle
pub struct AppRestart<R: Runtime>(pub AppHandle<R>);

impl<R: Runtime> RestartTrigger for AppRestart<R> {
    fn restart(&self) {
        self.0.restart()
    }
}
