//! Data folder and record migration commands

use std::path::{Path, PathBuf};
use tauri::{AppHandle, Emitter, Runtime, State};
use tokio::sync::mpsc;
use tracing::{error, info};

use super::MigrationState;
use crate::models::{
    DataRootInfo, MigrationReport, MigrationStatus, RelocationStatus, ValidationResult,
};

pub const RELOCATION_PROGRESS_EVENT: &str = "relocation:progress";
pub const RELOCATION_FINISHED_EVENT: &str = "relocation:finished";
pub const MIGRATION_PROGRESS_EVENT: &str = "migration:progress";

/// Where the data folder is and how big it is
#[tauri::command]
pub async fn get_data_root_info(
    state: State<'_, MigrationState>,
) -> Result<DataRootInfo, String> {
    state
        .coordinator
        .data_root_info()
        .map_err(|e| format!("Failed to read data folder: {}", e))
}

/// Check a destination folder without touching it
#[tauri::command]
pub async fn validate_data_root(
    path: String,
    state: State<'_, MigrationState>,
) -> Result<ValidationResult, String> {
    Ok(state.coordinator.validate_path(Path::new(&path)))
}

/// Start moving the data folder; progress arrives as events
#[tauri::command]
pub async fn start_relocation<R: Runtime>(
    path: String,
    app: AppHandle<R>,
    state: State<'_, MigrationState>,
) -> Result<(), String> {
    let handle = state
        .coordinator
        .start_relocation(PathBuf::from(&path))
        .map_err(|e| e.to_string())?;
    info!("Relocation to {} started", path);

    let (mut events, outcome) = handle.into_parts();
    tauri::async_runtime::spawn(async move {
        while let Some(status) = events.recv().await {
            if let Err(e) = app.emit(RELOCATION_PROGRESS_EVENT, &status) {
                error!("Failed to emit relocation progress: {}", e);
            }
        }

        match outcome.await {
            Ok(status) => {
                if let Err(e) = app.emit(RELOCATION_FINISHED_EVENT, &status) {
                    error!("Failed to emit relocation result: {}", e);
                }
            }
            Err(e) => error!("Relocation task panicked: {}", e),
        }
    });

    Ok(())
}

/// Latest relocation status, for polling after a reload
#[tauri::command]
pub async fn get_relocation_status(
    state: State<'_, MigrationState>,
) -> Result<Option<RelocationStatus>, String> {
    state.coordinator.relocation_status().map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn get_migration_status(
    state: State<'_, MigrationState>,
) -> Result<MigrationStatus, String> {
    Ok(state.coordinator.migration_status())
}

/// Migrate legacy records; resolves with the final report
#[tauri::command]
pub async fn run_migration<R: Runtime>(
    app: AppHandle<R>,
    state: State<'_, MigrationState>,
) -> Result<MigrationReport, String> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    tauri::async_runtime::spawn(async move {
        while let Some(progress) = rx.recv().await {
            if let Err(e) = app.emit(MIGRATION_PROGRESS_EVENT, &progress) {
                error!("Failed to emit migration progress: {}", e);
            }
        }
    });

    state
        .coordinator
        .run_migration(Some(tx))
        .await
        .map_err(|e| format!("Migration failed: {}", e))
}

#[tauri::command]
pub async fn restart_app(state: State<'_, MigrationState>) -> Result<(), String> {
    state.coordinator.restart().map_err(|e| e.to_string())
}
