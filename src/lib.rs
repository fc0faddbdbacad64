//! Marginalia storage migration engine
//!
//! Moves the application's data folder to a new location while the app is
//! running, and migrates a legacy library's records into the current store.
//! With the `desktop` feature the engine is exposed as a Tauri plugin.

pub mod adapters;
#[cfg(feature = "desktop")]
pub mod commands;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod storage;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::MigrationConfig;
pub use error::{CoordinatorError, OperationKind, RecordError, RegistryError, StoreError};
pub use services::{MigrationCoordinator, RelocationHandle, RestartTrigger};
pub use storage::DataRootRegistry;

#[cfg(feature = "desktop")]
pub use commands::MigrationState;

#[cfg(feature = "desktop")]
use tauri::{
    plugin::{Builder, TauriPlugin},
    Manager, Runtime,
};

/// Build the migration plugin.
///
/// Register it with `tauri::Builder::default().plugin(marginalia_migration::init(config))`.
#[cfg(feature = "desktop")]
pub fn init<R: Runtime>(config: MigrationConfig) -> TauriPlugin<R> {
    use std::sync::Arc;
    use tracing::{info, warn};

    Builder::new("marginalia-migration")
        .invoke_handler(tauri::generate_handler![
            commands::migration::get_data_root_info,
            commands::migration::validate_data_root,
            commands::migration::start_relocation,
            commands::migration::get_relocation_status,
            commands::migration::get_migration_status,
            commands::migration::run_migration,
            commands::migration::restart_app,
        ])
        .setup(move |app, _api| {
            let registry = Arc::new(DataRootRegistry::for_platform(&config)?);
            let root = registry.current()?;

            let log_guard = match utils::init_logging(&models::DataSubtree::Logs.path(&root)) {
                Ok(guard) => Some(guard),
                Err(e) => {
                    warn!("File logging unavailable: {}", e);
                    None
                }
            };
            info!("Data folder: {:?}", root);

            let restart = Arc::new(commands::AppRestart(app.clone()));
            let coordinator = MigrationCoordinator::with_sqlite_stores(registry, config, restart);
            app.manage(MigrationState::new(Arc::new(coordinator), log_guard));
            Ok(())
        })
        .build()
}
