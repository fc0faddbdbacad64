//! Storage module
//!
//! This module provides:
//! - The data-root registry (pointer to the active data folder)
//! - Legacy library reader and target library writer (SQLite)
//! - Target schema migrations
//! - Store traits the record migrator is written against

pub mod data_root;
pub mod db;
pub mod legacy_repo;
pub mod stores;
pub mod target_repo;

pub use data_root::DataRootRegistry;
pub use db::{open_target_database, SCHEMA_VERSION};
pub use legacy_repo::SqliteLegacyStore;
pub use stores::{LegacyStore, SqliteStoreProvider, StoreProvider, TargetStore};
pub use target_repo::SqliteTargetStore;
