//! Error types shared across the migration engine

use std::fmt;
use std::io;
use std::path::PathBuf;

use crate::models::EntityKind;

/// Failure talking to the legacy or target store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Migration failed: {0}")]
    MigrationFailed(String),
    #[error("Query failed: {0}")]
    QueryFailed(#[from] rusqlite::Error),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Failure reading or writing the data-root pointer
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Could not determine the platform {0} directory")]
    NoPlatformDir(&'static str),
    #[error("Failed to access {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Data root pointer is corrupt: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read settings {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to parse settings: {0}")]
    Json(#[from] serde_json::Error),
}

/// The two long-running operations the coordinator guards
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Relocation,
    RecordMigration,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Relocation => f.write_str("data folder relocation"),
            OperationKind::RecordMigration => f.write_str("record migration"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("A {0} is already in progress")]
    AlreadyRunning(OperationKind),
    #[error("The data folder was moved; restart the application before moving it again")]
    RestartPending,
    #[error("Invalid destination: {0}")]
    InvalidDestination(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("Background task failed: {0}")]
    Task(String),
    #[error("Migration state lock poisoned")]
    StatePoisoned,
}

/// Why a single legacy record could not be migrated.
///
/// These never abort a run; they end up as strings in
/// `MigrationReport::errors`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordError {
    pub entity: EntityKind,
    /// Legacy id, or `paper→other` for link rows
    pub record: String,
    pub reason: String,
}

impl RecordError {
    pub fn new(entity: EntityKind, record: impl fmt::Display, reason: impl Into<String>) -> Self {
        Self {
            entity,
            record: record.to_string(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.entity, self.record, self.reason)
    }
}

impl std::error::Error for RecordError {}
