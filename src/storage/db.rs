//! Database connection management and migrations

use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use tracing::info;

use crate::error::StoreError;

/// Latest target schema version this build knows how to create
pub const SCHEMA_VERSION: i32 = 2;

/// Open or create the target library and bring its schema up to date
pub fn open_target_database(db_path: &Path) -> Result<Connection, StoreError> {
    info!("Opening target library at {:?}", db_path);

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            StoreError::ConnectionFailed(format!("Failed to create {:?}: {}", parent, e))
        })?;
    }

    let conn = Connection::open(db_path)
        .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;

    configure(&conn)?;
    run_migrations(&conn)?;

    Ok(conn)
}

/// Open an existing target library without creating or migrating anything
pub fn open_target_readonly(db_path: &Path) -> Result<Connection, StoreError> {
    open_readonly(db_path)
}

/// Open the legacy library. It is never written to.
pub fn open_legacy_database(db_path: &Path) -> Result<Connection, StoreError> {
    info!("Opening legacy library at {:?}", db_path);
    open_readonly(db_path)
}

fn open_readonly(db_path: &Path) -> Result<Connection, StoreError> {
    if !db_path.exists() {
        return Err(StoreError::Unavailable(format!(
            "No library found at {:?}",
            db_path
        )));
    }

    Connection::open_with_flags(
        db_path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|e| StoreError::ConnectionFailed(e.to_string()))
}

fn configure(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;
         PRAGMA synchronous = NORMAL;",
    )
    .map_err(|e| StoreError::MigrationFailed(format!("Failed to configure connection: {}", e)))
}

/// Run database schema migrations
pub(crate) fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    let current_version = schema_version(conn);

    info!("Current schema version: {}", current_version);

    if current_version < 1 {
        info!("Applying migration v1: Initial schema");
        apply_v1_schema(conn)?;
    }

    if current_version < 2 {
        info!("Applying migration v2: Migration provenance");
        apply_v2_schema(conn)?;
    }

    Ok(())
}

/// Schema version of `conn`, 0 when it has never been migrated
pub fn schema_version(conn: &Connection) -> i32 {
    conn.query_row(
        "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
        [],
        |row| row.get(0),
    )
    .unwrap_or(0)
}

fn apply_v1_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(include_str!("schema.sql"))
        .map_err(|e| StoreError::MigrationFailed(format!("Failed to apply v1 schema: {}", e)))
}

fn apply_v2_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(include_str!("migration_v2.sql"))
        .map_err(|e| StoreError::MigrationFailed(format!("Failed to apply v2 schema: {}", e)))
}
