//! Services module for the migration engine
//!
//! This module contains the validator, relocator and record migrator, and
//! the coordinator that sequences them for the desktop layer.

pub mod coordinator;
pub mod file_relocator;
pub mod path_validator;
pub mod record_migrator;

pub use coordinator::{MigrationCoordinator, RelocationHandle, RestartTrigger};
pub use file_relocator::FileRelocator;
pub use path_validator::{PathValidator, SAME_LOCATION_ERROR};
pub use record_migrator::{readiness, RecordMigrator};
