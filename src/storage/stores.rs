//! Store seams used by the record migrator
//!
//! The legacy library is only ever read and the target library only ever
//! appended to, so the two sides get separate traits.

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::MigrationConfig;
use crate::error::StoreError;
use crate::models::{
    DataSubtree, EntityKind, LegacyAttachment, LegacyAuthor, LegacyCategory, LegacyKeyword,
    LegacyLabel, LegacyLink, LegacyPaper, NewAttachment, NewAuthor, NewCategory, NewKeyword,
    NewLabel, NewPaper, RelationKind, TargetId, Upsert,
};

use super::data_root::DataRootRegistry;
use super::legacy_repo::SqliteLegacyStore;
use super::target_repo::SqliteTargetStore;

/// Read access to the library being migrated from
pub trait LegacyStore {
    /// Number of papers; this is the "record count" shown to the user
    fn paper_count(&self) -> Result<u64, StoreError>;
    fn categories(&self) -> Result<Vec<LegacyCategory>, StoreError>;
    fn labels(&self) -> Result<Vec<LegacyLabel>, StoreError>;
    fn authors(&self) -> Result<Vec<LegacyAuthor>, StoreError>;
    fn keywords(&self) -> Result<Vec<LegacyKeyword>, StoreError>;
    fn papers(&self) -> Result<Vec<LegacyPaper>, StoreError>;
    fn attachments(&self) -> Result<Vec<LegacyAttachment>, StoreError>;
    fn links(&self, kind: RelationKind) -> Result<Vec<LegacyLink>, StoreError>;
}

/// Insert/count access to the library being migrated to.
///
/// Every `upsert_*` takes the legacy id the record came from. A record an
/// earlier run produced from that same legacy id comes back as
/// [`Upsert::Existing`]; a natural-key match against anything else comes back
/// as [`Upsert::Merged`].
pub trait TargetStore {
    /// Cheap reachability check
    fn ping(&self) -> Result<(), StoreError>;
    fn paper_count(&self) -> Result<u64, StoreError>;
    /// Legacy records of `kind` already accounted for by earlier runs
    fn migrated_count(&self, kind: EntityKind) -> Result<u64, StoreError>;
    fn upsert_category(&self, legacy_id: i64, category: &NewCategory) -> Result<Upsert, StoreError>;
    fn upsert_label(&self, legacy_id: i64, label: &NewLabel) -> Result<Upsert, StoreError>;
    fn upsert_author(&self, legacy_id: i64, author: &NewAuthor) -> Result<Upsert, StoreError>;
    fn upsert_keyword(&self, legacy_id: i64, keyword: &NewKeyword) -> Result<Upsert, StoreError>;
    fn upsert_paper(&self, legacy_id: i64, paper: &NewPaper) -> Result<Upsert, StoreError>;
    fn upsert_attachment(
        &self,
        legacy_id: i64,
        attachment: &NewAttachment,
    ) -> Result<Upsert, StoreError>;
    /// Link a paper to another entity. `Ok(false)` when the link existed.
    fn link(
        &self,
        kind: RelationKind,
        paper_id: &TargetId,
        other_id: &TargetId,
        position: Option<i64>,
    ) -> Result<bool, StoreError>;
}

/// Opens stores on demand so nothing holds a connection between operations
pub trait StoreProvider: Send + Sync {
    fn legacy(&self) -> Result<Box<dyn LegacyStore + Send>, StoreError>;
    /// Target opened read-only; `Ok(None)` when it has not been created yet
    fn target_readonly(&self) -> Result<Option<Box<dyn TargetStore + Send>>, StoreError>;
    /// Target opened for writing, created and migrated if needed
    fn target(&self) -> Result<Box<dyn TargetStore + Send>, StoreError>;
}

/// SQLite files under the current data root's `files/` directory.
///
/// Paths are resolved on every call, so a relocation is picked up without
/// rebuilding the provider.
pub struct SqliteStoreProvider {
    registry: Arc<DataRootRegistry>,
    config: MigrationConfig,
}

impl SqliteStoreProvider {
    pub fn new(registry: Arc<DataRootRegistry>, config: MigrationConfig) -> Self {
        Self { registry, config }
    }

    pub fn legacy_path(&self) -> Result<PathBuf, StoreError> {
        Ok(self.files_dir()?.join(&self.config.legacy_db_file))
    }

    pub fn target_path(&self) -> Result<PathBuf, StoreError> {
        Ok(self.files_dir()?.join(&self.config.target_db_file))
    }

    fn files_dir(&self) -> Result<PathBuf, StoreError> {
        let root = self
            .registry
            .current()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(DataSubtree::Files.path(&root))
    }
}

impl StoreProvider for SqliteStoreProvider {
    fn legacy(&self) -> Result<Box<dyn LegacyStore + Send>, StoreError> {
        Ok(Box::new(SqliteLegacyStore::open(&self.legacy_path()?)?))
    }

    fn target_readonly(&self) -> Result<Option<Box<dyn TargetStore + Send>>, StoreError> {
        let path = self.target_path()?;
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(Box::new(SqliteTargetStore::open_readonly(&path)?)))
    }

    fn target(&self) -> Result<Box<dyn TargetStore + Send>, StoreError> {
        Ok(Box::new(SqliteTargetStore::open(&self.target_path()?)?))
    }
}
