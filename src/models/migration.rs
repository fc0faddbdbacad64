use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use std::fmt;

/// Every kind of record the migrator moves, in the order it moves them
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Category,
    Label,
    Author,
    Keyword,
    Paper,
    Attachment,
    PaperAuthor,
    PaperLabel,
    PaperCategory,
    PaperKeyword,
}

impl EntityKind {
    pub const MIGRATION_ORDER: [EntityKind; 10] = [
        EntityKind::Category,
        EntityKind::Label,
        EntityKind::Author,
        EntityKind::Keyword,
        EntityKind::Paper,
        EntityKind::Attachment,
        EntityKind::PaperAuthor,
        EntityKind::PaperLabel,
        EntityKind::PaperCategory,
        EntityKind::PaperKeyword,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Category => "category",
            EntityKind::Label => "label",
            EntityKind::Author => "author",
            EntityKind::Keyword => "keyword",
            EntityKind::Paper => "paper",
            EntityKind::Attachment => "attachment",
            EntityKind::PaperAuthor => "paper-author link",
            EntityKind::PaperLabel => "paper-label link",
            EntityKind::PaperCategory => "paper-category link",
            EntityKind::PaperKeyword => "paper-keyword link",
        }
    }

    pub fn is_relation(&self) -> bool {
        matches!(
            self,
            EntityKind::PaperAuthor
                | EntityKind::PaperLabel
                | EntityKind::PaperCategory
                | EntityKind::PaperKeyword
        )
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a record migration is worth offering
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MigrationStatus {
    pub can_migrate: bool,
    pub source_record_count: u64,
    pub target_record_count: u64,
    pub message: String,
}

/// Final result of a record migration run.
///
/// Built privately by the migrator and handed out only once the run is over.
/// A non-empty `errors` list means some records were skipped, not that the
/// run failed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MigrationReport {
    pub papers_migrated: u64,
    pub authors_migrated: u64,
    pub keywords_migrated: u64,
    pub labels_migrated: u64,
    pub categories_migrated: u64,
    pub attachments_migrated: u64,
    pub paper_author_relations: u64,
    pub paper_label_relations: u64,
    pub paper_category_relations: u64,
    pub paper_keyword_relations: u64,
    /// Legacy papers the run tried to migrate, successful or not
    pub papers_attempted: u64,
    /// Records an earlier run already migrated from the same legacy record
    pub records_skipped_existing: u64,
    /// Authors, keywords, labels, categories and attachments folded into an
    /// existing record with the same natural key. Merged papers are errors.
    pub records_merged: u64,
    pub errors: Vec<String>,
    pub duration_ms: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl MigrationReport {
    /// Entities plus relations created by this run
    pub fn total_migrated(&self) -> u64 {
        self.papers_migrated
            + self.authors_migrated
            + self.keywords_migrated
            + self.labels_migrated
            + self.categories_migrated
            + self.attachments_migrated
            + self.paper_author_relations
            + self.paper_label_relations
            + self.paper_category_relations
            + self.paper_keyword_relations
    }
}

/// Progress event emitted while a record migration runs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MigrationProgress {
    pub entity: EntityKind,
    pub processed: u64,
    pub total: u64,
}
