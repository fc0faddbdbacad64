//! Records as read from the legacy library and as written to the target store
//!
//! Legacy rows are read leniently (most columns optional) so a malformed row
//! reaches the migrator, which turns it into a per-record error instead of
//! failing the whole read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier assigned by the target store
pub type TargetId = String;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct LegacyCategory {
    pub id: i64,
    pub name: Option<String>,
    pub parent_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct LegacyLabel {
    pub id: i64,
    pub name: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct LegacyAuthor {
    pub id: i64,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct LegacyKeyword {
    pub id: i64,
    pub word: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct LegacyPaper {
    pub id: i64,
    pub title: Option<String>,
    pub doi: Option<String>,
    /// Kept as text: legacy libraries store things like "n.d." here
    pub year: Option<String>,
    pub journal: Option<String>,
    pub r#abstract: Option<String>,
    pub url: Option<String>,
    pub added_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct LegacyAttachment {
    pub id: i64,
    pub paper_id: Option<i64>,
    pub file_name: Option<String>,
    pub file_path: Option<String>,
    pub mime_type: Option<String>,
    pub size_bytes: Option<i64>,
}

/// Row of one of the paper link tables
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct LegacyLink {
    /// Link tables carry no constraints, so either endpoint may be unreadable
    pub paper_id: Option<i64>,
    pub other_id: Option<i64>,
    pub position: Option<i64>,
}

/// Many-to-many tables hanging off papers
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    PaperAuthor,
    PaperLabel,
    PaperCategory,
    PaperKeyword,
}

impl RelationKind {
    pub const ALL: [RelationKind; 4] = [
        RelationKind::PaperAuthor,
        RelationKind::PaperLabel,
        RelationKind::PaperCategory,
        RelationKind::PaperKeyword,
    ];

    pub fn table(&self) -> &'static str {
        match self {
            RelationKind::PaperAuthor => "paper_authors",
            RelationKind::PaperLabel => "paper_labels",
            RelationKind::PaperCategory => "paper_categories",
            RelationKind::PaperKeyword => "paper_keywords",
        }
    }

    /// Column holding the non-paper endpoint
    pub fn other_column(&self) -> &'static str {
        match self {
            RelationKind::PaperAuthor => "author_id",
            RelationKind::PaperLabel => "label_id",
            RelationKind::PaperCategory => "category_id",
            RelationKind::PaperKeyword => "keyword_id",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewCategory {
    pub name: String,
    pub parent_id: Option<TargetId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewLabel {
    pub name: String,
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewAuthor {
    pub name: String,
}

impl NewAuthor {
    pub fn name_key(&self) -> String {
        normalize_key(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewKeyword {
    pub word: String,
}

impl NewKeyword {
    pub fn word_key(&self) -> String {
        normalize_key(&self.word)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPaper {
    pub title: String,
    pub doi: Option<String>,
    pub year: Option<i32>,
    pub journal: Option<String>,
    pub r#abstract: Option<String>,
    pub url: Option<String>,
    pub added_at: DateTime<Utc>,
}

impl NewPaper {
    pub fn title_key(&self) -> String {
        normalize_key(&self.title)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewAttachment {
    pub paper_id: TargetId,
    pub file_name: String,
    pub file_path: Option<String>,
    pub mime_type: Option<String>,
    pub size_bytes: Option<i64>,
}

/// Result of writing a record to the target store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Upsert {
    Inserted(TargetId),
    /// An earlier run already migrated this same legacy record
    Existing(TargetId),
    /// Folded into a record with the same natural key. `with` is the legacy
    /// record that produced it, `None` when it was created outside a migration.
    Merged { id: TargetId, with: Option<i64> },
}

impl Upsert {
    pub fn id(&self) -> &TargetId {
        match self {
            Upsert::Inserted(id) | Upsert::Existing(id) | Upsert::Merged { id, .. } => id,
        }
    }

    pub fn was_inserted(&self) -> bool {
        matches!(self, Upsert::Inserted(_))
    }
}

/// Lower-case and collapse whitespace so "Smith,  John" matches "smith, john"
pub fn normalize_key(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Canonical DOI form: lower-case, without resolver or `doi:` prefixes
pub fn normalize_doi(doi: &str) -> Option<String> {
    let trimmed = doi.trim();
    let lower = trimmed.to_lowercase();
    let stripped = ["https://doi.org/", "http://doi.org/", "https://dx.doi.org/", "http://dx.doi.org/", "doi:"]
        .iter()
        .find_map(|prefix| lower.strip_prefix(prefix))
        .unwrap_or(&lower)
        .trim();

    if stripped.is_empty() {
        None
    } else {
        Some(stripped.to_string())
    }
}
