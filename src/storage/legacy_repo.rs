//! Legacy library reader
//!
//! Column values are read leniently: numbers stored as text and text stored
//! as numbers are converted, so only rows the migrator rejects become errors.
//! Entity ids are read strictly: every legacy `id` is an `INTEGER PRIMARY KEY`,
//! which SQLite keeps as the integer rowid.

use rusqlite::types::ValueRef;
use rusqlite::{Connection, Row};
use std::path::Path;

use super::db::open_legacy_database;
use super::stores::LegacyStore;
use crate::error::StoreError;
use crate::models::{
    LegacyAttachment, LegacyAuthor, LegacyCategory, LegacyKeyword, LegacyLabel, LegacyLink,
    LegacyPaper, RelationKind,
};

/// Read-only view of a legacy SQLite library
pub struct SqliteLegacyStore {
    conn: Connection,
}

impl SqliteLegacyStore {
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        Ok(Self {
            conn: open_legacy_database(db_path)?,
        })
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }

    fn query<T>(
        &self,
        sql: &str,
        map: impl FnMut(&Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Vec<T>, StoreError> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([], map)?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row?);
        }
        Ok(items)
    }
}

impl LegacyStore for SqliteLegacyStore {
    fn paper_count(&self) -> Result<u64, StoreError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM papers", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    fn categories(&self) -> Result<Vec<LegacyCategory>, StoreError> {
        self.query(
            "SELECT id, name, parent_id FROM categories ORDER BY id",
            |row| {
                Ok(LegacyCategory {
                    id: row.get(0)?,
                    name: text(row, 1)?,
                    parent_id: integer(row, 2)?,
                })
            },
        )
    }

    fn labels(&self) -> Result<Vec<LegacyLabel>, StoreError> {
        self.query("SELECT id, name, color FROM labels ORDER BY id", |row| {
            Ok(LegacyLabel {
                id: row.get(0)?,
                name: text(row, 1)?,
                color: text(row, 2)?,
            })
        })
    }

    fn authors(&self) -> Result<Vec<LegacyAuthor>, StoreError> {
        self.query("SELECT id, name FROM authors ORDER BY id", |row| {
            Ok(LegacyAuthor {
                id: row.get(0)?,
                name: text(row, 1)?,
            })
        })
    }

    fn keywords(&self) -> Result<Vec<LegacyKeyword>, StoreError> {
        self.query("SELECT id, word FROM keywords ORDER BY id", |row| {
            Ok(LegacyKeyword {
                id: row.get(0)?,
                word: text(row, 1)?,
            })
        })
    }

    fn papers(&self) -> Result<Vec<LegacyPaper>, StoreError> {
        self.query(
            "SELECT id, title, doi, year, journal, abstract, url, added_at
             FROM papers ORDER BY id",
            |row| {
                Ok(LegacyPaper {
                    id: row.get(0)?,
                    title: text(row, 1)?,
                    doi: text(row, 2)?,
                    year: text(row, 3)?,
                    journal: text(row, 4)?,
                    r#abstract: text(row, 5)?,
                    url: text(row, 6)?,
                    added_at: text(row, 7)?,
                })
            },
        )
    }

    fn attachments(&self) -> Result<Vec<LegacyAttachment>, StoreError> {
        self.query(
            "SELECT id, paper_id, file_name, file_path, mime_type, size_bytes
             FROM attachments ORDER BY id",
            |row| {
                Ok(LegacyAttachment {
                    id: row.get(0)?,
                    paper_id: integer(row, 1)?,
                    file_name: text(row, 2)?,
                    file_path: text(row, 3)?,
                    mime_type: text(row, 4)?,
                    size_bytes: integer(row, 5)?,
                })
            },
        )
    }

    fn links(&self, kind: RelationKind) -> Result<Vec<LegacyLink>, StoreError> {
        // Only paper_authors keeps an ordering in legacy libraries
        let position = match kind {
            RelationKind::PaperAuthor => "position",
            _ => "NULL",
        };
        let sql = format!(
            "SELECT paper_id, {other}, {position} FROM {table} ORDER BY paper_id, {other}",
            other = kind.other_column(),
            position = position,
            table = kind.table(),
        );

        self.query(&sql, |row| {
            Ok(LegacyLink {
                paper_id: integer(row, 0)?,
                other_id: integer(row, 1)?,
                position: integer(row, 2)?,
            })
        })
    }
}

/// Column as text, whatever affinity it was stored with
fn text(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<String>> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Null => None,
        ValueRef::Text(bytes) => Some(String::from_utf8_lossy(bytes).to_string()),
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Blob(_) => None,
    })
}

/// Column as an integer; unparseable text reads as NULL
fn integer(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<i64>> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Integer(i) => Some(i),
        ValueRef::Real(f) => Some(f as i64),
        ValueRef::Text(bytes) => String::from_utf8_lossy(bytes).trim().parse().ok(),
        ValueRef::Null | ValueRef::Blob(_) => None,
    })
}
