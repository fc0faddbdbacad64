//! Target library writer
//!
//! Every upsert first checks `migrated_records` for the legacy record it is
//! given. Only that provenance makes a re-run skip a record; a natural-key
//! match against a record some other legacy row produced is a merge, and is
//! reported as one.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Params};
use std::path::Path;
use uuid::Uuid;

use super::db::{open_target_database, open_target_readonly, run_migrations};
use super::stores::TargetStore;
use crate::error::StoreError;
use crate::models::{
    normalize_doi, EntityKind, NewAttachment, NewAuthor, NewCategory, NewKeyword, NewLabel,
    NewPaper, RelationKind, TargetId, Upsert,
};

pub struct SqliteTargetStore {
    conn: Connection,
}

impl SqliteTargetStore {
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        Ok(Self {
            conn: open_target_database(db_path)?,
        })
    }

    pub fn open_readonly(db_path: &Path) -> Result<Self, StoreError> {
        Ok(Self {
            conn: open_target_readonly(db_path)?,
        })
    }

    /// In-memory target with the full schema
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        run_migrations(&conn)?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Row count of an arbitrary target table
    pub fn count(&self, table: &str) -> Result<u64, StoreError> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", table),
            [],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    fn find_id<P: Params>(&self, sql: &str, params: P) -> Result<Option<TargetId>, StoreError> {
        Ok(self
            .conn
            .query_row(sql, params, |row| row.get::<_, String>(0))
            .optional()?)
    }

    fn has_table(&self, name: &str) -> Result<bool, StoreError> {
        let found: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
            [name],
            |row| row.get(0),
        )?;
        Ok(found > 0)
    }

    /// Target record an earlier run created from this legacy record
    fn migrated_id(&self, kind: EntityKind, legacy_id: i64) -> Result<Option<TargetId>, StoreError> {
        self.find_id(
            "SELECT target_id FROM migrated_records WHERE entity = ? AND legacy_id = ?",
            params![kind.as_str(), legacy_id],
        )
    }

    /// Lowest legacy id already mapped onto `target_id`
    fn produced_by(&self, kind: EntityKind, target_id: &TargetId) -> Result<Option<i64>, StoreError> {
        Ok(self
            .conn
            .query_row(
                "SELECT MIN(legacy_id) FROM migrated_records WHERE entity = ? AND target_id = ?",
                params![kind.as_str(), target_id],
                |row| row.get::<_, Option<i64>>(0),
            )?)
    }

    /// Provenance check, natural-key match, then insert; all in one transaction
    fn upsert_with(
        &self,
        kind: EntityKind,
        legacy_id: i64,
        natural: impl FnOnce(&Connection) -> Result<Option<TargetId>, StoreError>,
        insert: impl FnOnce(&Connection, &TargetId) -> Result<(), StoreError>,
    ) -> Result<Upsert, StoreError> {
        if let Some(id) = self.migrated_id(kind, legacy_id)? {
            return Ok(Upsert::Existing(id));
        }

        let tx = self.conn.unchecked_transaction()?;
        let upsert = match natural(&tx)? {
            Some(id) => Upsert::Merged {
                with: self.produced_by(kind, &id)?,
                id,
            },
            None => {
                let id = new_id();
                insert(&tx, &id)?;
                Upsert::Inserted(id)
            }
        };
        tx.execute(
            "INSERT INTO migrated_records (entity, legacy_id, target_id, migrated_at)
             VALUES (?, ?, ?, ?)",
            params![kind.as_str(), legacy_id, upsert.id(), Utc::now().to_rfc3339()],
        )?;
        tx.commit()?;
        Ok(upsert)
    }
}

fn new_id() -> TargetId {
    Uuid::new_v4().to_string()
}

fn find_in<P: Params>(conn: &Connection, sql: &str, params: P) -> Result<Option<TargetId>, StoreError> {
    Ok(conn
        .query_row(sql, params, |row| row.get::<_, String>(0))
        .optional()?)
}

impl TargetStore for SqliteTargetStore {
    fn ping(&self) -> Result<(), StoreError> {
        self.conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }

    fn paper_count(&self) -> Result<u64, StoreError> {
        self.count("papers")
    }

    fn migrated_count(&self, kind: EntityKind) -> Result<u64, StoreError> {
        // Opened read-only, a library from before provenance tracking has no table
        if !self.has_table("migrated_records")? {
            return Ok(0);
        }
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM migrated_records WHERE entity = ?",
            [kind.as_str()],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    fn upsert_category(&self, legacy_id: i64, category: &NewCategory) -> Result<Upsert, StoreError> {
        self.upsert_with(
            EntityKind::Category,
            legacy_id,
            |conn| {
                find_in(
                    conn,
                    "SELECT id FROM categories WHERE name = ? AND parent_id IS ?",
                    params![category.name, category.parent_id],
                )
            },
            |conn, id| {
                conn.execute(
                    "INSERT INTO categories (id, name, parent_id, created_at) VALUES (?, ?, ?, ?)",
                    params![id, category.name, category.parent_id, Utc::now().to_rfc3339()],
                )?;
                Ok(())
            },
        )
    }

    fn upsert_label(&self, legacy_id: i64, label: &NewLabel) -> Result<Upsert, StoreError> {
        self.upsert_with(
            EntityKind::Label,
            legacy_id,
            |conn| find_in(conn, "SELECT id FROM labels WHERE name = ?", [&label.name]),
            |conn, id| {
                conn.execute(
                    "INSERT INTO labels (id, name, color, created_at) VALUES (?, ?, ?, ?)",
                    params![id, label.name, label.color, Utc::now().to_rfc3339()],
                )?;
                Ok(())
            },
        )
    }

    fn upsert_author(&self, legacy_id: i64, author: &NewAuthor) -> Result<Upsert, StoreError> {
        let key = author.name_key();
        self.upsert_with(
            EntityKind::Author,
            legacy_id,
            |conn| find_in(conn, "SELECT id FROM authors WHERE name_key = ?", [&key]),
            |conn, id| {
                conn.execute(
                    "INSERT INTO authors (id, name, name_key, created_at) VALUES (?, ?, ?, ?)",
                    params![id, author.name, key, Utc::now().to_rfc3339()],
                )?;
                Ok(())
            },
        )
    }

    fn upsert_keyword(&self, legacy_id: i64, keyword: &NewKeyword) -> Result<Upsert, StoreError> {
        let key = keyword.word_key();
        self.upsert_with(
            EntityKind::Keyword,
            legacy_id,
            |conn| find_in(conn, "SELECT id FROM keywords WHERE word_key = ?", [&key]),
            |conn, id| {
                conn.execute(
                    "INSERT INTO keywords (id, word, word_key, created_at) VALUES (?, ?, ?, ?)",
                    params![id, keyword.word, key, Utc::now().to_rfc3339()],
                )?;
                Ok(())
            },
        )
    }

    /// Papers only ever match on DOI; same-titled papers stay distinct
    fn upsert_paper(&self, legacy_id: i64, paper: &NewPaper) -> Result<Upsert, StoreError> {
        let doi = paper.doi.as_deref().and_then(normalize_doi);
        self.upsert_with(
            EntityKind::Paper,
            legacy_id,
            |conn| match &doi {
                Some(doi) => find_in(conn, "SELECT id FROM papers WHERE doi = ?", [doi]),
                None => Ok(None),
            },
            |conn, id| {
                conn.execute(
                    "INSERT INTO papers (
                        id, title, title_key, doi, year, journal, abstract, url, added_at, created_at
                    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    params![
                        id,
                        paper.title,
                        paper.title_key(),
                        doi,
                        paper.year,
                        paper.journal,
                        paper.r#abstract,
                        paper.url,
                        paper.added_at.to_rfc3339(),
                        Utc::now().to_rfc3339(),
                    ],
                )?;
                Ok(())
            },
        )
    }

    fn upsert_attachment(
        &self,
        legacy_id: i64,
        attachment: &NewAttachment,
    ) -> Result<Upsert, StoreError> {
        self.upsert_with(
            EntityKind::Attachment,
            legacy_id,
            |conn| {
                find_in(
                    conn,
                    "SELECT id FROM attachments WHERE paper_id = ? AND file_name = ?",
                    params![attachment.paper_id, attachment.file_name],
                )
            },
            |conn, id| {
                conn.execute(
                    "INSERT INTO attachments (
                        id, paper_id, file_name, file_path, mime_type, size_bytes, created_at
                    ) VALUES (?, ?, ?, ?, ?, ?, ?)",
                    params![
                        id,
                        attachment.paper_id,
                        attachment.file_name,
                        attachment.file_path,
                        attachment.mime_type,
                        attachment.size_bytes,
                        Utc::now().to_rfc3339(),
                    ],
                )?;
                Ok(())
            },
        )
    }

    fn link(
        &self,
        kind: RelationKind,
        paper_id: &TargetId,
        other_id: &TargetId,
        position: Option<i64>,
    ) -> Result<bool, StoreError> {
        let sql = format!(
            "INSERT OR IGNORE INTO {} (paper_id, {}, position) VALUES (?, ?, ?)",
            kind.table(),
            kind.other_column(),
        );
        let inserted = self.conn.execute(&sql, params![paper_id, other_id, position])?;
        Ok(inserted > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn paper(title: &str, doi: Option<&str>, year: Option<i32>) -> NewPaper {
        NewPaper {
            title: title.to_string(),
            doi: doi.map(str::to_string),
            year,
            journal: None,
            r#abstract: None,
            url: None,
            added_at: Utc::now(),
        }
    }

    #[test]
    fn test_same_legacy_record_is_recognised() {
        let store = SqliteTargetStore::open_in_memory().unwrap();
        let first = store.upsert_paper(1, &paper("A", None, None)).unwrap();
        let again = store.upsert_paper(1, &paper("A", None, None)).unwrap();

        assert!(first.was_inserted());
        assert_eq!(again, Upsert::Existing(first.id().clone()));
        assert_eq!(store.paper_count().unwrap(), 1);
        assert_eq!(store.migrated_count(EntityKind::Paper).unwrap(), 1);
    }

    #[test]
    fn test_same_title_papers_stay_distinct() {
        let store = SqliteTargetStore::open_in_memory().unwrap();
        let first = store.upsert_paper(1, &paper("Introduction", None, None)).unwrap();
        let second = store.upsert_paper(2, &paper("introduction", None, None)).unwrap();
        let dated = store.upsert_paper(3, &paper("Introduction", None, Some(2015))).unwrap();

        assert!(first.was_inserted());
        assert!(second.was_inserted());
        assert!(dated.was_inserted());
        assert_ne!(first.id(), second.id());
        assert_eq!(store.paper_count().unwrap(), 3);
    }

    #[test]
    fn test_shared_doi_is_a_merge() {
        let store = SqliteTargetStore::open_in_memory().unwrap();
        let first = store
            .upsert_paper(1, &paper("A", Some("10.1/X"), Some(2020)))
            .unwrap();
        let second = store
            .upsert_paper(2, &paper("A (preprint)", Some("https://doi.org/10.1/x"), None))
            .unwrap();

        assert_eq!(
            second,
            Upsert::Merged {
                id: first.id().clone(),
                with: Some(1),
            }
        );
        assert_eq!(store.paper_count().unwrap(), 1);
        assert_eq!(store.migrated_count(EntityKind::Paper).unwrap(), 2);

        // The merge is remembered, so a re-run sees it as already migrated
        let rerun = store
            .upsert_paper(2, &paper("A (preprint)", Some("10.1/x"), None))
            .unwrap();
        assert_eq!(rerun, Upsert::Existing(first.id().clone()));
    }

    #[test]
    fn test_merge_into_record_created_outside_migration() {
        let store = SqliteTargetStore::open_in_memory().unwrap();
        store
            .connection()
            .execute(
                "INSERT INTO authors (id, name, name_key, created_at) VALUES ('native', 'Ada', 'ada', 'now')",
                [],
            )
            .unwrap();

        let upsert = store.upsert_author(7, &NewAuthor { name: "ADA".into() }).unwrap();
        assert_eq!(
            upsert,
            Upsert::Merged {
                id: "native".to_string(),
                with: None,
            }
        );
    }

    #[test]
    fn test_category_key_includes_parent() {
        let store = SqliteTargetStore::open_in_memory().unwrap();
        let root = store
            .upsert_category(1, &NewCategory { name: "Physics".into(), parent_id: None })
            .unwrap();
        let child = store
            .upsert_category(
                2,
                &NewCategory {
                    name: "Physics".into(),
                    parent_id: Some(root.id().clone()),
                },
            )
            .unwrap();
        let root_again = store
            .upsert_category(1, &NewCategory { name: "Physics".into(), parent_id: None })
            .unwrap();

        assert!(child.was_inserted());
        assert_eq!(root_again, Upsert::Existing(root.id().clone()));
        assert_eq!(store.count("categories").unwrap(), 2);
    }

    #[test]
    fn test_link_is_idempotent() {
        let store = SqliteTargetStore::open_in_memory().unwrap();
        let paper = store.upsert_paper(1, &paper("P", None, None)).unwrap();
        let author = store
            .upsert_author(1, &NewAuthor { name: "Ada Lovelace".into() })
            .unwrap();

        assert!(store
            .link(RelationKind::PaperAuthor, paper.id(), author.id(), Some(0))
            .unwrap());
        assert!(!store
            .link(RelationKind::PaperAuthor, paper.id(), author.id(), Some(0))
            .unwrap());
        assert_eq!(store.count("paper_authors").unwrap(), 1);
    }

    #[test]
    fn test_link_to_unknown_paper_fails() {
        let store = SqliteTargetStore::open_in_memory().unwrap();
        let label = store
            .upsert_label(1, &NewLabel { name: "to-read".into(), color: None })
            .unwrap();

        let result = store.link(
            RelationKind::PaperLabel,
            &"missing".to_string(),
            label.id(),
            None,
        );
        assert!(result.is_err());
    }
}
