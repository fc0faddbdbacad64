//! Record migration from the legacy library into the target store
//!
//! Entities are written parents first (categories, labels, authors,
//! keywords, then papers and attachments) and relation rows last, so every
//! reference can be resolved through the legacy-id maps built along the way.
//! A record that cannot be migrated is reported and skipped; the run itself
//! always produces a report.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Instant;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::error::{RecordError, StoreError};
use crate::models::{
    normalize_doi, EntityKind, LegacyAttachment, LegacyCategory, LegacyPaper, MigrationProgress,
    MigrationReport, MigrationStatus, NewAttachment, NewAuthor, NewCategory, NewKeyword,
    NewLabel, NewPaper, RelationKind, TargetId, Upsert,
};
use crate::storage::{LegacyStore, TargetStore};

/// Emit a progress event every this many records of one kind
const PROGRESS_INTERVAL: u64 = 25;

/// Years outside this range are treated as data-entry errors
const YEAR_RANGE: std::ops::RangeInclusive<i32> = 1000..=2100;

/// Compare record counts and decide whether a migration is worth offering.
///
/// `target` is `None` when the target library has not been created yet,
/// which counts as an empty but reachable store.
pub fn readiness(legacy: &dyn LegacyStore, target: Option<&dyn TargetStore>) -> MigrationStatus {
    let source = match legacy.paper_count() {
        Ok(count) => count,
        Err(e) => {
            return MigrationStatus {
                can_migrate: false,
                source_record_count: 0,
                target_record_count: 0,
                message: format!("The legacy library could not be read: {}", e),
            }
        }
    };

    // Papers the target already holds from earlier runs, not raw row counts:
    // merged papers and papers created in the new library would skew those
    let target_count = match target {
        None => 0,
        Some(target) => match target
            .ping()
            .and_then(|_| target.migrated_count(EntityKind::Paper))
        {
            Ok(count) => count,
            Err(e) => {
                return MigrationStatus {
                    can_migrate: false,
                    source_record_count: source,
                    target_record_count: 0,
                    message: format!("The new library is not reachable: {}", e),
                }
            }
        },
    };

    let (can_migrate, message) = if source == 0 {
        (false, "The legacy library has no papers to migrate".to_string())
    } else if source > target_count {
        (
            true,
            format!(
                "{} papers in the legacy library, {} already migrated",
                source, target_count
            ),
        )
    } else {
        (false, "The new library is already up to date".to_string())
    };

    MigrationStatus {
        can_migrate,
        source_record_count: source,
        target_record_count: target_count,
        message,
    }
}

/// Legacy id -> target id, one map per entity kind
#[derive(Debug, Default)]
struct IdentityMap {
    by_kind: HashMap<EntityKind, HashMap<i64, TargetId>>,
}

impl IdentityMap {
    fn insert(&mut self, kind: EntityKind, legacy_id: i64, target_id: TargetId) {
        self.by_kind
            .entry(kind)
            .or_default()
            .insert(legacy_id, target_id);
    }

    fn get(&self, kind: EntityKind, legacy_id: i64) -> Option<&TargetId> {
        self.by_kind.get(&kind).and_then(|ids| ids.get(&legacy_id))
    }
}

/// Counters for a run in progress; only `finish` hands out a report
#[derive(Debug, Default)]
struct ReportBuilder {
    migrated: HashMap<EntityKind, u64>,
    papers_attempted: u64,
    skipped_existing: u64,
    merged: u64,
    errors: Vec<String>,
}

impl ReportBuilder {
    fn migrated(&mut self, kind: EntityKind) {
        *self.migrated.entry(kind).or_default() += 1;
    }

    fn skipped(&mut self, kind: EntityKind, record: impl std::fmt::Display) {
        debug!("{} {} already present in target", kind, record);
        self.skipped_existing += 1;
    }

    fn merged(&mut self, kind: EntityKind, record: i64, with: Option<i64>) {
        match with {
            Some(with) => debug!("{} {} merged into {} {}", kind, record, kind, with),
            None => debug!("{} {} merged into an existing {}", kind, record, kind),
        }
        self.merged += 1;
    }

    fn record_error(&mut self, err: RecordError) {
        warn!("Skipping {}", err);
        self.errors.push(err.to_string());
    }

    fn listing_failed(&mut self, kind: EntityKind, err: &StoreError) {
        warn!("Could not read {} records: {}", kind, err);
        self.errors
            .push(format!("could not read {} records: {}", kind, err));
    }

    fn count(&self, kind: EntityKind) -> u64 {
        self.migrated.get(&kind).copied().unwrap_or(0)
    }

    fn finish(self, started_at: DateTime<Utc>, started: Instant) -> MigrationReport {
        MigrationReport {
            papers_migrated: self.count(EntityKind::Paper),
            authors_migrated: self.count(EntityKind::Author),
            keywords_migrated: self.count(EntityKind::Keyword),
            labels_migrated: self.count(EntityKind::Label),
            categories_migrated: self.count(EntityKind::Category),
            attachments_migrated: self.count(EntityKind::Attachment),
            paper_author_relations: self.count(EntityKind::PaperAuthor),
            paper_label_relations: self.count(EntityKind::PaperLabel),
            paper_category_relations: self.count(EntityKind::PaperCategory),
            paper_keyword_relations: self.count(EntityKind::PaperKeyword),
            papers_attempted: self.papers_attempted,
            records_skipped_existing: self.skipped_existing,
            records_merged: self.merged,
            errors: self.errors,
            duration_ms: started.elapsed().as_millis() as u64,
            started_at,
            finished_at: Utc::now(),
        }
    }
}

pub struct RecordMigrator<'a> {
    legacy: &'a dyn LegacyStore,
    target: &'a dyn TargetStore,
    progress: Option<UnboundedSender<MigrationProgress>>,
}

impl<'a> RecordMigrator<'a> {
    pub fn new(legacy: &'a dyn LegacyStore, target: &'a dyn TargetStore) -> Self {
        Self {
            legacy,
            target,
            progress: None,
        }
    }

    /// Send [`MigrationProgress`] events while running
    pub fn with_progress(mut self, progress: UnboundedSender<MigrationProgress>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn status(&self) -> MigrationStatus {
        readiness(self.legacy, Some(self.target))
    }

    /// Migrate everything; per-record failures end up in `errors`
    pub fn run(&self) -> MigrationReport {
        let started = Instant::now();
        let started_at = Utc::now();
        let mut ids = IdentityMap::default();
        let mut report = ReportBuilder::default();
        info!("Record migration started");

        self.migrate_categories(&mut ids, &mut report);

        self.migrate_each(
            EntityKind::Label,
            self.legacy.labels(),
            &mut ids,
            &mut report,
            |label| label.id,
            |label, _| {
                let name = required(&label.name)
                    .ok_or_else(|| RecordError::new(EntityKind::Label, label.id, "missing name"))?;
                self.store(EntityKind::Label, label.id, self.target.upsert_label(label.id, &NewLabel {
                    name,
                    color: label.color.clone().filter(|c| !c.trim().is_empty()),
                }))
            },
        );

        self.migrate_each(
            EntityKind::Author,
            self.legacy.authors(),
            &mut ids,
            &mut report,
            |author| author.id,
            |author, _| {
                let name = required(&author.name)
                    .ok_or_else(|| RecordError::new(EntityKind::Author, author.id, "missing name"))?;
                self.store(EntityKind::Author, author.id, self.target.upsert_author(author.id, &NewAuthor { name }))
            },
        );

        self.migrate_each(
            EntityKind::Keyword,
            self.legacy.keywords(),
            &mut ids,
            &mut report,
            |keyword| keyword.id,
            |keyword, _| {
                let word = required(&keyword.word)
                    .ok_or_else(|| RecordError::new(EntityKind::Keyword, keyword.id, "missing word"))?;
                self.store(EntityKind::Keyword, keyword.id, self.target.upsert_keyword(keyword.id, &NewKeyword { word }))
            },
        );

        let papers = self.legacy.papers();
        if let Ok(rows) = &papers {
            report.papers_attempted = rows.len() as u64;
        }
        self.migrate_each(
            EntityKind::Paper,
            papers,
            &mut ids,
            &mut report,
            |paper| paper.id,
            |paper, _| {
                let new_paper = paper_from_legacy(paper)?;
                self.store(EntityKind::Paper, paper.id, self.target.upsert_paper(paper.id, &new_paper))
            },
        );

        self.migrate_each(
            EntityKind::Attachment,
            self.legacy.attachments(),
            &mut ids,
            &mut report,
            |attachment| attachment.id,
            |attachment, ids| {
                let new_attachment = attachment_from_legacy(attachment, ids)?;
                self.store(
                    EntityKind::Attachment,
                    attachment.id,
                    self.target.upsert_attachment(attachment.id, &new_attachment),
                )
            },
        );

        for kind in RelationKind::ALL {
            self.migrate_links(kind, &ids, &mut report);
        }

        let report = report.finish(started_at, started);
        info!(
            "Record migration finished in {}ms: {} records migrated, {} already present, {} errors",
            report.duration_ms,
            report.total_migrated(),
            report.records_skipped_existing,
            report.errors.len()
        );
        report
    }

    /// Run `write` over every row, mapping ids and counting outcomes
    fn migrate_each<T>(
        &self,
        kind: EntityKind,
        rows: Result<Vec<T>, StoreError>,
        ids: &mut IdentityMap,
        report: &mut ReportBuilder,
        legacy_id: impl Fn(&T) -> i64,
        mut write: impl FnMut(&T, &IdentityMap) -> Result<Upsert, RecordError>,
    ) {
        let rows = match rows {
            Ok(rows) => rows,
            Err(e) => {
                report.listing_failed(kind, &e);
                return;
            }
        };

        let total = rows.len() as u64;
        debug!("Migrating {} {} records", total, kind);
        for (i, row) in rows.iter().enumerate() {
            let id = legacy_id(row);
            match write(row, ids) {
                Ok(Upsert::Inserted(target_id)) => {
                    ids.insert(kind, id, target_id);
                    report.migrated(kind);
                }
                Ok(Upsert::Existing(target_id)) => {
                    ids.insert(kind, id, target_id);
                    report.skipped(kind, id);
                }
                // Two legacy papers sharing a DOI lose one of them; say so
                Ok(Upsert::Merged { id: target_id, with }) if kind == EntityKind::Paper => {
                    ids.insert(kind, id, target_id);
                    let reason = match with {
                        Some(with) => format!("same DOI as paper {}, merged into it", with),
                        None => "same DOI as a paper already in the new library, merged into it"
                            .to_string(),
                    };
                    report.record_error(RecordError::new(kind, id, reason));
                }
                Ok(Upsert::Merged { id: target_id, with }) => {
                    ids.insert(kind, id, target_id);
                    report.merged(kind, id, with);
                }
                Err(e) => report.record_error(e),
            }
            self.report_progress(kind, i as u64 + 1, total);
        }
    }

    fn migrate_categories(&self, ids: &mut IdentityMap, report: &mut ReportBuilder) {
        let ordered = self.legacy.categories().map(parents_first);

        self.migrate_each(
            EntityKind::Category,
            ordered,
            ids,
            report,
            |(category, _)| category.id,
            |(category, detached), ids| {
                let name = required(&category.name).ok_or_else(|| {
                    RecordError::new(EntityKind::Category, category.id, "missing name")
                })?;

                let parent_id = match category.parent_id.filter(|_| !*detached) {
                    Some(parent) => match ids.get(EntityKind::Category, parent) {
                        Some(id) => Some(id.clone()),
                        None => {
                            warn!(
                                "Category {} migrated as a root: parent {} was not migrated",
                                category.id, parent
                            );
                            None
                        }
                    },
                    None => None,
                };

                self.store(
                    EntityKind::Category,
                    category.id,
                    self.target.upsert_category(category.id, &NewCategory { name, parent_id }),
                )
            },
        );
    }

    fn migrate_links(&self, kind: RelationKind, ids: &IdentityMap, report: &mut ReportBuilder) {
        let entity = relation_entity(kind);
        let other_kind = endpoint_kind(kind);

        let links = match self.legacy.links(kind) {
            Ok(links) => links,
            Err(e) => {
                report.listing_failed(entity, &e);
                return;
            }
        };

        let total = links.len() as u64;
        for (i, link) in links.iter().enumerate() {
            let endpoint = |id: Option<i64>| id.map_or_else(|| "?".to_string(), |id| id.to_string());
            let record = format!("{}->{}", endpoint(link.paper_id), endpoint(link.other_id));
            let endpoints = match (link.paper_id, link.other_id) {
                (None, _) => Err(RecordError::new(entity, &record, "missing paper reference")),
                (_, None) => Err(RecordError::new(
                    entity,
                    &record,
                    format!("missing {} reference", other_kind),
                )),
                (Some(paper_id), Some(other_id)) => match (
                    ids.get(EntityKind::Paper, paper_id),
                    ids.get(other_kind, other_id),
                ) {
                    (Some(paper), Some(other)) => Ok((paper, other)),
                    (None, _) => Err(RecordError::new(
                        entity,
                        &record,
                        format!("paper {} was not migrated", paper_id),
                    )),
                    (_, None) => Err(RecordError::new(
                        entity,
                        &record,
                        format!("{} {} was not migrated", other_kind, other_id),
                    )),
                },
            };

            match endpoints {
                Ok((paper, other)) => match self.target.link(kind, paper, other, link.position) {
                    Ok(true) => report.migrated(entity),
                    Ok(false) => report.skipped(entity, &record),
                    Err(e) => report.record_error(RecordError::new(entity, &record, e.to_string())),
                },
                Err(e) => report.record_error(e),
            }
            self.report_progress(entity, i as u64 + 1, total);
        }
    }

    fn store(
        &self,
        kind: EntityKind,
        legacy_id: i64,
        result: Result<Upsert, StoreError>,
    ) -> Result<Upsert, RecordError> {
        result.map_err(|e| RecordError::new(kind, legacy_id, e.to_string()))
    }

    fn report_progress(&self, entity: EntityKind, processed: u64, total: u64) {
        if processed % PROGRESS_INTERVAL != 0 && processed != total {
            return;
        }
        if let Some(progress) = &self.progress {
            // Receiver gone means nobody is watching; the run carries on
            let _ = progress.send(MigrationProgress {
                entity,
                processed,
                total,
            });
        }
    }
}

fn relation_entity(kind: RelationKind) -> EntityKind {
    match kind {
        RelationKind::PaperAuthor => EntityKind::PaperAuthor,
        RelationKind::PaperLabel => EntityKind::PaperLabel,
        RelationKind::PaperCategory => EntityKind::PaperCategory,
        RelationKind::PaperKeyword => EntityKind::PaperKeyword,
    }
}

fn endpoint_kind(kind: RelationKind) -> EntityKind {
    match kind {
        RelationKind::PaperAuthor => EntityKind::Author,
        RelationKind::PaperLabel => EntityKind::Label,
        RelationKind::PaperCategory => EntityKind::Category,
        RelationKind::PaperKeyword => EntityKind::Keyword,
    }
}

/// Order categories so every parent precedes its children.
///
/// The flag marks categories that must become roots: their parent is
/// missing from the legacy library, or they sit on a parent cycle.
fn parents_first(categories: Vec<LegacyCategory>) -> Vec<(LegacyCategory, bool)> {
    let known: HashSet<i64> = categories.iter().map(|c| c.id).collect();
    let mut placed = HashSet::new();
    let mut ordered = Vec::with_capacity(categories.len());
    let mut pending = categories;

    while !pending.is_empty() {
        let before = pending.len();
        let mut waiting = Vec::new();

        for category in pending {
            match category.parent_id {
                None => {
                    placed.insert(category.id);
                    ordered.push((category, false));
                }
                Some(parent) if !known.contains(&parent) => {
                    warn!(
                        "Category {} has unknown parent {}; migrating it as a root",
                        category.id, parent
                    );
                    placed.insert(category.id);
                    ordered.push((category, true));
                }
                Some(parent) if placed.contains(&parent) => {
                    placed.insert(category.id);
                    ordered.push((category, false));
                }
                Some(_) => waiting.push(category),
            }
        }

        if waiting.len() == before {
            let category = waiting.remove(0);
            warn!(
                "Category {} is part of a parent cycle; migrating it as a root",
                category.id
            );
            placed.insert(category.id);
            ordered.push((category, true));
        }
        pending = waiting;
    }

    ordered
}

/// Trimmed value, or `None` when missing or blank
fn required(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn parse_year(raw: Option<&str>) -> Result<Option<i32>, String> {
    let raw = match raw.map(str::trim).filter(|v| !v.is_empty()) {
        Some(raw) => raw,
        None => return Ok(None),
    };
    match raw.parse::<i32>() {
        Ok(year) if YEAR_RANGE.contains(&year) => Ok(Some(year)),
        _ => Err(format!("invalid year '{}'", raw)),
    }
}

/// Legacy timestamps come in a few shapes; unknown ones fall back to now
fn parse_added_at(raw: Option<&str>) -> DateTime<Utc> {
    let raw = match raw.map(str::trim).filter(|v| !v.is_empty()) {
        Some(raw) => raw,
        None => return Utc::now(),
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return dt.and_utc();
    }
    if let Some(dt) = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        return dt.and_utc();
    }

    debug!("Unrecognised added_at '{}', using current time", raw);
    Utc::now()
}

fn paper_from_legacy(paper: &LegacyPaper) -> Result<NewPaper, RecordError> {
    let title = required(&paper.title)
        .ok_or_else(|| RecordError::new(EntityKind::Paper, paper.id, "missing title"))?;
    let year = parse_year(paper.year.as_deref())
        .map_err(|reason| RecordError::new(EntityKind::Paper, paper.id, reason))?;

    Ok(NewPaper {
        title,
        doi: paper.doi.as_deref().and_then(normalize_doi),
        year,
        journal: required(&paper.journal),
        r#abstract: required(&paper.r#abstract),
        url: required(&paper.url),
        added_at: parse_added_at(paper.added_at.as_deref()),
    })
}

fn attachment_from_legacy(
    attachment: &LegacyAttachment,
    ids: &IdentityMap,
) -> Result<NewAttachment, RecordError> {
    let error = |reason: String| RecordError::new(EntityKind::Attachment, attachment.id, reason);

    let legacy_paper = attachment
        .paper_id
        .ok_or_else(|| error("missing paper reference".to_string()))?;
    let paper_id = ids
        .get(EntityKind::Paper, legacy_paper)
        .ok_or_else(|| error(format!("paper {} was not migrated", legacy_paper)))?;

    let file_path = required(&attachment.file_path);
    let file_name = required(&attachment.file_name)
        .or_else(|| {
            file_path
                .as_deref()
                .and_then(|p| Path::new(p).file_name())
                .map(|n| n.to_string_lossy().to_string())
        })
        .ok_or_else(|| error("missing file name and path".to_string()))?;

    Ok(NewAttachment {
        paper_id: paper_id.clone(),
        file_name,
        file_path,
        mime_type: required(&attachment.mime_type),
        size_bytes: attachment.size_bytes.filter(|size| *size >= 0),
    })
}
