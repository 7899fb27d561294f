//! Single source of truth for known issues: ordering, de-duplication,
//! monotonic upsert.
//!
//! The catalog is a plain `Vec` kept strictly descending by date. Overview
//! responses may arrive in any order and overlap, so `upsert` is commutative
//! and idempotent: a record for an existing date replaces in place, a new
//! date is spliced in at its sorted position, and a record strictly less
//! complete than what is already there is dropped. No network or UI side
//! effects originate here; every mutation is synchronous and returns a
//! [`CatalogChange`] diff for observers.

use chrono::NaiveDate;
use std::ops::Range;
use tracing::debug;

use crate::types::{CatalogChange, IssueRecord, IssueStatus};

/// Outcome of a single `upsert`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    /// New date, inserted at the sorted position.
    Inserted(usize),
    /// Existing date, replaced in place.
    Updated(usize),
    /// Existing record was more complete; incoming record dropped.
    Kept(usize),
}

impl Upsert {
    pub fn index(self) -> usize {
        match self {
            Upsert::Inserted(i) | Upsert::Updated(i) | Upsert::Kept(i) => i,
        }
    }

    pub fn change(self) -> CatalogChange {
        match self {
            Upsert::Inserted(i) => CatalogChange::inserted_at(i),
            Upsert::Updated(i) => CatalogChange::updated_at(i),
            Upsert::Kept(_) => CatalogChange::default(),
        }
    }
}

#[derive(Debug, Default)]
pub struct Catalog {
    records: Vec<IssueRecord>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn record(&self, index: usize) -> Option<&IssueRecord> {
        self.records.get(index)
    }

    pub fn records(&self) -> &[IssueRecord] {
        &self.records
    }

    pub fn newest_date(&self) -> Option<NaiveDate> {
        self.records.first().map(|r| r.date)
    }

    pub fn oldest_date(&self) -> Option<NaiveDate> {
        self.records.last().map(|r| r.date)
    }

    /// Exact index of `date`, if present.
    pub fn index_of(&self, date: NaiveDate) -> Option<usize> {
        self.search(date).ok()
    }

    pub fn record_for(&self, date: NaiveDate) -> Option<&IssueRecord> {
        self.index_of(date).map(|i| &self.records[i])
    }

    /// Index of `date` or of the nearest older record. `None` only when the
    /// catalog is empty.
    pub fn nearest_index(&self, date: NaiveDate) -> Option<usize> {
        if self.records.is_empty() {
            return None;
        }
        match self.search(date) {
            Ok(i) => Some(i),
            // Insertion point: records past it are older than `date`.
            Err(i) => Some(i.min(self.records.len() - 1)),
        }
    }

    /// Indices within `radius` records of the nearest record to `date`.
    /// Used by the pager to detect gaps around the selection.
    pub fn window(&self, around: NaiveDate, radius: usize) -> Range<usize> {
        match self.nearest_index(around) {
            Some(center) => {
                let start = center.saturating_sub(radius);
                let end = (center + radius + 1).min(self.records.len());
                start..end
            }
            None => 0..0,
        }
    }

    /// Insert or replace the record for its date.
    ///
    /// A record already present wins over a strictly less complete incoming
    /// one, so a stale overview response resolving late cannot downgrade a
    /// record that reached `Complete` in the meantime. Replacement preserves
    /// the existing resume position, which only the reading UI writes.
    pub fn upsert(&mut self, mut record: IssueRecord) -> Upsert {
        match self.search(record.date) {
            Ok(i) => {
                let existing = &self.records[i];
                if record.status.completeness() < existing.status.completeness() {
                    debug!(
                        date = %record.date,
                        existing = ?existing.status,
                        incoming = ?record.status,
                        "Upsert dropped, existing record more complete"
                    );
                    return Upsert::Kept(i);
                }
                record.last_read_section = existing.last_read_section;
                record.last_read_article = existing.last_read_article;
                self.records[i] = record;
                Upsert::Updated(i)
            }
            Err(i) => {
                self.records.insert(i, record);
                Upsert::Inserted(i)
            }
        }
    }

    /// Overwrite only the status of the record at `date`, bypassing the
    /// completeness guard. This is the orchestrator's transition channel;
    /// overview ingestion must go through `upsert`.
    pub fn set_status(&mut self, date: NaiveDate, status: IssueStatus) -> Option<CatalogChange> {
        let i = self.index_of(date)?;
        if self.records[i].status == status {
            return Some(CatalogChange::default());
        }
        self.records[i].status = status;
        Some(CatalogChange::updated_at(i))
    }

    /// Record the reader's resume position. Only the reading UI calls this.
    pub fn set_resume(
        &mut self,
        date: NaiveDate,
        section: Option<u32>,
        article: Option<u32>,
    ) -> Option<CatalogChange> {
        let i = self.index_of(date)?;
        self.records[i].last_read_section = section;
        self.records[i].last_read_article = article;
        Some(CatalogChange::updated_at(i))
    }

    /// Delete the record for `date`. Download-state guards live in the
    /// facade; the catalog itself only maintains ordering.
    pub fn remove(&mut self, date: NaiveDate) -> Option<CatalogChange> {
        let i = self.index_of(date)?;
        self.records.remove(i);
        Some(CatalogChange::deleted_at(i))
    }

    /// Empty the catalog. Used on feed switch or forced reload.
    pub fn reset(&mut self) -> CatalogChange {
        let deleted: Vec<usize> = (0..self.records.len()).collect();
        self.records.clear();
        CatalogChange {
            deleted,
            ..CatalogChange::default()
        }
    }

    // Binary search over the descending-by-date sequence. Ok(i) is an exact
    // match, Err(i) the sorted insertion point.
    fn search(&self, date: NaiveDate) -> Result<usize, usize> {
        self.records.binary_search_by(|r| date.cmp(&r.date))
    }
}
