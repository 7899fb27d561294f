//! Carousel selection cursor.
//!
//! Tracks which catalog index the UI centers on and which issue is open for
//! reading. The two are distinct: the user can scroll the carousel away from
//! the issue they are reading. The opened issue is tracked by date rather
//! than index so it survives insertions shifting the catalog underneath it.

use chrono::NaiveDate;
use tracing::warn;

use crate::catalog::Catalog;
use crate::errors::KioskError;
use crate::types::CatalogChange;

#[derive(Debug, Default)]
pub struct SelectionCursor {
    selected: Option<usize>,
    opened: Option<NaiveDate>,
    /// Set by `jump_to_newest`: keep the cursor pinned at index 0 while
    /// overview pages ingest out of order, until an explicit select/move.
    stick_to_newest: bool,
}

impl SelectionCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.selected
    }

    pub fn opened_date(&self) -> Option<NaiveDate> {
        self.opened
    }

    pub fn set_opened(&mut self, date: Option<NaiveDate>) {
        self.opened = date;
    }

    /// Explicit carousel selection. Unpins a prior `jump_to_newest`.
    pub fn select(&mut self, index: usize, len: usize) -> Result<(), KioskError> {
        if index >= len {
            return Err(KioskError::OutOfRange(index));
        }
        self.stick_to_newest = false;
        self.selected = Some(index);
        Ok(())
    }

    /// Home navigation: pin the cursor to the newest record, across future
    /// insertions, until the user selects something else.
    pub fn jump_to_newest(&mut self, len: usize) {
        self.stick_to_newest = true;
        self.selected = if len > 0 { Some(0) } else { None };
    }

    /// Date-picker navigation: exact date or nearest older record.
    pub fn move_to(&mut self, date: NaiveDate, catalog: &Catalog) -> Option<usize> {
        self.stick_to_newest = false;
        self.selected = catalog.nearest_index(date);
        self.selected
    }

    /// Re-derive the cursor after a catalog mutation so it keeps referencing
    /// the same logical issue. `len_after` is the catalog length after the
    /// mutation; `change` carries pre-mutation indices for deletions and
    /// post-mutation indices for insertions.
    pub fn apply(&mut self, change: &CatalogChange, len_after: usize) {
        if len_after == 0 {
            self.selected = None;
            return;
        }
        if self.stick_to_newest {
            self.selected = Some(0);
            return;
        }

        if let Some(sel) = self.selected {
            // Deleting the selected record itself keeps the position, which
            // then points at the next-older record; only earlier deletions
            // shift the cursor. Indices in `deleted` are pre-mutation, so
            // compare all of them against the pre-mutation selection.
            let deleted_self = change.deleted.contains(&sel);
            let before = change.deleted.iter().filter(|&&d| d < sel).count();
            let mut sel = sel - before;
            if let Some(ins) = &change.inserted {
                if ins.start <= sel {
                    sel += ins.len();
                }
            }
            // When the selected record was the oldest entry there is no
            // next-older record to slide in; fall back to the new oldest.
            if deleted_self && sel >= len_after {
                sel = len_after - 1;
            }
            self.selected = Some(self.heal(sel, len_after));
        } else if change.inserted.is_some() {
            // First record of a previously empty catalog becomes the
            // selection.
            self.selected = Some(0);
        }
    }

    // Out-of-range cursors are programming errors; assert in development,
    // clamp to the catalog bounds in production.
    fn heal(&self, index: usize, len: usize) -> usize {
        debug_assert!(index < len, "selection cursor {index} out of bounds {len}");
        if index >= len {
            warn!(index, len, "Selection cursor out of bounds, clamping");
            len - 1
        } else {
            index
        }
    }
}
