//! Overview paging: decides when the catalog's loaded window is too thin
//! around the selection and what date range to request next.
//!
//! A request means "up to `count` issues dated at or before `from`, newest
//! first". Identical ranges already in flight are suppressed until they
//! resolve, and a connectivity failure latches the pager: no automatic
//! retries, only an explicit retry trigger or a connectivity-restored signal
//! resumes paging. A range that resolves successfully but empty is
//! remembered as exhausted, so an empty feed or the end of the archive
//! never re-plans the same fetch in a loop.

use std::collections::HashSet;

use chrono::{Duration, NaiveDate};
use tracing::debug;

use crate::catalog::Catalog;
use crate::constants::{EDGE_THRESHOLD, INITIAL_WINDOW, OVERVIEW_PAGE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OverviewRequest {
    pub from: NaiveDate,
    pub count: u32,
}

#[derive(Debug)]
pub struct OverviewPager {
    edge_threshold: usize,
    page_size: u32,
    initial_window: u32,
    in_flight: HashSet<OverviewRequest>,
    /// Ranges the feed answered with zero issues. Re-planning would produce
    /// the identical request forever, so these stay suppressed until an
    /// explicit retry or a reset.
    exhausted: HashSet<OverviewRequest>,
    /// Target date for the initial window; set for deep links into the
    /// archive, otherwise "today".
    target: Option<NaiveDate>,
    stalled: bool,
}

impl Default for OverviewPager {
    fn default() -> Self {
        Self {
            edge_threshold: EDGE_THRESHOLD,
            page_size: OVERVIEW_PAGE,
            initial_window: INITIAL_WINDOW,
            in_flight: HashSet::new(),
            exhausted: HashSet::new(),
            target: None,
            stalled: false,
        }
    }
}

impl OverviewPager {
    pub fn new(edge_threshold: usize, page_size: u32, initial_window: u32) -> Self {
        Self {
            edge_threshold,
            page_size,
            initial_window,
            ..Self::default()
        }
    }

    /// Deep-link target for the next initial window.
    pub fn set_target(&mut self, date: Option<NaiveDate>) {
        self.target = date;
    }

    pub fn is_stalled(&self) -> bool {
        self.stalled
    }

    pub fn has_in_flight(&self) -> bool {
        !self.in_flight.is_empty()
    }

    /// Decide the next overview request, if any, and mark it in flight.
    /// Called on every cursor move and every successful ingestion.
    pub fn next_request(
        &mut self,
        catalog: &Catalog,
        selected: Option<usize>,
        today: NaiveDate,
    ) -> Option<OverviewRequest> {
        if self.stalled {
            return None;
        }
        let req = self.plan(catalog, selected, today)?;
        if self.exhausted.contains(&req) {
            return None;
        }
        if !self.in_flight.insert(req) {
            debug!(from = %req.from, count = req.count, "Overview range already in flight");
            return None;
        }
        debug!(from = %req.from, count = req.count, "Requesting overview page");
        Some(req)
    }

    /// Mark a request resolved. A connectivity failure latches the pager
    /// until `resume` is called.
    pub fn resolve(&mut self, req: OverviewRequest, ok: bool) {
        self.in_flight.remove(&req);
        if !ok {
            self.stalled = true;
        }
    }

    /// The feed had nothing in this range. Remember it so the planner does
    /// not re-issue the identical request on every resolution.
    pub fn mark_exhausted(&mut self, req: OverviewRequest) {
        debug!(from = %req.from, count = req.count, "Overview range exhausted");
        self.exhausted.insert(req);
    }

    /// Manual retry or connectivity-restored signal. Exhausted ranges become
    /// plannable again; the feed may have gained issues since.
    pub fn resume(&mut self) {
        self.stalled = false;
        self.exhausted.clear();
    }

    /// Drop in-flight bookkeeping, e.g. on catalog reset.
    pub fn clear(&mut self) {
        self.in_flight.clear();
        self.exhausted.clear();
        self.stalled = false;
    }

    fn plan(
        &self,
        catalog: &Catalog,
        selected: Option<usize>,
        today: NaiveDate,
    ) -> Option<OverviewRequest> {
        if catalog.is_empty() {
            return Some(OverviewRequest {
                from: self.target.unwrap_or(today),
                count: self.initial_window,
            });
        }

        let len = catalog.len();
        let sel = selected.unwrap_or(0).min(len - 1);

        // Near the old end: page further into the archive.
        if len - 1 - sel < self.edge_threshold {
            let oldest = catalog.oldest_date()?;
            return Some(OverviewRequest {
                from: oldest - Duration::days(1),
                count: self.page_size,
            });
        }

        // Near the new end: fill the gap up to today, if there is one.
        if sel < self.edge_threshold {
            let newest = catalog.newest_date()?;
            let gap = (today - newest).num_days();
            if gap > 0 {
                let count = (gap as u32).min(self.page_size);
                return Some(OverviewRequest {
                    from: newest + Duration::days(count as i64),
                    count,
                });
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{IssueMetadata, IssueRecord};

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn catalog_with(days: &[&str]) -> Catalog {
        let mut cat = Catalog::new();
        for d in days {
            cat.upsert(IssueRecord::from_metadata(IssueMetadata {
                date: date(d),
                reduced: false,
                sections: Vec::new(),
                pages: Vec::new(),
                imprint: None,
                files: Vec::new(),
            }));
        }
        cat
    }

    fn dense_catalog(newest: &str, len: usize) -> Catalog {
        let mut cat = Catalog::new();
        let newest = date(newest);
        for i in 0..len {
            cat.upsert(IssueRecord::from_metadata(IssueMetadata {
                date: newest - Duration::days(i as i64),
                reduced: false,
                sections: Vec::new(),
                pages: Vec::new(),
                imprint: None,
                files: Vec::new(),
            }));
        }
        cat
    }

    #[test]
    fn empty_catalog_requests_initial_window_at_today() {
        let mut pager = OverviewPager::default();
        let req = pager
            .next_request(&Catalog::new(), None, date("2026-03-10"))
            .unwrap();
        assert_eq!(req.from, date("2026-03-10"));
        assert_eq!(req.count, INITIAL_WINDOW);
    }

    #[test]
    fn deep_link_target_overrides_today() {
        let mut pager = OverviewPager::default();
        pager.set_target(Some(date("2025-12-24")));
        let req = pager
            .next_request(&Catalog::new(), None, date("2026-03-10"))
            .unwrap();
        assert_eq!(req.from, date("2025-12-24"));
    }

    #[test]
    fn selection_near_old_end_pages_older() {
        let mut pager = OverviewPager::new(3, 7, 20);
        let cat = dense_catalog("2026-03-10", 10);
        // Selected index 8, one record from the old end.
        let req = pager.next_request(&cat, Some(8), date("2026-03-10")).unwrap();
        assert_eq!(req.from, date("2026-02-28"));
        assert_eq!(req.count, 7);
    }

    #[test]
    fn selection_near_new_end_fills_gap_to_today() {
        let mut pager = OverviewPager::new(3, 7, 20);
        let cat = dense_catalog("2026-03-06", 10);
        let req = pager.next_request(&cat, Some(0), date("2026-03-10")).unwrap();
        // Four missing days, below the page size.
        assert_eq!(req.count, 4);
        assert_eq!(req.from, date("2026-03-10"));
    }

    #[test]
    fn no_request_when_window_is_comfortable() {
        let mut pager = OverviewPager::new(3, 7, 20);
        let cat = dense_catalog("2026-03-10", 20);
        assert_eq!(pager.next_request(&cat, Some(9), date("2026-03-10")), None);
    }

    #[test]
    fn identical_range_in_flight_is_suppressed() {
        let mut pager = OverviewPager::default();
        let today = date("2026-03-10");
        let req = pager.next_request(&Catalog::new(), None, today).unwrap();
        assert_eq!(pager.next_request(&Catalog::new(), None, today), None);
        pager.resolve(req, true);
        assert!(pager.next_request(&Catalog::new(), None, today).is_some());
    }

    #[test]
    fn failure_latches_until_resumed() {
        let mut pager = OverviewPager::default();
        let today = date("2026-03-10");
        let req = pager.next_request(&Catalog::new(), None, today).unwrap();
        pager.resolve(req, false);
        assert!(pager.is_stalled());
        assert_eq!(pager.next_request(&Catalog::new(), None, today), None);
        pager.resume();
        assert!(pager.next_request(&Catalog::new(), None, today).is_some());
    }

    #[test]
    fn exhausted_range_is_not_replanned() {
        let mut pager = OverviewPager::default();
        let today = date("2026-03-10");
        let req = pager.next_request(&Catalog::new(), None, today).unwrap();
        pager.resolve(req, true);
        pager.mark_exhausted(req);
        // The planner would produce the identical request; it stays quiet.
        assert_eq!(pager.next_request(&Catalog::new(), None, today), None);
        assert!(!pager.is_stalled());
        // An explicit retry tries the range again.
        pager.resume();
        assert_eq!(pager.next_request(&Catalog::new(), None, today), Some(req));
    }

    #[test]
    fn no_newer_request_when_catalog_reaches_today() {
        let mut pager = OverviewPager::new(3, 7, 20);
        let cat = catalog_with(&["2026-03-10", "2026-03-09", "2026-03-08",
                                 "2026-03-07", "2026-03-06", "2026-03-05",
                                 "2026-03-04", "2026-03-03", "2026-03-02", "2026-03-01"]);
        // Newest is today and the selection sits clear of both edges.
        assert_eq!(pager.next_request(&cat, Some(4), date("2026-03-10")), None);
    }
}
