//! Kiosk facade - composes catalog, cursor, pager and orchestrator behind
//! the surface the UI calls.
//!
//! Threading discipline: the kiosk is single-writer. Every catalog and
//! cursor mutation happens on the thread that owns the `Kiosk`, either
//! inside a synchronous API call or inside `pump()`, which drains the
//! completions that background tasks posted to the event channel. The
//! network tasks themselves never touch the catalog.

mod downloads;
mod events;

pub use events::{DownloadStage, KioskEvent, KioskNotice};

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::catalog::Catalog;
use crate::clock::Clock;
use crate::cursor::SelectionCursor;
use crate::errors::KioskError;
use crate::feed::FeedClient;
use crate::orchestrator::{BeginOpen, DownloadOrchestrator};
use crate::pager::OverviewPager;
use crate::settings::Settings;
use crate::store::Store;
use crate::types::{AuthState, CatalogChange, IssueRecord, IssueStatus};

pub type SubscriptionId = u64;

/// Everything the kiosk needs at creation time. Explicit so tests can stand
/// up an isolated instance without app-wide state.
pub struct KioskContext {
    pub feed: Arc<dyn FeedClient>,
    pub store: Store,
    pub settings: Settings,
    pub clock: Arc<dyn Clock>,
    pub runtime: tokio::runtime::Handle,
}

pub struct Kiosk {
    feed_id: String,
    catalog: Catalog,
    cursor: SelectionCursor,
    pager: OverviewPager,
    orchestrator: DownloadOrchestrator,
    store: Store,
    feed: Arc<dyn FeedClient>,
    clock: Arc<dyn Clock>,
    runtime: tokio::runtime::Handle,
    request_timeout: Duration,
    events_tx: mpsc::UnboundedSender<KioskEvent>,
    events_rx: mpsc::UnboundedReceiver<KioskEvent>,
    observers: Vec<(SubscriptionId, Box<dyn FnMut(&KioskNotice) + Send>)>,
    next_subscription: SubscriptionId,
    /// Dates whose open failed on authentication, newest attempt last.
    pending_auth: Vec<NaiveDate>,
    /// Issues past sessions finished downloading, seeded from the store so
    /// overview records rehydrate straight to `Complete`.
    completed: HashSet<NaiveDate>,
}

impl Kiosk {
    pub fn new(ctx: KioskContext) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let settings = ctx.settings;
        let completed = Self::load_completed(&ctx.store, &settings.feed);
        Self {
            feed_id: settings.feed.clone(),
            catalog: Catalog::new(),
            cursor: SelectionCursor::new(),
            pager: OverviewPager::new(
                settings.edge_threshold,
                settings.overview_page,
                settings.initial_window,
            ),
            orchestrator: DownloadOrchestrator::new(),
            store: ctx.store,
            feed: ctx.feed,
            clock: ctx.clock,
            runtime: ctx.runtime,
            request_timeout: Duration::from_secs(settings.request_timeout_secs),
            events_tx,
            events_rx,
            observers: Vec::new(),
            next_subscription: 0,
            pending_auth: Vec::new(),
            completed,
        }
    }

    fn load_completed(store: &Store, feed: &str) -> HashSet<NaiveDate> {
        match store.complete_dates(feed) {
            Ok(dates) => dates.into_iter().collect(),
            Err(e) => {
                warn!(feed = %feed, error = %e, "Failed to load completed issues");
                HashSet::new()
            }
        }
    }

    // ------------------------------------------------------------------
    // Read-only accessors
    // ------------------------------------------------------------------

    pub fn feed_id(&self) -> &str {
        &self.feed_id
    }

    pub fn len(&self) -> usize {
        self.catalog.len()
    }

    pub fn is_empty(&self) -> bool {
        self.catalog.is_empty()
    }

    pub fn record(&self, index: usize) -> Option<&IssueRecord> {
        self.catalog.record(index)
    }

    pub fn records(&self) -> &[IssueRecord] {
        self.catalog.records()
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.cursor.selected_index()
    }

    pub fn selected_record(&self) -> Option<&IssueRecord> {
        self.catalog.record(self.cursor.selected_index()?)
    }

    pub fn opened_record(&self) -> Option<&IssueRecord> {
        self.catalog.record_for(self.cursor.opened_date()?)
    }

    /// True while a user-initiated download is in flight.
    pub fn is_busy(&self) -> bool {
        self.orchestrator.active().is_some()
    }

    pub fn overview_stalled(&self) -> bool {
        self.pager.is_stalled()
    }

    // ------------------------------------------------------------------
    // Observers
    // ------------------------------------------------------------------

    /// Register a typed observer. Scoped to this instance; no global
    /// broadcast.
    pub fn subscribe(
        &mut self,
        observer: impl FnMut(&KioskNotice) + Send + 'static,
    ) -> SubscriptionId {
        self.next_subscription += 1;
        let id = self.next_subscription;
        self.observers.push((id, Box::new(observer)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) {
        self.observers.retain(|(sub, _)| *sub != id);
    }

    pub(crate) fn notify(&mut self, notice: KioskNotice) {
        for (_, observer) in &mut self.observers {
            observer(&notice);
        }
    }

    fn notify_change(&mut self, change: CatalogChange) {
        if !change.is_empty() {
            self.notify(KioskNotice::Catalog(change));
        }
    }

    // ------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------

    /// Center the carousel on `index`.
    pub fn select(&mut self, index: usize) -> Result<(), KioskError> {
        self.cursor.select(index, self.catalog.len())?;
        self.maybe_page();
        Ok(())
    }

    /// Home navigation: pin the cursor to the newest issue. On an empty
    /// catalog this also kicks off the initial overview window.
    pub fn jump_to_newest(&mut self) {
        self.cursor.jump_to_newest(self.catalog.len());
        self.maybe_page();
    }

    /// Date-picker navigation: exact date or nearest older record.
    pub fn move_to(&mut self, date: NaiveDate) -> Option<usize> {
        let selected = self.cursor.move_to(date, &self.catalog);
        if selected.is_none() {
            // Deep link into an unloaded part of the archive.
            self.pager.set_target(Some(date));
        }
        self.maybe_page();
        selected
    }

    // ------------------------------------------------------------------
    // Issue operations
    // ------------------------------------------------------------------

    /// Open the issue at `index` for reading. Kicks the download state
    /// machine; completion lands through `pump()`. Rejects with `Busy` while
    /// a different issue's user-initiated download is in flight; calling it
    /// again for the same issue is an idempotent no-op.
    pub fn open(&mut self, index: usize) -> Result<(), KioskError> {
        let record = self
            .catalog
            .record(index)
            .ok_or(KioskError::OutOfRange(index))?;
        if record.status == IssueStatus::Stub {
            return Err(KioskError::NotReady);
        }
        let date = record.date;
        let prior = record.status;

        match self.orchestrator.begin_open(date, prior)? {
            BeginOpen::AlreadyInFlight => Ok(()),
            BeginOpen::Started(generation) => {
                self.run_needs_update_check(date, generation);
                Ok(())
            }
        }
    }

    /// Re-run a failed open. Only valid for records in `Error` status.
    pub fn retry(&mut self, index: usize) -> Result<(), KioskError> {
        let record = self
            .catalog
            .record(index)
            .ok_or(KioskError::OutOfRange(index))?;
        if record.status != IssueStatus::Error {
            return Err(KioskError::NotRetryable);
        }
        self.open(index)
    }

    /// Delete the issue at `index`. Refused while downloading; a record
    /// carrying reader bookmarks needs `confirmed` to guard against
    /// accidental destruction.
    pub fn delete(&mut self, index: usize, confirmed: bool) -> Result<(), KioskError> {
        let record = self
            .catalog
            .record(index)
            .ok_or(KioskError::OutOfRange(index))?;
        if record.is_downloading() || self.orchestrator.is_open_in_flight(record.date) {
            return Err(KioskError::DownloadInProgress);
        }
        if record.has_bookmarks() && !confirmed {
            return Err(KioskError::ConfirmationRequired);
        }
        let date = record.date;

        if self.cursor.opened_date() == Some(date) {
            self.cursor.set_opened(None);
        }
        if let Err(e) = self.store.remove_issue(&self.feed_id, date) {
            warn!(date = %date, error = %e, "Failed to drop issue rows from store");
        }
        self.completed.remove(&date);
        if let Some(change) = self.catalog.remove(date) {
            self.cursor.apply(&change, self.catalog.len());
            self.notify_change(change);
        }
        info!(date = %date, "Issue deleted");
        Ok(())
    }

    /// Record the reader's position for session continuation. Called only by
    /// the reading UI.
    pub fn set_resume_position(
        &mut self,
        index: usize,
        section: Option<u32>,
        article: Option<u32>,
    ) -> Result<(), KioskError> {
        let record = self
            .catalog
            .record(index)
            .ok_or(KioskError::OutOfRange(index))?;
        let date = record.date;
        if let Err(e) = self.store.set_resume(&self.feed_id, date, section, article) {
            warn!(date = %date, error = %e, "Failed to persist resume position");
        }
        if let Some(change) = self.catalog.set_resume(date, section, article) {
            self.notify_change(change);
        }
        Ok(())
    }

    /// Explicit user cancellation of the in-flight open, e.g. leaving the
    /// app mid-download. The record reverts to its prior status so a later
    /// retry is possible.
    pub fn abandon_open(&mut self) {
        if let Some(abandoned) = self.orchestrator.abandon() {
            if let Some(change) = self.catalog.set_status(abandoned.date, abandoned.prior_status) {
                self.notify_change(change);
            }
        }
    }

    // ------------------------------------------------------------------
    // Catalog lifetime
    // ------------------------------------------------------------------

    /// Forced reload: drop everything in memory and invalidate the cursor.
    /// Local files and resume positions survive; they rehydrate when the
    /// overview comes back.
    pub fn reset(&mut self) {
        self.abandon_open();
        self.cursor.set_opened(None);
        let change = self.catalog.reset();
        self.cursor.apply(&change, 0);
        self.pager.clear();
        self.notify_change(change);
        info!(feed = %self.feed_id, "Catalog reset");
    }

    /// Switch to a different feed edition: reset plus a fresh initial
    /// window.
    pub fn switch_feed(&mut self, feed_id: impl Into<String>) {
        self.feed_id = feed_id.into();
        self.completed = Self::load_completed(&self.store, &self.feed_id);
        self.reset();
        self.jump_to_newest();
    }

    // ------------------------------------------------------------------
    // Environment signals
    // ------------------------------------------------------------------

    /// Manual retry after an overview fetch failure.
    pub fn retry_overview(&mut self) {
        self.pager.resume();
        self.maybe_page();
    }

    /// Connectivity came back; paging may proceed again. Retries are never
    /// automatic.
    pub fn connectivity_restored(&mut self) {
        self.pager.resume();
        self.maybe_page();
    }

    /// Authentication-state hook from the feed environment. Once valid
    /// again, the most recently blocked open is re-run; earlier blocked
    /// records stay user-retryable with their status intact.
    pub fn auth_state_changed(&mut self, state: AuthState) {
        if state != AuthState::Valid {
            return;
        }
        let retry = self.pending_auth.pop();
        self.pending_auth.clear();
        if let Some(date) = retry {
            if let Some(index) = self.catalog.index_of(date) {
                info!(date = %date, "Re-running open after re-authentication");
                if let Err(e) = self.open(index) {
                    warn!(date = %date, error = %e, "Post-auth reopen rejected");
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Event pump
    // ------------------------------------------------------------------

    /// Drain completions posted by background tasks and apply them on the
    /// owner thread. Call from the UI tick. Returns the number of events
    /// handled.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    pub(crate) fn maybe_page(&mut self) {
        let today = self.clock.today();
        if let Some(request) =
            self.pager
                .next_request(&self.catalog, self.cursor.selected_index(), today)
        {
            self.spawn_overview_fetch(request);
        }
    }
}
