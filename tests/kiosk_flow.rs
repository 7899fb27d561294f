//! End-to-end flows over the kiosk facade with a scripted feed client.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use newsstand::clock::FixedClock;
use newsstand::errors::{FeedError, KioskError};
use newsstand::feed::FeedClient;
use newsstand::kiosk::{Kiosk, KioskContext, KioskEvent, KioskNotice};
use newsstand::pager::OverviewRequest;
use newsstand::settings::Settings;
use newsstand::store::Store;
use newsstand::types::{AuthState, FileEntry, IssueMetadata, IssueStatus, SectionMeta};

fn date(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

fn issue_meta(d: NaiveDate) -> IssueMetadata {
    IssueMetadata {
        date: d,
        reduced: false,
        sections: vec![
            SectionMeta { index: 0, title: "Front".into(), article_count: 8 },
            SectionMeta { index: 1, title: "Culture".into(), article_count: 5 },
        ],
        pages: Vec::new(),
        imprint: None,
        files: vec![
            FileEntry { name: "front.html".into(), size: 100, section: 0 },
            FileEntry { name: "rest.html".into(), size: 200, section: 1 },
        ],
    }
}

/// Feed client with scripted failures and a hold gate for in-flight
/// downloads.
#[derive(Default)]
struct MockFeed {
    overview_errors: Mutex<VecDeque<FeedError>>,
    overview_calls: AtomicUsize,
    empty_overviews: AtomicBool,
    download_results: Mutex<VecDeque<Result<(), FeedError>>>,
    download_calls: Mutex<Vec<(NaiveDate, Vec<String>)>>,
    hold_downloads: AtomicBool,
    release: Notify,
}

impl MockFeed {
    fn script_download(&self, result: Result<(), FeedError>) {
        self.download_results.lock().unwrap().push_back(result);
    }

    fn serve_empty(&self) {
        self.empty_overviews.store(true, Ordering::SeqCst);
    }

    fn overview_count(&self) -> usize {
        self.overview_calls.load(Ordering::SeqCst)
    }

    fn hold(&self) {
        self.hold_downloads.store(true, Ordering::SeqCst);
    }

    fn release_downloads(&self) {
        self.hold_downloads.store(false, Ordering::SeqCst);
        self.release.notify_waiters();
    }

    fn calls_for(&self, d: NaiveDate) -> usize {
        self.download_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(cd, _)| *cd == d)
            .count()
    }
}

#[async_trait]
impl FeedClient for MockFeed {
    async fn fetch_overview(
        &self,
        _feed: &str,
        from: NaiveDate,
        count: u32,
    ) -> Result<Vec<IssueMetadata>, FeedError> {
        self.overview_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = self.overview_errors.lock().unwrap().pop_front() {
            return Err(e);
        }
        if self.empty_overviews.load(Ordering::SeqCst) {
            return Ok(Vec::new());
        }
        Ok((0..count)
            .map(|i| issue_meta(from - chrono::Duration::days(i as i64)))
            .collect())
    }

    async fn download_files(
        &self,
        _feed: &str,
        d: NaiveDate,
        files: &[FileEntry],
        _token: CancellationToken,
    ) -> Result<(), FeedError> {
        self.download_calls
            .lock()
            .unwrap()
            .push((d, files.iter().map(|f| f.name.clone()).collect()));
        if self.hold_downloads.load(Ordering::SeqCst) {
            self.release.notified().await;
        }
        self.download_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(()))
    }

    fn auth_state(&self) -> AuthState {
        AuthState::Valid
    }
}

const TODAY: &str = "2026-03-10";

fn kiosk_with(feed: Arc<MockFeed>) -> Kiosk {
    kiosk_with_store(feed, Store::open_in_memory().unwrap())
}

fn kiosk_with_store(feed: Arc<MockFeed>, store: Store) -> Kiosk {
    let settings = Settings {
        feed: "daily".into(),
        edge_threshold: 2,
        overview_page: 5,
        initial_window: 20,
        request_timeout_secs: 5,
        ..Settings::default()
    };
    Kiosk::new(KioskContext {
        feed,
        store,
        settings,
        clock: Arc::new(FixedClock(date(TODAY))),
        runtime: tokio::runtime::Handle::current(),
    })
}

/// Pump until the predicate holds or a bounded wait elapses.
async fn pump_until(kiosk: &mut Kiosk, mut pred: impl FnMut(&Kiosk) -> bool) {
    for _ in 0..400 {
        kiosk.pump();
        if pred(kiosk) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached");
}

/// Ingest an overview page synchronously, bypassing the network.
fn inject_page(kiosk: &mut Kiosk, newest: &str, count: u32) {
    let from = date(newest);
    let issues = (0..count)
        .map(|i| issue_meta(from - chrono::Duration::days(i as i64)))
        .collect();
    kiosk.handle_event(KioskEvent::OverviewResolved {
        request: OverviewRequest { from, count },
        result: Ok(issues),
    });
}

#[tokio::test]
async fn initial_window_lands_with_cursor_on_newest() {
    let feed = Arc::new(MockFeed::default());
    let mut kiosk = kiosk_with(feed);

    assert_eq!(kiosk.selected_index(), None);
    kiosk.jump_to_newest();
    pump_until(&mut kiosk, |k| k.len() == 20).await;

    assert_eq!(kiosk.selected_index(), Some(0));
    assert_eq!(kiosk.record(0).unwrap().date, date(TODAY));
    assert_eq!(kiosk.record(0).unwrap().status, IssueStatus::Overview);
    // Strictly descending, no duplicates.
    let dates: Vec<_> = kiosk.records().iter().map(|r| r.date).collect();
    let mut sorted = dates.clone();
    sorted.sort_unstable_by(|a, b| b.cmp(a));
    sorted.dedup();
    assert_eq!(dates, sorted);
}

#[tokio::test]
async fn open_downloads_section_zero_then_completes_in_background() {
    let feed = Arc::new(MockFeed::default());
    let mut kiosk = kiosk_with(feed.clone());
    inject_page(&mut kiosk, TODAY, 3);

    kiosk.open(0).unwrap();
    assert!(kiosk.is_busy());
    pump_until(&mut kiosk, |k| {
        k.record(0).unwrap().status == IssueStatus::Complete
    })
    .await;
    assert!(!kiosk.is_busy());
    assert_eq!(kiosk.opened_record().unwrap().date, date(TODAY));

    // Section zero first, then the full manifest.
    let calls = feed.download_calls.lock().unwrap();
    assert_eq!(calls[0].1, vec!["front.html"]);
    assert_eq!(calls[1].1, vec!["front.html", "rest.html"]);
}

#[tokio::test]
async fn open_while_other_download_in_flight_is_busy() {
    let feed = Arc::new(MockFeed::default());
    let mut kiosk = kiosk_with(feed.clone());
    inject_page(&mut kiosk, TODAY, 3);

    feed.hold();
    kiosk.open(0).unwrap();
    assert_eq!(kiosk.open(1), Err(KioskError::Busy));

    feed.release_downloads();
    pump_until(&mut kiosk, |k| !k.is_busy()).await;

    // After the first resolves, the second open succeeds.
    kiosk.open(1).unwrap();
    pump_until(&mut kiosk, |k| !k.is_busy()).await;
    assert_eq!(kiosk.record(1).unwrap().status, IssueStatus::Complete);
}

#[tokio::test]
async fn reopening_in_flight_issue_issues_no_second_request() {
    let feed = Arc::new(MockFeed::default());
    let mut kiosk = kiosk_with(feed.clone());
    inject_page(&mut kiosk, TODAY, 2);

    feed.hold();
    kiosk.open(0).unwrap();
    kiosk.open(0).unwrap(); // idempotent re-attach
    // Await the spawned section-zero task; the hold gate keeps it in flight.
    pump_until(&mut kiosk, |_| feed.calls_for(date(TODAY)) == 1).await;

    feed.release_downloads();
    pump_until(&mut kiosk, |k| !k.is_busy()).await;
    // Section zero plus background full, nothing more.
    assert_eq!(feed.calls_for(date(TODAY)), 2);
}

#[tokio::test]
async fn delete_is_refused_while_downloading() {
    let feed = Arc::new(MockFeed::default());
    let mut kiosk = kiosk_with(feed.clone());
    inject_page(&mut kiosk, TODAY, 2);

    feed.hold();
    kiosk.open(0).unwrap();
    assert_eq!(kiosk.delete(0, true), Err(KioskError::DownloadInProgress));
    assert_eq!(kiosk.len(), 2);

    feed.release_downloads();
    pump_until(&mut kiosk, |k| !k.is_busy()).await;
    let before = kiosk.len();
    kiosk.delete(0, true).unwrap();
    assert_eq!(kiosk.len(), before - 1);
}

#[tokio::test]
async fn delete_with_bookmarks_needs_confirmation() {
    let feed = Arc::new(MockFeed::default());
    let mut kiosk = kiosk_with(feed);
    inject_page(&mut kiosk, TODAY, 2);

    kiosk.set_resume_position(0, Some(1), Some(3)).unwrap();
    assert_eq!(kiosk.delete(0, false), Err(KioskError::ConfirmationRequired));
    kiosk.delete(0, true).unwrap();
    assert_eq!(kiosk.len(), 1);
}

#[tokio::test]
async fn transient_failure_marks_error_and_retry_recovers() {
    let feed = Arc::new(MockFeed::default());
    let mut kiosk = kiosk_with(feed.clone());
    inject_page(&mut kiosk, TODAY, 2);

    let failures = Arc::new(Mutex::new(Vec::new()));
    let sink = failures.clone();
    kiosk.subscribe(move |notice| {
        if let KioskNotice::DownloadFailed(d) = notice {
            sink.lock().unwrap().push(*d);
        }
    });

    feed.script_download(Err(FeedError::Network("connection reset".into())));
    kiosk.open(0).unwrap();
    pump_until(&mut kiosk, |k| {
        k.record(0).unwrap().status == IssueStatus::Error
    })
    .await;
    assert!(!kiosk.is_busy());
    assert_eq!(failures.lock().unwrap().as_slice(), &[date(TODAY)]);

    // Retry re-enters the check and reaches opened/complete.
    kiosk.retry(0).unwrap();
    pump_until(&mut kiosk, |k| {
        k.record(0).unwrap().status == IssueStatus::Complete
    })
    .await;
    assert_eq!(kiosk.opened_record().unwrap().date, date(TODAY));
}

#[tokio::test]
async fn retry_on_non_error_record_is_rejected() {
    let feed = Arc::new(MockFeed::default());
    let mut kiosk = kiosk_with(feed);
    inject_page(&mut kiosk, TODAY, 1);
    assert_eq!(kiosk.retry(0), Err(KioskError::NotRetryable));
}

#[tokio::test]
async fn auth_failure_parks_record_and_reauth_reopens() {
    let feed = Arc::new(MockFeed::default());
    let mut kiosk = kiosk_with(feed.clone());
    inject_page(&mut kiosk, TODAY, 2);

    let auth_dates = Arc::new(Mutex::new(Vec::new()));
    let sink = auth_dates.clone();
    kiosk.subscribe(move |notice| {
        if let KioskNotice::AuthRequired(d) = notice {
            sink.lock().unwrap().push(*d);
        }
    });

    feed.script_download(Err(FeedError::Auth));
    kiosk.open(0).unwrap();
    pump_until(&mut kiosk, |k| !k.is_busy()).await;

    // Not a permanent error; the record fell back to its prior status.
    assert_eq!(kiosk.record(0).unwrap().status, IssueStatus::Overview);
    assert_eq!(auth_dates.lock().unwrap().as_slice(), &[date(TODAY)]);

    kiosk.auth_state_changed(AuthState::Valid);
    pump_until(&mut kiosk, |k| {
        k.record(0).unwrap().status == IssueStatus::Complete
    })
    .await;
}

#[tokio::test]
async fn insert_before_selection_keeps_selected_date() {
    let feed = Arc::new(MockFeed::default());
    let mut kiosk = kiosk_with(feed);
    inject_page(&mut kiosk, "2026-03-08", 5);

    kiosk.select(2).unwrap();
    let selected_date = kiosk.selected_record().unwrap().date;

    // Two newer issues arrive and land before the selection.
    inject_page(&mut kiosk, TODAY, 2);
    assert_eq!(kiosk.len(), 7);
    assert_eq!(kiosk.selected_index(), Some(4));
    assert_eq!(kiosk.selected_record().unwrap().date, selected_date);
}

#[tokio::test]
async fn overview_failure_stalls_until_manual_retry() {
    let feed = Arc::new(MockFeed::default());
    let mut kiosk = kiosk_with(feed.clone());

    feed.overview_errors
        .lock()
        .unwrap()
        .push_back(FeedError::Network("offline".into()));
    kiosk.jump_to_newest();
    pump_until(&mut kiosk, |k| k.overview_stalled()).await;
    assert!(kiosk.is_empty());

    // No automatic retry; an explicit trigger resumes paging.
    kiosk.retry_overview();
    pump_until(&mut kiosk, |k| k.len() == 20).await;
    assert!(!kiosk.overview_stalled());
}

#[tokio::test]
async fn empty_feed_asks_once_and_goes_quiet() {
    let feed = Arc::new(MockFeed::default());
    feed.serve_empty();
    let mut kiosk = kiosk_with(feed.clone());

    kiosk.jump_to_newest();
    for _ in 0..50 {
        kiosk.pump();
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    assert!(kiosk.is_empty());
    assert!(!kiosk.overview_stalled());
    assert_eq!(feed.overview_count(), 1);

    // Only an explicit retry asks the feed again.
    kiosk.retry_overview();
    let counter = feed.clone();
    pump_until(&mut kiosk, move |_| counter.overview_count() == 2).await;
    for _ in 0..30 {
        kiosk.pump();
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    assert_eq!(feed.overview_count(), 2);
}

#[tokio::test]
async fn completed_issue_rehydrates_from_past_session() {
    let feed = Arc::new(MockFeed::default());
    let store = Store::open_in_memory().unwrap();
    store
        .set_status("daily", date(TODAY), IssueStatus::Complete)
        .unwrap();
    let mut kiosk = kiosk_with_store(feed, store);

    inject_page(&mut kiosk, TODAY, 2);
    assert_eq!(kiosk.record(0).unwrap().status, IssueStatus::Complete);
    assert_eq!(kiosk.record(1).unwrap().status, IssueStatus::Overview);
}

#[tokio::test]
async fn delete_of_oldest_selected_issue_moves_cursor_back() {
    let feed = Arc::new(MockFeed::default());
    let mut kiosk = kiosk_with(feed);
    inject_page(&mut kiosk, TODAY, 3);

    kiosk.select(2).unwrap();
    kiosk.delete(2, true).unwrap();
    assert_eq!(kiosk.len(), 2);
    assert_eq!(kiosk.selected_index(), Some(1));
}

#[tokio::test]
async fn reset_clears_catalog_and_cursor() {
    let feed = Arc::new(MockFeed::default());
    let mut kiosk = kiosk_with(feed);
    inject_page(&mut kiosk, TODAY, 5);
    kiosk.select(3).unwrap();
    kiosk.open(3).unwrap();
    pump_until(&mut kiosk, |k| !k.is_busy()).await;

    kiosk.reset();
    assert!(kiosk.is_empty());
    assert_eq!(kiosk.selected_index(), None);
    assert!(kiosk.opened_record().is_none());
}

#[tokio::test]
async fn hung_download_resolves_as_transient_timeout() {
    let feed = Arc::new(MockFeed::default());
    let settings = Settings {
        feed: "daily".into(),
        edge_threshold: 2,
        overview_page: 5,
        initial_window: 20,
        request_timeout_secs: 1,
        ..Settings::default()
    };
    let mut kiosk = Kiosk::new(KioskContext {
        feed: feed.clone(),
        store: Store::open_in_memory().unwrap(),
        settings,
        clock: Arc::new(FixedClock(date(TODAY))),
        runtime: tokio::runtime::Handle::current(),
    });
    inject_page(&mut kiosk, TODAY, 1);

    // Never released: the bounded timeout must fire.
    feed.hold();
    kiosk.open(0).unwrap();
    pump_until(&mut kiosk, |k| {
        k.record(0).unwrap().status == IssueStatus::Error
    })
    .await;
    assert!(!kiosk.is_busy());
}
