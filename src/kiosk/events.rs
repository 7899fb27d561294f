//! Event types and the single dispatcher that applies background
//! completions to the catalog.
//!
//! Each event type has one handler; illegal state-machine transitions are
//! caught by the orchestrator's phase checks, and completions from an
//! abandoned open are dropped on the generation check before they can touch
//! any record.

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::errors::FeedError;
use crate::kiosk::Kiosk;
use crate::pager::OverviewRequest;
use crate::types::{CatalogChange, IssueMetadata, IssueStatus};

/// Which subset of an issue's files a download covered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadStage {
    SectionZero,
    Full,
}

/// Completion posted by a background task, consumed by `Kiosk::pump`.
#[derive(Debug)]
pub enum KioskEvent {
    OverviewResolved {
        request: OverviewRequest,
        result: Result<Vec<IssueMetadata>, FeedError>,
    },
    DownloadFinished {
        date: NaiveDate,
        generation: u64,
        stage: DownloadStage,
        result: Result<(), FeedError>,
    },
}

/// Typed notification delivered to subscribed observers.
#[derive(Debug)]
pub enum KioskNotice {
    /// The catalog mutated; apply the diff to the UI.
    Catalog(CatalogChange),
    /// The issue is ready for reading (section zero or cache).
    Opened(NaiveDate),
    /// A download failed; the record is in `Error` and user-retryable.
    DownloadFailed(NaiveDate),
    /// The open hit an authentication error; re-login is needed.
    AuthRequired(NaiveDate),
    /// Overview paging stopped on a connectivity failure; waiting for a
    /// manual retry or a connectivity-restored signal.
    OverviewStalled(FeedError),
}

impl Kiosk {
    /// Dispatch one event. All catalog and cursor mutation caused by
    /// background work funnels through here, on the owner thread.
    pub fn handle_event(&mut self, event: KioskEvent) {
        match event {
            KioskEvent::OverviewResolved { request, result } => {
                self.on_overview_resolved(request, result)
            }
            KioskEvent::DownloadFinished {
                date,
                generation,
                stage,
                result,
            } => self.on_download_finished(date, generation, stage, result),
        }
    }

    fn on_overview_resolved(
        &mut self,
        request: OverviewRequest,
        result: Result<Vec<IssueMetadata>, FeedError>,
    ) {
        match result {
            Ok(issues) => {
                self.pager.resolve(request, true);
                self.pager.set_target(None);
                if issues.is_empty() {
                    // Nothing published in this range; without remembering
                    // that, the thin window would re-plan the same fetch on
                    // every resolution.
                    self.pager.mark_exhausted(request);
                } else {
                    let count = issues.len();
                    for meta in issues {
                        self.ingest_overview(meta);
                    }
                    info!(from = %request.from, count, "Overview page ingested");
                }
                // A fresh page may still leave the window thin; an exhausted
                // range stays suppressed inside the pager.
                self.maybe_page();
            }
            Err(e) => {
                warn!(from = %request.from, error = %e, "Overview fetch failed");
                self.pager.resolve(request, false);
                self.notify(KioskNotice::OverviewStalled(e));
            }
        }
    }

    /// Fold one overview record into the catalog. Commutative and
    /// idempotent, so overlapping range responses may land in any order.
    fn ingest_overview(&mut self, meta: IssueMetadata) {
        let date = meta.date;
        let mut record = crate::types::IssueRecord::from_metadata(meta);

        // Rehydrate what past sessions already did for this issue. The
        // completed set is the fast path seeded at startup; the file check
        // catches issues that finished without a status row.
        let finished = self.completed.contains(&date)
            || (!record.file_manifest.is_empty()
                && self
                    .store
                    .has_all_files(&self.feed_id, date, &record.file_manifest)
                    .unwrap_or(false));
        if finished {
            record.status = IssueStatus::Complete;
        }
        if let Ok(Some((section, article))) = self.store.resume(&self.feed_id, date) {
            record.last_read_section = section;
            record.last_read_article = article;
        }

        let change = self.catalog.upsert(record).change();
        self.cursor.apply(&change, self.catalog.len());
        self.notify_change(change);
    }

    fn on_download_finished(
        &mut self,
        date: NaiveDate,
        generation: u64,
        stage: DownloadStage,
        result: Result<(), FeedError>,
    ) {
        if !self.orchestrator.is_current(date, generation) {
            // Abandoned or superseded open; the completion must not
            // resurrect the record.
            debug!(date = %date, generation, "Dropping stale download completion");
            return;
        }

        match (stage, result) {
            (DownloadStage::SectionZero, Ok(())) => self.on_section_zero_ok(date, generation),
            (DownloadStage::Full, Ok(())) => {
                self.orchestrator.finish(generation);
                self.finish_complete(date);
                info!(date = %date, "Issue download complete");
            }
            (stage, Err(e)) if e.is_auth() => {
                // Auth failures never mark the record permanently failed;
                // they park it for the re-authentication path.
                let prior = self
                    .orchestrator
                    .finish(generation)
                    .map(|a| a.prior_status)
                    .unwrap_or(IssueStatus::Overview);
                warn!(date = %date, ?stage, "Download blocked on authentication");
                self.set_status_and_notify(date, prior);
                self.pending_auth.push(date);
                self.notify(KioskNotice::AuthRequired(date));
            }
            (_, Err(FeedError::Cancelled)) => {
                // Abandon already reverted the record; nothing to apply.
                debug!(date = %date, "Download cancelled");
                self.orchestrator.finish(generation);
            }
            (stage, Err(e)) => {
                warn!(date = %date, ?stage, error = %e, "Download failed");
                self.orchestrator.finish(generation);
                self.set_status_and_notify(date, IssueStatus::Error);
                if let Err(err) = self.store.set_status(&self.feed_id, date, IssueStatus::Error) {
                    warn!(date = %date, error = %err, "Failed to persist error status");
                }
                // Section zero from an earlier session may still make the
                // issue readable from cache despite the failed refresh.
                if stage == DownloadStage::SectionZero {
                    let watchable = self
                        .catalog
                        .record_for(date)
                        .map(|r| r.section_zero_files())
                        .filter(|s0| !s0.is_empty())
                        .map(|s0| {
                            self.store
                                .has_all_files(&self.feed_id, date, &s0)
                                .unwrap_or(false)
                        })
                        .unwrap_or(false);
                    if watchable {
                        self.mark_opened(date);
                    }
                }
                self.notify(KioskNotice::DownloadFailed(date));
            }
        }
    }

    fn on_section_zero_ok(&mut self, date: NaiveDate, generation: u64) {
        let Some(record) = self.catalog.record_for(date) else {
            self.orchestrator.finish(generation);
            return;
        };
        let section_zero = record.section_zero_files();
        let manifest = record.file_manifest.clone();
        if let Err(e) = self.store.record_files(&self.feed_id, date, &section_zero) {
            warn!(date = %date, error = %e, "Failed to record section-zero files");
        }

        // Reading starts now; the remainder continues in the background
        // without interrupting the reader.
        self.mark_opened(date);

        let all_present = self
            .store
            .has_all_files(&self.feed_id, date, &manifest)
            .unwrap_or(false);
        if all_present {
            self.orchestrator.finish(generation);
            self.finish_complete(date);
            return;
        }

        if self.orchestrator.enter_full_download(generation) {
            let token = match self.orchestrator.active() {
                Some(active) => active.token.clone(),
                None => return,
            };
            self.spawn_file_download(date, generation, manifest, DownloadStage::Full, token);
        }
    }
}
