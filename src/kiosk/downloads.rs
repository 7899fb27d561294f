//! Background task spawning for the kiosk.
//!
//! Network work runs on the tokio runtime and reports back through the
//! event channel; nothing here touches the catalog directly. Every feed
//! call is wrapped in a timeout so a hung response resolves as a transient
//! error instead of pinning a record in `Downloading` forever.

use chrono::NaiveDate;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::FeedError;
use crate::kiosk::events::{DownloadStage, KioskEvent};
use crate::kiosk::{Kiosk, KioskNotice};
use crate::pager::OverviewRequest;
use crate::types::{FileEntry, IssueStatus};

impl Kiosk {
    /// First phase of an open: compare the manifest against local files.
    /// Runs synchronously on the owner thread; only the fetches it decides
    /// on are spawned.
    pub(crate) fn run_needs_update_check(&mut self, date: NaiveDate, generation: u64) {
        let Some(record) = self.catalog.record_for(date) else {
            self.orchestrator.finish(generation);
            return;
        };
        let manifest = record.file_manifest.clone();
        let section_zero = record.section_zero_files();

        let all_present = self
            .store
            .has_all_files(&self.feed_id, date, &manifest)
            .unwrap_or(false);
        if all_present {
            // Already current; open straight from local content.
            debug!(date = %date, "Issue current, opening from cache");
            self.orchestrator.finish(generation);
            self.finish_complete(date);
            self.mark_opened(date);
            return;
        }

        let section_zero_present = !section_zero.is_empty()
            && self
                .store
                .has_all_files(&self.feed_id, date, &section_zero)
                .unwrap_or(false);

        let token = match self.orchestrator.active() {
            Some(active) if active.generation == generation => active.token.clone(),
            _ => return,
        };

        if section_zero_present {
            // Reading can begin now; only the remainder is fetched.
            self.orchestrator.enter_section_zero(generation);
            self.orchestrator.enter_full_download(generation);
            self.set_status_and_notify(date, IssueStatus::Downloading);
            self.mark_opened(date);
            self.spawn_file_download(date, generation, manifest, DownloadStage::Full, token);
        } else {
            self.orchestrator.enter_section_zero(generation);
            self.set_status_and_notify(date, IssueStatus::Downloading);
            self.spawn_file_download(date, generation, section_zero, DownloadStage::SectionZero, token);
        }
    }

    pub(crate) fn spawn_overview_fetch(&self, request: OverviewRequest) {
        let feed = self.feed.clone();
        let feed_id = self.feed_id.clone();
        let tx = self.events_tx.clone();
        let timeout = self.request_timeout;
        self.runtime.spawn(async move {
            let result = match tokio::time::timeout(
                timeout,
                feed.fetch_overview(&feed_id, request.from, request.count),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(FeedError::Timeout),
            };
            // The kiosk may be gone during shutdown; nothing to do then.
            let _ = tx.send(KioskEvent::OverviewResolved { request, result });
        });
    }

    pub(crate) fn spawn_file_download(
        &self,
        date: NaiveDate,
        generation: u64,
        files: Vec<FileEntry>,
        stage: DownloadStage,
        token: CancellationToken,
    ) {
        let feed = self.feed.clone();
        let feed_id = self.feed_id.clone();
        let tx = self.events_tx.clone();
        let timeout = self.request_timeout;
        debug!(date = %date, files = files.len(), ?stage, "Spawning file download");
        self.runtime.spawn(async move {
            let result = match tokio::time::timeout(
                timeout,
                feed.download_files(&feed_id, date, &files, token),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(FeedError::Timeout),
            };
            let _ = tx.send(KioskEvent::DownloadFinished {
                date,
                generation,
                stage,
                result,
            });
        });
    }

    /// Hand the issue off to the reader.
    pub(crate) fn mark_opened(&mut self, date: NaiveDate) {
        self.cursor.set_opened(Some(date));
        self.notify(KioskNotice::Opened(date));
    }

    pub(crate) fn set_status_and_notify(&mut self, date: NaiveDate, status: IssueStatus) {
        if let Some(change) = self.catalog.set_status(date, status) {
            if !change.is_empty() {
                self.notify(KioskNotice::Catalog(change));
            }
        }
    }

    /// Terminal success: everything required is on disk.
    pub(crate) fn finish_complete(&mut self, date: NaiveDate) {
        if let Some(record) = self.catalog.record_for(date) {
            let manifest = record.file_manifest.clone();
            if let Err(e) = self.store.record_files(&self.feed_id, date, &manifest) {
                warn!(date = %date, error = %e, "Failed to record files in store");
            }
        }
        if let Err(e) = self.store.set_status(&self.feed_id, date, IssueStatus::Complete) {
            warn!(date = %date, error = %e, "Failed to persist complete status");
        }
        self.completed.insert(date);
        self.set_status_and_notify(date, IssueStatus::Complete);
    }
}
