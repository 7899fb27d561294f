//! Reqwest-backed feed client: JSON overview endpoint plus streamed file
//! downloads with cancellation and a skip-existing check.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use futures::StreamExt;
use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::constants::MAX_PARALLEL_FILES;
use crate::errors::FeedError;
use crate::feed::FeedClient;
use crate::types::{AuthState, FileEntry, IssueMetadata, OverviewResponse};

/// Optional byte-progress hook: (file name, downloaded, total).
pub type ProgressFn = Arc<dyn Fn(&str, u64, u64) + Send + Sync>;

pub struct HttpFeedClient {
    client: reqwest::Client,
    base_url: String,
    content_dir: PathBuf,
    max_parallel: usize,
    progress: Option<ProgressFn>,
    // 0 = valid, 1 = expired, 2 = invalid; flipped on 401/403 responses.
    auth: AtomicU8,
}

impl HttpFeedClient {
    pub fn new(base_url: impl Into<String>, content_dir: PathBuf) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            content_dir,
            max_parallel: MAX_PARALLEL_FILES,
            progress: None,
            auth: AtomicU8::new(0),
        }
    }

    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel.max(1);
        self
    }

    fn file_url(&self, feed: &str, date: NaiveDate, name: &str) -> String {
        format!("{}/feeds/{}/issues/{}/files/{}", self.base_url, feed, date, name)
    }

    fn issue_dir(&self, feed: &str, date: NaiveDate) -> PathBuf {
        self.content_dir.join(feed).join(date.to_string())
    }

    fn classify_status(&self, status: StatusCode) -> FeedError {
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            self.auth.store(1, Ordering::Relaxed);
            FeedError::Auth
        } else if status.is_server_error() {
            FeedError::Server(format!("HTTP {status}"))
        } else {
            FeedError::Network(format!("HTTP {status}"))
        }
    }

    fn report_progress(&self, name: &str, downloaded: u64, total: u64) {
        if let Some(progress) = &self.progress {
            progress(name, downloaded, total);
        }
    }

    async fn download_one(
        &self,
        url: String,
        dest: PathBuf,
        expected_size: u64,
        name: &str,
        token: &CancellationToken,
    ) -> Result<(), FeedError> {
        if token.is_cancelled() {
            return Err(FeedError::Cancelled);
        }

        // Files are written once, never partially overwritten in place; a
        // present file of the expected size is good.
        if let Ok(meta) = tokio::fs::metadata(&dest).await {
            if expected_size == 0 || meta.len() == expected_size {
                debug!(file = name, "File already present, skipping");
                return Ok(());
            }
        }

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FeedError::Network(e.to_string()))?;
        if !response.status().is_success() {
            return Err(self.classify_status(response.status()));
        }

        let total = response.content_length().unwrap_or(expected_size);
        let mut downloaded: u64 = 0;
        let mut buf = Vec::with_capacity(total as usize);
        let mut stream = response.bytes_stream();

        loop {
            tokio::select! {
                _ = token.cancelled() => return Err(FeedError::Cancelled),
                chunk = stream.next() => {
                    match chunk {
                        Some(Ok(data)) => {
                            downloaded += data.len() as u64;
                            buf.extend_from_slice(&data);
                            self.report_progress(name, downloaded, total);
                        }
                        Some(Err(e)) => return Err(FeedError::Network(e.to_string())),
                        None => break,
                    }
                }
            }
        }

        tokio::fs::write(&dest, &buf).await?;
        debug!(file = name, bytes = downloaded, "File downloaded");
        Ok(())
    }
}

#[async_trait]
impl FeedClient for HttpFeedClient {
    async fn fetch_overview(
        &self,
        feed: &str,
        from: NaiveDate,
        count: u32,
    ) -> Result<Vec<IssueMetadata>, FeedError> {
        let url = format!(
            "{}/feeds/{}/overview?from={}&count={}",
            self.base_url, feed, from, count
        );
        debug!(url = %url, "Fetching overview");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FeedError::Network(e.to_string()))?;
        if !response.status().is_success() {
            return Err(self.classify_status(response.status()));
        }
        let overview: OverviewResponse = response
            .json()
            .await
            .map_err(|e| FeedError::Server(format!("bad overview payload: {e}")))?;
        info!(
            feed = %overview.feed,
            issues = overview.issue_count,
            "Overview page received"
        );
        Ok(overview.issues)
    }

    async fn download_files(
        &self,
        feed: &str,
        date: NaiveDate,
        files: &[FileEntry],
        token: CancellationToken,
    ) -> Result<(), FeedError> {
        let dir = self.issue_dir(feed, date);
        tokio::fs::create_dir_all(&dir).await?;

        // Bounded fan-out: at most `max_parallel` file fetches at once.
        let results = futures::stream::iter(files.iter().cloned().map(|file| {
            let url = self.file_url(feed, date, &file.name);
            let dest = dir.join(&file.name);
            let token = token.clone();
            async move {
                self.download_one(url, dest, file.size, &file.name, &token)
                    .await
                    .map_err(|e| (file.name.clone(), e))
            }
        }))
        .buffer_unordered(self.max_parallel)
        .collect::<Vec<_>>()
        .await;

        for result in results {
            if let Err((name, e)) = result {
                warn!(date = %date, file = %name, error = %e, "File download failed");
                return Err(e);
            }
        }
        info!(date = %date, files = files.len(), "Issue files downloaded");
        Ok(())
    }

    fn auth_state(&self) -> AuthState {
        match self.auth.load(Ordering::Relaxed) {
            0 => AuthState::Valid,
            1 => AuthState::Expired,
            _ => AuthState::Invalid,
        }
    }
}
