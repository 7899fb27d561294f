//! External feed client port.
//!
//! The core never talks to the network directly; it drives everything
//! through this object-safe trait so tests can script responses and the
//! demo binary can plug in the reqwest implementation.

mod http;

pub use http::HttpFeedClient;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio_util::sync::CancellationToken;

use crate::errors::FeedError;
use crate::types::{AuthState, FileEntry, IssueMetadata};

#[async_trait]
pub trait FeedClient: Send + Sync {
    /// Up to `count` issue overviews dated at or before `from`, newest
    /// first.
    async fn fetch_overview(
        &self,
        feed: &str,
        from: NaiveDate,
        count: u32,
    ) -> Result<Vec<IssueMetadata>, FeedError>;

    /// Fetch the given files of one issue to local storage. Used for both
    /// section-zero and full downloads, differentiated by the file subset.
    /// Files already present are not re-fetched; the store is append-only
    /// per issue.
    async fn download_files(
        &self,
        feed: &str,
        date: NaiveDate,
        files: &[FileEntry],
        token: CancellationToken,
    ) -> Result<(), FeedError>;

    fn auth_state(&self) -> AuthState;
}
