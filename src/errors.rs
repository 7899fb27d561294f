//! Error taxonomy for feed I/O and the kiosk API surface.
//!
//! Feed failures split into three families the orchestrator routes
//! differently: authentication errors go to the re-auth path, transient
//! errors mark the record retryable, cancellations are dropped silently.

use thiserror::Error;

/// Failure reported by the feed client or the timeout wrapper around it.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("authentication required or expired")]
    Auth,
    #[error("request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("server error: {0}")]
    Server(String),
    #[error("file write failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("operation cancelled")]
    Cancelled,
}

impl FeedError {
    /// Errors the user may retry without any state repair.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FeedError::Timeout | FeedError::Network(_) | FeedError::Server(_) | FeedError::Io(_)
        )
    }

    /// Errors routed to the re-authentication path instead of marking the
    /// record failed.
    pub fn is_auth(&self) -> bool {
        matches!(self, FeedError::Auth)
    }
}

/// Rejection returned synchronously by kiosk operations. Never crosses the
/// UI boundary as a panic; the caller maps it to a user-visible message.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KioskError {
    #[error("another issue download is already in flight")]
    Busy,
    #[error("issue is currently downloading")]
    DownloadInProgress,
    #[error("issue has reader bookmarks; deletion needs confirmation")]
    ConfirmationRequired,
    #[error("index {0} is out of catalog bounds")]
    OutOfRange(usize),
    #[error("issue metadata not loaded yet")]
    NotReady,
    #[error("issue is not in a retryable state")]
    NotRetryable,
}
