//! Application constants and configuration

pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_FEED: &str = "daily";
pub const DEFAULT_BASE_URL: &str = "https://feed.example.org/v1";

/// How close the selection may drift toward either catalog edge before the
/// pager requests another overview page. Tuning value, not a correctness
/// constraint.
pub const EDGE_THRESHOLD: usize = 6;

/// Overview records fetched per pager request once a window exists.
pub const OVERVIEW_PAGE: u32 = 14;

/// Overview records fetched for the initial window on an empty catalog.
pub const INITIAL_WINDOW: u32 = 20;

/// Upper bound on any single feed call. A hung response resolves as a
/// transient timeout error rather than leaving a record stuck downloading.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Parallel file fetches within one issue download.
pub const MAX_PARALLEL_FILES: usize = 4;
