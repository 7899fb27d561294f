//! Newsstand - issue catalog and download orchestration for a newspaper
//! reader.
//!
//! The crate keeps an ordered, duplicate-free catalog of newspaper issues,
//! reconciles it against out-of-order overview responses, pages more
//! overview metadata in as the selection nears an edge, and drives the
//! per-issue open/download state machine (section zero first so reading can
//! start early, the rest in the background). The [`kiosk::Kiosk`] facade is
//! the surface UI code talks to.

pub mod catalog;
pub mod clock;
pub mod constants;
pub mod cursor;
pub mod errors;
pub mod feed;
pub mod kiosk;
pub mod orchestrator;
pub mod pager;
pub mod settings;
pub mod store;
pub mod types;
pub mod utils;

pub use catalog::{Catalog, Upsert};
pub use cursor::SelectionCursor;
pub use errors::{FeedError, KioskError};
pub use kiosk::{Kiosk, KioskContext, KioskEvent, KioskNotice};
pub use pager::{OverviewPager, OverviewRequest};
pub use types::{CatalogChange, IssueRecord, IssueStatus};
