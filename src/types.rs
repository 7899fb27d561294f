//! Common types and data structures

use std::ops::Range;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Lifecycle status of one issue in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IssueStatus {
    /// Placeholder reserving a date slot before metadata arrives.
    Stub,
    /// Metadata known, no content downloaded.
    Overview,
    /// Partial/preview content only (unauthenticated access).
    Reduced,
    /// A download is in flight.
    Downloading,
    /// All required files present locally.
    Complete,
    /// Last operation failed; user-retryable.
    Error,
}

impl IssueStatus {
    /// Rank used by the catalog's monotonic upsert: a late, less complete
    /// response must never overwrite a record that already progressed.
    /// `Error` ranks with `Overview` so a fresh overview arrival clears a
    /// stale transient failure.
    pub fn completeness(self) -> u8 {
        match self {
            IssueStatus::Stub => 0,
            IssueStatus::Overview | IssueStatus::Reduced | IssueStatus::Error => 1,
            IssueStatus::Downloading => 2,
            IssueStatus::Complete => 3,
        }
    }
}

/// Downloadable file descriptor from the issue's manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub name: String,
    #[serde(default)]
    pub size: u64,
    /// Section this file belongs to; section 0 is fetched first so reading
    /// can begin before the full issue finishes.
    #[serde(default)]
    pub section: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionMeta {
    pub index: u32,
    pub title: String,
    #[serde(default)]
    pub article_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageMeta {
    pub number: u32,
    pub pdf_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImprintMeta {
    pub title: String,
    pub html_name: String,
}

/// Overview metadata for one issue as returned by the feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueMetadata {
    pub date: NaiveDate,
    #[serde(default)]
    pub reduced: bool,
    #[serde(default)]
    pub sections: Vec<SectionMeta>,
    #[serde(default)]
    pub pages: Vec<PageMeta>,
    #[serde(default)]
    pub imprint: Option<ImprintMeta>,
    #[serde(default)]
    pub files: Vec<FileEntry>,
}

/// Overview response envelope from the feed's JSON endpoint.
#[derive(Debug, Deserialize)]
pub struct OverviewResponse {
    pub feed: String,
    #[serde(alias = "count")]
    pub issue_count: usize,
    pub issues: Vec<IssueMetadata>,
}

/// One issue known to the client: identity, status, manifest, resume state.
#[derive(Debug, Clone)]
pub struct IssueRecord {
    pub date: NaiveDate,
    pub status: IssueStatus,
    pub sections: Vec<SectionMeta>,
    pub pages: Vec<PageMeta>,
    pub imprint: Option<ImprintMeta>,
    pub file_manifest: Vec<FileEntry>,
    /// Resume position, mutated only by the reading UI.
    pub last_read_section: Option<u32>,
    pub last_read_article: Option<u32>,
}

impl IssueRecord {
    /// Empty placeholder reserving a date slot.
    pub fn stub(date: NaiveDate) -> Self {
        Self {
            date,
            status: IssueStatus::Stub,
            sections: Vec::new(),
            pages: Vec::new(),
            imprint: None,
            file_manifest: Vec::new(),
            last_read_section: None,
            last_read_article: None,
        }
    }

    /// Record built from an overview response.
    pub fn from_metadata(meta: IssueMetadata) -> Self {
        Self {
            date: meta.date,
            status: if meta.reduced {
                IssueStatus::Reduced
            } else {
                IssueStatus::Overview
            },
            sections: meta.sections,
            pages: meta.pages,
            imprint: meta.imprint,
            file_manifest: meta.files,
            last_read_section: None,
            last_read_article: None,
        }
    }

    pub fn is_downloading(&self) -> bool {
        self.status == IssueStatus::Downloading
    }

    /// Files belonging to section zero, enough to open the issue.
    pub fn section_zero_files(&self) -> Vec<FileEntry> {
        self.file_manifest
            .iter()
            .filter(|f| f.section == 0)
            .cloned()
            .collect()
    }

    pub fn has_bookmarks(&self) -> bool {
        self.last_read_section.is_some() || self.last_read_article.is_some()
    }
}

/// Minimal diff emitted after a catalog mutation so observers can apply
/// targeted UI updates instead of reloading everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogChange {
    pub inserted: Option<Range<usize>>,
    pub updated: Vec<usize>,
    pub deleted: Vec<usize>,
}

impl CatalogChange {
    pub fn inserted_at(index: usize) -> Self {
        Self {
            inserted: Some(index..index + 1),
            ..Self::default()
        }
    }

    pub fn updated_at(index: usize) -> Self {
        Self {
            updated: vec![index],
            ..Self::default()
        }
    }

    pub fn deleted_at(index: usize) -> Self {
        Self {
            deleted: vec![index],
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.inserted.is_none() && self.updated.is_empty() && self.deleted.is_empty()
    }
}

/// Authentication state reported by the feed client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Valid,
    Expired,
    Invalid,
}
