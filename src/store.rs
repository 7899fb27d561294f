//! Local persistence for issue bookkeeping.
//!
//! Handles SQLite storage for download state, per-issue file bookkeeping,
//! and the reader's resume positions. The catalog itself is in-memory; the
//! store only remembers what survived past sessions: which files of which
//! issue are on disk, where the reader left off, and which issues finished
//! downloading.

use std::collections::HashSet;
use std::path::Path;

use chrono::NaiveDate;
use rusqlite::{params, Connection, Result};
use tracing::debug;

use crate::types::{FileEntry, IssueStatus};

pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open or create the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init_schema()?;
        debug!(path = %path.display(), "Store opened");
        Ok(store)
    }

    /// In-memory database for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS issues (
                feed TEXT NOT NULL,
                date TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'overview',
                last_read_section INTEGER,
                last_read_article INTEGER,
                PRIMARY KEY (feed, date)
            );

            CREATE TABLE IF NOT EXISTS files (
                feed TEXT NOT NULL,
                date TEXT NOT NULL,
                name TEXT NOT NULL,
                size INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (feed, date, name)
            );

            CREATE INDEX IF NOT EXISTS idx_files_issue ON files(feed, date);",
        )?;
        Ok(())
    }

    /// Record files as present on disk. Append-only per issue: a file row is
    /// written once and never downgraded.
    pub fn record_files(&self, feed: &str, date: NaiveDate, files: &[FileEntry]) -> Result<()> {
        for file in files {
            self.conn.execute(
                "INSERT INTO files (feed, date, name, size) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(feed, date, name) DO NOTHING",
                params![feed, date.to_string(), file.name, file.size as i64],
            )?;
        }
        Ok(())
    }

    /// Names of files already downloaded for an issue.
    pub fn files_present(&self, feed: &str, date: NaiveDate) -> Result<HashSet<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM files WHERE feed = ?1 AND date = ?2")?;
        let names = stmt
            .query_map(params![feed, date.to_string()], |row| row.get(0))?
            .collect::<Result<HashSet<String>>>()?;
        Ok(names)
    }

    /// True when every manifest entry has a stored file row.
    pub fn has_all_files(&self, feed: &str, date: NaiveDate, manifest: &[FileEntry]) -> Result<bool> {
        let present = self.files_present(feed, date)?;
        Ok(manifest.iter().all(|f| present.contains(&f.name)))
    }

    /// Persist a terminal status for an issue.
    pub fn set_status(&self, feed: &str, date: NaiveDate, status: IssueStatus) -> Result<()> {
        self.conn.execute(
            "INSERT INTO issues (feed, date, status) VALUES (?1, ?2, ?3)
             ON CONFLICT(feed, date) DO UPDATE SET status = excluded.status",
            params![feed, date.to_string(), status_str(status)],
        )?;
        Ok(())
    }

    /// Dates recorded complete for a feed, for startup hydration.
    pub fn complete_dates(&self, feed: &str) -> Result<Vec<NaiveDate>> {
        let mut stmt = self
            .conn
            .prepare("SELECT date FROM issues WHERE feed = ?1 AND status = 'complete'")?;
        let dates = stmt
            .query_map(params![feed], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>>>()?;
        Ok(dates.iter().filter_map(|d| d.parse().ok()).collect())
    }

    /// Persist the reader's resume position.
    pub fn set_resume(
        &self,
        feed: &str,
        date: NaiveDate,
        section: Option<u32>,
        article: Option<u32>,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO issues (feed, date, last_read_section, last_read_article)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(feed, date) DO UPDATE SET
                last_read_section = excluded.last_read_section,
                last_read_article = excluded.last_read_article",
            params![feed, date.to_string(), section, article],
        )?;
        Ok(())
    }

    pub fn resume(&self, feed: &str, date: NaiveDate) -> Result<Option<(Option<u32>, Option<u32>)>> {
        let mut stmt = self.conn.prepare(
            "SELECT last_read_section, last_read_article FROM issues
             WHERE feed = ?1 AND date = ?2",
        )?;
        let mut rows = stmt.query(params![feed, date.to_string()])?;
        if let Some(row) = rows.next()? {
            Ok(Some((row.get(0)?, row.get(1)?)))
        } else {
            Ok(None)
        }
    }

    /// Drop every row for one issue, on user-initiated delete.
    pub fn remove_issue(&self, feed: &str, date: NaiveDate) -> Result<()> {
        self.conn.execute(
            "DELETE FROM files WHERE feed = ?1 AND date = ?2",
            params![feed, date.to_string()],
        )?;
        self.conn.execute(
            "DELETE FROM issues WHERE feed = ?1 AND date = ?2",
            params![feed, date.to_string()],
        )?;
        Ok(())
    }

}

fn status_str(status: IssueStatus) -> &'static str {
    match status {
        IssueStatus::Stub => "stub",
        IssueStatus::Overview => "overview",
        IssueStatus::Reduced => "reduced",
        IssueStatus::Downloading => "downloading",
        IssueStatus::Complete => "complete",
        IssueStatus::Error => "error",
    }
}
