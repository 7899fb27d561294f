//! User settings stored as settings.json in the app data directory

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::constants::*;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Feed edition to read from.
    pub feed: String,
    pub base_url: String,

    /// Where downloaded issue content lives.
    pub content_dir: Option<String>,

    // Pager tuning
    pub edge_threshold: usize,
    pub overview_page: u32,
    pub initial_window: u32,

    // Network
    pub request_timeout_secs: u64,
    pub max_parallel_files: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            feed: DEFAULT_FEED.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            content_dir: None,
            edge_threshold: EDGE_THRESHOLD,
            overview_page: OVERVIEW_PAGE,
            initial_window: INITIAL_WINDOW,
            request_timeout_secs: REQUEST_TIMEOUT_SECS,
            max_parallel_files: MAX_PARALLEL_FILES,
        }
    }
}

impl Settings {
    pub fn load(data_dir: &Path) -> Self {
        let path = data_dir.join("settings.json");
        match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(settings) => {
                    debug!(path = %path.display(), "Settings loaded");
                    settings
                }
                Err(e) => {
                    warn!(error = %e, "Failed to parse settings, using defaults");
                    Settings::default()
                }
            },
            Err(_) => Settings::default(),
        }
    }

    pub fn save(&self, data_dir: &Path) {
        let path = data_dir.join("settings.json");
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&path, json) {
                    warn!(error = %e, path = %path.display(), "Failed to save settings");
                }
            }
            Err(e) => warn!(error = %e, "Failed to serialize settings"),
        }
    }

    pub fn content_dir_or_default(&self, data_dir: &Path) -> PathBuf {
        match &self.content_dir {
            Some(dir) => PathBuf::from(dir),
            None => data_dir.join("content"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let settings: Settings = serde_json::from_str(r#"{"feed": "weekend"}"#).unwrap();
        assert_eq!(settings.feed, "weekend");
        assert_eq!(settings.edge_threshold, EDGE_THRESHOLD);
        assert_eq!(settings.initial_window, INITIAL_WINDOW);
    }
}
