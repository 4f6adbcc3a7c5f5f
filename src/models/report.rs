//! Session report written at the end of every crawl.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::PageArtifact;

/// Summary of one crawl session, persisted once as `report.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    pub session_id: String,
    pub keyword: String,
    pub requested_count: usize,
    pub found_count: usize,
    pub scraped_count: usize,
    pub session_dir: PathBuf,
    pub timestamp: String,
    /// True when the session stopped early on a deadline or cancel signal.
    #[serde(default)]
    pub cancelled: bool,
    /// Session-wide note, e.g. "No links found".
    pub error: Option<String>,
    pub results: Vec<PageArtifact>,
}

impl SessionReport {
    /// Number of pages that rendered successfully.
    pub fn ok_count(&self) -> usize {
        self.results.iter().filter(|r| r.ok).count()
    }

    /// Number of pages recorded as failures.
    pub fn failed_count(&self) -> usize {
        self.results.len() - self.ok_count()
    }
}
