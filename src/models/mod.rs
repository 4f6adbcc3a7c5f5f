//! Data models for crawl sessions.

mod artifact;
mod report;
mod request;

pub use artifact::{ExtractedEntities, PageArtifact};
pub use report::SessionReport;
pub use request::{CrawlRequest, MAX_DEPTH, MAX_RESULTS};

/// Timestamp in the `YYYYmmdd-HHMMSS` local-time form used in names and reports.
pub fn timestamp() -> String {
    chrono::Local::now().format("%Y%m%d-%H%M%S").to_string()
}
