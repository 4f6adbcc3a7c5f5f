//! Crawl invocation parameters.

use serde::{Deserialize, Serialize};

use crate::error::CrawlError;

/// Upper bound on candidates resolved per session.
pub const MAX_RESULTS: usize = 50;

/// Upper bound on requested crawl depth.
pub const MAX_DEPTH: u8 = 2;

/// Parameters for one crawl session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlRequest {
    pub keyword: String,
    pub max_results: usize,
    pub depth: u8,
    pub rotate_identity: bool,
}

impl CrawlRequest {
    pub fn new(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            max_results: 5,
            depth: 0,
            rotate_identity: false,
        }
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn with_depth(mut self, depth: u8) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_rotation(mut self, rotate: bool) -> Self {
        self.rotate_identity = rotate;
        self
    }

    /// Whether internal links of each seed page should be followed.
    pub fn follows_internal_links(&self) -> bool {
        self.depth > 0
    }

    /// Check the request against the accepted parameter ranges.
    pub fn validate(&self) -> Result<(), CrawlError> {
        if self.keyword.trim().is_empty() {
            return Err(CrawlError::InvalidRequest("keyword is empty".to_string()));
        }
        if !(1..=MAX_RESULTS).contains(&self.max_results) {
            return Err(CrawlError::InvalidRequest(format!(
                "max_results must be between 1 and {}, got {}",
                MAX_RESULTS, self.max_results
            )));
        }
        if self.depth > MAX_DEPTH {
            return Err(CrawlError::InvalidRequest(format!(
                "depth must be between 0 and {}, got {}",
                MAX_DEPTH, self.depth
            )));
        }
        Ok(())
    }
}
