//! Per-page artifact records.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Identifiers pulled out of a page, one list per category.
///
/// Each list is de-duplicated and keeps first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractedEntities {
    pub emails: Vec<String>,
    pub pgp_keys: Vec<String>,
    pub btc_addresses: Vec<String>,
    pub eth_addresses: Vec<String>,
    pub xmr_addresses: Vec<String>,
    pub phones: Vec<String>,
    pub ibans: Vec<String>,
    pub credit_cards: Vec<String>,
}

impl ExtractedEntities {
    /// Total number of identifiers across all categories.
    pub fn total(&self) -> usize {
        self.emails.len()
            + self.pgp_keys.len()
            + self.btc_addresses.len()
            + self.eth_addresses.len()
            + self.xmr_addresses.len()
            + self.phones.len()
            + self.ibans.len()
            + self.credit_cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Everything recorded about one fetched page.
///
/// Written once as `meta.json` in the page's bundle directory and embedded
/// in the session report. Failed fetches still produce an artifact with
/// `ok == false` and the error message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageArtifact {
    pub url: String,
    pub safe_name: String,
    pub scraped_at: String,
    pub ok: bool,
    pub error: Option<String>,
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub meta_keywords: Option<String>,
    pub language: Option<String>,
    #[serde(default)]
    pub keywords_found: Vec<String>,
    pub text_excerpt: Option<String>,
    #[serde(default)]
    pub relevance_score: f64,
    #[serde(default)]
    pub entities: ExtractedEntities,
    #[serde(default)]
    pub links: Vec<String>,
    pub raw_html_file: Option<PathBuf>,
    pub screenshot_file: Option<PathBuf>,
    pub text_file: Option<PathBuf>,
    /// 0 for a seed page, 1 for an internal follow-up link.
    pub depth: u8,
}

impl PageArtifact {
    /// Create an empty, not-yet-successful artifact for `url`.
    pub fn pending(url: &str, safe_name: &str, depth: u8) -> Self {
        Self {
            url: url.to_string(),
            safe_name: safe_name.to_string(),
            scraped_at: super::timestamp(),
            ok: false,
            error: None,
            title: None,
            meta_description: None,
            meta_keywords: None,
            language: None,
            keywords_found: Vec::new(),
            text_excerpt: None,
            relevance_score: 0.0,
            entities: ExtractedEntities::default(),
            links: Vec::new(),
            raw_html_file: None,
            screenshot_file: None,
            text_file: None,
            depth,
        }
    }

    /// Create an artifact recording a failed fetch.
    pub fn failed(url: &str, safe_name: &str, depth: u8, error: impl Into<String>) -> Self {
        let mut artifact = Self::pending(url, safe_name, depth);
        artifact.mark_failed(error);
        artifact
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.ok = false;
        self.error = Some(error.into());
    }
}
