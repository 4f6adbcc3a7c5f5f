//! Turning search-result anchors into hidden-service addresses.

use std::collections::HashSet;
use std::sync::LazyLock;

use scraper::{Html, Selector};

/// Path fragment marking a search engine's click-through redirect.
const REDIRECT_MARKER: &str = "/search/redirect?";

/// Query parameter carrying the redirect target.
const REDIRECT_PARAM: &str = "redirect_url";

/// Nested redirects deeper than this are dropped.
const MAX_UNWRAP: usize = 4;

static ANCHORS: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());

/// All non-empty `href` values in document order.
pub fn extract_hrefs(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    document
        .select(&ANCHORS)
        .filter_map(|el| el.value().attr("href"))
        .map(str::trim)
        .filter(|href| !href.is_empty())
        .map(str::to_string)
        .collect()
}

/// Unwrap redirect links and keep only hidden-service addresses.
///
/// Applying this to its own output returns the output unchanged.
pub fn clean_onion_links<S: AsRef<str>>(raw_links: &[S]) -> Vec<String> {
    raw_links
        .iter()
        .filter_map(|link| unwrap_redirect(link.as_ref().trim()))
        .filter(|link| link.contains(".onion"))
        .collect()
}

/// De-duplicate in first-seen order and keep at most `max` links.
pub fn dedup_truncate(links: impl IntoIterator<Item = String>, max: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    links
        .into_iter()
        .filter(|link| seen.insert(link.clone()))
        .take(max)
        .collect()
}

fn unwrap_redirect(link: &str) -> Option<String> {
    let mut current = link.to_string();
    for _ in 0..MAX_UNWRAP {
        if current.is_empty() {
            return None;
        }
        if !current.contains(REDIRECT_MARKER) {
            return Some(current);
        }
        current = redirect_target(&current)?;
    }
    None
}

fn redirect_target(link: &str) -> Option<String> {
    let (_, query) = link.split_once('?')?;
    let query = query.split('#').next().unwrap_or_default();
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == REDIRECT_PARAM)
        .map(|(_, value)| value.trim().to_string())
}
