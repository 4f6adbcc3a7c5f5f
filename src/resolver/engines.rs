//! Search backends queried for hidden-service addresses.

use serde::{Deserialize, Serialize};

/// Placeholder replaced by the encoded keyword in a query URL.
pub const QUERY_PLACEHOLDER: &str = "{query}";

const AHMIA_ONION: &str = "http://juhanurmihxlp77nkq76byazcldy2hlmovfu2epvl5ankdibsot4csyd.onion";
const TORCH_ONION: &str = "http://torchdeedp3i2jigzjdmfpn5ttjhthh5wbmda2rr3jvqjg5p77c54dqd.onion";

/// One search backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchEngineConfig {
    pub name: String,
    /// Query URL. `{query}` is replaced with the form-encoded keyword; without
    /// the placeholder the keyword is appended.
    pub query_url: String,
    /// Whether requests must go through Tor.
    #[serde(default)]
    pub requires_proxy: bool,
    pub referer: String,
}

impl SearchEngineConfig {
    pub fn new(
        name: impl Into<String>,
        query_url: impl Into<String>,
        requires_proxy: bool,
        referer: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            query_url: query_url.into(),
            requires_proxy,
            referer: referer.into(),
        }
    }

    /// Search URL for `keyword`, encoded the way HTML forms encode it.
    pub fn search_url(&self, keyword: &str) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(keyword.as_bytes()).collect();
        if self.query_url.contains(QUERY_PLACEHOLDER) {
            self.query_url.replace(QUERY_PLACEHOLDER, &encoded)
        } else {
            format!("{}{}", self.query_url, encoded)
        }
    }
}

/// Engines in priority order: clearnet Ahmia, Ahmia's onion mirror, Torch.
pub fn default_engines() -> Vec<SearchEngineConfig> {
    vec![
        SearchEngineConfig::new(
            "Ahmia (clearnet)",
            "https://ahmia.fi/search/?q={query}",
            false,
            "https://ahmia.fi/",
        ),
        SearchEngineConfig::new(
            "Ahmia (onion)",
            format!("{}/search/?q={{query}}", AHMIA_ONION),
            true,
            format!("{}/", AHMIA_ONION),
        ),
        SearchEngineConfig::new(
            "Torch",
            format!("{}/search?query={{query}}", TORCH_ONION),
            true,
            format!("{}/", TORCH_ONION),
        ),
    ]
}
