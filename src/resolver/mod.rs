//! Multi-engine resolution of a keyword to candidate hidden-service addresses.
//!
//! Engines are tried in priority order. Engines that need Tor are skipped
//! unless a probe through the proxy confirms Tor is working. Any engine
//! failure just moves on to the next engine; when every engine fails the
//! result is an empty list.

mod engines;
mod links;

pub use engines::{default_engines, SearchEngineConfig, QUERY_PLACEHOLDER};
pub use links::{clean_onion_links, dedup_truncate, extract_hrefs};

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{CrawlError, EngineError};
use crate::http_client::{browser_headers, HttpClient, RetryPolicy};
use crate::privacy::TorConfig;

/// How results from several engines are combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveStrategy {
    /// Stop at the first engine that yields at least one address.
    #[default]
    FirstSuccess,
    /// Query every engine and merge, de-duplicated, up to the maximum.
    Accumulate,
}

impl std::fmt::Display for ResolveStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolveStrategy::FirstSuccess => write!(f, "first-success"),
            ResolveStrategy::Accumulate => write!(f, "accumulate"),
        }
    }
}

/// Resolver settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Per-request timeout for engine queries, in seconds.
    #[serde(default = "default_engine_timeout")]
    pub engine_timeout_secs: u64,

    #[serde(default)]
    pub strategy: ResolveStrategy,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base backoff in seconds; doubled per retry.
    #[serde(default = "default_backoff_secs")]
    pub backoff_secs: u64,

    /// Engines in priority order. Empty means the built-in list.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub engines: Vec<SearchEngineConfig>,
}

fn default_engine_timeout() -> u64 {
    180
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_secs() -> u64 {
    5
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            engine_timeout_secs: default_engine_timeout(),
            strategy: ResolveStrategy::default(),
            max_retries: default_max_retries(),
            backoff_secs: default_backoff_secs(),
            engines: Vec::new(),
        }
    }
}

impl ResolverConfig {
    /// Apply environment variable overrides.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(secs) = lookup("ONIONSCOPE_ENGINE_TIMEOUT").and_then(|v| v.parse().ok()) {
            self.engine_timeout_secs = secs;
        }
        self
    }

    /// Configured engines, or the built-in list.
    pub fn effective_engines(&self) -> Vec<SearchEngineConfig> {
        if self.engines.is_empty() {
            default_engines()
        } else {
            self.engines.clone()
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            backoff_base: Duration::from_secs(self.backoff_secs),
            ..Default::default()
        }
    }
}

/// Source of candidate addresses for a keyword.
#[async_trait]
pub trait CandidateResolver: Send + Sync {
    /// At most `max_results` de-duplicated addresses in first-seen order.
    ///
    /// Engine failures are not errors; an `Err` means the resolver itself
    /// could not run.
    async fn resolve(&self, keyword: &str, max_results: usize) -> Result<Vec<String>, CrawlError>;
}

/// Check that proxied traffic really exits through Tor.
#[derive(Debug, Clone)]
pub struct TorProbe {
    client: HttpClient,
    url: String,
    marker: String,
}

impl TorProbe {
    pub fn new(client: HttpClient, url: impl Into<String>, marker: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            marker: marker.into(),
        }
    }

    async fn check(&self, engine: &str) -> Result<(), EngineError> {
        let response = self
            .client
            .get(&self.url, browser_headers(None))
            .await
            .map_err(|e| EngineError::ProbeFailed {
                engine: engine.to_string(),
                reason: e.to_string(),
            })?;
        if response.body.contains(&self.marker) {
            Ok(())
        } else {
            Err(EngineError::ProbeFailed {
                engine: engine.to_string(),
                reason: format!("probe page did not contain '{}'", self.marker),
            })
        }
    }
}

/// Resolver querying a priority-ordered list of search engines.
pub struct MultiEngineResolver {
    engines: Vec<SearchEngineConfig>,
    direct: HttpClient,
    proxied: HttpClient,
    probe: TorProbe,
    strategy: ResolveStrategy,
}

impl MultiEngineResolver {
    /// Build clients for `config`, routing proxied engines through `tor`.
    pub fn new(config: &ResolverConfig, tor: &TorConfig) -> Result<Self, EngineError> {
        let timeout = Duration::from_secs(config.engine_timeout_secs);
        let proxy = tor.proxy_config();

        let direct = HttpClient::builder(timeout)
            .retry(config.retry_policy())
            .build()?;
        let proxied = HttpClient::builder(timeout)
            .proxy(&proxy)
            .retry(config.retry_policy())
            .build()?;
        let probe_client = HttpClient::builder(Duration::from_secs(tor.probe_timeout_secs))
            .proxy(&proxy)
            .retry(RetryPolicy::immediate(0))
            .build()?;

        Ok(Self::with_clients(
            config.effective_engines(),
            direct,
            proxied,
            TorProbe::new(probe_client, &tor.probe_url, &tor.probe_marker),
            config.strategy,
        ))
    }

    /// Assemble a resolver from pre-built clients.
    pub fn with_clients(
        engines: Vec<SearchEngineConfig>,
        direct: HttpClient,
        proxied: HttpClient,
        probe: TorProbe,
        strategy: ResolveStrategy,
    ) -> Self {
        Self {
            engines,
            direct,
            proxied,
            probe,
            strategy,
        }
    }

    pub fn engines(&self) -> &[SearchEngineConfig] {
        &self.engines
    }

    pub fn strategy(&self) -> ResolveStrategy {
        self.strategy
    }

    async fn query_engine(
        &self,
        engine: &SearchEngineConfig,
        keyword: &str,
        max_results: usize,
    ) -> Result<Vec<String>, EngineError> {
        if engine.requires_proxy {
            self.probe.check(&engine.name).await?;
        }

        let client = if engine.requires_proxy {
            &self.proxied
        } else {
            &self.direct
        };
        let url = engine.search_url(keyword);
        debug!("{} query: {}", engine.name, url);

        let response = client
            .get(&url, browser_headers(Some(&engine.referer)))
            .await
            .map_err(|source| EngineError::Transport {
                engine: engine.name.clone(),
                source,
            })?;
        if !response.is_success() {
            return Err(EngineError::Status {
                engine: engine.name.clone(),
                status: response.status,
            });
        }

        let raw = extract_hrefs(&response.body);
        Ok(dedup_truncate(clean_onion_links(&raw), max_results))
    }
}

#[async_trait]
impl CandidateResolver for MultiEngineResolver {
    async fn resolve(&self, keyword: &str, max_results: usize) -> Result<Vec<String>, CrawlError> {
        let mut accumulated: Vec<String> = Vec::new();

        for engine in &self.engines {
            info!("Attempting {} search for: {}", engine.name, keyword);
            match self.query_engine(engine, keyword, max_results).await {
                Ok(links) if links.is_empty() => {
                    info!("{} returned no onion links", engine.name);
                }
                Ok(links) => {
                    info!("Found {} links via {}", links.len(), engine.name);
                    match self.strategy {
                        ResolveStrategy::FirstSuccess => return Ok(links),
                        ResolveStrategy::Accumulate => {
                            accumulated =
                                dedup_truncate(accumulated.into_iter().chain(links), max_results);
                            if accumulated.len() >= max_results {
                                break;
                            }
                        }
                    }
                }
                Err(e) => warn!("{}", e),
            }
        }

        if accumulated.is_empty() {
            warn!("No onion links found for '{}' on any engine", keyword);
        }
        Ok(accumulated)
    }
}
