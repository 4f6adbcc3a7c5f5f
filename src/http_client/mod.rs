//! HTTP client for search-engine requests.
//!
//! Clients are either direct (clearnet engines) or routed through the Tor
//! SOCKS endpoint with remote DNS. Transient failures are retried with
//! exponential backoff, scoped to a single request.

mod user_agent;

pub use user_agent::{browser_headers, random_user_agent, BROWSER_USER_AGENTS};

use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::{Client, Proxy};
use tracing::{debug, warn};

use crate::error::EngineError;
use crate::privacy::ProxyConfig;

/// Status codes treated as transient.
pub const RETRY_STATUSES: &[u16] = &[400, 429, 500, 502, 503, 504];

/// Retry and backoff settings for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each later retry.
    pub backoff_base: Duration,
    pub retry_statuses: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: Duration::from_secs(5),
            retry_statuses: RETRY_STATUSES.to_vec(),
        }
    }
}

impl RetryPolicy {
    /// A policy that retries immediately, for tests and local mocks.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff_base: Duration::ZERO,
            ..Default::default()
        }
    }

    /// Backoff before retry number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff_base
            .saturating_mul(2u32.saturating_pow(attempt.min(16)))
    }

    pub fn should_retry_status(&self, status: u16) -> bool {
        self.retry_statuses.contains(&status)
    }
}

/// Final response of a (possibly retried) request.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
    /// Total attempts made, including the first.
    pub attempts: u32,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// reqwest client plus retry policy.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    retry: RetryPolicy,
    proxied: bool,
}

/// Builder for [`HttpClient`].
pub struct HttpClientBuilder {
    timeout: Duration,
    proxy: Option<ProxyConfig>,
    retry: RetryPolicy,
}

impl HttpClientBuilder {
    /// Route every request through `proxy`.
    pub fn proxy(mut self, proxy: &ProxyConfig) -> Self {
        self.proxy = Some(proxy.clone());
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn build(self) -> Result<HttpClient, EngineError> {
        let client = HttpClient::build_client(self.timeout, self.proxy.as_ref())?;
        Ok(HttpClient {
            client,
            retry: self.retry,
            proxied: self.proxy.is_some(),
        })
    }
}

impl HttpClient {
    pub fn builder(timeout: Duration) -> HttpClientBuilder {
        HttpClientBuilder {
            timeout,
            proxy: None,
            retry: RetryPolicy::default(),
        }
    }

    fn build_client(timeout: Duration, proxy: Option<&ProxyConfig>) -> Result<Client, EngineError> {
        let mut builder = Client::builder().timeout(timeout).gzip(true).brotli(true);

        if let Some(proxy) = proxy {
            let proxy_url = proxy.http_proxy_url.as_str();
            if !proxy_url.starts_with("socks5://") && !proxy_url.starts_with("socks5h://") {
                return Err(EngineError::Proxy(format!(
                    "Invalid SOCKS proxy URL: '{}'. Must start with socks5:// or socks5h://",
                    proxy_url
                )));
            }
            let proxy = Proxy::all(proxy_url).map_err(|e| {
                EngineError::Proxy(format!("Invalid SOCKS proxy URL '{}': {}", proxy_url, e))
            })?;
            builder = builder.proxy(proxy);
        }

        builder
            .build()
            .map_err(|e| EngineError::Client(format!("Failed to create HTTP client: {}", e)))
    }

    /// Whether requests go through the Tor proxy.
    pub fn is_proxied(&self) -> bool {
        self.proxied
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// GET `url`, retrying transient statuses and connection failures.
    ///
    /// A retryable status that persists past the last retry is returned as
    /// the final response rather than an error.
    pub async fn get(&self, url: &str, headers: HeaderMap) -> Result<HttpResponse, reqwest::Error> {
        let mut attempt: u32 = 0;
        loop {
            let result = self.client.get(url).headers(headers.clone()).send().await;
            let can_retry = attempt < self.retry.max_retries;

            match result {
                Ok(response) => {
                    let status = response.status().as_u16();
                    if can_retry && self.retry.should_retry_status(status) {
                        let delay = self.retry.delay_for(attempt);
                        debug!(
                            "HTTP {} from {}, retry {}/{} in {:?}",
                            status,
                            url,
                            attempt + 1,
                            self.retry.max_retries,
                            delay
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    let body = response.text().await?;
                    return Ok(HttpResponse {
                        status,
                        body,
                        attempts: attempt + 1,
                    });
                }
                Err(e) if can_retry && e.is_connect() => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        "Connection to {} failed ({}), retry {}/{} in {:?}",
                        url,
                        e,
                        attempt + 1,
                        self.retry.max_retries,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
