//! Error types for each layer of the crawler.
//!
//! Only [`CrawlError`] ever reaches the caller of a crawl session. Engine,
//! render and rotation failures are recovered where they happen and show up
//! in logs, in a page artifact's `error` field, or in a rotation outcome.

use std::path::PathBuf;

use thiserror::Error;

/// Failure of a single search engine attempt.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Tor probe failed for {engine}: {reason}")]
    ProbeFailed { engine: String, reason: String },
    #[error("{engine} returned HTTP {status}")]
    Status { engine: String, status: u16 },
    #[error("{engine} request failed: {source}")]
    Transport {
        engine: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Proxy configuration error: {0}")]
    Proxy(String),
    #[error("HTTP client configuration error: {0}")]
    Client(String),
}

/// Failure while rendering one page.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Browser launch failed: {0}")]
    Launch(String),
    #[error("Navigation timed out after {secs}s for {url}")]
    NavigationTimeout { url: String, secs: u64 },
    #[error("Navigation failed for {url}: {reason}")]
    Navigation { url: String, reason: String },
    #[error("Page capture failed: {0}")]
    Capture(String),
    #[error("Browser support not compiled. Rebuild with: cargo build --features browser")]
    Unsupported,
    #[error("I/O error writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure while asking Tor for a new circuit.
#[derive(Debug, Error)]
pub enum RotationError {
    #[error("Tor control endpoint not configured")]
    NotConfigured,
    #[error("Invalid control endpoint '{0}', expected host:port")]
    InvalidEndpoint(String),
    #[error("Could not reach control port {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Control port rejected authentication: {0}")]
    AuthRejected(String),
    #[error("Control port rejected NEWNYM: {0}")]
    SignalRejected(String),
    #[error("Control port I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Control port timed out")]
    Timeout,
}

/// Session-level failure. The only error class returned by a crawl.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Invalid crawl request: {0}")]
    InvalidRequest(String),
    #[error("Output directory {path} is not writable: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Resolver failed: {0}")]
    Resolver(String),
}
