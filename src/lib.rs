//! onionscope - keyword reconnaissance crawler for Tor hidden services.
//!
//! Resolves a keyword to candidate `.onion` addresses through several search
//! engines, renders each page in headless Chromium over Tor, extracts
//! identifiers and keyword context, and writes a per-session report.

pub mod browser;
pub mod cli;
pub mod config;
pub mod crawl;
pub mod error;
pub mod extract;
pub mod http_client;
pub mod models;
pub mod privacy;
pub mod resolver;
pub mod storage;

pub use config::Settings;
pub use crawl::{run_crawl, Cancellation, Crawler};
pub use error::{CrawlError, EngineError, RenderError, RotationError};
pub use models::{CrawlRequest, PageArtifact, SessionReport};
