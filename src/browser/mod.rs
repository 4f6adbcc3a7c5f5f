//! Page rendering through headless Chromium over Tor.
//!
//! [`PageCapture`] drives the browser and returns raw page material;
//! [`Renderer`] turns that into a persisted [`PageArtifact`] bundle.
//! Each capture launches its own browser process with a throwaway profile
//! and tears it down before returning.

#[cfg(feature = "browser")]
mod chromium;
mod render;
mod stealth;

#[cfg(feature = "browser")]
pub use chromium::{find_chrome, ChromiumCapture};
pub use render::{Renderer, RENDER_EXCERPT_WINDOW};
pub use stealth::{CHROME_ARGS, STEALTH_SCRIPTS};

use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::crawl::Cancellation;
use crate::error::RenderError;
use crate::models::PageArtifact;
use crate::privacy::ProxyConfig;

/// Raw material captured from one page.
#[derive(Debug, Clone, Default)]
pub struct CapturedPage {
    pub html: String,
    /// Visible text of the body.
    pub text: String,
    /// Full-page PNG, when the screenshot succeeded.
    pub screenshot: Option<Vec<u8>>,
}

/// Fetches one page through the proxy.
#[async_trait]
pub trait PageCapture: Send + Sync {
    async fn capture(&self, url: &str) -> Result<CapturedPage, RenderError>;
}

/// Produces a page artifact and its on-disk bundle.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// Render `url` into a bundle under `reports_dir`.
    ///
    /// Page failures are recorded on the returned artifact; `Err` is reserved
    /// for failures that prevent writing the bundle at all. When `cancel`
    /// fires mid-capture the artifact is failed with
    /// [`CANCELLED`](crate::crawl::CANCELLED) and its metadata is still
    /// written to the bundle.
    async fn render(
        &self,
        url: &str,
        reports_dir: &Path,
        keyword: Option<&str>,
        depth: u8,
        cancel: &Cancellation,
    ) -> Result<PageArtifact, RenderError>;
}

/// Browser settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowserEngineConfig {
    /// Explicit Chrome/Chromium executable. Set via `CHROME_PATH`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chrome_path: Option<PathBuf>,

    #[serde(default = "default_true")]
    pub headless: bool,

    /// Navigation timeout in seconds. Set via `ONIONSCOPE_PAGE_TIMEOUT`.
    #[serde(default = "default_page_timeout")]
    pub page_timeout_secs: u64,

    #[serde(default = "default_viewport_width")]
    pub viewport_width: u32,

    #[serde(default = "default_viewport_height")]
    pub viewport_height: u32,

    /// Randomized settle pause and scrolling after load.
    #[serde(default = "default_true")]
    pub emulate_browsing: bool,

    /// Extra Chromium flags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chrome_args: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_page_timeout() -> u64 {
    60
}

fn default_viewport_width() -> u32 {
    1280
}

fn default_viewport_height() -> u32 {
    900
}

impl Default for BrowserEngineConfig {
    fn default() -> Self {
        Self {
            chrome_path: None,
            headless: true,
            page_timeout_secs: default_page_timeout(),
            viewport_width: default_viewport_width(),
            viewport_height: default_viewport_height(),
            emulate_browsing: true,
            chrome_args: Vec::new(),
        }
    }
}

impl BrowserEngineConfig {
    /// Apply environment variable overrides.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| env::var(key).ok())
    }

    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(path) = lookup("CHROME_PATH") {
            if !path.is_empty() {
                self.chrome_path = Some(PathBuf::from(shellexpand::tilde(&path).into_owned()));
            }
        }
        if let Some(secs) = lookup("ONIONSCOPE_PAGE_TIMEOUT").and_then(|v| v.parse().ok()) {
            self.page_timeout_secs = secs;
        }
        self
    }
}

/// Capture used when the crate is built without browser support.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableCapture;

#[async_trait]
impl PageCapture for UnavailableCapture {
    async fn capture(&self, _url: &str) -> Result<CapturedPage, RenderError> {
        Err(RenderError::Unsupported)
    }
}

/// The best page capture available in this build.
pub fn default_capture(config: &BrowserEngineConfig, proxy: &ProxyConfig) -> Arc<dyn PageCapture> {
    #[cfg(feature = "browser")]
    {
        Arc::new(ChromiumCapture::new(config.clone(), proxy.clone()))
    }
    #[cfg(not(feature = "browser"))]
    {
        let _ = (config, proxy);
        Arc::new(UnavailableCapture)
    }
}
