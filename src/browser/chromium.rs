//! Headless Chromium capture over the Tor SOCKS proxy.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, NavigateParams};
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use rand::Rng;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::stealth::{CHROME_ARGS, STEALTH_SCRIPTS};
use super::{BrowserEngineConfig, CapturedPage, PageCapture};
use crate::error::RenderError;
use crate::http_client::random_user_agent;
use crate::privacy::ProxyConfig;

const CHROME_PATHS: &[&str] = &[
    // Linux
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
    // macOS
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    "/opt/google/chrome/google-chrome",
];

const CHROME_COMMANDS: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
];

/// Resolves once the DOM is parsed; does not wait for subresources.
const WAIT_FOR_DOM_SCRIPT: &str = r#"
    new Promise((resolve) => {
        if (document.readyState === 'complete' || document.readyState === 'interactive') {
            resolve(document.readyState);
        } else {
            document.addEventListener('DOMContentLoaded', () => resolve(document.readyState));
        }
    })
"#;

const OUTER_HTML_SCRIPT: &str = "document.documentElement ? document.documentElement.outerHTML : ''";
const BODY_TEXT_SCRIPT: &str = "document.body ? document.body.innerText : ''";

static PROFILE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Locate a Chrome/Chromium executable.
pub fn find_chrome(explicit: Option<&Path>) -> Result<PathBuf, RenderError> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        warn!("Configured Chrome path {} does not exist", path.display());
    }

    for path in CHROME_PATHS {
        let p = Path::new(path);
        if p.exists() {
            debug!("Found Chrome at: {}", path);
            return Ok(p.to_path_buf());
        }
    }

    for cmd in CHROME_COMMANDS {
        if let Ok(path) = which::which(cmd) {
            debug!("Found Chrome in PATH: {}", path.display());
            return Ok(path);
        }
    }

    Err(RenderError::Launch(
        "Chrome/Chromium not found. Install it or set CHROME_PATH".to_string(),
    ))
}

fn random_duration(min_secs: f64, max_secs: f64) -> Duration {
    Duration::from_secs_f64(rand::rng().random_range(min_secs..=max_secs))
}

fn random_scrolls() -> Vec<u32> {
    let mut rng = rand::rng();
    let count = rng.random_range(3..=7);
    (0..count).map(|_| rng.random_range(300..=1000)).collect()
}

/// A launched browser. Dropping it stops the event handler and removes the profile.
struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
    profile_dir: PathBuf,
}

impl BrowserSession {
    async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            debug!("Browser close failed: {}", e);
        }
        let _ = self.browser.wait().await;
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        self.handler.abort();
        let _ = std::fs::remove_dir_all(&self.profile_dir);
    }
}

/// Captures pages with a fresh headless Chromium per page.
pub struct ChromiumCapture {
    config: BrowserEngineConfig,
    proxy: ProxyConfig,
}

impl ChromiumCapture {
    pub fn new(config: BrowserEngineConfig, proxy: ProxyConfig) -> Self {
        Self { config, proxy }
    }

    async fn launch(&self) -> Result<BrowserSession, RenderError> {
        let chrome = find_chrome(self.config.chrome_path.as_deref())?;
        let profile_dir = std::env::temp_dir().join(format!(
            "onionscope-profile-{}-{}",
            std::process::id(),
            PROFILE_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome)
            .user_data_dir(&profile_dir)
            .window_size(self.config.viewport_width, self.config.viewport_height)
            .arg(format!("--proxy-server={}", self.proxy.browser_proxy_server))
            .arg(format!(
                "--host-resolver-rules={}",
                self.proxy.browser_host_resolver_rules
            ));
        if !self.config.headless {
            builder = builder.with_head();
        }
        for arg in CHROME_ARGS {
            builder = builder.arg(*arg);
        }
        for arg in &self.config.chrome_args {
            builder = builder.arg(arg);
        }

        let config = builder
            .build()
            .map_err(|e| RenderError::Launch(format!("Failed to build browser config: {}", e)))?;
        let (browser, mut handler) = match Browser::launch(config).await {
            Ok(launched) => launched,
            Err(e) => {
                let _ = std::fs::remove_dir_all(&profile_dir);
                return Err(RenderError::Launch(e.to_string()));
            }
        };

        let handler = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        Ok(BrowserSession {
            browser,
            handler,
            profile_dir,
        })
    }

    async fn navigate(&self, page: &Page, url: &str) -> Result<(), RenderError> {
        info!("Opening {}", url);
        let nav_params = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(|e| RenderError::Navigation {
                url: url.to_string(),
                reason: format!("Invalid URL: {}", e),
            })?;

        let secs = self.config.page_timeout_secs;
        let response = tokio::time::timeout(Duration::from_secs(secs), page.execute(nav_params))
            .await
            .map_err(|_| RenderError::NavigationTimeout {
                url: url.to_string(),
                secs,
            })?
            .map_err(|e| RenderError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        if let Some(error_text) = response.result.error_text.clone() {
            return Err(RenderError::Navigation {
                url: url.to_string(),
                reason: error_text,
            });
        }

        match tokio::time::timeout(
            Duration::from_secs(secs),
            page.evaluate(WAIT_FOR_DOM_SCRIPT.to_string()),
        )
        .await
        {
            Ok(Ok(result)) => {
                let state: String = result
                    .into_value()
                    .unwrap_or_else(|_| "unknown".to_string());
                debug!("Page ready state: {}", state);
                Ok(())
            }
            Ok(Err(e)) => {
                debug!("Could not check ready state for {}: {}", url, e);
                Ok(())
            }
            Err(_) => Err(RenderError::NavigationTimeout {
                url: url.to_string(),
                secs,
            }),
        }
    }

    async fn apply_stealth(&self, page: &Page) {
        for script in STEALTH_SCRIPTS {
            if let Err(e) = page.evaluate(script.to_string()).await {
                debug!("Stealth script injection skipped: {}", e);
            }
        }
    }

    async fn emulate_browsing(&self, page: &Page) {
        tokio::time::sleep(random_duration(1.0, 2.5)).await;
        for dy in random_scrolls() {
            let script = format!("window.scrollBy(0, {})", dy);
            if let Err(e) = page.evaluate(script).await {
                debug!("Scroll failed: {}", e);
                break;
            }
            tokio::time::sleep(random_duration(0.6, 1.6)).await;
        }
    }

    async fn read_html(page: &Page) -> String {
        match page.content().await {
            Ok(html) => html,
            Err(e) => {
                debug!("page.content() failed ({}), serializing DOM", e);
                match page.evaluate(OUTER_HTML_SCRIPT).await {
                    Ok(result) => result.into_value().unwrap_or_default(),
                    Err(_) => String::new(),
                }
            }
        }
    }

    async fn read_text(page: &Page) -> String {
        let primary = match page.find_element("body").await {
            Ok(body) => body.inner_text().await.ok().flatten(),
            Err(_) => None,
        };
        match primary {
            Some(text) => text,
            None => match page.evaluate(BODY_TEXT_SCRIPT).await {
                Ok(result) => result.into_value().unwrap_or_default(),
                Err(_) => String::new(),
            },
        }
    }

    async fn screenshot(page: &Page, url: &str) -> Option<Vec<u8>> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(true)
            .build();
        match page.screenshot(params).await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!("Screenshot failed for {}: {}", url, e);
                None
            }
        }
    }

    async fn capture_page(&self, page: &Page, url: &str) -> Result<CapturedPage, RenderError> {
        let user_agent = random_user_agent();
        if let Err(e) = page
            .execute(SetUserAgentOverrideParams::new(user_agent.to_string()))
            .await
        {
            debug!("User agent override failed: {}", e);
        }

        self.navigate(page, url).await?;
        self.apply_stealth(page).await;
        if self.config.emulate_browsing {
            self.emulate_browsing(page).await;
        }

        let html = Self::read_html(page).await;
        let screenshot = Self::screenshot(page, url).await;
        let text = Self::read_text(page).await;

        Ok(CapturedPage {
            html,
            text,
            screenshot,
        })
    }
}

#[async_trait]
impl PageCapture for ChromiumCapture {
    async fn capture(&self, url: &str) -> Result<CapturedPage, RenderError> {
        let session = self.launch().await?;

        let result = match session.browser.new_page("about:blank").await {
            Ok(page) => {
                let result = self.capture_page(&page, url).await;
                let _ = page.close().await;
                result
            }
            Err(e) => Err(RenderError::Capture(format!("Failed to open page: {}", e))),
        };

        session.close().await;
        result
    }
}
