//! Crawl orchestration.
//!
//! A session moves through `Resolving -> Fetching -> ExpandingInternal* ->
//! Reporting -> Done`. Page failures never abort the session; they are
//! recorded on the page's artifact. Only session-level problems (bad request,
//! unwritable output, resolver breakdown) are returned as errors.

mod cancel;
mod pacing;

pub use cancel::Cancellation;
pub use pacing::{NoPacing, PacingPolicy, Pause, RandomPacing};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::browser::{default_capture, PageRenderer, Renderer};
use crate::config::Settings;
use crate::error::CrawlError;
use crate::extract::default_detector;
use crate::models::{timestamp, CrawlRequest, PageArtifact, SessionReport};
use crate::privacy::{IdentityRotator, RotationOutcome, TorController};
use crate::resolver::{CandidateResolver, MultiEngineResolver};
use crate::storage::{page_dir_name, SessionStore};

/// Internal links followed per seed page.
pub const MAX_INTERNAL_LINKS: usize = 5;

/// Session-wide note recorded when resolution yields nothing.
pub const NO_LINKS_FOUND: &str = "No links found";

/// Error recorded on a page aborted by cancellation.
pub const CANCELLED: &str = "cancelled";

/// Stage of a crawl session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlPhase {
    Resolving,
    Fetching,
    ExpandingInternal,
    Reporting,
    Done,
    Failed(String),
}

impl std::fmt::Display for CrawlPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CrawlPhase::Resolving => write!(f, "resolving"),
            CrawlPhase::Fetching => write!(f, "fetching"),
            CrawlPhase::ExpandingInternal => write!(f, "expanding internal links"),
            CrawlPhase::Reporting => write!(f, "reporting"),
            CrawlPhase::Done => write!(f, "done"),
            CrawlPhase::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Events emitted while a session runs.
#[derive(Debug, Clone)]
pub enum CrawlEvent {
    Phase(CrawlPhase),
    /// Candidates resolved for the keyword.
    Resolved { count: usize },
    PageStarted { url: String, depth: u8 },
    PageFinished {
        url: String,
        depth: u8,
        ok: bool,
        error: Option<String>,
    },
    Rotated(RotationOutcome),
}

enum PageOutcome {
    Done(PageArtifact),
    Cancelled(PageArtifact),
}

/// Artifacts produced from one seed and its internal links.
struct SeedRun {
    artifacts: Vec<PageArtifact>,
    cancelled: bool,
}

/// Same-host links of `seed`, de-duplicated in order, without the seed itself.
pub fn internal_links(seed: &str, links: &[String]) -> Vec<String> {
    let Some(seed_host) = Url::parse(seed)
        .ok()
        .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
    else {
        return Vec::new();
    };
    let seed_norm = seed.trim_end_matches('/');

    let mut seen = std::collections::HashSet::new();
    let mut found = Vec::new();
    for link in links {
        let same_host = Url::parse(link)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.eq_ignore_ascii_case(&seed_host)))
            .unwrap_or(false);
        if !same_host || link.trim_end_matches('/') == seed_norm {
            continue;
        }
        if seen.insert(link.as_str()) {
            found.push(link.clone());
            if found.len() == MAX_INTERNAL_LINKS {
                break;
            }
        }
    }
    found
}

/// Runs crawl sessions.
pub struct Crawler {
    resolver: Arc<dyn CandidateResolver>,
    renderer: Arc<dyn PageRenderer>,
    rotator: Option<Arc<dyn IdentityRotator>>,
    pacing: Arc<dyn PacingPolicy>,
    output_dir: PathBuf,
    concurrency: usize,
    events: Option<mpsc::Sender<CrawlEvent>>,
}

impl Crawler {
    pub fn new(
        resolver: Arc<dyn CandidateResolver>,
        renderer: Arc<dyn PageRenderer>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            resolver,
            renderer,
            rotator: None,
            pacing: Arc::new(RandomPacing::default()),
            output_dir: output_dir.into(),
            concurrency: 1,
            events: None,
        }
    }

    /// Build a crawler wired to Tor, the search engines, and Chromium.
    pub fn from_settings(settings: &Settings) -> Result<Self, CrawlError> {
        let resolver = MultiEngineResolver::new(&settings.resolver, &settings.tor)
            .map_err(|e| CrawlError::Resolver(e.to_string()))?;
        let capture = default_capture(&settings.browser, &settings.tor.proxy_config());
        let renderer = Renderer::new(capture, default_detector());

        let mut crawler = Self::new(Arc::new(resolver), Arc::new(renderer), &settings.output_dir)
            .with_concurrency(settings.concurrency);
        if let Some(controller) = TorController::from_config(&settings.tor) {
            crawler = crawler.with_rotator(Arc::new(controller));
        }
        if !settings.pacing {
            crawler = crawler.with_pacing(Arc::new(NoPacing));
        }
        Ok(crawler)
    }

    pub fn with_rotator(mut self, rotator: Arc<dyn IdentityRotator>) -> Self {
        self.rotator = Some(rotator);
        self
    }

    pub fn with_pacing(mut self, pacing: Arc<dyn PacingPolicy>) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_events(mut self, events: mpsc::Sender<CrawlEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    async fn emit(&self, event: CrawlEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event).await;
        }
    }

    async fn enter(&self, phase: CrawlPhase) {
        debug!("Crawl phase: {}", phase);
        self.emit(CrawlEvent::Phase(phase)).await;
    }

    /// Sleep for the policy's delay. Returns false if cancelled meanwhile.
    async fn pause(&self, pause: Pause, cancel: &Cancellation) -> bool {
        let delay = self.pacing.delay(pause);
        if delay.is_zero() {
            return !cancel.is_cancelled();
        }
        tokio::select! {
            _ = tokio::time::sleep(delay) => !cancel.is_cancelled(),
            _ = cancel.cancelled() => false,
        }
    }

    async fn rotate(&self, rotator: &dyn IdentityRotator) {
        let outcome = rotator.rotate_identity().await;
        self.emit(CrawlEvent::Rotated(outcome)).await;
    }

    async fn fetch(
        &self,
        url: &str,
        reports_dir: &Path,
        keyword: &str,
        depth: u8,
        cancel: &Cancellation,
    ) -> PageOutcome {
        self.emit(CrawlEvent::PageStarted {
            url: url.to_string(),
            depth,
        })
        .await;

        // The renderer records cancellation in the page's own bundle.
        let artifact = match self
            .renderer
            .render(url, reports_dir, Some(keyword), depth, cancel)
            .await
        {
            Ok(artifact) => artifact,
            Err(e) => {
                error!("Could not record {}: {}", url, e);
                PageArtifact::failed(url, &page_dir_name(url), depth, e.to_string())
            }
        };
        let outcome = if cancel.is_cancelled() {
            PageOutcome::Cancelled(artifact)
        } else {
            PageOutcome::Done(artifact)
        };

        let artifact = match &outcome {
            PageOutcome::Done(a) | PageOutcome::Cancelled(a) => a,
        };
        self.emit(CrawlEvent::PageFinished {
            url: url.to_string(),
            depth,
            ok: artifact.ok,
            error: artifact.error.clone(),
        })
        .await;
        outcome
    }

    /// Fetch one seed and, when requested, its internal links.
    async fn crawl_seed(
        &self,
        index: usize,
        seed: &str,
        request: &CrawlRequest,
        reports_dir: &Path,
        rotator: Option<&dyn IdentityRotator>,
        cancel: &Cancellation,
    ) -> SeedRun {
        let mut run = SeedRun {
            artifacts: Vec::new(),
            cancelled: false,
        };

        if index > 0 && !self.pause(Pause::BetweenSeeds, cancel).await {
            run.cancelled = true;
            return run;
        }
        if let Some(rotator) = rotator {
            self.rotate(rotator).await;
            if !self.pause(Pause::AfterRotationBeforeSeed, cancel).await {
                run.cancelled = true;
                return run;
            }
        }

        self.enter(CrawlPhase::Fetching).await;
        info!("[{}] Fetching {}", index + 1, seed);
        let seed_artifact = match self.fetch(seed, reports_dir, &request.keyword, 0, cancel).await {
            PageOutcome::Done(a) => a,
            PageOutcome::Cancelled(a) => {
                run.artifacts.push(a);
                run.cancelled = true;
                return run;
            }
        };

        let follow = if request.follows_internal_links() {
            internal_links(seed, &seed_artifact.links)
        } else {
            Vec::new()
        };
        run.artifacts.push(seed_artifact);
        if follow.is_empty() {
            return run;
        }

        self.enter(CrawlPhase::ExpandingInternal).await;
        info!("Following {} internal links of {}", follow.len(), seed);
        for link in follow {
            if let Some(rotator) = rotator {
                self.rotate(rotator).await;
                if !self.pause(Pause::AfterRotationBeforeInternal, cancel).await {
                    run.cancelled = true;
                    return run;
                }
            }
            if !self.pause(Pause::BetweenInternalLinks, cancel).await {
                run.cancelled = true;
                return run;
            }
            match self.fetch(&link, reports_dir, &request.keyword, 1, cancel).await {
                PageOutcome::Done(a) => run.artifacts.push(a),
                PageOutcome::Cancelled(a) => {
                    run.artifacts.push(a);
                    run.cancelled = true;
                    return run;
                }
            }
        }
        run
    }

    /// Run one crawl session and persist its report.
    pub async fn run(
        &self,
        request: &CrawlRequest,
        cancel: &Cancellation,
    ) -> Result<SessionReport, CrawlError> {
        request.validate()?;
        let store = SessionStore::create(&self.output_dir, &request.keyword)?;
        info!("Session {} in {}", store.session_id(), store.dir().display());

        self.enter(CrawlPhase::Resolving).await;
        let resolved = tokio::select! {
            _ = cancel.cancelled() => None,
            result = self.resolver.resolve(&request.keyword, request.max_results) => Some(result),
        };
        let resolve_cancelled = resolved.is_none();
        let mut candidates = match resolved {
            Some(Ok(candidates)) => candidates,
            Some(Err(e)) => {
                self.enter(CrawlPhase::Failed(e.to_string())).await;
                return Err(e);
            }
            None => Vec::new(),
        };
        candidates.truncate(request.max_results);
        store.write_candidates(&candidates)?;
        self.emit(CrawlEvent::Resolved {
            count: candidates.len(),
        })
        .await;

        let mut report = SessionReport {
            session_id: store.session_id().to_string(),
            keyword: request.keyword.clone(),
            requested_count: request.max_results,
            found_count: candidates.len(),
            scraped_count: 0,
            session_dir: store.dir().to_path_buf(),
            timestamp: timestamp(),
            cancelled: resolve_cancelled,
            error: None,
            results: Vec::new(),
        };

        if candidates.is_empty() {
            if !report.cancelled {
                warn!("{} for '{}'", NO_LINKS_FOUND, request.keyword);
                report.error = Some(NO_LINKS_FOUND.to_string());
                self.enter(CrawlPhase::Failed(NO_LINKS_FOUND.to_string()))
                    .await;
            }
            store.write_report(&report)?;
            return Ok(report);
        }

        let rotator = if request.rotate_identity {
            if self.rotator.is_none() {
                warn!("Identity rotation requested but no Tor control port is configured");
            }
            self.rotator.as_deref()
        } else {
            None
        };

        let reports_dir = store.reports_dir();
        let runs: Vec<SeedRun> = if self.concurrency > 1 && rotator.is_none() {
            info!(
                "Crawling {} seeds with {} workers",
                candidates.len(),
                self.concurrency
            );
            stream::iter(candidates.iter().enumerate())
                .map(|(i, seed)| self.crawl_seed(i, seed, request, &reports_dir, None, cancel))
                .buffered(self.concurrency)
                .collect()
                .await
        } else {
            let mut runs = Vec::with_capacity(candidates.len());
            for (i, seed) in candidates.iter().enumerate() {
                if cancel.is_cancelled() {
                    runs.push(SeedRun {
                        artifacts: Vec::new(),
                        cancelled: true,
                    });
                    break;
                }
                let run = self
                    .crawl_seed(i, seed, request, &reports_dir, rotator, cancel)
                    .await;
                let stop = run.cancelled;
                runs.push(run);
                if stop {
                    break;
                }
            }
            runs
        };

        for run in runs {
            report.cancelled |= run.cancelled;
            report.results.extend(run.artifacts);
        }
        report.scraped_count = report.results.len();
        report.timestamp = timestamp();

        self.enter(CrawlPhase::Reporting).await;
        let path = store.write_report(&report)?;
        info!(
            "Report saved to {} ({} ok, {} failed{})",
            path.display(),
            report.ok_count(),
            report.failed_count(),
            if report.cancelled { ", cancelled" } else { "" }
        );
        self.enter(CrawlPhase::Done).await;
        Ok(report)
    }
}

/// Build a crawler from `settings` and run `request` without a deadline.
pub async fn run_crawl(
    settings: &Settings,
    request: &CrawlRequest,
) -> Result<SessionReport, CrawlError> {
    Crawler::from_settings(settings)?
        .run(request, &Cancellation::none())
        .await
}
