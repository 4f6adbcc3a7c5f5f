//! Orchestrator behavior against stub resolver, renderer and rotator.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::tempdir;
use tokio::sync::mpsc;

use onionscope::browser::{CapturedPage, PageCapture, PageRenderer, Renderer};
use onionscope::crawl::{Cancellation, CrawlEvent, CrawlPhase, Crawler, NoPacing, CANCELLED};
use onionscope::error::{CrawlError, RenderError};
use onionscope::extract::NoLanguageDetection;
use onionscope::models::{CrawlRequest, PageArtifact, SessionReport};
use onionscope::privacy::{IdentityRotator, RotationOutcome};
use onionscope::resolver::CandidateResolver;
use onionscope::storage::{page_dir_name, CANDIDATES_FILE, META_FILE, REPORTS_DIR, REPORT_FILE};

struct StubResolver {
    links: Vec<String>,
}

#[async_trait]
impl CandidateResolver for StubResolver {
    async fn resolve(&self, _keyword: &str, max_results: usize) -> Result<Vec<String>, CrawlError> {
        Ok(self.links.iter().take(max_results).cloned().collect())
    }
}

struct BrokenResolver;

#[async_trait]
impl CandidateResolver for BrokenResolver {
    async fn resolve(&self, _keyword: &str, _max: usize) -> Result<Vec<String>, CrawlError> {
        Err(CrawlError::Resolver("engine list is empty".into()))
    }
}

#[derive(Default)]
struct StubRenderer {
    links: HashMap<String, Vec<String>>,
    failing: HashSet<String>,
    slow: HashMap<String, Duration>,
    rendered: Mutex<Vec<String>>,
}

impl StubRenderer {
    fn rendered(&self) -> Vec<String> {
        self.rendered.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageRenderer for StubRenderer {
    async fn render(
        &self,
        url: &str,
        _reports_dir: &Path,
        _keyword: Option<&str>,
        depth: u8,
        cancel: &Cancellation,
    ) -> Result<PageArtifact, RenderError> {
        if let Some(delay) = self.slow.get(url) {
            tokio::select! {
                _ = tokio::time::sleep(*delay) => {}
                _ = cancel.cancelled() => {
                    return Ok(PageArtifact::failed(url, &page_dir_name(url), depth, CANCELLED));
                }
            }
        }
        self.rendered.lock().unwrap().push(url.to_string());
        if self.failing.contains(url) {
            return Err(RenderError::NavigationTimeout {
                url: url.to_string(),
                secs: 60,
            });
        }
        let mut artifact = PageArtifact::pending(url, &page_dir_name(url), depth);
        artifact.ok = true;
        artifact.links = self.links.get(url).cloned().unwrap_or_default();
        Ok(artifact)
    }
}

#[derive(Default)]
struct CountingRotator {
    calls: AtomicUsize,
}

#[async_trait]
impl IdentityRotator for CountingRotator {
    async fn rotate_identity(&self) -> RotationOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        RotationOutcome::ok("NEWNYM signal sent")
    }
}

struct RefusingRotator {
    calls: AtomicUsize,
}

#[async_trait]
impl IdentityRotator for RefusingRotator {
    async fn rotate_identity(&self) -> RotationOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        RotationOutcome::failed("515 Authentication failed")
    }
}

struct StalledCapture;

#[async_trait]
impl PageCapture for StalledCapture {
    async fn capture(&self, _url: &str) -> Result<CapturedPage, RenderError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(CapturedPage::default())
    }
}

fn seeds(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("http://seed{}.onion/", i)).collect()
}

fn crawler(resolver: Vec<String>, renderer: Arc<StubRenderer>, out: &Path) -> Crawler {
    Crawler::new(Arc::new(StubResolver { links: resolver }), renderer, out)
        .with_pacing(Arc::new(NoPacing))
}

fn read_report(report: &SessionReport) -> SessionReport {
    let raw = std::fs::read_to_string(report.session_dir.join(REPORT_FILE)).unwrap();
    serde_json::from_str(&raw).unwrap()
}

#[tokio::test]
async fn three_seeds_at_depth_zero() {
    let tmp = tempdir().unwrap();
    let renderer = Arc::new(StubRenderer::default());
    let request = CrawlRequest::new("darknet market").with_max_results(3);

    let report = crawler(seeds(3), renderer.clone(), tmp.path())
        .run(&request, &Cancellation::none())
        .await
        .unwrap();

    assert_eq!(report.found_count, 3);
    assert_eq!(report.scraped_count, 3);
    assert_eq!(report.requested_count, 3);
    assert!(report.results.iter().all(|r| r.depth == 0 && r.ok));
    assert!(!report.cancelled);
    assert!(report.error.is_none());
    assert_eq!(renderer.rendered(), seeds(3));

    assert_eq!(read_report(&report), report);
    let candidates: Vec<String> = serde_json::from_str(
        &std::fs::read_to_string(report.session_dir.join(CANDIDATES_FILE)).unwrap(),
    )
    .unwrap();
    assert_eq!(candidates, seeds(3));
    assert!(report.session_id.starts_with("darknet_market_"));
}

#[tokio::test]
async fn failed_page_does_not_abort_session() {
    let tmp = tempdir().unwrap();
    let all = seeds(3);
    let renderer = Arc::new(StubRenderer {
        failing: HashSet::from([all[1].clone()]),
        ..Default::default()
    });

    let report = crawler(all.clone(), renderer, tmp.path())
        .run(&CrawlRequest::new("leak").with_max_results(3), &Cancellation::none())
        .await
        .unwrap();

    assert_eq!(report.scraped_count, 3);
    assert!(report.results[0].ok);
    assert!(!report.results[1].ok);
    assert!(!report.results[1].error.as_deref().unwrap_or("").is_empty());
    assert_eq!(report.results[1].url, all[1]);
    assert!(report.results[2].ok);
    assert_eq!(report.failed_count(), 1);
}

#[tokio::test]
async fn depth_one_caps_internal_links_at_five() {
    let tmp = tempdir().unwrap();
    let seed = "http://seed0.onion/".to_string();
    let mut page_links: Vec<String> = (0..8).map(|i| format!("http://seed0.onion/p{}", i)).collect();
    page_links.push("http://elsewhere.onion/".to_string());
    let renderer = Arc::new(StubRenderer {
        links: HashMap::from([(seed.clone(), page_links)]),
        ..Default::default()
    });

    let report = crawler(vec![seed], renderer.clone(), tmp.path())
        .run(
            &CrawlRequest::new("market").with_max_results(1).with_depth(1),
            &Cancellation::none(),
        )
        .await
        .unwrap();

    assert_eq!(report.scraped_count, 6);
    assert_eq!(report.results[0].depth, 0);
    let internal: Vec<_> = report.results.iter().filter(|r| r.depth == 1).collect();
    assert_eq!(internal.len(), 5);
    assert!(internal.iter().all(|r| r.url.starts_with("http://seed0.onion/p")));
    assert!(!renderer.rendered().contains(&"http://elsewhere.onion/".to_string()));
}

#[tokio::test]
async fn depth_two_is_treated_as_depth_one() {
    let tmp = tempdir().unwrap();
    let seed = "http://seed0.onion/".to_string();
    let child = "http://seed0.onion/child".to_string();
    let renderer = Arc::new(StubRenderer {
        links: HashMap::from([
            (seed.clone(), vec![child.clone()]),
            (child.clone(), vec!["http://seed0.onion/grandchild".to_string()]),
        ]),
        ..Default::default()
    });

    let report = crawler(vec![seed], renderer, tmp.path())
        .run(
            &CrawlRequest::new("market").with_max_results(1).with_depth(2),
            &Cancellation::none(),
        )
        .await
        .unwrap();

    assert_eq!(report.scraped_count, 2);
    assert!(report.results.iter().all(|r| r.depth <= 1));
}

#[tokio::test]
async fn no_candidates_still_writes_report() {
    let tmp = tempdir().unwrap();
    let report = crawler(Vec::new(), Arc::new(StubRenderer::default()), tmp.path())
        .run(&CrawlRequest::new("nothing"), &Cancellation::none())
        .await
        .unwrap();

    assert_eq!(report.error.as_deref(), Some("No links found"));
    assert_eq!(report.found_count, 0);
    assert!(report.results.is_empty());
    assert_eq!(read_report(&report).error.as_deref(), Some("No links found"));
    assert_eq!(
        std::fs::read_to_string(report.session_dir.join(CANDIDATES_FILE)).unwrap(),
        "[]"
    );
}

#[tokio::test]
async fn resolver_breakdown_is_session_error() {
    let tmp = tempdir().unwrap();
    let crawler = Crawler::new(
        Arc::new(BrokenResolver),
        Arc::new(StubRenderer::default()),
        tmp.path(),
    );
    let err = crawler
        .run(&CrawlRequest::new("market"), &Cancellation::none())
        .await
        .unwrap_err();
    assert!(matches!(err, CrawlError::Resolver(_)));
}

#[tokio::test]
async fn invalid_request_rejected_before_output() {
    let tmp = tempdir().unwrap();
    let out = tmp.path().join("out");
    let err = crawler(seeds(1), Arc::new(StubRenderer::default()), &out)
        .run(&CrawlRequest::new("x").with_max_results(0), &Cancellation::none())
        .await
        .unwrap_err();
    assert!(matches!(err, CrawlError::InvalidRequest(_)));
    assert!(!out.exists());
}

#[tokio::test]
async fn deadline_produces_partial_report() {
    let tmp = tempdir().unwrap();
    let all = seeds(3);
    let renderer = Arc::new(StubRenderer {
        slow: HashMap::from([(all[1].clone(), Duration::from_secs(30))]),
        ..Default::default()
    });

    let cancel = Cancellation::none().with_deadline(Duration::from_millis(300));
    let report = crawler(all.clone(), renderer.clone(), tmp.path())
        .run(&CrawlRequest::new("market").with_max_results(3), &cancel)
        .await
        .unwrap();

    assert!(report.cancelled);
    assert_eq!(report.found_count, 3);
    assert_eq!(report.scraped_count, 2);
    assert!(report.results[0].ok);
    assert_eq!(report.results[1].url, all[1]);
    assert_eq!(report.results[1].error.as_deref(), Some(CANCELLED));
    assert!(!renderer.rendered().contains(&all[2]));
    assert!(read_report(&report).cancelled);
}

#[tokio::test]
async fn cancel_signal_stops_crawl() {
    let tmp = tempdir().unwrap();
    let all = seeds(2);
    let renderer = Arc::new(StubRenderer {
        slow: HashMap::from([(all[0].clone(), Duration::from_secs(30))]),
        ..Default::default()
    });
    let (tx, cancel) = Cancellation::channel();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let _ = tx.send(true);
    });

    let report = crawler(all, renderer, tmp.path())
        .run(&CrawlRequest::new("market").with_max_results(2), &cancel)
        .await
        .unwrap();
    assert!(report.cancelled);
    assert_eq!(report.scraped_count, 1);
    assert_eq!(report.results[0].error.as_deref(), Some(CANCELLED));
}

#[tokio::test]
async fn rotation_only_when_requested() {
    let tmp = tempdir().unwrap();
    let seed = "http://seed0.onion/".to_string();
    let renderer = Arc::new(StubRenderer {
        links: HashMap::from([(seed.clone(), vec!["http://seed0.onion/a".to_string()])]),
        ..Default::default()
    });
    let rotator = Arc::new(CountingRotator::default());
    let crawler = crawler(vec![seed, "http://seed1.onion/".into()], renderer, tmp.path())
        .with_rotator(rotator.clone());

    let request = CrawlRequest::new("market").with_max_results(2).with_depth(1);
    crawler.run(&request, &Cancellation::none()).await.unwrap();
    assert_eq!(rotator.calls.load(Ordering::SeqCst), 0);

    let report = crawler
        .run(&request.clone().with_rotation(true), &Cancellation::none())
        .await
        .unwrap();
    // Two seeds plus one internal link.
    assert_eq!(report.scraped_count, 3);
    assert_eq!(rotator.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn cancelled_page_keeps_its_bundle_metadata() {
    let tmp = tempdir().unwrap();
    let renderer = Renderer::new(Arc::new(StalledCapture), Arc::new(NoLanguageDetection));
    let crawler = Crawler::new(
        Arc::new(StubResolver { links: seeds(2) }),
        Arc::new(renderer),
        tmp.path(),
    )
    .with_pacing(Arc::new(NoPacing));

    let cancel = Cancellation::none().with_deadline(Duration::from_millis(200));
    let report = crawler
        .run(&CrawlRequest::new("market").with_max_results(2), &cancel)
        .await
        .unwrap();

    assert!(report.cancelled);
    assert_eq!(report.scraped_count, 1);
    let page = &report.results[0];
    assert_eq!(page.error.as_deref(), Some(CANCELLED));

    let meta = report
        .session_dir
        .join(REPORTS_DIR)
        .join(&page.safe_name)
        .join(META_FILE);
    let written: PageArtifact =
        serde_json::from_str(&std::fs::read_to_string(meta).unwrap()).unwrap();
    assert_eq!(&written, page);
}

#[tokio::test]
async fn failed_rotation_does_not_skip_pages() {
    let tmp = tempdir().unwrap();
    let seed = "http://seed0.onion/".to_string();
    let renderer = Arc::new(StubRenderer {
        links: HashMap::from([(seed.clone(), vec!["http://seed0.onion/a".to_string()])]),
        ..Default::default()
    });
    let rotator = Arc::new(RefusingRotator {
        calls: AtomicUsize::new(0),
    });
    let (tx, mut rx) = mpsc::channel(100);
    let crawler = crawler(vec![seed, "http://seed1.onion/".into()], renderer.clone(), tmp.path())
        .with_rotator(rotator.clone())
        .with_events(tx);

    let request = CrawlRequest::new("market")
        .with_max_results(2)
        .with_depth(1)
        .with_rotation(true);
    let report = crawler.run(&request, &Cancellation::none()).await.unwrap();
    drop(crawler);

    assert_eq!(report.scraped_count, 3);
    assert!(report.results.iter().all(|r| r.ok));
    assert!(!report.cancelled);
    assert_eq!(renderer.rendered().len(), 3);
    assert_eq!(rotator.calls.load(Ordering::SeqCst), 3);

    let mut failed_rotations = 0;
    while let Some(event) = rx.recv().await {
        if let CrawlEvent::Rotated(outcome) = event {
            assert!(!outcome.success);
            failed_rotations += 1;
        }
    }
    assert_eq!(failed_rotations, 3);
}

#[tokio::test]
async fn worker_pool_keeps_candidate_order() {
    let tmp = tempdir().unwrap();
    let all = seeds(4);
    let renderer = Arc::new(StubRenderer {
        slow: HashMap::from([
            (all[0].clone(), Duration::from_millis(150)),
            (all[1].clone(), Duration::from_millis(50)),
        ]),
        ..Default::default()
    });

    let report = crawler(all.clone(), renderer, tmp.path())
        .with_concurrency(3)
        .run(&CrawlRequest::new("market").with_max_results(4), &Cancellation::none())
        .await
        .unwrap();

    let urls: Vec<String> = report.results.iter().map(|r| r.url.clone()).collect();
    assert_eq!(urls, all);
}

#[tokio::test]
async fn emits_phases_in_order() {
    let tmp = tempdir().unwrap();
    let (tx, mut rx) = mpsc::channel(100);
    let crawler = crawler(seeds(1), Arc::new(StubRenderer::default()), tmp.path()).with_events(tx);

    crawler
        .run(&CrawlRequest::new("market").with_max_results(1), &Cancellation::none())
        .await
        .unwrap();
    drop(crawler);

    let mut phases = Vec::new();
    let mut finished = 0;
    while let Some(event) = rx.recv().await {
        match event {
            CrawlEvent::Phase(p) => phases.push(p),
            CrawlEvent::PageFinished { ok, .. } => {
                assert!(ok);
                finished += 1;
            }
            _ => {}
        }
    }
    assert_eq!(finished, 1);
    assert_eq!(
        phases,
        vec![
            CrawlPhase::Resolving,
            CrawlPhase::Fetching,
            CrawlPhase::Reporting,
            CrawlPhase::Done
        ]
    );
}
