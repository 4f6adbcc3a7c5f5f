use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use super::{CapturedPage, PageCapture, PageRenderer};
use crate::crawl::{Cancellation, CANCELLED};
use crate::error::RenderError;
use crate::extract::language::detect_or_unknown;
use crate::extract::{
    extract_entities, find_keyword_context, parse_page_meta, relevance_score, LanguageDetector,
    UNKNOWN_LANGUAGE,
};
use crate::models::PageArtifact;
use crate::storage::PageBundle;

/// Characters of context kept on each side of a keyword hit in page excerpts.
pub const RENDER_EXCERPT_WINDOW: usize = 200;

/// Captures a page, analyzes it, and persists the bundle.
pub struct Renderer {
    capture: Arc<dyn PageCapture>,
    language: Arc<dyn LanguageDetector>,
    excerpt_window: usize,
}

impl Renderer {
    pub fn new(capture: Arc<dyn PageCapture>, language: Arc<dyn LanguageDetector>) -> Self {
        Self {
            capture,
            language,
            excerpt_window: RENDER_EXCERPT_WINDOW,
        }
    }

    pub fn with_excerpt_window(mut self, window: usize) -> Self {
        self.excerpt_window = window;
        self
    }

    fn fill(
        &self,
        artifact: &mut PageArtifact,
        bundle: &PageBundle,
        page: &CapturedPage,
        keyword: Option<&str>,
    ) -> Result<(), RenderError> {
        if !page.html.is_empty() {
            artifact.raw_html_file = Some(bundle.write_html(&page.html)?);
        }
        if let Some(png) = &page.screenshot {
            artifact.screenshot_file = Some(bundle.write_screenshot(png)?);
        }
        if !page.text.is_empty() {
            artifact.text_file = Some(bundle.write_text(&page.text)?);
        }

        let meta = parse_page_meta(&page.html, &artifact.url);
        artifact.title = meta.title;
        artifact.meta_description = meta.description;
        artifact.meta_keywords = meta.keywords;
        artifact.links = meta.links;

        // Identifiers can hide in markup (mailto:, attributes) as well as visible text.
        artifact.entities = extract_entities(&format!("{}\n{}", page.text, page.html));

        artifact.language = Some(if page.text.trim().is_empty() {
            UNKNOWN_LANGUAGE.to_string()
        } else {
            detect_or_unknown(self.language.as_ref(), &page.text)
        });

        if let Some(kw) = keyword.map(str::trim).filter(|k| !k.is_empty()) {
            if !page.text.is_empty() {
                artifact.keywords_found = find_keyword_context(&page.text, kw, self.excerpt_window);
                artifact.text_excerpt = artifact.keywords_found.first().cloned();
                artifact.relevance_score = relevance_score(&page.text, kw);
            }
        }

        artifact.ok = true;
        artifact.error = None;
        Ok(())
    }
}

#[async_trait]
impl PageRenderer for Renderer {
    async fn render(
        &self,
        url: &str,
        reports_dir: &Path,
        keyword: Option<&str>,
        depth: u8,
        cancel: &Cancellation,
    ) -> Result<PageArtifact, RenderError> {
        let bundle = PageBundle::create(reports_dir, url)?;
        let mut artifact = PageArtifact::pending(url, bundle.safe_name(), depth);

        let captured = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = self.capture.capture(url) => Some(result),
        };

        match captured {
            None => {
                warn!("Cancelled while rendering {}", url);
                artifact.mark_failed(CANCELLED);
            }
            Some(Ok(page)) => {
                if let Err(e) = self.fill(&mut artifact, &bundle, &page, keyword) {
                    error!("Failed to save page bundle for {}: {}", url, e);
                    artifact.mark_failed(e.to_string());
                } else {
                    info!(
                        "Captured {} ({} entities, {} links)",
                        url,
                        artifact.entities.total(),
                        artifact.links.len()
                    );
                }
            }
            Some(Err(e)) => {
                error!("Failed to render {}: {}", url, e);
                artifact.mark_failed(e.to_string());
            }
        }

        match bundle.write_meta(&artifact) {
            Ok(path) => debug!("Wrote {}", path.display()),
            Err(e) => warn!("Could not write page metadata for {}: {}", url, e),
        }

        Ok(artifact)
    }
}
