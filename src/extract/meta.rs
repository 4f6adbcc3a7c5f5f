//! Title, description, keywords and outbound links from rendered HTML.

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use url::Url;

static TITLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("title").unwrap());
static META_DESCRIPTION: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"meta[name="description"]"#).unwrap());
static OG_DESCRIPTION: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"meta[property="og:description"]"#).unwrap());
static META_KEYWORDS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"meta[name="keywords"]"#).unwrap());
static ANCHORS: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());

/// Metadata parsed from one HTML document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageMeta {
    pub title: Option<String>,
    pub description: Option<String>,
    pub keywords: Option<String>,
    /// Absolute outbound links in document order.
    pub links: Vec<String>,
}

/// Parse `html`, resolving relative links against `base_url`.
pub fn parse_page_meta(html: &str, base_url: &str) -> PageMeta {
    if html.trim().is_empty() {
        return PageMeta::default();
    }

    let document = Html::parse_document(html);
    let base = Url::parse(base_url).ok();

    let title = document
        .select(&TITLE)
        .next()
        .map(|el| el.text().collect::<String>())
        .and_then(non_empty);

    let description = first_content(&document, &META_DESCRIPTION)
        .or_else(|| first_content(&document, &OG_DESCRIPTION));
    let keywords = first_content(&document, &META_KEYWORDS);

    let links = document
        .select(&ANCHORS)
        .filter_map(|el| el.value().attr("href"))
        .map(str::trim)
        .filter(|href| !href.is_empty())
        .filter_map(|href| absolutize(base.as_ref(), href))
        .collect();

    PageMeta {
        title,
        description,
        keywords,
        links,
    }
}

fn first_content(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .find_map(|el: ElementRef<'_>| el.value().attr("content"))
        .map(str::to_string)
        .and_then(non_empty)
}

fn absolutize(base: Option<&Url>, href: &str) -> Option<String> {
    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href.to_string());
    }
    match base {
        Some(base) => base.join(href).ok().map(String::from),
        None => Some(href.to_string()),
    }
}

fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
