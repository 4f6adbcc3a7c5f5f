//! `extract` command: offline analysis of a saved page.

use std::path::Path;

use serde::Serialize;

use crate::browser::RENDER_EXCERPT_WINDOW;
use crate::extract::language::detect_or_unknown;
use crate::extract::{
    default_detector, extract_entities, find_keyword_context, parse_page_meta, relevance_score,
};
use crate::models::ExtractedEntities;

#[derive(Serialize)]
struct ExtractOutput {
    file: String,
    title: Option<String>,
    language: String,
    entities: ExtractedEntities,
    #[serde(skip_serializing_if = "Option::is_none")]
    keyword: Option<String>,
    keywords_found: Vec<String>,
    relevance_score: f64,
}

fn looks_like_html(path: &Path, contents: &str) -> bool {
    let ext_html = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("html") || e.eq_ignore_ascii_case("htm"));
    ext_html || contents.trim_start().starts_with('<')
}

/// Visible text of an HTML document.
fn html_text(html: &str) -> String {
    let doc = scraper::Html::parse_document(html);
    doc.root_element()
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

pub async fn cmd_extract(file: &Path, keyword: Option<&str>) -> anyhow::Result<()> {
    let contents = tokio::fs::read_to_string(file).await?;

    let (text, title) = if looks_like_html(file, &contents) {
        let meta = parse_page_meta(&contents, "");
        (html_text(&contents), meta.title)
    } else {
        (contents.clone(), None)
    };

    let (keywords_found, score) = match keyword {
        Some(kw) => (
            find_keyword_context(&text, kw, RENDER_EXCERPT_WINDOW),
            relevance_score(&text, kw),
        ),
        None => (Vec::new(), 0.0),
    };

    let output = ExtractOutput {
        file: file.display().to_string(),
        title,
        language: detect_or_unknown(default_detector().as_ref(), &text),
        entities: extract_entities(&format!("{}\n{}", text, contents)),
        keyword: keyword.map(str::to_string),
        keywords_found,
        relevance_score: score,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
