//! Pure text and HTML analysis applied to every rendered page.

pub mod entities;
pub mod excerpt;
pub mod language;
pub mod meta;

pub use entities::extract_entities;
pub use excerpt::{find_keyword_context, relevance_score, DEFAULT_WINDOW};
pub use language::{default_detector, LanguageDetector, NoLanguageDetection, UNKNOWN_LANGUAGE};
pub use meta::{parse_page_meta, PageMeta};
