//! Optional language detection for page text.

use std::sync::Arc;

/// Value recorded when no language could be determined.
pub const UNKNOWN_LANGUAGE: &str = "unknown";

/// Detects the natural language of a block of text.
pub trait LanguageDetector: Send + Sync {
    /// Language code, or `None` when the text gives no usable signal.
    fn detect(&self, text: &str) -> Option<String>;
}

/// Detector used when no detection backend is compiled in.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLanguageDetection;

impl LanguageDetector for NoLanguageDetection {
    fn detect(&self, _text: &str) -> Option<String> {
        None
    }
}

/// Trigram-based detector returning ISO 639-3 codes (`eng`, `rus`, ...).
#[cfg(feature = "language")]
#[derive(Debug, Clone, Copy, Default)]
pub struct WhatlangDetector;

#[cfg(feature = "language")]
impl LanguageDetector for WhatlangDetector {
    fn detect(&self, text: &str) -> Option<String> {
        if text.trim().is_empty() {
            return None;
        }
        whatlang::detect(text).map(|info| info.lang().code().to_string())
    }
}

/// The best detector available in this build.
pub fn default_detector() -> Arc<dyn LanguageDetector> {
    #[cfg(feature = "language")]
    {
        Arc::new(WhatlangDetector)
    }
    #[cfg(not(feature = "language"))]
    {
        Arc::new(NoLanguageDetection)
    }
}

/// Run `detector` over `text`, falling back to [`UNKNOWN_LANGUAGE`].
pub fn detect_or_unknown(detector: &dyn LanguageDetector, text: &str) -> String {
    detector
        .detect(text)
        .unwrap_or_else(|| UNKNOWN_LANGUAGE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_detection_is_unknown() {
        assert_eq!(detect_or_unknown(&NoLanguageDetection, "hello world"), "unknown");
    }

    #[cfg(feature = "language")]
    #[test]
    fn test_whatlang_detects_english() {
        let text = "This marketplace lists stolen credentials and leaked databases for sale to anyone who pays.";
        assert_eq!(WhatlangDetector.detect(text).as_deref(), Some("eng"));
        assert_eq!(WhatlangDetector.detect("   "), None);
    }
}
