//! On-disk layout of a crawl session.
//!
//! ```text
//! <output_dir>/<keyword>_<YYYYmmdd-HHMMSS>/
//!     ahmia_results.json
//!     report.json
//!     reports/<page-dir>/{page.html, page.png, page.txt, meta.json}
//! ```

use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::{CrawlError, RenderError};
use crate::models::{timestamp, PageArtifact, SessionReport};

pub const CANDIDATES_FILE: &str = "ahmia_results.json";
pub const REPORT_FILE: &str = "report.json";
pub const REPORTS_DIR: &str = "reports";
pub const HTML_FILE: &str = "page.html";
pub const SCREENSHOT_FILE: &str = "page.png";
pub const TEXT_FILE: &str = "page.txt";
pub const META_FILE: &str = "meta.json";

/// Longest sanitized name kept before the hash suffix.
const MAX_NAME_LEN: usize = 120;

/// Hex characters kept from the URL hash.
const HASH_LEN: usize = 10;

/// Give up looking for a free directory name after this many suffixes.
const MAX_DIR_SUFFIX: u32 = 1000;

static SCHEME_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^https?://").unwrap());
static UNSAFE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^A-Za-z0-9._-]+").unwrap());

/// Turn a URL or keyword into a short filesystem-safe name.
pub fn sanitize_filename(s: &str) -> String {
    let without_scheme = SCHEME_RE.replace(s.trim(), "");
    let slashes = without_scheme.trim().replace('/', "_");
    let safe = UNSAFE_RE.replace_all(&slashes, "_");
    let truncated: String = safe.chars().take(MAX_NAME_LEN).collect();
    if truncated.is_empty() {
        "unknown".to_string()
    } else {
        truncated
    }
}

/// First ten hex characters of the SHA-256 of `s`.
pub fn short_hash(s: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    let mut hex = hex::encode(hasher.finalize());
    hex.truncate(HASH_LEN);
    hex
}

/// Bundle directory name for a page URL.
pub fn page_dir_name(url: &str) -> String {
    format!("{}_{}", sanitize_filename(url), short_hash(url))
}

/// Create `parent/base`, or `parent/base-2`, `-3`, ... if taken.
fn create_unique_dir(parent: &Path, base: &str) -> io::Result<PathBuf> {
    let mut candidate = parent.join(base);
    for n in 2..=MAX_DIR_SUFFIX + 1 {
        match std::fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                candidate = parent.join(format!("{}-{}", base, n));
            }
            Err(e) => return Err(e),
        }
    }
    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free directory name for {}", base),
    ))
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), CrawlError> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).map_err(|source| CrawlError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Directory of one crawl session.
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
    session_id: String,
}

impl SessionStore {
    /// Create a fresh session directory for `keyword` under `output_dir`.
    pub fn create(output_dir: &Path, keyword: &str) -> Result<Self, CrawlError> {
        let output_error = |source: io::Error| CrawlError::OutputDir {
            path: output_dir.to_path_buf(),
            source,
        };
        std::fs::create_dir_all(output_dir).map_err(output_error)?;

        let base = format!("{}_{}", sanitize_filename(keyword), timestamp());
        let dir = create_unique_dir(output_dir, &base).map_err(output_error)?;
        std::fs::create_dir_all(dir.join(REPORTS_DIR)).map_err(|source| CrawlError::OutputDir {
            path: dir.join(REPORTS_DIR),
            source,
        })?;

        let session_id = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or(base);
        Ok(Self { dir, session_id })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.dir.join(REPORTS_DIR)
    }

    /// Write the raw resolved candidate list.
    pub fn write_candidates(&self, candidates: &[String]) -> Result<PathBuf, CrawlError> {
        let path = self.dir.join(CANDIDATES_FILE);
        write_json(&path, candidates)?;
        Ok(path)
    }

    /// Write the session report.
    pub fn write_report(&self, report: &SessionReport) -> Result<PathBuf, CrawlError> {
        let path = self.dir.join(REPORT_FILE);
        write_json(&path, report)?;
        Ok(path)
    }
}

/// Files of one page's artifact bundle.
#[derive(Debug, Clone)]
pub struct PageBundle {
    dir: PathBuf,
    safe_name: String,
}

impl PageBundle {
    /// Create the bundle directory for `url` inside `reports_dir`.
    pub fn create(reports_dir: &Path, url: &str) -> Result<Self, RenderError> {
        let base = page_dir_name(url);
        let dir = create_unique_dir(reports_dir, &base).map_err(|source| RenderError::Io {
            path: reports_dir.join(&base),
            source,
        })?;
        let safe_name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or(base);
        Ok(Self { dir, safe_name })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn safe_name(&self) -> &str {
        &self.safe_name
    }

    fn write(&self, name: &str, contents: &[u8]) -> Result<PathBuf, RenderError> {
        let path = self.dir.join(name);
        std::fs::write(&path, contents).map_err(|source| RenderError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    pub fn write_html(&self, html: &str) -> Result<PathBuf, RenderError> {
        self.write(HTML_FILE, html.as_bytes())
    }

    pub fn write_text(&self, text: &str) -> Result<PathBuf, RenderError> {
        self.write(TEXT_FILE, text.as_bytes())
    }

    pub fn write_screenshot(&self, png: &[u8]) -> Result<PathBuf, RenderError> {
        self.write(SCREENSHOT_FILE, png)
    }

    pub fn write_meta(&self, artifact: &PageArtifact) -> Result<PathBuf, RenderError> {
        let json = serde_json::to_vec_pretty(artifact).map_err(|e| RenderError::Io {
            path: self.dir.join(META_FILE),
            source: io::Error::new(io::ErrorKind::InvalidData, e),
        })?;
        self.write(META_FILE, &json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(
            sanitize_filename("http://abc.onion/path/to page?x=1"),
            "abc.onion_path_to_page_x_1"
        );
        assert_eq!(sanitize_filename("HTTPS://Example.onion/"), "Example.onion_");
        assert_eq!(sanitize_filename("darknet market"), "darknet_market");
        assert_eq!(sanitize_filename(""), "unknown");
        assert_eq!(sanitize_filename("http://"), "unknown");
    }

    #[test]
    fn test_sanitize_truncates() {
        let long = format!("http://{}.onion/", "a".repeat(300));
        assert_eq!(sanitize_filename(&long).len(), 120);
    }

    #[test]
    fn test_page_dir_name_has_hash_suffix() {
        let name = page_dir_name("http://abc.onion/");
        assert_eq!(name, format!("abc.onion__{}", short_hash("http://abc.onion/")));
        assert_eq!(short_hash("x").len(), 10);
        assert_ne!(page_dir_name("http://abc.onion/a"), page_dir_name("http://abc.onion/b"));
    }

    #[test]
    fn test_session_dirs_are_unique() {
        let tmp = tempdir().unwrap();
        let first = SessionStore::create(tmp.path(), "market").unwrap();
        let second = SessionStore::create(tmp.path(), "market").unwrap();
        assert_ne!(first.dir(), second.dir());
        assert!(first.session_id().starts_with("market_"));
        assert!(first.reports_dir().is_dir());
        assert!(second.reports_dir().is_dir());
    }

    #[test]
    fn test_unwritable_output_dir() {
        let tmp = tempdir().unwrap();
        let file = tmp.path().join("not-a-dir");
        std::fs::write(&file, b"x").unwrap();
        let err = SessionStore::create(&file, "market").unwrap_err();
        assert!(matches!(err, CrawlError::OutputDir { .. }));
    }

    #[test]
    fn test_page_bundle_files() {
        let tmp = tempdir().unwrap();
        let bundle = PageBundle::create(tmp.path(), "http://abc.onion/").unwrap();
        let html = bundle.write_html("<html></html>").unwrap();
        let text = bundle.write_text("hello").unwrap();
        let png = bundle.write_screenshot(&[0x89, b'P', b'N', b'G']).unwrap();
        assert!(html.ends_with(HTML_FILE));
        assert!(text.ends_with(TEXT_FILE));
        assert!(png.ends_with(SCREENSHOT_FILE));

        let artifact = PageArtifact::pending("http://abc.onion/", bundle.safe_name(), 0);
        let meta = bundle.write_meta(&artifact).unwrap();
        let parsed: PageArtifact =
            serde_json::from_str(&std::fs::read_to_string(meta).unwrap()).unwrap();
        assert_eq!(parsed.url, "http://abc.onion/");
    }

    #[test]
    fn test_same_url_gets_separate_bundles() {
        let tmp = tempdir().unwrap();
        let a = PageBundle::create(tmp.path(), "http://abc.onion/").unwrap();
        let b = PageBundle::create(tmp.path(), "http://abc.onion/").unwrap();
        assert_ne!(a.dir(), b.dir());
        assert!(b.safe_name().ends_with("-2"));
    }

    #[test]
    fn test_candidates_file() {
        let tmp = tempdir().unwrap();
        let store = SessionStore::create(tmp.path(), "leak").unwrap();
        let path = store.write_candidates(&[]).unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "[]");
    }
}
