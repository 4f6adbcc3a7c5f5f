//! Configuration management.
//!
//! Settings are resolved once at start-up, lowest precedence first:
//! built-in defaults, then the config file, then environment variables,
//! then command-line flags.

use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::browser::BrowserEngineConfig;
use crate::models::MAX_DEPTH;
use crate::privacy::TorConfig;
use crate::resolver::ResolverConfig;

/// Default directory for crawl sessions, relative to the working directory.
pub const DEFAULT_OUTPUT_DIR: &str = "tor_scrape_output";

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Parent directory of every session directory.
    pub output_dir: PathBuf,
    /// Depth used when a crawl does not ask for one.
    pub default_depth: u8,
    /// Seeds crawled concurrently when rotation is off.
    pub concurrency: usize,
    /// Randomized delays between fetches. Disable only for local testing.
    pub pacing: bool,
    pub tor: TorConfig,
    pub resolver: ResolverConfig,
    pub browser: BrowserEngineConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            default_depth: 0,
            concurrency: 1,
            pacing: true,
            tor: TorConfig::default(),
            resolver: ResolverConfig::default(),
            browser: BrowserEngineConfig::default(),
        }
    }
}

impl Settings {
    /// Apply environment variable overrides.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| env::var(key).ok())
    }

    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(dir) = lookup("ONIONSCOPE_OUTPUT_DIR").filter(|s| !s.is_empty()) {
            self.output_dir = PathBuf::from(shellexpand::tilde(&dir).into_owned());
        }
        if let Some(depth) = lookup("ONIONSCOPE_DEPTH").and_then(|v| v.parse::<u8>().ok()) {
            self.default_depth = depth.min(MAX_DEPTH);
        }
        if let Some(n) = lookup("ONIONSCOPE_CONCURRENCY").and_then(|v| v.parse::<usize>().ok()) {
            self.concurrency = n.max(1);
        }
        self.tor = self.tor.with_overrides_from(&lookup);
        self.resolver = self.resolver.with_overrides_from(&lookup);
        self.browser = self.browser.with_overrides_from(&lookup);
        self
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Session output directory. Relative paths are resolved against the
    /// config file's directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pacing: Option<bool>,
    #[serde(default)]
    pub tor: TorConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub browser: BrowserEngineConfig,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Discover and load an `onionscope` config file, falling back to defaults.
    pub async fn load() -> Self {
        match prefer::load("onionscope").await {
            Ok(pref_config) => match pref_config.source_path() {
                Some(path) => match Self::load_from_path(path).await {
                    Ok(config) => config,
                    Err(e) => {
                        tracing::warn!("Ignoring config file {}: {}", path.display(), e);
                        Self::default()
                    }
                },
                None => Self::default(),
            },
            Err(_) => Self::default(),
        }
    }

    /// Load configuration from a specific file path.
    /// The format is picked from the extension; anything unknown is read as JSON.
    pub async fn load_from_path(path: &Path) -> Result<Self, String> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let mut config: Config = match ext {
            "toml" => toml::from_str(&contents)
                .map_err(|e| format!("Failed to parse TOML config: {}", e))?,
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .map_err(|e| format!("Failed to parse YAML config: {}", e))?,
            _ => serde_json::from_str(&contents)
                .map_err(|e| format!("Failed to parse JSON config: {}", e))?,
        };

        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Directory relative paths in this config are resolved against.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Apply configuration to settings.
    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(ref dir) = self.output_dir {
            settings.output_dir = self.resolve_path(dir, base_dir);
        }
        if let Some(depth) = self.depth {
            settings.default_depth = depth.min(MAX_DEPTH);
        }
        if let Some(n) = self.concurrency {
            settings.concurrency = n.max(1);
        }
        if let Some(pacing) = self.pacing {
            settings.pacing = pacing;
        }
        settings.tor = self.tor.clone();
        settings.resolver = self.resolver.clone();
        settings.browser = self.browser.clone();
    }
}

/// Options for loading settings, usually from CLI flags.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file path (overrides discovery).
    pub config_path: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub socks: Option<String>,
    pub control: Option<String>,
    pub concurrency: Option<usize>,
}

/// Load settings from every source in precedence order.
pub async fn load_settings_with_options(options: LoadOptions) -> Result<Settings, String> {
    let config = match &options.config_path {
        Some(path) => Config::load_from_path(path).await?,
        None => Config::load().await,
    };

    let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let base_dir = config.base_dir().unwrap_or(cwd);

    let mut settings = Settings::default();
    config.apply_to_settings(&mut settings, &base_dir);
    let mut settings = settings.with_env_overrides();

    if let Some(dir) = options.output_dir {
        settings.output_dir = dir;
    }
    if let Some(n) = options.concurrency {
        settings.concurrency = n.max(1);
    }
    settings.tor = settings
        .tor
        .with_cli_overrides(options.socks, options.control);

    tracing::debug!(
        "Settings: output_dir={}, socks={}, rotation={}",
        settings.output_dir.display(),
        settings.tor.socks_endpoint(),
        settings.tor.rotation_available()
    );
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.output_dir, PathBuf::from("tor_scrape_output"));
        assert_eq!(settings.default_depth, 0);
        assert_eq!(settings.concurrency, 1);
        assert_eq!(settings.resolver.engine_timeout_secs, 180);
        assert_eq!(settings.browser.page_timeout_secs, 60);
    }

    #[test]
    fn test_env_overrides() {
        let settings = Settings::default().with_overrides_from(lookup(&[
            ("ONIONSCOPE_OUTPUT_DIR", "/srv/crawls"),
            ("ONIONSCOPE_DEPTH", "7"),
            ("ONIONSCOPE_CONCURRENCY", "0"),
            ("ONIONSCOPE_ENGINE_TIMEOUT", "30"),
            ("TOR_CONTROL", "127.0.0.1:9051"),
        ]));
        assert_eq!(settings.output_dir, PathBuf::from("/srv/crawls"));
        assert_eq!(settings.default_depth, MAX_DEPTH);
        assert_eq!(settings.concurrency, 1);
        assert_eq!(settings.resolver.engine_timeout_secs, 30);
        assert!(settings.tor.rotation_available());
    }

    #[tokio::test]
    async fn test_load_toml_relative_output() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("onionscope.toml");
        std::fs::write(
            &path,
            r#"
output_dir = "crawls"
depth = 1
concurrency = 3

[tor]
socks = "127.0.0.1:9150"

[resolver]
strategy = "accumulate"
"#,
        )
        .unwrap();

        let config = Config::load_from_path(&path).await.unwrap();
        let mut settings = Settings::default();
        config.apply_to_settings(&mut settings, &config.base_dir().unwrap());
        assert_eq!(settings.output_dir, tmp.path().join("crawls"));
        assert_eq!(settings.default_depth, 1);
        assert_eq!(settings.concurrency, 3);
        assert_eq!(settings.tor.socks_endpoint(), "127.0.0.1:9150");
    }

    #[tokio::test]
    async fn test_load_yaml_and_json() {
        let tmp = tempdir().unwrap();
        let yaml = tmp.path().join("c.yaml");
        std::fs::write(&yaml, "depth: 2\nbrowser:\n  headless: false\n").unwrap();
        let config = Config::load_from_path(&yaml).await.unwrap();
        assert_eq!(config.depth, Some(2));
        assert!(!config.browser.headless);

        let json = tmp.path().join("c.json");
        std::fs::write(&json, r#"{"pacing": false}"#).unwrap();
        let config = Config::load_from_path(&json).await.unwrap();
        assert_eq!(config.pacing, Some(false));
    }

    #[tokio::test]
    async fn test_bad_config_is_error() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("broken.toml");
        std::fs::write(&path, "depth = [").unwrap();
        let err = Config::load_from_path(&path).await.unwrap_err();
        assert!(err.contains("TOML"));
    }

    #[tokio::test]
    async fn test_cli_overrides_win() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("onionscope.toml");
        std::fs::write(&path, "[tor]\nsocks = \"127.0.0.1:9150\"\n").unwrap();

        let settings = load_settings_with_options(LoadOptions {
            config_path: Some(path),
            output_dir: Some(tmp.path().join("out")),
            socks: Some("10.1.1.1:9050".into()),
            ..Default::default()
        })
        .await
        .unwrap();
        assert_eq!(settings.tor.socks_endpoint(), "10.1.1.1:9050");
        assert_eq!(settings.output_dir, tmp.path().join("out"));
    }
}
