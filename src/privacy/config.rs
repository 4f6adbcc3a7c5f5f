//! Tor endpoint configuration and derived proxy settings.

use serde::{Deserialize, Serialize};
use std::env;

/// Default local Tor SOCKS listener.
pub const DEFAULT_SOCKS: &str = "127.0.0.1:9050";

/// Endpoint used to confirm traffic really leaves through Tor.
pub const DEFAULT_PROBE_URL: &str = "https://check.torproject.org/";

/// Text the probe page contains only when reached over Tor.
pub const DEFAULT_PROBE_MARKER: &str = "Congratulations";

const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CONTROL_TIMEOUT_SECS: u64 = 10;

/// Tor connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TorConfig {
    /// SOCKS endpoint as `host:port` (a `socks5://` or `socks5h://` prefix is accepted).
    /// Set via `TOR_SOCKS`.
    #[serde(default = "default_socks")]
    pub socks: String,

    /// Control port as `host:port`. Identity rotation is unavailable without it.
    /// Set via `TOR_CONTROL`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control: Option<String>,

    /// Control port password. Set via `TOR_CONTROL_PASS`.
    #[serde(default, skip_serializing)]
    pub control_password: Option<String>,

    /// Timeout for a full control-port exchange.
    #[serde(default = "default_control_timeout")]
    pub control_timeout_secs: u64,

    #[serde(default = "default_probe_url")]
    pub probe_url: String,

    #[serde(default = "default_probe_marker")]
    pub probe_marker: String,

    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
}

fn default_socks() -> String {
    DEFAULT_SOCKS.to_string()
}

fn default_probe_url() -> String {
    DEFAULT_PROBE_URL.to_string()
}

fn default_probe_marker() -> String {
    DEFAULT_PROBE_MARKER.to_string()
}

fn default_probe_timeout() -> u64 {
    DEFAULT_PROBE_TIMEOUT_SECS
}

fn default_control_timeout() -> u64 {
    DEFAULT_CONTROL_TIMEOUT_SECS
}

impl Default for TorConfig {
    fn default() -> Self {
        Self {
            socks: default_socks(),
            control: None,
            control_password: None,
            control_timeout_secs: DEFAULT_CONTROL_TIMEOUT_SECS,
            probe_url: default_probe_url(),
            probe_marker: default_probe_marker(),
            probe_timeout_secs: DEFAULT_PROBE_TIMEOUT_SECS,
        }
    }
}

impl TorConfig {
    /// Apply environment variable overrides.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(socks) = lookup("TOR_SOCKS") {
            if !socks.is_empty() {
                self.socks = socks;
            }
        }

        if let Some(control) = lookup("TOR_CONTROL") {
            if !control.is_empty() {
                self.control = Some(control);
            }
        }

        // An empty password still means "authenticate without one".
        if let Some(pass) = lookup("TOR_CONTROL_PASS") {
            self.control_password = if pass.is_empty() { None } else { Some(pass) };
        }

        self
    }

    /// Apply CLI flag overrides.
    pub fn with_cli_overrides(mut self, socks: Option<String>, control: Option<String>) -> Self {
        if let Some(socks) = socks {
            self.socks = socks;
        }
        if let Some(control) = control {
            self.control = Some(control);
        }
        self
    }

    /// The SOCKS endpoint as bare `host:port`.
    pub fn socks_endpoint(&self) -> &str {
        let s = self.socks.trim();
        s.strip_prefix("socks5h://")
            .or_else(|| s.strip_prefix("socks5://"))
            .unwrap_or(s)
            .trim_end_matches('/')
    }

    /// Whether a control endpoint is configured for identity rotation.
    pub fn rotation_available(&self) -> bool {
        self.control.as_deref().is_some_and(|c| !c.trim().is_empty())
    }

    /// Transport settings for both the HTTP client and the browser.
    pub fn proxy_config(&self) -> ProxyConfig {
        ProxyConfig::for_endpoint(self.socks_endpoint())
    }
}

/// Proxy settings routing HTTP and HTTPS through Tor.
///
/// Hostnames are always resolved on the Tor side: reqwest gets a
/// `socks5h://` URL, and Chromium gets a resolver rule that blocks every
/// local lookup except the proxy host itself, so the SOCKS proxy receives
/// the hostname.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    /// Proxy URL for reqwest, applied to every scheme.
    pub http_proxy_url: String,
    /// Value for Chromium's `--proxy-server`.
    pub browser_proxy_server: String,
    /// Value for Chromium's `--host-resolver-rules`.
    pub browser_host_resolver_rules: String,
}

impl ProxyConfig {
    pub fn for_endpoint(endpoint: &str) -> Self {
        Self {
            http_proxy_url: format!("socks5h://{}", endpoint),
            browser_proxy_server: format!("socks5://{}", endpoint),
            browser_host_resolver_rules: format!(
                "MAP * ~NOTFOUND , EXCLUDE {}",
                endpoint_host(endpoint)
            ),
        }
    }
}

/// Host part of a `host:port` endpoint. IPv6 literals keep their brackets.
fn endpoint_host(endpoint: &str) -> &str {
    match endpoint.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => host,
        _ => endpoint,
    }
}

/// Build the proxy configuration for `config`.
pub fn build_proxy_config(config: &TorConfig) -> ProxyConfig {
    config.proxy_config()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = TorConfig::default();
        assert_eq!(config.socks_endpoint(), "127.0.0.1:9050");
        assert!(!config.rotation_available());
        assert_eq!(config.probe_marker, "Congratulations");
    }

    #[test]
    fn test_env_overrides() {
        let config = TorConfig::default().with_overrides_from(lookup(&[
            ("TOR_SOCKS", "10.0.0.2:9150"),
            ("TOR_CONTROL", "127.0.0.1:9051"),
            ("TOR_CONTROL_PASS", "hunter2"),
        ]));
        assert_eq!(config.socks, "10.0.0.2:9150");
        assert_eq!(config.control.as_deref(), Some("127.0.0.1:9051"));
        assert_eq!(config.control_password.as_deref(), Some("hunter2"));
        assert!(config.rotation_available());
    }

    #[test]
    fn test_empty_env_values_ignored() {
        let config = TorConfig::default()
            .with_overrides_from(lookup(&[("TOR_SOCKS", ""), ("TOR_CONTROL", "")]));
        assert_eq!(config.socks, DEFAULT_SOCKS);
        assert!(config.control.is_none());
    }

    #[test]
    fn test_cli_overrides_env() {
        let config = TorConfig::default()
            .with_overrides_from(lookup(&[("TOR_SOCKS", "10.0.0.2:9150")]))
            .with_cli_overrides(Some("127.0.0.1:9150".into()), None);
        assert_eq!(config.socks, "127.0.0.1:9150");
    }

    #[test]
    fn test_scheme_prefix_stripped() {
        let config = TorConfig {
            socks: "socks5h://127.0.0.1:9150/".into(),
            ..Default::default()
        };
        assert_eq!(config.socks_endpoint(), "127.0.0.1:9150");
    }

    #[test]
    fn test_proxy_config_uses_remote_dns() {
        let proxy = build_proxy_config(&TorConfig::default());
        assert_eq!(proxy.http_proxy_url, "socks5h://127.0.0.1:9050");
        assert_eq!(proxy.browser_proxy_server, "socks5://127.0.0.1:9050");
        assert_eq!(
            proxy.browser_host_resolver_rules,
            "MAP * ~NOTFOUND , EXCLUDE 127.0.0.1"
        );
    }

    #[test]
    fn test_proxy_hostname_stays_resolvable() {
        let config =
            TorConfig::default().with_overrides_from(lookup(&[("TOR_SOCKS", "tor:9050")]));
        let proxy = config.proxy_config();
        assert_eq!(proxy.browser_proxy_server, "socks5://tor:9050");
        assert_eq!(proxy.browser_host_resolver_rules, "MAP * ~NOTFOUND , EXCLUDE tor");

        let local = ProxyConfig::for_endpoint("localhost:9150");
        assert!(local.browser_host_resolver_rules.ends_with("EXCLUDE localhost"));
    }

    #[test]
    fn test_endpoint_host() {
        assert_eq!(endpoint_host("10.0.0.2:9150"), "10.0.0.2");
        assert_eq!(endpoint_host("[::1]:9050"), "[::1]");
        assert_eq!(endpoint_host("tor"), "tor");
    }

    #[test]
    fn test_password_not_serialized() {
        let config = TorConfig {
            control_password: Some("secret".into()),
            ..Default::default()
        };
        let toml = toml::to_string(&config).unwrap();
        assert!(!toml.contains("secret"));
    }
}
