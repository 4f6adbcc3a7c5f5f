//! Tor routing and circuit control.
//!
//! Every outbound request and every rendered page goes through the local Tor
//! SOCKS endpoint with hostname resolution on the Tor side. Circuit rotation
//! is optional and only exists when a control port is configured.
//!
//! # Configuration
//!
//! - `TOR_SOCKS=127.0.0.1:9050` - SOCKS endpoint
//! - `TOR_CONTROL=127.0.0.1:9051` - control port (enables rotation)
//! - `TOR_CONTROL_PASS=...` - control port password

mod config;
mod control;

pub use config::{
    build_proxy_config, ProxyConfig, TorConfig, DEFAULT_PROBE_MARKER, DEFAULT_PROBE_URL,
    DEFAULT_SOCKS,
};
pub use control::{IdentityRotator, RotationOutcome, TorController};
