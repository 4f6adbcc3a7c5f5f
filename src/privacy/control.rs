//! Tor control-port client for circuit rotation.
//!
//! Speaks just enough of the control protocol to authenticate and send
//! `SIGNAL NEWNYM`. Replies are read until the final line of each response
//! (`NNN<space>...`); any status other than 250 is a rejection.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use super::TorConfig;
use crate::error::RotationError;

/// Result of a rotation attempt. Rotation never aborts the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RotationOutcome {
    pub success: bool,
    pub message: String,
}

impl RotationOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

impl From<Result<(), RotationError>> for RotationOutcome {
    fn from(result: Result<(), RotationError>) -> Self {
        match result {
            Ok(()) => RotationOutcome::ok("NEWNYM signal sent"),
            Err(e) => RotationOutcome::failed(e.to_string()),
        }
    }
}

/// Something that can request a fresh anonymizing circuit.
#[async_trait]
pub trait IdentityRotator: Send + Sync {
    async fn rotate_identity(&self) -> RotationOutcome;
}

/// Client for a Tor control port.
#[derive(Debug, Clone)]
pub struct TorController {
    addr: String,
    password: Option<String>,
    timeout: Duration,
}

impl TorController {
    pub fn new(addr: impl Into<String>, password: Option<String>) -> Self {
        Self {
            addr: addr.into(),
            password,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build a controller when a control endpoint is configured.
    pub fn from_config(config: &TorConfig) -> Option<Self> {
        if !config.rotation_available() {
            return None;
        }
        let addr = config.control.as_deref()?.trim().to_string();
        Some(
            Self::new(addr, config.control_password.clone())
                .with_timeout(Duration::from_secs(config.control_timeout_secs)),
        )
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Authenticate and send `SIGNAL NEWNYM`.
    pub async fn signal_newnym(&self) -> Result<(), RotationError> {
        if !is_host_port(&self.addr) {
            return Err(RotationError::InvalidEndpoint(self.addr.clone()));
        }
        match tokio::time::timeout(self.timeout, self.exchange()).await {
            Ok(result) => result,
            Err(_) => Err(RotationError::Timeout),
        }
    }

    async fn exchange(&self) -> Result<(), RotationError> {
        let stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|source| RotationError::Connect {
                addr: self.addr.clone(),
                source,
            })?;
        let (read_half, mut writer) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        let auth = match &self.password {
            Some(pw) => format!("AUTHENTICATE \"{}\"\r\n", escape_password(pw)),
            None => "AUTHENTICATE\r\n".to_string(),
        };
        writer.write_all(auth.as_bytes()).await?;
        let (code, text) = read_reply(&mut reader).await?;
        if code != 250 {
            return Err(RotationError::AuthRejected(format!("{} {}", code, text)));
        }
        debug!("Authenticated to Tor control port {}", self.addr);

        writer.write_all(b"SIGNAL NEWNYM\r\n").await?;
        let (code, text) = read_reply(&mut reader).await?;
        if code != 250 {
            return Err(RotationError::SignalRejected(format!("{} {}", code, text)));
        }

        // The connection is closing either way.
        let _ = writer.write_all(b"QUIT\r\n").await;
        let _ = writer.shutdown().await;
        Ok(())
    }
}

#[async_trait]
impl IdentityRotator for TorController {
    async fn rotate_identity(&self) -> RotationOutcome {
        let outcome = RotationOutcome::from(self.signal_newnym().await);
        if outcome.success {
            info!("Tor identity rotated via {}", self.addr);
        } else {
            warn!("Tor identity rotation failed: {}", outcome.message);
        }
        outcome
    }
}

/// Read one (possibly multi-line) control reply, returning the status and final text.
async fn read_reply<R>(reader: &mut BufReader<R>) -> Result<(u16, String), RotationError>
where
    R: tokio::io::AsyncRead + Unpin,
{
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            return Err(RotationError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "control connection closed",
            )));
        }
        let line = line.trim_end_matches(['\r', '\n']);
        let bytes = line.as_bytes();
        if bytes.len() < 4 {
            continue;
        }
        let code: u16 = std::str::from_utf8(&bytes[..3])
            .ok()
            .and_then(|digits| digits.parse().ok())
            .ok_or_else(|| {
                RotationError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("malformed control reply: {}", line),
                ))
            })?;
        if bytes[3] == b' ' {
            return Ok((code, line[4..].to_string()));
        }
    }
}

fn escape_password(password: &str) -> String {
    password.replace('\\', "\\\\").replace('"', "\\\"")
}

fn is_host_port(addr: &str) -> bool {
    match addr.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    /// Fake control port answering each command from `replies` in order.
    async fn fake_control_port(
        replies: Vec<&'static str>,
    ) -> (String, tokio::task::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut writer) = stream.into_split();
            let mut reader = BufReader::new(read_half);
            let mut received = Vec::new();
            for reply in replies {
                let mut line = String::new();
                if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
                    break;
                }
                received.push(line.trim_end().to_string());
                let _ = writer.write_all(reply.as_bytes()).await;
            }
            received
        });
        (addr, handle)
    }

    #[tokio::test]
    async fn test_rotation_with_password() {
        let (addr, server) =
            fake_control_port(vec!["250 OK\r\n", "250 OK\r\n", "250 closing connection\r\n"])
                .await;
        let controller = TorController::new(addr, Some("pa\"ss".into()));
        let outcome = controller.rotate_identity().await;
        assert!(outcome.success, "{}", outcome.message);

        let received = server.await.unwrap();
        assert_eq!(received[0], r#"AUTHENTICATE "pa\"ss""#);
        assert_eq!(received[1], "SIGNAL NEWNYM");
    }

    #[tokio::test]
    async fn test_rotation_without_password() {
        let (addr, server) = fake_control_port(vec!["250 OK\r\n", "250 OK\r\n"]).await;
        let controller = TorController::new(addr, None);
        assert!(controller.signal_newnym().await.is_ok());
        let received = server.await.unwrap();
        assert_eq!(received[0], "AUTHENTICATE");
    }

    #[tokio::test]
    async fn test_auth_rejected() {
        let (addr, _server) =
            fake_control_port(vec!["515 Authentication failed: Password did not match\r\n"]).await;
        let controller = TorController::new(addr, Some("wrong".into()));
        let err = controller.signal_newnym().await.unwrap_err();
        assert!(matches!(err, RotationError::AuthRejected(_)));
    }

    #[tokio::test]
    async fn test_non_ascii_reply_is_malformed() {
        let (addr, _server) = fake_control_port(vec!["\u{e9}\u{e9} OK\r\n"]).await;
        let controller = TorController::new(addr, None);
        let err = controller.signal_newnym().await.unwrap_err();
        assert!(matches!(err, RotationError::Io(_)));
    }

    #[tokio::test]
    async fn test_multiline_reply() {
        let (addr, _server) =
            fake_control_port(vec!["250-extra info\r\n250 OK\r\n", "250 OK\r\n"]).await;
        let controller = TorController::new(addr, None);
        assert!(controller.signal_newnym().await.is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_port_is_failure_outcome() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let outcome = TorController::new(addr, None).rotate_identity().await;
        assert!(!outcome.success);
        assert!(!outcome.message.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_endpoint() {
        let err = TorController::new("not-an-endpoint", None)
            .signal_newnym()
            .await
            .unwrap_err();
        assert!(matches!(err, RotationError::InvalidEndpoint(_)));
    }

    #[test]
    fn test_from_config_requires_control() {
        assert!(TorController::from_config(&TorConfig::default()).is_none());
        let config = TorConfig {
            control: Some("127.0.0.1:9051".into()),
            ..Default::default()
        };
        let controller = TorController::from_config(&config).unwrap();
        assert_eq!(controller.addr(), "127.0.0.1:9051");
    }
}
