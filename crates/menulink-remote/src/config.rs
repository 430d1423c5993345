//! Connector configuration.
//!
//! Construction is an explicit, validated struct rather than a deferred
//! builder: [`ConnectorConfig::validate`] fails fast on missing mandatory
//! values before any channel is opened.

use std::net::Ipv4Addr;
use std::time::Duration;

use menulink_protocol::{AesKey, ConnectMode, LocalIdentifier};

use crate::error::RemoteError;

/// Default heartbeat interval.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// Silence longer than this multiple of the heartbeat interval declares the
/// connection dead.
pub const HEARTBEAT_TIMEOUT_MULTIPLIER: u32 = 3;

/// Outstanding correlations older than this multiple of the heartbeat
/// interval resolve with a synthetic timeout.
pub const CORRELATION_TIMEOUT_MULTIPLIER: u32 = 7;

/// Configuration shared by every connector variant.
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    /// Identity presented in the join or pairing handshake.
    pub identity: LocalIdentifier,
    /// Whether the handshake authenticates or pairs.
    pub mode: ConnectMode,
    /// Interval between heartbeats when the link is idle.
    pub heartbeat_interval: Duration,
    /// Optional pre-shared AES key; `None` means plaintext.
    pub encryption: Option<AesKey>,
}

impl ConnectorConfig {
    /// Create a configuration with default heartbeat and no encryption.
    pub fn new(identity: LocalIdentifier) -> Self {
        ConnectorConfig {
            identity,
            mode: ConnectMode::FullyAuthenticated,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            encryption: None,
        }
    }

    /// Set the connect mode.
    pub fn with_mode(mut self, mode: ConnectMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the heartbeat interval.
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Enable encryption with a pre-shared key.
    pub fn with_encryption(mut self, key: AesKey) -> Self {
        self.encryption = Some(key);
        self
    }

    /// Fail fast on configuration a connector cannot run with.
    pub fn validate(&self) -> Result<(), RemoteError> {
        if self.identity.name().trim().is_empty() {
            return Err(RemoteError::InvalidConfig(
                "local identity name must not be empty".to_string(),
            ));
        }
        if self.heartbeat_interval < Duration::from_millis(100) {
            return Err(RemoteError::InvalidConfig(
                "heartbeat interval below 100ms".to_string(),
            ));
        }
        Ok(())
    }
}

/// Serial endpoint parameters.
#[derive(Debug, Clone)]
pub struct SerialEndpoint {
    /// Port name, e.g. `/dev/ttyUSB0` or `COM3`.
    pub port: String,
    /// Baud rate, e.g. 115200.
    pub baud: u32,
}

/// TCP client endpoint parameters.
#[derive(Debug, Clone)]
pub struct SocketEndpoint {
    /// Remote host name or address.
    pub host: String,
    /// Remote port.
    pub port: u16,
}

/// UDP multicast endpoint parameters.
#[derive(Debug, Clone)]
pub struct UdpEndpoint {
    /// Multicast group address.
    pub group: Ipv4Addr,
    /// Group port.
    pub port: u16,
    /// Multicast TTL.
    pub ttl: u8,
    /// Whether locally sent datagrams loop back to this host.
    pub loopback: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ConnectorConfig::new(LocalIdentifier::random("remote"));
        assert_eq!(config.heartbeat_interval, DEFAULT_HEARTBEAT_INTERVAL);
        assert_eq!(config.mode, ConnectMode::FullyAuthenticated);
        assert!(config.encryption.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_name_fails_fast() {
        let config = ConnectorConfig::new(LocalIdentifier::random("  "));
        assert!(matches!(
            config.validate(),
            Err(RemoteError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_too_small_heartbeat_fails_fast() {
        let config = ConnectorConfig::new(LocalIdentifier::random("remote"))
            .with_heartbeat_interval(Duration::from_millis(10));
        assert!(matches!(
            config.validate(),
            Err(RemoteError::InvalidConfig(_))
        ));
    }
}
