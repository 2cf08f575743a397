//! Tunnel configuration
//!
//! Everything the supervisor needs from the enclosing application:
//! gateway endpoint, CONNECT URL, MTU, reconnect policy, transport
//! selection, and the TLS / QUIC parameters shared by both transports.
//! The types deserialize from the application's config file and carry
//! usable defaults for everything except the endpoint and the client
//! credentials.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use url::Url;

/// SNI the gateway expects on both transports
pub const CONNECT_SNI: &str = "consumer-masque.cloudflareclient.com";

/// Default CONNECT request URL
pub const CONNECT_URI: &str = "https://cloudflareaccess.com";

/// Default tunnel MTU
pub const DEFAULT_MTU: usize = 1280;

const DEFAULT_RECONNECT_DELAY_SECS: u64 = 1;
const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 30;
const DEFAULT_KEEP_ALIVE_SECS: u64 = 15;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_INITIAL_MAX_DATA: u64 = 10_000_000;
const DEFAULT_INITIAL_MAX_STREAM_DATA: u64 = 1_000_000;
const DEFAULT_MAX_UDP_PAYLOAD_SIZE: usize = 1350;

/// Configuration errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Both transports are disabled
    #[error("at least one of http3 and http2 must be enabled")]
    NoTransportEnabled,

    /// The MTU is zero
    #[error("mtu must be greater than zero")]
    InvalidMtu,

    /// The CONNECT URL does not parse or lacks a host
    #[error("invalid connect URL {url}: {reason}")]
    InvalidConnectUrl {
        /// The offending URL
        url: String,
        /// Why it was rejected
        reason: String,
    },
}

/// TLS identity and trust for both transports.
///
/// The gateway authenticates clients by mTLS; certificate and key are
/// required. Paths are PEM files.
#[derive(Debug, Clone, Deserialize)]
pub struct TlsSettings {
    /// Client certificate chain (PEM)
    pub cert_path: PathBuf,

    /// Client private key (PEM)
    pub key_path: PathBuf,

    /// CA bundle overriding the default trust anchors (PEM)
    #[serde(default)]
    pub ca_path: Option<PathBuf>,

    /// SNI / certificate verification name
    #[serde(default = "default_server_name")]
    pub server_name: String,
}

impl TlsSettings {
    /// Create settings for the given client certificate and key, with the
    /// default gateway SNI.
    pub fn new(cert_path: impl Into<PathBuf>, key_path: impl Into<PathBuf>) -> Self {
        Self {
            cert_path: cert_path.into(),
            key_path: key_path.into(),
            ca_path: None,
            server_name: default_server_name(),
        }
    }

    /// Override the server name.
    #[must_use]
    pub fn with_server_name(mut self, server_name: impl Into<String>) -> Self {
        self.server_name = server_name.into();
        self
    }

    /// Trust the given CA bundle instead of the default roots.
    #[must_use]
    pub fn with_ca(mut self, ca_path: impl Into<PathBuf>) -> Self {
        self.ca_path = Some(ca_path.into());
        self
    }
}

/// QUIC parameters for the HTTP/3 transport. The keep-alive period also
/// drives the TCP keep-alive of the HTTP/2 fallback.
#[derive(Debug, Clone, Deserialize)]
pub struct QuicSettings {
    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Keep-alive period in seconds
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,

    /// Handshake timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Initial connection flow-control credit in bytes
    #[serde(default = "default_initial_max_data")]
    pub initial_max_data: u64,

    /// Initial per-stream flow-control credit in bytes
    #[serde(default = "default_initial_max_stream_data")]
    pub initial_max_stream_data: u64,

    /// Maximum outgoing UDP payload size in bytes
    #[serde(default = "default_max_udp_payload_size")]
    pub max_udp_payload_size: usize,
}

impl Default for QuicSettings {
    fn default() -> Self {
        Self {
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
            keep_alive_secs: DEFAULT_KEEP_ALIVE_SECS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            initial_max_data: DEFAULT_INITIAL_MAX_DATA,
            initial_max_stream_data: DEFAULT_INITIAL_MAX_STREAM_DATA,
            max_udp_payload_size: DEFAULT_MAX_UDP_PAYLOAD_SIZE,
        }
    }
}

impl QuicSettings {
    /// Idle timeout as a [`Duration`]
    #[must_use]
    pub const fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Keep-alive period as a [`Duration`]
    #[must_use]
    pub const fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    /// Handshake timeout as a [`Duration`]
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Supervisor inputs: where the gateway is, how to talk to it, and how to
/// behave when the session drops.
#[derive(Debug, Clone, Deserialize)]
pub struct TunnelConfig {
    /// Resolved gateway address
    pub endpoint: SocketAddr,

    /// CONNECT request URL
    #[serde(default = "default_connect_url")]
    pub connect_url: String,

    /// Tunnel MTU; also the size of every pooled packet buffer
    #[serde(default = "default_mtu")]
    pub mtu: usize,

    /// Delay between reconnect attempts in seconds
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,

    /// Try the HTTP/3 transport
    #[serde(default = "default_true")]
    pub http3: bool,

    /// Fall back to the HTTP/2 transport
    #[serde(default = "default_true")]
    pub http2: bool,

    /// TLS identity and trust
    pub tls: TlsSettings,

    /// QUIC parameters
    #[serde(default)]
    pub quic: QuicSettings,
}

impl TunnelConfig {
    /// Create a config for the given gateway endpoint and TLS identity,
    /// with defaults for everything else.
    pub fn new(endpoint: SocketAddr, tls: TlsSettings) -> Self {
        Self {
            endpoint,
            connect_url: default_connect_url(),
            mtu: DEFAULT_MTU,
            reconnect_delay_secs: DEFAULT_RECONNECT_DELAY_SECS,
            http3: true,
            http2: true,
            tls,
            quic: QuicSettings::default(),
        }
    }

    /// Override the MTU.
    #[must_use]
    pub fn with_mtu(mut self, mtu: usize) -> Self {
        self.mtu = mtu;
        self
    }

    /// Select which transports may be attempted, in preference order
    /// HTTP/3 then HTTP/2.
    #[must_use]
    pub fn with_transports(mut self, http3: bool, http2: bool) -> Self {
        self.http3 = http3;
        self.http2 = http2;
        self
    }

    /// Override the reconnect delay.
    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay_secs = delay.as_secs();
        self
    }

    /// Reconnect delay as a [`Duration`]
    #[must_use]
    pub const fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    /// Parse the CONNECT URL.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidConnectUrl`] if the URL does not parse or
    /// has no host.
    pub fn connect_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.connect_url).map_err(|e| ConfigError::InvalidConnectUrl {
            url: self.connect_url.clone(),
            reason: e.to_string(),
        })?;
        if url.host_str().is_none() {
            return Err(ConfigError::InvalidConnectUrl {
                url: self.connect_url.clone(),
                reason: "missing host".into(),
            });
        }
        Ok(url)
    }

    /// Validate the configuration before use.
    ///
    /// # Errors
    ///
    /// Rejects configs with no transport enabled, a zero MTU, or an
    /// unusable CONNECT URL.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.http3 && !self.http2 {
            return Err(ConfigError::NoTransportEnabled);
        }
        if self.mtu == 0 {
            return Err(ConfigError::InvalidMtu);
        }
        self.connect_url()?;
        Ok(())
    }
}

fn default_server_name() -> String {
    CONNECT_SNI.to_string()
}

fn default_connect_url() -> String {
    CONNECT_URI.to_string()
}

const fn default_mtu() -> usize {
    DEFAULT_MTU
}

const fn default_reconnect_delay_secs() -> u64 {
    DEFAULT_RECONNECT_DELAY_SECS
}

const fn default_idle_timeout_secs() -> u64 {
    DEFAULT_IDLE_TIMEOUT_SECS
}

const fn default_keep_alive_secs() -> u64 {
    DEFAULT_KEEP_ALIVE_SECS
}

const fn default_connect_timeout_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

const fn default_initial_max_data() -> u64 {
    DEFAULT_INITIAL_MAX_DATA
}

const fn default_initial_max_stream_data() -> u64 {
    DEFAULT_INITIAL_MAX_STREAM_DATA
}

const fn default_max_udp_payload_size() -> usize {
    DEFAULT_MAX_UDP_PAYLOAD_SIZE
}

const fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> TunnelConfig {
        TunnelConfig::new(
            "162.159.198.1:443".parse().unwrap(),
            TlsSettings::new("/etc/masque/cert.pem", "/etc/masque/key.pem"),
        )
    }

    #[test]
    fn test_defaults() {
        let config = sample_config();
        assert_eq!(config.mtu, 1280);
        assert_eq!(config.connect_url, "https://cloudflareaccess.com");
        assert!(config.http3);
        assert!(config.http2);
        assert_eq!(config.reconnect_delay(), Duration::from_secs(1));
        assert_eq!(config.tls.server_name, CONNECT_SNI);
        assert_eq!(config.quic.keep_alive(), Duration::from_secs(15));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builders() {
        let config = sample_config()
            .with_mtu(1420)
            .with_transports(false, true)
            .with_reconnect_delay(Duration::from_secs(5));
        assert_eq!(config.mtu, 1420);
        assert!(!config.http3);
        assert!(config.http2);
        assert_eq!(config.reconnect_delay(), Duration::from_secs(5));
    }

    #[test]
    fn test_validation_rejects_no_transport() {
        let config = sample_config().with_transports(false, false);
        assert_eq!(config.validate(), Err(ConfigError::NoTransportEnabled));
    }

    #[test]
    fn test_validation_rejects_zero_mtu() {
        let config = sample_config().with_mtu(0);
        assert_eq!(config.validate(), Err(ConfigError::InvalidMtu));
    }

    #[test]
    fn test_validation_rejects_bad_url() {
        let mut config = sample_config();
        config.connect_url = "not a url".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidConnectUrl { .. })
        ));
    }

    #[test]
    fn test_connect_url_host() {
        let config = sample_config();
        let url = config.connect_url().unwrap();
        assert_eq!(url.host_str(), Some("cloudflareaccess.com"));
        assert_eq!(url.scheme(), "https");
    }

    #[test]
    fn test_deserialize_minimal() {
        let json = r#"{
            "endpoint": "162.159.198.2:4443",
            "tls": {
                "cert_path": "/tmp/cert.pem",
                "key_path": "/tmp/key.pem"
            }
        }"#;
        let config: TunnelConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.endpoint.port(), 4443);
        assert_eq!(config.mtu, DEFAULT_MTU);
        assert_eq!(config.tls.server_name, CONNECT_SNI);
        assert!(config.validate().is_ok());
    }
}
