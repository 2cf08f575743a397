//! Transport layer error types

use std::io;

use thiserror::Error;

use crate::packet::PacketError;

/// Errors from transport establishment and packet forwarding
#[derive(Debug, Error)]
pub enum TransportError {
    /// The gateway rejected the client certificate with a TLS
    /// `access denied` alert. Retrying without re-enrolling will not help.
    #[error(
        "login failed: the gateway denied access; \
         check that the TLS key and certificate are enrolled"
    )]
    LoginDenied,

    /// The server lacks a capability this transport requires (HTTP/3
    /// datagrams, Extended CONNECT, or a usable certificate chain on the
    /// HTTP/2 path). The next enabled transport should be tried.
    #[error("not supported by server: {0}")]
    Unsupported(String),

    /// The connection is gone: the peer closed it, or the local session
    /// was cancelled.
    #[error("connection closed: {0}")]
    Closed(String),

    /// Connection establishment failed
    #[error("failed to connect to {address}: {reason}")]
    ConnectionFailed {
        /// Target address
        address: String,
        /// Failure reason
        reason: String,
    },

    /// An establishment step timed out
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout {
        /// What timed out
        operation: String,
        /// Timeout in milliseconds
        timeout_ms: u64,
    },

    /// TLS configuration or handshake failure
    #[error("TLS error: {0}")]
    Tls(String),

    /// The HTTP layer misbehaved (bad status, malformed response,
    /// protocol error)
    #[error("HTTP error: {0}")]
    Http(String),

    /// A single datagram or record was lost; the session is still usable
    #[error("datagram error: {0}")]
    Datagram(String),

    /// The outbound packet could not be parsed for ICMP synthesis
    #[error("packet error: {0}")]
    Packet(#[from] PacketError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl TransportError {
    /// Create a connection-failed error
    pub fn connection_failed(address: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            address: address.into(),
            reason: reason.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Create a closed error
    pub fn closed(reason: impl Into<String>) -> Self {
        Self::Closed(reason.into())
    }

    /// Create an unsupported-by-server error
    pub fn unsupported(reason: impl Into<String>) -> Self {
        Self::Unsupported(reason.into())
    }

    /// True when the connection is unusable and the session must end
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed(_))
    }

    /// True when only the current packet was affected: the forwarding
    /// loop logs and moves on to the next packet
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Datagram(_) | Self::Packet(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(TransportError::closed("peer went away").is_closed());
        assert!(!TransportError::closed("peer went away").is_transient());

        assert!(TransportError::Datagram("queue full".into()).is_transient());
        assert!(TransportError::Packet(PacketError::Empty).is_transient());

        assert!(!TransportError::LoginDenied.is_closed());
        assert!(!TransportError::LoginDenied.is_transient());
        assert!(!TransportError::unsupported("no datagrams").is_transient());
    }

    #[test]
    fn test_display() {
        let err = TransportError::connection_failed("192.0.2.1:443", "refused");
        assert!(err.to_string().contains("192.0.2.1:443"));
        assert!(err.to_string().contains("refused"));

        let err = TransportError::timeout("TCP dial", 30_000);
        assert!(err.to_string().contains("30000ms"));

        assert!(TransportError::LoginDenied.to_string().contains("enrolled"));
    }

    #[test]
    fn test_packet_error_converts() {
        let err: TransportError = PacketError::UnknownVersion(9).into();
        assert!(err.is_transient());
        assert!(err.to_string().contains("unknown IP version"));
    }
}
