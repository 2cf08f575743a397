//! CONNECT-IP transports
//!
//! A transport carries raw IP packets between the local tunnel and the
//! MASQUE gateway. Two implementations exist:
//!
//! - [`Http3Transport`]: CONNECT-IP over an HTTP/3 extended CONNECT
//!   request, one HTTP datagram per packet (preferred);
//! - [`Http2Transport`]: the fallback, carrying the same packets as varint-framed
//!   records in a streaming HTTP/2 CONNECT body.
//!
//! Both apply the same pre-send policy: a packet with a terminal TTL, or
//! one that exceeds the datagram capacity, is not forwarded; instead
//! `write_packet` returns a synthesized ICMP reply that the caller hands
//! back to the TUN device. That outcome is ordinary operation, not an
//! error, which is why [`WriteOutcome`] is a sum of `Sent` and `Reply`
//! rather than an error variant carrying a payload.

pub mod error;
pub mod framing;
pub mod h2;
pub mod h3;
pub mod tls;

use async_trait::async_trait;

pub use self::h2::Http2Transport;
pub use self::h3::Http3Transport;
pub use error::TransportError;

/// HTTP datagram context ID carrying forwarded IP packets.
///
/// CONNECT-IP reserves context 0 for IP payloads; datagrams with any
/// other context ID are dropped on receive. Future multi-context use
/// (separate flows, compression contexts) would thread a different value
/// through [`framing`], but only 0 is spoken today.
pub const CONTEXT_ID_IP: u64 = 0;

/// `:protocol` / `cf-connect-proto` value selecting the IP tunnel
pub const CONNECT_PROTOCOL: &str = "cf-connect-ip";

/// Header carrying the client version string
pub const VERSION_HEADER: &str = "cf-client-version";

/// Header carrying [`CONNECT_PROTOCOL`] on the HTTP/2 path, where
/// extended CONNECT's `:protocol` pseudo-header is unavailable
pub const PROTOCOL_HEADER: &str = "cf-connect-proto";

/// Version string the gateway expects in [`VERSION_HEADER`]
pub const CLIENT_VERSION: &str = "l-2025.8.779.0";

/// Legacy HTTP/3 datagram settings identifier (`SETTINGS_H3_DATAGRAM_00`).
///
/// The production gateway still checks this deprecated identifier, so it
/// is advertised alongside the registered one. Do not remove it.
pub const SETTINGS_H3_DATAGRAM_00: u64 = 0x276;

/// QUIC transport error code the gateway uses for a TLS `access denied`
/// alert (CRYPTO_ERROR + alert 49)
pub const ACCESS_DENIED_ERROR_CODE: u64 = 0x131;

/// Result of writing one packet into the tunnel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The packet was handed to the gateway
    Sent,

    /// The packet was refused locally; this ICMP reply must be written
    /// back into the TUN device as an inbound packet
    Reply(Vec<u8>),
}

/// A bidirectional IP packet tunnel to the gateway.
///
/// `read_packet` and `write_packet` are called concurrently from one
/// reader task and one writer task; implementations tolerate that without
/// external locking.
#[async_trait]
pub trait IpTransport: Send + Sync {
    /// Receive one IP packet into `buf`, returning its length.
    ///
    /// Datagrams or records with a context ID other than
    /// [`CONTEXT_ID_IP`] are skipped and the read continues.
    ///
    /// # Errors
    ///
    /// [`TransportError::Closed`] when the connection is gone or the
    /// session was cancelled; transient errors for recoverable receive
    /// failures.
    async fn read_packet(&self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Send one IP packet, or synthesize the ICMP reply that explains why
    /// it was not sent.
    ///
    /// # Errors
    ///
    /// [`TransportError::Closed`] when the connection is gone or the
    /// session was cancelled; transient errors when this packet was lost
    /// but the session is still usable.
    async fn write_packet(&self, packet: &[u8]) -> Result<WriteOutcome, TransportError>;

    /// Tear the session down: stream, HTTP transport, socket, in that
    /// order. Idempotent; individual close errors are ignored.
    async fn close(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_id_is_zero() {
        assert_eq!(CONTEXT_ID_IP, 0);
    }

    #[test]
    fn test_legacy_datagram_setting_identifier() {
        assert_eq!(SETTINGS_H3_DATAGRAM_00, 0x276);
    }

    #[test]
    fn test_write_outcome_reply_carries_bytes() {
        let outcome = WriteOutcome::Reply(vec![1, 2, 3]);
        match outcome {
            WriteOutcome::Reply(bytes) => assert_eq!(bytes, vec![1, 2, 3]),
            WriteOutcome::Sent => panic!("expected a reply"),
        }
    }
}
