//! masque-tunnel: user-space MASQUE (CONNECT-IP) tunnel core
//!
//! This crate implements the packet-forwarding engine of a MASQUE VPN
//! client. It reads raw IP packets from a TUN-style device, frames them as
//! HTTP datagrams, and forwards them to a CONNECT-IP gateway over HTTP/3
//! (QUIC datagrams) or, as a fallback, over a streaming HTTP/2 CONNECT
//! body. The concrete target is Cloudflare's WARP consumer endpoint, but
//! the wire behavior is generic over any RFC 9484-style gateway that also
//! accepts the TCP/TLS/HTTP2 fallback.
//!
//! # Architecture
//!
//! ```text
//! TUN device ──read──> inspector ──> transport.write_packet ──> gateway
//!     ^                   │ (TTL gate)
//!     │                   v
//!     └──── synthesized ICMP (Time Exceeded / Packet Too Big)
//!
//! gateway ──datagram/record──> transport.read_packet ──write──> TUN device
//! ```
//!
//! A single [`tunnel::maintain_tunnel`] supervisor owns both directions: it
//! establishes the gateway connection (HTTP/3 preferred, HTTP/2 fallback),
//! pumps packets until either direction fails, then reconnects after a
//! configurable delay. Device loss and caller cancellation terminate the
//! supervisor instead.
//!
//! The crate is a pure L3 packet mover: no routing, NAT, address
//! assignment, or device creation happens here. Enrollment, key material,
//! and OS-specific TUN plumbing belong to the enclosing application.
//!
//! # Modules
//!
//! - [`packet`]: IP header inspection and ICMP/ICMPv6 synthesis
//! - [`transport`]: the CONNECT-IP transports and their wire framing
//! - [`device`]: the TUN-side device abstraction
//! - [`io`]: pooled packet buffers
//! - [`tunnel`]: the connection supervisor and its configuration

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod device;
pub mod io;
pub mod packet;
pub mod transport;
pub mod tunnel;

// Re-export commonly used types at the crate root
pub use device::{DeviceError, StreamDevice, TunnelDevice};
pub use io::{PacketBufferPool, PooledBuffer};
pub use packet::{PacketError, Verdict};
pub use transport::{
    Http2Transport, Http3Transport, IpTransport, TransportError, WriteOutcome, CONTEXT_ID_IP,
};
pub use tunnel::{maintain_tunnel, QuicSettings, TlsSettings, TunnelConfig, TunnelExit};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
