//! HTTP/3 CONNECT-IP transport
//!
//! The preferred path to the gateway: a QUIC connection carrying an
//! HTTP/3 extended CONNECT request (`:protocol = cf-connect-ip`), with
//! each IP packet forwarded as one HTTP datagram.
//!
//! `quiche` is sans-I/O, so this module owns the UDP socket and drives
//! the connection explicitly: the connect path runs a handshake loop
//! inline, and a background task then pumps socket ⇄ connection, runs
//! the QUIC timers, sends keep-alive pings and wakes the packet reader.
//! The connection state lives behind one async mutex shared by the
//! reader, the writer, and the driver; nothing holds it across a
//! suspension point.
//!
//! Wire detail: a QUIC DATAGRAM frame payload starts with the varint
//! quarter-stream-ID of the request stream, then the CONNECT-IP context
//! ID, then the raw packet. Both prefixes are handled in
//! [`framing`](super::framing).

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use quiche::h3::NameValue;
use tokio::net::UdpSocket;
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::framing;
use super::{
    IpTransport, TransportError, WriteOutcome, ACCESS_DENIED_ERROR_CODE, CLIENT_VERSION,
    CONNECT_PROTOCOL, CONTEXT_ID_IP, SETTINGS_H3_DATAGRAM_00, VERSION_HEADER,
};
use crate::packet::{self, icmp, Verdict};
use crate::tunnel::TunnelConfig;

/// Largest UDP payload the socket will receive
const MAX_UDP_PAYLOAD: usize = 65_535;

/// Upper bound on one socket wait, so timers and shutdown stay responsive
const DRIVE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// QUIC datagram queue depths (packets)
const DGRAM_QUEUE_LEN: usize = 1024;

/// HTTP/3 `H3_NO_ERROR` code used for the local close
const H3_NO_ERROR: u64 = 0x100;

/// Mutable connection state shared between reader, writer and driver.
struct H3State {
    quic: quiche::Connection,
    http3: quiche::h3::Connection,
    /// Outbound datagram encode buffer; grows to the largest packet seen
    /// and never shrinks
    scratch: Vec<u8>,
    /// Inbound datagram receive buffer
    recv_dgram: Vec<u8>,
}

struct Shared {
    state: Mutex<H3State>,
    socket: UdpSocket,
    local_addr: SocketAddr,
    /// CONNECT request stream
    stream_id: u64,
    /// Datagram flow identifier derived from the request stream
    quarter_stream_id: u64,
    /// Woken by the driver when inbound datagrams are queued or the
    /// connection dies
    dgram_ready: Notify,
    /// Outbound UDP staging buffer for [`flush_shared`]
    flush_buf: Mutex<Vec<u8>>,
    closed: AtomicBool,
    cancel: CancellationToken,
    keep_alive: Duration,
}

/// CONNECT-IP over HTTP/3 datagrams.
pub struct Http3Transport {
    shared: Arc<Shared>,
}

impl Http3Transport {
    /// Establish the HTTP/3 tunnel described by `config`.
    ///
    /// Dials QUIC, waits for the server's SETTINGS and requires HTTP/3
    /// datagram and Extended CONNECT support, then issues the extended
    /// CONNECT request and waits for a 200.
    ///
    /// # Errors
    ///
    /// - [`TransportError::LoginDenied`] when the gateway answers the
    ///   handshake with a TLS `access denied` alert;
    /// - [`TransportError::Unsupported`] when the server lacks datagrams
    ///   or Extended CONNECT;
    /// - [`TransportError::Closed`] when `cancel` fires first;
    /// - connection, timeout and HTTP errors otherwise.
    pub async fn connect(
        config: &TunnelConfig,
        cancel: &CancellationToken,
    ) -> Result<Self, TransportError> {
        let endpoint = config.endpoint;
        let bind_addr: SocketAddr = if endpoint.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };

        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|e| TransportError::connection_failed(endpoint.to_string(), e.to_string()))?;
        let local_addr = socket
            .local_addr()
            .map_err(|e| TransportError::connection_failed(endpoint.to_string(), e.to_string()))?;

        let mut quic_config = build_quic_config(config)?;

        let mut scid = [0u8; quiche::MAX_CONN_ID_LEN];
        rand::RngCore::fill_bytes(&mut rand::rng(), &mut scid);
        let scid = quiche::ConnectionId::from_ref(&scid);

        let mut quic = quiche::connect(
            Some(config.tls.server_name.as_str()),
            &scid,
            local_addr,
            endpoint,
            &mut quic_config,
        )
        .map_err(|e| TransportError::connection_failed(endpoint.to_string(), e.to_string()))?;

        let mut buf = vec![0u8; MAX_UDP_PAYLOAD];
        let mut out = vec![0u8; MAX_UDP_PAYLOAD];

        flush_conn(&socket, &mut quic, &mut out).await?;

        let timeout_ms = config.quic.connect_timeout().as_millis() as u64;
        let deadline = Instant::now() + config.quic.connect_timeout();

        // QUIC handshake
        while !quic.is_established() {
            check_connect_guards(&quic, cancel, deadline, timeout_ms, "QUIC handshake")?;
            drive_once(&socket, &mut quic, local_addr, &mut buf, &mut out).await?;
        }

        // HTTP/3 layer; QPACK dynamic table stays off (no compression)
        let h3_config = build_h3_config()?;
        let mut http3 = quiche::h3::Connection::with_transport(&mut quic, &h3_config)
            .map_err(|e| TransportError::Http(format!("failed to start HTTP/3: {e}")))?;
        flush_conn(&socket, &mut quic, &mut out).await?;

        // The server's SETTINGS decide whether this transport is usable.
        while http3.peer_settings_raw().is_none() {
            check_connect_guards(&quic, cancel, deadline, timeout_ms, "HTTP/3 settings")?;
            drain_h3_events(&mut quic, &mut http3);
            drive_once(&socket, &mut quic, local_addr, &mut buf, &mut out).await?;
        }
        if !http3.dgram_enabled_by_peer(&quic) {
            return Err(TransportError::unsupported("server didn't enable datagrams"));
        }
        if !http3.extended_connect_enabled_by_peer() {
            return Err(TransportError::unsupported(
                "server didn't enable Extended CONNECT",
            ));
        }

        // Extended CONNECT request
        let url = config
            .connect_url()
            .map_err(|e| TransportError::Http(e.to_string()))?;
        let authority = url
            .host_str()
            .map(|host| match url.port() {
                Some(port) => format!("{host}:{port}"),
                None => host.to_string(),
            })
            .unwrap_or_default();
        let path = if url.path().is_empty() { "/" } else { url.path() };
        let headers = vec![
            quiche::h3::Header::new(b":method", b"CONNECT"),
            quiche::h3::Header::new(b":protocol", CONNECT_PROTOCOL.as_bytes()),
            quiche::h3::Header::new(b":scheme", url.scheme().as_bytes()),
            quiche::h3::Header::new(b":authority", authority.as_bytes()),
            quiche::h3::Header::new(b":path", path.as_bytes()),
            quiche::h3::Header::new(b"user-agent", b""),
            quiche::h3::Header::new(VERSION_HEADER.as_bytes(), CLIENT_VERSION.as_bytes()),
        ];

        let stream_id = loop {
            match http3.send_request(&mut quic, &headers, false) {
                Ok(id) => break id,
                Err(quiche::h3::Error::StreamBlocked | quiche::h3::Error::Done) => {
                    check_connect_guards(&quic, cancel, deadline, timeout_ms, "CONNECT request")?;
                    drive_once(&socket, &mut quic, local_addr, &mut buf, &mut out).await?;
                }
                Err(e) => {
                    return Err(TransportError::Http(format!(
                        "failed to send CONNECT request: {e}"
                    )))
                }
            }
        };
        flush_conn(&socket, &mut quic, &mut out).await?;

        // Response headers
        let status = loop {
            match http3.poll(&mut quic) {
                Ok((id, quiche::h3::Event::Headers { list, .. })) if id == stream_id => {
                    break response_status(&list)?;
                }
                Ok(_) => {}
                Err(quiche::h3::Error::Done) => {
                    check_connect_guards(&quic, cancel, deadline, timeout_ms, "CONNECT response")?;
                    drive_once(&socket, &mut quic, local_addr, &mut buf, &mut out).await?;
                }
                Err(e) => {
                    return Err(TransportError::Http(format!(
                        "failed to read CONNECT response: {e}"
                    )))
                }
            }
        };
        if status != 200 {
            return Err(TransportError::Http(format!(
                "server responded with status {status}"
            )));
        }

        info!(
            endpoint = %endpoint,
            stream_id,
            "HTTP/3 CONNECT-IP tunnel established"
        );

        let shared = Arc::new(Shared {
            state: Mutex::new(H3State {
                quic,
                http3,
                scratch: Vec::new(),
                recv_dgram: vec![0u8; MAX_UDP_PAYLOAD],
            }),
            socket,
            local_addr,
            stream_id,
            quarter_stream_id: stream_id / 4,
            dgram_ready: Notify::new(),
            flush_buf: Mutex::new(vec![0u8; MAX_UDP_PAYLOAD]),
            closed: AtomicBool::new(false),
            cancel: cancel.child_token(),
            keep_alive: config.quic.keep_alive(),
        });

        tokio::spawn(drive(Arc::clone(&shared)));

        Ok(Self { shared })
    }
}

#[async_trait]
impl IpTransport for Http3Transport {
    async fn read_packet(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let shared = &self.shared;
        loop {
            if shared.cancel.is_cancelled() {
                return Err(TransportError::closed("session cancelled"));
            }
            {
                let mut st = shared.state.lock().await;
                let H3State {
                    quic, recv_dgram, ..
                } = &mut *st;
                match quic.dgram_recv(recv_dgram) {
                    Ok(len) => match framing::decode_datagram(&recv_dgram[..len]) {
                        Ok((_, context_id, payload)) if context_id == CONTEXT_ID_IP => {
                            let n = payload.len().min(buf.len());
                            buf[..n].copy_from_slice(&payload[..n]);
                            return Ok(n);
                        }
                        Ok((_, context_id, _)) => {
                            debug!(context_id, "skipping datagram with foreign context");
                            continue;
                        }
                        Err(e) => return Err(TransportError::Datagram(e.to_string())),
                    },
                    Err(quiche::Error::Done) => {
                        if shared.closed.load(Ordering::Acquire) || quic.is_closed() {
                            return Err(close_reason(quic, &shared.cancel));
                        }
                    }
                    Err(e) => {
                        return Err(TransportError::Datagram(format!(
                            "datagram receive failed: {e}"
                        )))
                    }
                }
            }
            tokio::select! {
                () = shared.dgram_ready.notified() => {}
                () = shared.cancel.cancelled() => {
                    return Err(TransportError::closed("session cancelled"));
                }
            }
        }
    }

    async fn write_packet(&self, packet: &[u8]) -> Result<WriteOutcome, TransportError> {
        match packet::inspect(packet) {
            Verdict::HopLimitExceeded { ttl } => {
                debug!(ttl, "refusing packet with terminal hop limit");
                return Ok(WriteOutcome::Reply(icmp::time_exceeded(packet)?));
            }
            Verdict::Ok => {}
        }

        let shared = &self.shared;
        if shared.cancel.is_cancelled() {
            return Err(TransportError::closed("session cancelled"));
        }
        {
            let mut st = shared.state.lock().await;
            if shared.closed.load(Ordering::Acquire) || st.quic.is_closed() {
                return Err(close_reason(&st.quic, &shared.cancel));
            }
            let H3State { quic, scratch, .. } = &mut *st;

            let overhead = framing::varint_len(shared.quarter_stream_id)
                + framing::varint_len(CONTEXT_ID_IP);
            let Some(max_len) = quic.dgram_max_writable_len() else {
                return Err(TransportError::Datagram(
                    "peer is not accepting datagrams".into(),
                ));
            };
            if packet.len() + overhead > max_len {
                let mtu = max_len.saturating_sub(overhead);
                debug!(len = packet.len(), mtu, "packet exceeds datagram capacity");
                return Ok(WriteOutcome::Reply(icmp::packet_too_big(packet, mtu)?));
            }

            scratch.clear();
            framing::encode_datagram(shared.quarter_stream_id, CONTEXT_ID_IP, packet, scratch);
            match quic.dgram_send(scratch) {
                Ok(()) => {}
                Err(quiche::Error::Done) => {
                    return Err(TransportError::Datagram("datagram queue full".into()))
                }
                Err(e) => {
                    return Err(TransportError::Datagram(format!("datagram send failed: {e}")))
                }
            }
        }

        flush_shared(shared).await?;
        Ok(WriteOutcome::Sent)
    }

    async fn close(&self) {
        let shared = &self.shared;
        if shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        shared.cancel.cancel();
        {
            let mut st = shared.state.lock().await;
            let H3State { quic, http3, .. } = &mut *st;
            // Stream first, then the connection; the socket goes with the
            // last reference.
            let _ = http3.send_body(quic, shared.stream_id, &[], true);
            let _ = quic.close(true, H3_NO_ERROR, b"");
        }
        let _ = flush_shared(shared).await;
        shared.dgram_ready.notify_one();
        debug!("HTTP/3 tunnel closed");
    }
}

/// Background task: pump the socket, run timers, keep the peer alive,
/// wake the reader.
async fn drive(shared: Arc<Shared>) {
    let mut buf = vec![0u8; MAX_UDP_PAYLOAD];
    let mut last_keep_alive = Instant::now();

    loop {
        if shared.closed.load(Ordering::Acquire) || shared.cancel.is_cancelled() {
            break;
        }

        let wait = {
            let st = shared.state.lock().await;
            st.quic
                .timeout()
                .unwrap_or(DRIVE_POLL_INTERVAL)
                .min(DRIVE_POLL_INTERVAL)
        };

        tokio::select! {
            recv = shared.socket.recv_from(&mut buf) => match recv {
                Ok((len, from)) => {
                    let mut st = shared.state.lock().await;
                    let H3State { quic, http3, .. } = &mut *st;
                    let info = quiche::RecvInfo {
                        from,
                        to: shared.local_addr,
                    };
                    if let Err(e) = quic.recv(&mut buf[..len], info) {
                        if e != quiche::Error::Done {
                            debug!(error = %e, "QUIC receive failed");
                        }
                    }
                    drain_h3_events(quic, http3);
                    if quic.dgram_recv_front_len().is_some() {
                        shared.dgram_ready.notify_one();
                    }
                }
                Err(e) => {
                    warn!(error = %e, "tunnel socket receive failed");
                    break;
                }
            },
            () = tokio::time::sleep(wait) => {
                shared.state.lock().await.quic.on_timeout();
            }
            () = shared.cancel.cancelled() => break,
        }

        if last_keep_alive.elapsed() >= shared.keep_alive {
            let _ = shared.state.lock().await.quic.send_ack_eliciting();
            last_keep_alive = Instant::now();
        }

        if let Err(e) = flush_shared(&shared).await {
            debug!(error = %e, "tunnel socket send failed");
            break;
        }

        let dead = shared.state.lock().await.quic.is_closed();
        if dead {
            shared.closed.store(true, Ordering::Release);
            break;
        }
    }

    // Whatever ended the loop, unblock a waiting reader so it can observe
    // the closed state.
    shared.closed.store(true, Ordering::Release);
    shared.dgram_ready.notify_one();
}

/// Process pending HTTP/3 events. The tunnel itself only uses datagrams;
/// stream events are the peer cycling or finishing streams and need no
/// action beyond draining.
fn drain_h3_events(quic: &mut quiche::Connection, http3: &mut quiche::h3::Connection) {
    loop {
        match http3.poll(quic) {
            Ok((stream_id, event)) => {
                debug!(stream_id, ?event, "HTTP/3 event");
            }
            Err(quiche::h3::Error::Done) => break,
            Err(e) => {
                debug!(error = %e, "HTTP/3 poll failed");
                break;
            }
        }
    }
}

/// One step of the inline connect loop: wait briefly for a packet, feed
/// it to the connection (or run its timers), then flush.
async fn drive_once(
    socket: &UdpSocket,
    quic: &mut quiche::Connection,
    local_addr: SocketAddr,
    buf: &mut [u8],
    out: &mut [u8],
) -> Result<(), TransportError> {
    let wait = quic
        .timeout()
        .unwrap_or(DRIVE_POLL_INTERVAL)
        .min(DRIVE_POLL_INTERVAL);

    match tokio::time::timeout(wait, socket.recv_from(buf)).await {
        Ok(Ok((len, from))) => {
            let info = quiche::RecvInfo {
                from,
                to: local_addr,
            };
            if let Err(e) = quic.recv(&mut buf[..len], info) {
                if e != quiche::Error::Done {
                    return Err(TransportError::connection_failed(
                        quic.trace_id().to_string(),
                        format!("QUIC receive failed: {e}"),
                    ));
                }
            }
        }
        Ok(Err(e)) => return Err(TransportError::Io(e)),
        Err(_) => quic.on_timeout(),
    }

    flush_conn(socket, quic, out).await
}

/// Send every packet the connection has queued.
async fn flush_conn(
    socket: &UdpSocket,
    quic: &mut quiche::Connection,
    out: &mut [u8],
) -> Result<(), TransportError> {
    loop {
        match quic.send(out) {
            Ok((n, send_info)) => {
                socket.send_to(&out[..n], send_info.to).await?;
            }
            Err(quiche::Error::Done) => return Ok(()),
            Err(e) => {
                return Err(TransportError::connection_failed(
                    quic.trace_id().to_string(),
                    format!("QUIC send failed: {e}"),
                ))
            }
        }
    }
}

/// [`flush_conn`] against the shared state, taking the connection lock
/// per packet so readers and the driver are never starved.
async fn flush_shared(shared: &Shared) -> Result<(), TransportError> {
    let mut out = shared.flush_buf.lock().await;
    loop {
        let (n, to) = {
            let mut st = shared.state.lock().await;
            match st.quic.send(&mut out) {
                Ok((n, send_info)) => (n, send_info.to),
                Err(quiche::Error::Done) => return Ok(()),
                Err(e) => {
                    return Err(TransportError::Datagram(format!("QUIC send failed: {e}")));
                }
            }
        };
        shared.socket.send_to(&out[..n], to).await?;
    }
}

/// Abort conditions shared by every phase of the connect loop.
fn check_connect_guards(
    quic: &quiche::Connection,
    cancel: &CancellationToken,
    deadline: Instant,
    timeout_ms: u64,
    phase: &str,
) -> Result<(), TransportError> {
    if cancel.is_cancelled() {
        return Err(TransportError::closed("cancelled"));
    }
    if quic.is_closed() {
        return Err(close_reason(quic, cancel));
    }
    if Instant::now() > deadline {
        return Err(TransportError::timeout(phase, timeout_ms));
    }
    Ok(())
}

/// Translate a dead connection into the right error. The gateway signals
/// a rejected client certificate as a TLS `access denied` alert, which
/// arrives as QUIC transport error 0x131.
fn close_reason(quic: &quiche::Connection, cancel: &CancellationToken) -> TransportError {
    if cancel.is_cancelled() {
        return TransportError::closed("session cancelled");
    }
    if let Some(err) = quic.peer_error() {
        if !err.is_app && err.error_code == ACCESS_DENIED_ERROR_CODE {
            return TransportError::LoginDenied;
        }
        return TransportError::closed(format!(
            "peer closed connection (code 0x{:x})",
            err.error_code
        ));
    }
    if let Some(err) = quic.local_error() {
        return TransportError::closed(format!(
            "connection closed locally (code 0x{:x})",
            err.error_code
        ));
    }
    TransportError::closed("connection closed")
}

/// Extract the `:status` pseudo-header.
fn response_status(headers: &[quiche::h3::Header]) -> Result<u16, TransportError> {
    for header in headers {
        if header.name() == b":status" {
            return std::str::from_utf8(header.value())
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| TransportError::Http("malformed :status header".into()));
        }
    }
    Err(TransportError::Http("response missing :status".into()))
}

/// QUIC client configuration: ALPN `h3`, datagrams on, mTLS identity
/// loaded from the configured PEM files.
fn build_quic_config(config: &TunnelConfig) -> Result<quiche::Config, TransportError> {
    let tls = &config.tls;
    let quic = &config.quic;

    let mut qc = quiche::Config::new(quiche::PROTOCOL_VERSION)
        .map_err(|e| TransportError::Tls(format!("failed to create QUIC config: {e}")))?;

    qc.set_application_protos(&[b"h3"])
        .map_err(|e| TransportError::Tls(format!("failed to set ALPN: {e}")))?;

    let cert_path = path_str(&tls.cert_path)?;
    qc.load_cert_chain_from_pem_file(cert_path)
        .map_err(|e| TransportError::Tls(format!("failed to load certificate: {e}")))?;
    let key_path = path_str(&tls.key_path)?;
    qc.load_priv_key_from_pem_file(key_path)
        .map_err(|e| TransportError::Tls(format!("failed to load private key: {e}")))?;
    if let Some(ca_path) = &tls.ca_path {
        let ca_path = path_str(ca_path)?;
        qc.load_verify_locations_from_file(ca_path)
            .map_err(|e| TransportError::Tls(format!("failed to load CA bundle: {e}")))?;
    }
    qc.verify_peer(true);

    qc.set_max_idle_timeout(config.quic.idle_timeout().as_millis() as u64);
    qc.set_max_recv_udp_payload_size(MAX_UDP_PAYLOAD);
    qc.set_max_send_udp_payload_size(quic.max_udp_payload_size);
    qc.set_initial_max_data(quic.initial_max_data);
    qc.set_initial_max_stream_data_bidi_local(quic.initial_max_stream_data);
    qc.set_initial_max_stream_data_bidi_remote(quic.initial_max_stream_data);
    qc.set_initial_max_stream_data_uni(quic.initial_max_stream_data);
    qc.set_initial_max_streams_bidi(16);
    qc.set_initial_max_streams_uni(16);
    qc.enable_dgram(true, DGRAM_QUEUE_LEN, DGRAM_QUEUE_LEN);

    Ok(qc)
}

/// HTTP/3 configuration: Extended CONNECT, no QPACK dynamic table, and
/// the legacy datagram settings identifier the production gateway still
/// checks alongside the registered one.
fn build_h3_config() -> Result<quiche::h3::Config, TransportError> {
    let mut hc = quiche::h3::Config::new()
        .map_err(|e| TransportError::Http(format!("failed to create HTTP/3 config: {e}")))?;
    hc.set_qpack_max_table_capacity(0);
    hc.set_qpack_blocked_streams(0);
    hc.enable_extended_connect(true);
    hc.set_additional_settings(vec![(SETTINGS_H3_DATAGRAM_00, 1)])
        .map_err(|e| TransportError::Http(format!("failed to set HTTP/3 settings: {e}")))?;
    Ok(hc)
}

fn path_str(path: &std::path::Path) -> Result<&str, TransportError> {
    path.to_str()
        .ok_or_else(|| TransportError::Tls(format!("non-UTF-8 path: {}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tunnel::TlsSettings;

    #[test]
    fn test_response_status() {
        let headers = vec![quiche::h3::Header::new(b":status", b"200")];
        assert_eq!(response_status(&headers).unwrap(), 200);

        let headers = vec![quiche::h3::Header::new(b":status", b"401")];
        assert_eq!(response_status(&headers).unwrap(), 401);

        let headers = vec![quiche::h3::Header::new(b"server", b"gateway")];
        assert!(response_status(&headers).is_err());

        let headers = vec![quiche::h3::Header::new(b":status", b"abc")];
        assert!(response_status(&headers).is_err());
    }

    #[test]
    fn test_h3_config_builds() {
        // The legacy settings identifier must be accepted by quiche.
        assert!(build_h3_config().is_ok());
    }

    #[test]
    fn test_quic_config_requires_identity() {
        let config = TunnelConfig::new(
            "192.0.2.1:443".parse().unwrap(),
            TlsSettings::new("/nonexistent/cert.pem", "/nonexistent/key.pem"),
        );
        match build_quic_config(&config) {
            Err(err) => assert!(matches!(err, TransportError::Tls(_))),
            Ok(_) => panic!("expected build_quic_config to fail"),
        }
    }
}
