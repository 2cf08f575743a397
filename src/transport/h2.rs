//! HTTP/2 CONNECT-IP fallback transport
//!
//! When HTTP/3 is refused or unreachable, the gateway accepts a
//! long-lived HTTP/2 CONNECT with a streaming body. Both directions
//! share the CONNECT stream: each IP packet travels as a varint-framed
//! record (context ID, length, packet), and the receive side reassembles
//! records across arbitrary DATA frame boundaries.
//!
//! The extended CONNECT `:protocol` of the HTTP/3 path is folded into
//! the ordinary `cf-connect-proto` header here.

use std::future::poll_fn;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use h2::client::{self, SendRequest};
use h2::{Error as H2Error, RecvStream, SendStream};
use http::{Method, Request, StatusCode, Uri};
use rustls::pki_types::ServerName;
use socket2::{SockRef, TcpKeepalive};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::framing::{self, RecordDecoder};
use super::{
    tls, IpTransport, TransportError, WriteOutcome, CLIENT_VERSION, CONNECT_PROTOCOL,
    CONTEXT_ID_IP, PROTOCOL_HEADER, VERSION_HEADER,
};
use crate::packet::{self, icmp, Verdict};
use crate::tunnel::TunnelConfig;

/// TCP dial timeout
const DIAL_TIMEOUT: Duration = Duration::from_secs(30);

/// Receive-side state: the response body and the record reassembler
struct ReadHalf {
    body: RecvStream,
    decoder: RecordDecoder,
}

/// Send-side state: the request body stream and the framing scratch
struct WriteHalf {
    stream: SendStream<Bytes>,
    scratch: Vec<u8>,
}

/// CONNECT-IP over a streaming HTTP/2 CONNECT body.
pub struct Http2Transport {
    reader: Mutex<ReadHalf>,
    writer: Mutex<WriteHalf>,
    cancel: CancellationToken,
    closed: AtomicBool,
    driver: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl Http2Transport {
    /// Establish the HTTP/2 tunnel described by `config`.
    ///
    /// Dials TCP with a 30 s timeout and the configured keep-alive
    /// period, starts TLS with the client certificate, then issues a
    /// CONNECT request with a streaming body.
    ///
    /// # Errors
    ///
    /// - [`TransportError::Unsupported`] when certificate verification
    ///   fails (the server has no chain this transport can use);
    /// - [`TransportError::LoginDenied`] on a TLS `access denied` alert;
    /// - [`TransportError::Closed`] when `cancel` fires first;
    /// - connection, timeout and HTTP errors otherwise.
    pub async fn connect(
        config: &TunnelConfig,
        cancel: &CancellationToken,
    ) -> Result<Self, TransportError> {
        let endpoint = config.endpoint;

        let tcp = timeout(DIAL_TIMEOUT, TcpStream::connect(endpoint))
            .await
            .map_err(|_| {
                TransportError::timeout(
                    format!("TCP dial to {endpoint}"),
                    DIAL_TIMEOUT.as_millis() as u64,
                )
            })?
            .map_err(|e| TransportError::connection_failed(endpoint.to_string(), e.to_string()))?;

        configure_keepalive(&tcp, config.quic.keep_alive())?;

        let tls_config = tls::build_client_config(&config.tls, &["h2"])?;
        let server_name = ServerName::try_from(config.tls.server_name.clone())
            .map_err(|e| TransportError::Tls(format!("invalid server name: {e}")))?;

        let connector = TlsConnector::from(tls_config);
        let tls_stream = connector
            .connect(server_name, tcp)
            .await
            .map_err(|e| map_tls_error(&e, &config.tls.server_name))?;

        let (send_request, connection) = client::handshake(tls_stream)
            .await
            .map_err(|e| TransportError::Http(format!("HTTP/2 handshake failed: {e}")))?;

        let driver = tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!(error = %e, "HTTP/2 connection terminated");
            }
        });

        match Self::open_tunnel(config, send_request, cancel).await {
            Ok((response_body, request_body)) => {
                info!(endpoint = %endpoint, "HTTP/2 CONNECT-IP tunnel established");
                Ok(Self {
                    reader: Mutex::new(ReadHalf {
                        body: response_body,
                        decoder: RecordDecoder::new(config.mtu.max(packet::IPV6_HEADER_LEN)),
                    }),
                    writer: Mutex::new(WriteHalf {
                        stream: request_body,
                        scratch: Vec::new(),
                    }),
                    cancel: cancel.child_token(),
                    closed: AtomicBool::new(false),
                    driver: parking_lot::Mutex::new(Some(driver)),
                })
            }
            Err(e) => {
                driver.abort();
                Err(e)
            }
        }
    }

    /// Send the CONNECT request and wait for a 200.
    async fn open_tunnel(
        config: &TunnelConfig,
        mut send_request: SendRequest<Bytes>,
        cancel: &CancellationToken,
    ) -> Result<(RecvStream, SendStream<Bytes>), TransportError> {
        let url = config
            .connect_url()
            .map_err(|e| TransportError::Http(e.to_string()))?;
        let host = url
            .host_str()
            .ok_or_else(|| TransportError::Http("connect URL has no host".into()))?;

        // CONNECT uses an authority-form URI: no scheme, no path.
        let mut parts = http::uri::Parts::default();
        parts.authority = Some(
            http::uri::Authority::try_from(host)
                .map_err(|e| TransportError::Http(format!("invalid authority {host}: {e}")))?,
        );
        let uri = Uri::from_parts(parts)
            .map_err(|e| TransportError::Http(format!("invalid CONNECT URI: {e}")))?;

        let request = Request::builder()
            .method(Method::CONNECT)
            .uri(uri)
            .header(http::header::USER_AGENT, "")
            .header(VERSION_HEADER, CLIENT_VERSION)
            .header(PROTOCOL_HEADER, CONNECT_PROTOCOL)
            .body(())
            .map_err(|e| TransportError::Http(format!("failed to build request: {e}")))?;

        let send_request_ready = poll_fn(|cx| send_request.poll_ready(cx));
        tokio::select! {
            ready = send_request_ready => {
                ready.map_err(|e| map_request_error(&e))?;
            }
            () = cancel.cancelled() => return Err(TransportError::closed("cancelled")),
        }

        let (response, request_body) = send_request
            .send_request(request, false)
            .map_err(|e| map_request_error(&e))?;

        let response = tokio::select! {
            response = response => response.map_err(|e| map_request_error(&e))?,
            () = cancel.cancelled() => return Err(TransportError::closed("cancelled")),
        };

        if response.status() != StatusCode::OK {
            return Err(TransportError::Http(format!(
                "server responded with status {}",
                response.status()
            )));
        }

        Ok((response.into_body(), request_body))
    }
}

#[async_trait]
impl IpTransport for Http2Transport {
    async fn read_packet(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let mut reader = self.reader.lock().await;
        loop {
            match reader.decoder.next() {
                Ok(Some(record)) => {
                    if record.context_id == CONTEXT_ID_IP {
                        let n = record.payload.len().min(buf.len());
                        buf[..n].copy_from_slice(&record.payload[..n]);
                        return Ok(n);
                    }
                    debug!(
                        context_id = record.context_id,
                        len = record.payload.len(),
                        "skipping record with foreign context"
                    );
                    continue;
                }
                // A record the decoder cannot consume desynchronizes the
                // whole stream; the session has to be rebuilt.
                Err(e) => return Err(TransportError::closed(e.to_string())),
                Ok(None) => {}
            }

            let chunk = tokio::select! {
                () = self.cancel.cancelled() => {
                    return Err(TransportError::closed("session cancelled"));
                }
                data = reader.body.data() => match data {
                    None => return Err(TransportError::closed("CONNECT stream ended")),
                    Some(Err(e)) => {
                        if self.cancel.is_cancelled() {
                            return Err(TransportError::closed("session cancelled"));
                        }
                        return Err(TransportError::closed(format!("stream error: {e}")));
                    }
                    Some(Ok(chunk)) => chunk,
                },
            };
            let _ = reader.body.flow_control().release_capacity(chunk.len());
            reader.decoder.push(&chunk);
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

        if self.cancel.is_cancelled() {
            return Err(TransportError::closed("session cancelled"));
        }

        let mut writer = self.writer.lock().await;
        let WriteHalf { stream, scratch } = &mut *writer;

        scratch.clear();
        framing::encode_record(CONTEXT_ID_IP, packet, scratch);
        let mut frame = Bytes::copy_from_slice(scratch);

        while !frame.is_empty() {
            stream.reserve_capacity(frame.len());
            let capacity = tokio::select! {
                () = self.cancel.cancelled() => {
                    return Err(TransportError::closed("session cancelled"));
                }
                capacity = poll_fn(|cx| stream.poll_capacity(cx)) => match capacity {
                    None => return Err(TransportError::closed("CONNECT stream closed")),
                    Some(Err(e)) => {
                        return Err(TransportError::closed(format!("stream error: {e}")));
                    }
                    Some(Ok(capacity)) => capacity,
                },
            };
            if capacity == 0 {
                continue;
            }
            let chunk = frame.split_to(capacity.min(frame.len()));
            stream
                .send_data(chunk, false)
                .map_err(|e| TransportError::closed(format!("stream error: {e}")))?;
        }

        Ok(WriteOutcome::Sent)
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cancel.cancel();
        {
            // FIN the request body; the peer sees an orderly end of stream.
            let mut writer = self.writer.lock().await;
            let _ = writer.stream.send_data(Bytes::new(), true);
        }
        if let Some(driver) = self.driver.lock().take() {
            driver.abort();
        }
        debug!("HTTP/2 tunnel closed");
    }
}

/// Apply the configured keep-alive period to the dialed socket.
fn configure_keepalive(stream: &TcpStream, period: Duration) -> Result<(), TransportError> {
    let keepalive = TcpKeepalive::new().with_time(period).with_interval(period);
    SockRef::from(stream)
        .set_tcp_keepalive(&keepalive)
        .map_err(|e| {
            TransportError::connection_failed("keep-alive setup", e.to_string())
        })
}

/// Classify a TLS connect failure. Certificate-verification failures mean
/// the server cannot speak this transport; an `access denied` alert means
/// the client certificate was rejected.
fn map_tls_error(error: &std::io::Error, server_name: &str) -> TransportError {
    if let Some(inner) = error.get_ref() {
        if let Some(tls_error) = inner.downcast_ref::<rustls::Error>() {
            match tls_error {
                rustls::Error::InvalidCertificate(_) => {
                    return TransportError::unsupported(format!(
                        "HTTP/2 tunnel not supported on this server: {tls_error}"
                    ));
                }
                rustls::Error::AlertReceived(rustls::AlertDescription::AccessDenied) => {
                    return TransportError::LoginDenied;
                }
                _ => {}
            }
        }
    }
    TransportError::Tls(format!("TLS handshake with {server_name} failed: {error}"))
}

/// Classify a failed CONNECT round trip. The gateway rejects an
/// unenrolled client certificate with a TLS `access denied` alert, which
/// surfaces here through the connection error.
fn map_request_error(error: &H2Error) -> TransportError {
    let message = error.to_string();
    if message.contains("access denied") || message.contains("AccessDenied") {
        return TransportError::LoginDenied;
    }
    TransportError::Http(format!("CONNECT request failed: {message}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tls_access_denied_maps_to_login_denied() {
        let rustls_error =
            rustls::Error::AlertReceived(rustls::AlertDescription::AccessDenied);
        let io_error = std::io::Error::new(std::io::ErrorKind::InvalidData, rustls_error);
        assert!(matches!(
            map_tls_error(&io_error, "gateway"),
            TransportError::LoginDenied
        ));
    }

    #[test]
    fn test_tls_invalid_certificate_maps_to_unsupported() {
        let rustls_error =
            rustls::Error::InvalidCertificate(rustls::CertificateError::UnknownIssuer);
        let io_error = std::io::Error::new(std::io::ErrorKind::InvalidData, rustls_error);
        let mapped = map_tls_error(&io_error, "gateway");
        assert!(matches!(mapped, TransportError::Unsupported(_)));
        assert!(mapped.to_string().contains("not supported"));
    }

    #[test]
    fn test_other_tls_errors_stay_tls() {
        let io_error = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert!(matches!(
            map_tls_error(&io_error, "gateway"),
            TransportError::Tls(_)
        ));
    }
}
