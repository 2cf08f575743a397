//! Tunnel supervision
//!
//! [`maintain_tunnel`] is the control spine: it establishes a gateway
//! connection (HTTP/3 preferred, HTTP/2 fallback), pumps packets between
//! the TUN device and the transport until either direction fails, then
//! closes the session and reconnects after the configured delay.
//!
//! Two failure severities exist. A *session error* (either peer closed
//! the transport, or a directional task died) tears down the current
//! session and triggers a reconnect. A *device closure* means the TUN was
//! detached; reconnecting is pointless, so the supervisor returns
//! [`TunnelExit::DeviceClosed`] and lets the caller decide what dying
//! looks like. Cancellation always wins: when the token fires the
//! transport is closed and the supervisor returns.

pub mod config;

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use config::{
    ConfigError, QuicSettings, TlsSettings, TunnelConfig, CONNECT_SNI, CONNECT_URI, DEFAULT_MTU,
};

use crate::device::TunnelDevice;
use crate::io::PacketBufferPool;
use crate::transport::{Http2Transport, Http3Transport, IpTransport, WriteOutcome};

/// Why the supervisor returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelExit {
    /// The caller's cancellation token fired
    Cancelled,

    /// The TUN device was closed or detached
    DeviceClosed,
}

/// Why one pump session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The cancellation token fired
    Cancelled,

    /// A directional task failed; the session should be rebuilt
    SessionError,

    /// The TUN device is gone
    DeviceClosed,
}

/// Keep a tunnel session alive until the device disappears or the caller
/// cancels.
///
/// Repeats: connect (HTTP/3 first if enabled, then HTTP/2), pump until a
/// directional failure, close, sleep `reconnect_delay`, again. Connect
/// failures of both transports also sleep the reconnect delay before the
/// next round.
///
/// # Errors
///
/// Returns a [`ConfigError`] without attempting a connection when the
/// configuration is unusable. After that, the only ways out are
/// [`TunnelExit::Cancelled`] and [`TunnelExit::DeviceClosed`].
pub async fn maintain_tunnel(
    config: &TunnelConfig,
    device: Arc<dyn TunnelDevice>,
    cancel: CancellationToken,
) -> Result<TunnelExit, ConfigError> {
    config.validate()?;

    let pool = Arc::new(PacketBufferPool::new(config.mtu));

    loop {
        if cancel.is_cancelled() {
            return Ok(TunnelExit::Cancelled);
        }

        info!(endpoint = %config.endpoint, "establishing MASQUE connection");

        let transport = connect_any(config, &cancel).await;
        if cancel.is_cancelled() {
            if let Some(transport) = transport {
                transport.close().await;
            }
            return Ok(TunnelExit::Cancelled);
        }

        let Some(transport) = transport else {
            if !sleep_or_cancel(config, &cancel).await {
                return Ok(TunnelExit::Cancelled);
            }
            continue;
        };

        info!("connected to MASQUE gateway");

        match run_session(transport, Arc::clone(&device), Arc::clone(&pool), &cancel).await {
            SessionEnd::Cancelled => return Ok(TunnelExit::Cancelled),
            SessionEnd::DeviceClosed => return Ok(TunnelExit::DeviceClosed),
            SessionEnd::SessionError => {
                if !sleep_or_cancel(config, &cancel).await {
                    return Ok(TunnelExit::Cancelled);
                }
            }
        }
    }
}

/// Try the enabled transports in preference order.
async fn connect_any(
    config: &TunnelConfig,
    cancel: &CancellationToken,
) -> Option<Arc<dyn IpTransport>> {
    if config.http3 {
        match Http3Transport::connect(config, cancel).await {
            Ok(transport) => return Some(Arc::new(transport)),
            Err(e) => {
                if cancel.is_cancelled() {
                    return None;
                }
                warn!(error = %e, "failed to connect HTTP/3 tunnel");
            }
        }
    }
    if config.http2 {
        match Http2Transport::connect(config, cancel).await {
            Ok(transport) => return Some(Arc::new(transport)),
            Err(e) => {
                if cancel.is_cancelled() {
                    return None;
                }
                warn!(error = %e, "failed to connect HTTP/2 tunnel");
            }
        }
    }
    None
}

/// Sleep the reconnect delay. Returns false when cancellation fired.
async fn sleep_or_cancel(config: &TunnelConfig, cancel: &CancellationToken) -> bool {
    tokio::select! {
        () = cancel.cancelled() => false,
        () = tokio::time::sleep(config.reconnect_delay()) => true,
    }
}

/// Pump one session: spawn the egress (device → transport) and ingress
/// (transport → device) tasks and wait for the first failure, device
/// loss, or cancellation. Closes the transport before returning.
pub async fn run_session(
    transport: Arc<dyn IpTransport>,
    device: Arc<dyn TunnelDevice>,
    pool: Arc<PacketBufferPool>,
    cancel: &CancellationToken,
) -> SessionEnd {
    // Two severities, two channels: session errors trigger a reconnect,
    // device closures end the supervisor.
    let (error_tx, mut error_rx) = mpsc::channel::<String>(2);
    let (device_gone_tx, mut device_gone_rx) = mpsc::channel::<String>(2);

    let egress = spawn_egress(
        Arc::clone(&transport),
        Arc::clone(&device),
        Arc::clone(&pool),
        error_tx.clone(),
        device_gone_tx.clone(),
    );
    let ingress = spawn_ingress(Arc::clone(&transport), device, pool, error_tx, device_gone_tx);

    let end = tokio::select! {
        () = cancel.cancelled() => {
            info!("closing tunnel session");
            SessionEnd::Cancelled
        }
        Some(reason) = error_rx.recv() => {
            warn!(%reason, "tunnel session lost, reconnecting");
            SessionEnd::SessionError
        }
        Some(reason) = device_gone_rx.recv() => {
            info!(%reason, "tunnel device closed");
            SessionEnd::DeviceClosed
        }
    };

    transport.close().await;
    egress.abort();
    ingress.abort();
    end
}

/// Device → transport. Each packet borrows a pooled buffer and returns
/// it before the next read; synthesized ICMP replies are written back
/// into the device.
fn spawn_egress(
    transport: Arc<dyn IpTransport>,
    device: Arc<dyn TunnelDevice>,
    pool: Arc<PacketBufferPool>,
    error_tx: mpsc::Sender<String>,
    device_gone_tx: mpsc::Sender<String>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let mut buf = pool.get();
            let n = match device.read_packet(&mut buf).await {
                Ok(n) => n,
                Err(e) if e.is_closed() => {
                    let _ = device_gone_tx
                        .try_send(format!("device closed while reading: {e}"));
                    return;
                }
                Err(e) => {
                    let _ = error_tx.try_send(format!("failed to read from device: {e}"));
                    return;
                }
            };

            let reply = match transport.write_packet(&buf[..n]).await {
                Ok(WriteOutcome::Sent) => None,
                Ok(WriteOutcome::Reply(reply)) => Some(reply),
                Err(e) if e.is_closed() => {
                    let _ = error_tx
                        .try_send(format!("connection closed while writing: {e}"));
                    return;
                }
                Err(e) => {
                    debug!(error = %e, "failed to write packet, continuing");
                    continue;
                }
            };
            drop(buf);

            if let Some(reply) = reply {
                match device.write_packet(&reply).await {
                    Ok(()) => {}
                    Err(e) if e.is_closed() => {
                        let _ = device_gone_tx
                            .try_send(format!("device closed while writing ICMP: {e}"));
                        return;
                    }
                    Err(e) => {
                        debug!(error = %e, "failed to write ICMP reply, continuing");
                    }
                }
            }
        }
    })
}

/// Transport → device. The task is serial, so one long-lived pooled
/// buffer is enough; it returns to the pool when the task ends.
fn spawn_ingress(
    transport: Arc<dyn IpTransport>,
    device: Arc<dyn TunnelDevice>,
    pool: Arc<PacketBufferPool>,
    error_tx: mpsc::Sender<String>,
    device_gone_tx: mpsc::Sender<String>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buf = pool.get();
        loop {
            let n = match transport.read_packet(&mut buf).await {
                Ok(n) => n,
                Err(e) if e.is_closed() => {
                    let _ = error_tx
                        .try_send(format!("connection closed while reading: {e}"));
                    return;
                }
                Err(e) => {
                    debug!(error = %e, "failed to read packet, continuing");
                    continue;
                }
            };

            match device.write_packet(&buf[..n]).await {
                Ok(()) => {}
                Err(e) if e.is_closed() => {
                    let _ = device_gone_tx
                        .try_send(format!("device closed while writing: {e}"));
                    return;
                }
                Err(e) => {
                    let _ = error_tx.try_send(format!("failed to write to device: {e}"));
                    return;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceError;
    use async_trait::async_trait;
    use std::time::Duration;

    /// A device that never yields packets and never fails.
    struct NullDevice;

    #[async_trait]
    impl TunnelDevice for NullDevice {
        async fn read_packet(&self, _buf: &mut [u8]) -> Result<usize, DeviceError> {
            std::future::pending().await
        }

        async fn write_packet(&self, _packet: &[u8]) -> Result<(), DeviceError> {
            Ok(())
        }

        async fn close(&self) -> Result<(), DeviceError> {
            Ok(())
        }
    }

    fn invalid_config() -> TunnelConfig {
        TunnelConfig::new(
            "192.0.2.1:443".parse().unwrap(),
            TlsSettings::new("/tmp/cert.pem", "/tmp/key.pem"),
        )
        .with_transports(false, false)
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected_before_connecting() {
        let result = maintain_tunnel(
            &invalid_config(),
            Arc::new(NullDevice),
            CancellationToken::new(),
        )
        .await;
        assert_eq!(result.unwrap_err(), ConfigError::NoTransportEnabled);
    }

    #[tokio::test]
    async fn test_pre_cancelled_token_returns_immediately() {
        let config = TunnelConfig::new(
            "192.0.2.1:443".parse().unwrap(),
            TlsSettings::new("/tmp/cert.pem", "/tmp/key.pem"),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        let exit = tokio::time::timeout(
            Duration::from_secs(1),
            maintain_tunnel(&config, Arc::new(NullDevice), cancel),
        )
        .await
        .expect("supervisor did not honor cancellation")
        .unwrap();
        assert_eq!(exit, TunnelExit::Cancelled);
    }

    #[tokio::test]
    async fn test_sleep_or_cancel_prefers_cancellation() {
        let config = TunnelConfig::new(
            "192.0.2.1:443".parse().unwrap(),
            TlsSettings::new("/tmp/cert.pem", "/tmp/key.pem"),
        )
        .with_reconnect_delay(Duration::from_secs(3600));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let woke = tokio::time::timeout(
            Duration::from_secs(1),
            sleep_or_cancel(&config, &cancel),
        )
        .await
        .expect("sleep ignored cancellation");
        assert!(!woke);
    }
}
