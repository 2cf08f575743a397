//! TUN-side device abstraction
//!
//! The tunnel core does not create or configure TUN interfaces; it only
//! moves packets through one. [`TunnelDevice`] is the narrow seam: one IP
//! packet per read, one per write, and a close. The same maintenance code
//! then works over a native TUN, a user-space netstack, or a test pipe.
//!
//! Reads and writes are safe to issue concurrently from one reader task
//! and one writer task; two concurrent readers are not supported.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

/// Device errors, classified by whether the device is gone.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The device was closed or detached. Forwarding cannot continue and
    /// reconnecting the gateway would be pointless.
    #[error("device closed")]
    Closed,

    /// Any other I/O failure
    #[error("device I/O error: {0}")]
    Io(#[from] io::Error),
}

impl DeviceError {
    /// True when the device is gone for good
    #[must_use]
    pub fn is_closed(&self) -> bool {
        match self {
            Self::Closed => true,
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::BrokenPipe
                    | io::ErrorKind::NotConnected
                    | io::ErrorKind::UnexpectedEof
            ),
        }
    }
}

/// An L3 device carrying raw IP packets.
#[async_trait]
pub trait TunnelDevice: Send + Sync {
    /// Read exactly one IP packet into `buf`, returning its length.
    ///
    /// # Errors
    ///
    /// [`DeviceError::Closed`] once the device is detached; I/O errors
    /// otherwise.
    async fn read_packet(&self, buf: &mut [u8]) -> Result<usize, DeviceError>;

    /// Write exactly one IP packet.
    ///
    /// # Errors
    ///
    /// [`DeviceError::Closed`] once the device is detached; I/O errors
    /// otherwise.
    async fn write_packet(&self, packet: &[u8]) -> Result<(), DeviceError>;

    /// Close the device.
    ///
    /// # Errors
    ///
    /// I/O errors from the underlying handle.
    async fn close(&self) -> Result<(), DeviceError>;
}

/// [`TunnelDevice`] over any `AsyncRead` + `AsyncWrite` pair.
///
/// The two halves are locked independently, so the reader task and the
/// writer task never contend. Each underlying read must yield one whole
/// IP packet, which holds for TUN file descriptors and datagram-like pipes.
#[derive(Debug)]
pub struct StreamDevice<R, W> {
    reader: Mutex<R>,
    writer: Mutex<W>,
    closed: AtomicBool,
}

impl<R, W> StreamDevice<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// Wrap a read half and a write half.
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl<R, W> TunnelDevice for StreamDevice<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn read_packet(&self, buf: &mut [u8]) -> Result<usize, DeviceError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DeviceError::Closed);
        }
        let n = self.reader.lock().await.read(buf).await?;
        if n == 0 {
            self.closed.store(true, Ordering::Release);
            return Err(DeviceError::Closed);
        }
        Ok(n)
    }

    async fn write_packet(&self, packet: &[u8]) -> Result<(), DeviceError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DeviceError::Closed);
        }
        let mut writer = self.writer.lock().await;
        writer.write_all(packet).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), DeviceError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.writer.lock().await.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_write_round_trip() {
        let (local, mut remote) = tokio::io::duplex(4096);
        let (read_half, write_half) = tokio::io::split(local);
        let device = StreamDevice::new(read_half, write_half);

        device.write_packet(&[0x45, 1, 2, 3]).await.unwrap();
        let mut buf = [0u8; 16];
        let n = remote.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], &[0x45, 1, 2, 3]);

        remote.write_all(&[0x60, 9]).await.unwrap();
        let n = device.read_packet(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], &[0x60, 9]);
    }

    #[tokio::test]
    async fn test_peer_hangup_reads_closed() {
        let (local, remote) = tokio::io::duplex(64);
        let (read_half, write_half) = tokio::io::split(local);
        let device = StreamDevice::new(read_half, write_half);

        drop(remote);
        let mut buf = [0u8; 16];
        let err = device.read_packet(&mut buf).await.unwrap_err();
        assert!(err.is_closed());

        // The classification is sticky.
        let err = device.read_packet(&mut buf).await.unwrap_err();
        assert!(matches!(err, DeviceError::Closed));
        let err = device.write_packet(&[1]).await.unwrap_err();
        assert!(matches!(err, DeviceError::Closed));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (local, _remote) = tokio::io::duplex(64);
        let (read_half, write_half) = tokio::io::split(local);
        let device = StreamDevice::new(read_half, write_half);

        device.close().await.unwrap();
        device.close().await.unwrap();

        let mut buf = [0u8; 4];
        assert!(matches!(
            device.read_packet(&mut buf).await,
            Err(DeviceError::Closed)
        ));
    }

    #[test]
    fn test_io_error_classification() {
        let err = DeviceError::Io(io::Error::new(io::ErrorKind::BrokenPipe, "gone"));
        assert!(err.is_closed());
        let err = DeviceError::Io(io::Error::new(io::ErrorKind::TimedOut, "slow"));
        assert!(!err.is_closed());
    }
}
