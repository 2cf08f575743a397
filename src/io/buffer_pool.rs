//! Pooled packet buffers
//!
//! Every forwarded packet lives in a buffer sized to the tunnel MTU. The
//! pool recycles those buffers between packets so the hot paths allocate
//! only on cold starts and bursts.
//!
//! The pool is a cache, not a semaphore: `get()` never blocks and the
//! number of resident buffers is unbounded. The one invariant it defends
//! is buffer shape: a buffer whose capacity no longer matches the pool's
//! buffer size (someone reshaped it) is silently discarded on return
//! rather than reinserted, and a buffer handed out by `get()` always has
//! length equal to the pool's buffer size.
//!
//! Buffers return to the pool automatically when the [`PooledBuffer`]
//! guard is dropped.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_queue::SegQueue;

/// Counters for pool behavior
#[derive(Debug, Default)]
pub struct PoolStats {
    /// New buffer allocations (pool was empty)
    allocations: AtomicU64,
    /// Buffers reused from the pool
    reuses: AtomicU64,
    /// Buffers returned to the pool
    returns: AtomicU64,
    /// Buffers rejected on return (capacity mismatch)
    rejected: AtomicU64,
}

impl PoolStats {
    /// Number of new allocations
    #[must_use]
    pub fn allocations(&self) -> u64 {
        self.allocations.load(Ordering::Relaxed)
    }

    /// Number of reuses
    #[must_use]
    pub fn reuses(&self) -> u64 {
        self.reuses.load(Ordering::Relaxed)
    }

    /// Number of returns
    #[must_use]
    pub fn returns(&self) -> u64 {
        self.returns.load(Ordering::Relaxed)
    }

    /// Number of rejected returns
    #[must_use]
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Snapshot all counters at once
    #[must_use]
    pub fn snapshot(&self) -> PoolStatsSnapshot {
        PoolStatsSnapshot {
            allocations: self.allocations(),
            reuses: self.reuses(),
            returns: self.returns(),
            rejected: self.rejected(),
        }
    }
}

/// Point-in-time copy of [`PoolStats`]
#[derive(Debug, Clone, Copy)]
pub struct PoolStatsSnapshot {
    /// New buffer allocations
    pub allocations: u64,
    /// Buffers reused from the pool
    pub reuses: u64,
    /// Buffers returned to the pool
    pub returns: u64,
    /// Buffers rejected on return
    pub rejected: u64,
}

/// Lock-free recycler of fixed-size packet buffers.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use masque_tunnel::io::PacketBufferPool;
///
/// let pool = Arc::new(PacketBufferPool::new(1500));
/// let buf = pool.get();
/// assert_eq!(buf.len(), 1500);
/// drop(buf); // returned to the pool
/// assert_eq!(pool.stats().returns(), 1);
/// ```
#[derive(Debug)]
pub struct PacketBufferPool {
    /// Idle buffers
    buffers: SegQueue<Vec<u8>>,
    /// Capacity of every buffer in the pool
    buffer_size: usize,
    /// Behavior counters
    stats: PoolStats,
}

impl PacketBufferPool {
    /// Create a pool of `buffer_size`-byte buffers.
    ///
    /// # Panics
    ///
    /// Panics if `buffer_size` is zero.
    #[must_use]
    pub fn new(buffer_size: usize) -> Self {
        assert!(buffer_size > 0, "buffer size must be greater than zero");
        Self {
            buffers: SegQueue::new(),
            buffer_size,
            stats: PoolStats::default(),
        }
    }

    /// Get a buffer with length = the pool's buffer size.
    ///
    /// Reuses an idle buffer when one is available, otherwise allocates.
    /// Reused buffers are not zeroed; the caller overwrites them with
    /// received data.
    #[must_use]
    pub fn get(self: &Arc<Self>) -> PooledBuffer {
        let buffer = if let Some(mut buf) = self.buffers.pop() {
            self.stats.reuses.fetch_add(1, Ordering::Relaxed);
            buf.resize(self.buffer_size, 0);
            buf
        } else {
            self.stats.allocations.fetch_add(1, Ordering::Relaxed);
            vec![0u8; self.buffer_size]
        };

        PooledBuffer {
            buffer: Some(buffer),
            pool: Arc::clone(self),
        }
    }

    /// Return a buffer. Buffers whose capacity differs from the pool's
    /// buffer size are dropped instead of reinserted.
    fn put(&self, mut buffer: Vec<u8>) {
        if buffer.capacity() != self.buffer_size {
            self.stats.rejected.fetch_add(1, Ordering::Relaxed);
            return;
        }
        buffer.clear();
        self.buffers.push(buffer);
        self.stats.returns.fetch_add(1, Ordering::Relaxed);
    }

    /// Capacity of every buffer handed out by this pool
    #[must_use]
    pub const fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Number of idle buffers currently resident
    #[must_use]
    pub fn idle(&self) -> usize {
        self.buffers.len()
    }

    /// Behavior counters
    #[must_use]
    pub fn stats(&self) -> &PoolStats {
        &self.stats
    }
}

/// A buffer borrowed from a [`PacketBufferPool`].
///
/// Dereferences to `[u8]` of length = the pool's buffer size. Returns to
/// the pool on drop.
#[derive(Debug)]
pub struct PooledBuffer {
    /// The buffer, taken on drop
    buffer: Option<Vec<u8>>,
    /// Owning pool
    pool: Arc<PacketBufferPool>,
}

impl PooledBuffer {
    /// Detach the buffer from the pool.
    #[must_use]
    pub fn into_vec(mut self) -> Vec<u8> {
        self.buffer.take().unwrap_or_default()
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(buf) = self.buffer.take() {
            self.pool.put(buf);
        }
    }
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.buffer.as_ref().map_or(&[], Vec::as_slice)
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.buffer.as_mut().map_or(&mut [], Vec::as_mut_slice)
    }
}

impl AsRef<[u8]> for PooledBuffer {
    fn as_ref(&self) -> &[u8] {
        self
    }
}

impl AsMut<[u8]> for PooledBuffer {
    fn as_mut(&mut self) -> &mut [u8] {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_allocates_then_reuses() {
        let pool = Arc::new(PacketBufferPool::new(1500));

        let buf = pool.get();
        assert_eq!(buf.len(), 1500);
        assert_eq!(pool.stats().allocations(), 1);
        drop(buf);
        assert_eq!(pool.stats().returns(), 1);
        assert_eq!(pool.idle(), 1);

        let _buf = pool.get();
        assert_eq!(pool.stats().allocations(), 1);
        assert_eq!(pool.stats().reuses(), 1);
        assert_eq!(pool.idle(), 0);
    }

    #[test]
    fn test_get_always_full_length() {
        let pool = Arc::new(PacketBufferPool::new(64));

        // Shrink the buffer's length (capacity intact) before returning.
        let buf = pool.get();
        let mut v = buf.into_vec();
        v.truncate(3);
        pool.put(v);
        assert_eq!(pool.idle(), 1);

        let buf = pool.get();
        assert_eq!(buf.len(), 64);
    }

    #[test]
    fn test_reshaped_buffer_is_rejected() {
        let pool = Arc::new(PacketBufferPool::new(64));

        // A buffer with foreign capacity never enters the pool.
        pool.put(Vec::with_capacity(128));
        assert_eq!(pool.idle(), 0);
        assert_eq!(pool.stats().rejected(), 1);

        pool.put(Vec::new());
        assert_eq!(pool.idle(), 0);
        assert_eq!(pool.stats().rejected(), 2);

        // Subsequent gets allocate fresh, correctly sized buffers.
        let buf = pool.get();
        assert_eq!(buf.len(), 64);
    }

    #[test]
    fn test_unbounded_residency() {
        let pool = Arc::new(PacketBufferPool::new(16));
        let buffers: Vec<_> = (0..256).map(|_| pool.get()).collect();
        drop(buffers);
        assert_eq!(pool.idle(), 256);
        assert_eq!(pool.stats().returns(), 256);
    }

    #[test]
    fn test_into_vec_skips_return() {
        let pool = Arc::new(PacketBufferPool::new(32));
        let v = pool.get().into_vec();
        assert_eq!(v.len(), 32);
        assert_eq!(pool.idle(), 0);
        assert_eq!(pool.stats().returns(), 0);
    }

    #[test]
    fn test_deref_mut_writes_visible() {
        let pool = Arc::new(PacketBufferPool::new(8));
        let mut buf = pool.get();
        buf[0] = 0xAB;
        buf[7] = 0xCD;
        assert_eq!(buf.as_ref()[0], 0xAB);
        assert_eq!(buf.as_ref()[7], 0xCD);
    }

    #[test]
    fn test_concurrent_get_put() {
        use std::thread;

        let pool = Arc::new(PacketBufferPool::new(256));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = Arc::clone(&pool);
                thread::spawn(move || {
                    for _ in 0..200 {
                        let mut buf = pool.get();
                        buf[0] = 1;
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let stats = pool.stats().snapshot();
        assert_eq!(stats.allocations + stats.reuses, 1600);
        assert_eq!(stats.rejected, 0);
    }

    #[test]
    #[should_panic(expected = "buffer size must be greater than zero")]
    fn test_zero_buffer_size_panics() {
        let _ = PacketBufferPool::new(0);
    }
}
