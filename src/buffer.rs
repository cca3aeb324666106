//! Reusable buffer pool for aggregates and header buffers.

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;

use crate::error::{Error, Result};

/// Default cap on a single acquisition, 16 MB.
const DEFAULT_MAX_BUFFER_SIZE: usize = 16 * 1024 * 1024;

/// Default number of idle buffers retained.
const DEFAULT_MAX_POOLED: usize = 32;

/// A free list of [`BytesMut`] buffers shared between the flush engine and
/// the header generator.
///
/// `acquire` hands out a cleared buffer of at least the requested capacity,
/// reusing a pooled one when a large enough buffer is idle. Buffers come
/// back either directly via [`release`](Self::release) or through
/// [`recycle`](Self::recycle) once a frozen buffer's last reader (the
/// transport) has dropped its reference.
pub struct BufferPool {
    free: Mutex<Vec<BytesMut>>,
    max_pooled: usize,
    max_buffer_size: usize,
}

impl BufferPool {
    /// Create a pool with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_POOLED, DEFAULT_MAX_BUFFER_SIZE)
    }

    /// Create a pool retaining at most `max_pooled` idle buffers and
    /// refusing acquisitions larger than `max_buffer_size`.
    #[must_use]
    pub fn with_limits(max_pooled: usize, max_buffer_size: usize) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            max_pooled,
            max_buffer_size,
        }
    }

    /// Acquire a cleared buffer with at least `capacity` bytes of room.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PoolExhausted`] when `capacity` exceeds the pool's
    /// configured maximum buffer size.
    pub fn acquire(&self, capacity: usize) -> Result<BytesMut> {
        if capacity > self.max_buffer_size {
            return Err(Error::PoolExhausted {
                requested: capacity,
                max: self.max_buffer_size,
            });
        }

        let mut free = self.free.lock();
        if let Some(pos) = free.iter().position(|buf| buf.capacity() >= capacity) {
            return Ok(free.swap_remove(pos));
        }
        drop(free);

        Ok(BytesMut::with_capacity(capacity))
    }

    /// Return a buffer to the pool.
    ///
    /// The buffer is cleared; its contents are gone. Buffers beyond the
    /// retention limit are dropped.
    pub fn release(&self, mut buf: BytesMut) {
        buf.clear();
        let mut free = self.free.lock();
        if free.len() < self.max_pooled {
            free.push(buf);
        }
    }

    /// Attempt to reclaim a frozen buffer.
    ///
    /// Succeeds only when `bytes` is the last reference to its storage;
    /// otherwise the storage is simply dropped and the pool takes a miss.
    pub fn recycle(&self, bytes: Bytes) {
        if let Ok(buf) = bytes.try_into_mut() {
            self.release(buf);
        }
    }

    /// Number of idle buffers currently retained.
    #[must_use]
    pub fn idle(&self) -> usize {
        self.free.lock().len()
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("idle", &self.idle())
            .field("max_pooled", &self.max_pooled)
            .field("max_buffer_size", &self.max_buffer_size)
            .finish()
    }
}
