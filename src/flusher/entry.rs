//! Submission entries and batching hints.

use std::panic::{catch_unwind, AssertUnwindSafe};

use bytes::Bytes;
use tracing::debug;

use crate::buffer::BufferPool;
use crate::callback::WriteCallback;
use crate::error::Error;
use crate::protocol::Frame;

/// Batching hint attached to each submission.
///
/// When a drain slice is assembled the hints of its entries are combined
/// by dominance: `Off` beats `On` beats `Auto`. Any entry hinting `Off`
/// therefore forces the whole slice onto the gather-write path, as do the
/// flush sentinel, large frames, and aggregate-capacity exhaustion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BatchMode {
    /// Batch small frames, flush automatically once the queue drains.
    Auto,
    /// Prefer batching.
    On,
    /// Do not batch; write this frame's bytes directly.
    Off,
}

impl BatchMode {
    /// Combine two hints; the more flush-forcing one wins.
    #[inline]
    #[must_use]
    pub fn combine(self, other: BatchMode) -> BatchMode {
        self.max(other)
    }
}

/// A pending submission owned by the flush engine during a drain.
///
/// `frame == None` marks the flush sentinel: it forces its slice onto the
/// direct path, contributes no bytes, and exists only so its callback
/// fires once previously aggregated bytes have been written.
pub(crate) struct FrameEntry {
    pub(crate) frame: Option<Frame>,
    callback: Box<dyn WriteCallback>,
    pub(crate) batch: BatchMode,
    /// Pooled header buffer, set when the engine rendered this entry's
    /// header for a gather write. Returned to the pool after the callback.
    pub(crate) header: Option<Bytes>,
}

impl FrameEntry {
    pub(crate) fn new(frame: Frame, callback: Box<dyn WriteCallback>, batch: BatchMode) -> Self {
        Self {
            frame: Some(frame),
            callback,
            batch,
            header: None,
        }
    }

    pub(crate) fn sentinel(callback: Box<dyn WriteCallback>) -> Self {
        Self {
            frame: None,
            callback,
            batch: BatchMode::Off,
            header: None,
        }
    }

    #[inline]
    pub(crate) fn is_sentinel(&self) -> bool {
        self.frame.is_none()
    }

    #[inline]
    pub(crate) fn payload_len(&self) -> usize {
        self.frame.as_ref().map_or(0, |f| f.payload().len())
    }

    /// Complete the submission successfully and release its header buffer.
    pub(crate) fn succeed(self, pool: &BufferPool) {
        let FrameEntry {
            callback, header, ..
        } = self;
        if catch_unwind(AssertUnwindSafe(|| callback.succeeded())).is_err() {
            debug!("panic in write callback success notification");
        }
        if let Some(header) = header {
            pool.recycle(header);
        }
    }

    /// Fail the submission and release its header buffer.
    pub(crate) fn fail(self, error: Error, pool: &BufferPool) {
        let FrameEntry {
            callback, header, ..
        } = self;
        if catch_unwind(AssertUnwindSafe(|| callback.failed(error))).is_err() {
            debug!("panic in write callback failure notification");
        }
        if let Some(header) = header {
            pool.recycle(header);
        }
    }
}

impl std::fmt::Debug for FrameEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameEntry")
            .field("frame", &self.frame)
            .field("batch", &self.batch)
            .field("header", &self.header.as_ref().map(Bytes::len))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::NoopCallback;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_batch_mode_combine_off_dominates() {
        assert_eq!(BatchMode::Auto.combine(BatchMode::Off), BatchMode::Off);
        assert_eq!(BatchMode::Off.combine(BatchMode::Auto), BatchMode::Off);
        assert_eq!(BatchMode::On.combine(BatchMode::Off), BatchMode::Off);
        assert_eq!(BatchMode::Auto.combine(BatchMode::On), BatchMode::On);
        assert_eq!(BatchMode::Auto.combine(BatchMode::Auto), BatchMode::Auto);
    }

    #[test]
    fn test_sentinel_entry() {
        let entry = FrameEntry::sentinel(Box::new(NoopCallback));
        assert!(entry.is_sentinel());
        assert_eq!(entry.payload_len(), 0);
        assert_eq!(entry.batch, BatchMode::Off);
    }

    #[test]
    fn test_entry_succeed_invokes_callback_once() {
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = hits.clone();
        let entry = FrameEntry::new(
            Frame::text("x"),
            Box::new(move |_result: crate::Result<()>| {
                hits2.fetch_add(1, Ordering::SeqCst);
            }),
            BatchMode::Auto,
        );
        entry.succeed(&BufferPool::new());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_callback_is_contained() {
        let entry = FrameEntry::new(
            Frame::text("x"),
            Box::new(|_result: crate::Result<()>| panic!("user callback bug")),
            BatchMode::Auto,
        );
        // Must not propagate the panic.
        entry.succeed(&BufferPool::new());
    }

    #[test]
    fn test_fail_releases_header() {
        let pool = BufferPool::new();
        let mut entry = FrameEntry::new(Frame::text("x"), Box::new(NoopCallback), BatchMode::Off);
        let mut header = pool.acquire(14).unwrap();
        header.extend_from_slice(&[0x81, 0x01]);
        entry.header = Some(header.freeze());
        entry.fail(Error::Closed, &pool);
        assert_eq!(pool.idle(), 1);
    }
}
