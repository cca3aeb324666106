//! Outbound frame flusher: the single-writer, batching serializer between
//! frame submitters and a gather-write transport.
//!
//! Any number of threads may [`submit`](FrameFlusher::submit) frames
//! concurrently. Exactly one logical writer drains the queue, coalesces
//! small frames into a pooled aggregate buffer or gather-writes large
//! ones, and completes each submission's callback exactly once — success,
//! failure, or cancellation on close.
//!
//! Ordering: frames complete in acceptance order, except PING frames,
//! which jump to the head of the queue (ping latency matters more than
//! ordering against data frames, and pings are self-contained).

mod engine;
mod entry;

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::callback::WriteCallback;
use crate::config::FlusherConfig;
use crate::error::Error;
use crate::generator::Generator;
use crate::protocol::{Frame, OpCode};
use crate::transport::Transport;

use engine::{Engine, FlushWork, Shared, SubmitQueue};
use entry::FrameEntry;

pub use entry::BatchMode;

/// Serializes outgoing frames onto a byte-oriented transport.
///
/// Cloning is cheap and yields a handle to the same flusher.
pub struct FrameFlusher<T: Transport> {
    shared: Arc<Shared<T>>,
}

impl<T: Transport> FrameFlusher<T> {
    /// Create a flusher over `transport`, rendering headers with
    /// `generator`.
    #[must_use]
    pub fn new(generator: Generator, transport: T, config: FlusherConfig) -> Self {
        let shared = Arc::new_cyclic(|this| Shared {
            generator,
            transport,
            buffer_size: config.buffer_size,
            max_gather: config.max_gather.max(1),
            max_queue: config.max_queue,
            queue: Mutex::new(SubmitQueue::new()),
            engine: Mutex::new(Engine::new()),
            work: Mutex::new(FlushWork::new()),
            this: this.clone(),
        });
        Self { shared }
    }

    /// Submit a frame for writing. Non-blocking: either the frame is
    /// enqueued and the engine kicked, or `callback` fails synchronously.
    ///
    /// The payload's storage is held (by reference count) until the
    /// callback fires. PING frames are enqueued at the head of the queue;
    /// a CLOSE frame closes the flusher to further submissions.
    pub fn submit<C: WriteCallback>(&self, frame: Frame, callback: C, batch: BatchMode) {
        self.shared
            .submit_entry(FrameEntry::new(frame, Box::new(callback), batch));
    }

    /// Force any aggregated bytes onto the transport.
    ///
    /// Enqueues a sentinel submission that produces no bytes of its own;
    /// `callback` completes once everything batched before it has been
    /// written.
    pub fn flush<C: WriteCallback>(&self, callback: C) {
        self.shared
            .submit_entry(FrameEntry::sentinel(Box::new(callback)));
    }

    /// Close the flusher. Idempotent.
    ///
    /// Every queued submission fails with [`Error::Closed`], the engine is
    /// failed with the same error, and all subsequent submissions fail
    /// synchronously. If a transport write is in flight, its completion
    /// racing the close decides whether that slice reports success or
    /// end-of-stream.
    pub fn close(&self) {
        self.shared.close();
    }

    /// Whether the flusher has been closed (locally or by a submitted
    /// CLOSE frame).
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.queue.lock().closed
    }
}

impl<T: Transport> Clone for FrameFlusher<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Transport> std::fmt::Debug for FrameFlusher<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let work = self.shared.work.lock();
        let aggregate_size = work.aggregate.as_ref().map_or(0, |agg| agg.len());
        drop(work);
        let queue = self.shared.queue.lock();
        f.debug_struct("FrameFlusher")
            .field("queue_size", &queue.entries.len())
            .field("closed", &queue.closed)
            .field("aggregate_size", &aggregate_size)
            .field("failure", &queue.failure)
            .finish()
    }
}

impl<T: Transport> Shared<T> {
    fn submit_entry(&self, entry: FrameEntry) {
        let outcome = {
            let mut queue = self.queue.lock();
            if queue.closed {
                Err((entry, Error::Closed))
            } else if self.is_failed() {
                let error = queue
                    .failure
                    .clone()
                    .unwrap_or_else(|| Error::Io("frame flusher failed".into()));
                Err((entry, error))
            } else if let Some(limit) = self
                .max_queue
                .filter(|limit| queue.entries.len() >= *limit)
            {
                Err((entry, Error::QueueFull { limit }))
            } else {
                match entry.frame.as_ref().map(|frame| frame.opcode) {
                    Some(OpCode::Ping) => {
                        // Prepend pings so they are processed first.
                        queue.entries.push_front(entry);
                    }
                    Some(OpCode::Close) => {
                        // Everything submitted after this frame fails.
                        queue.closed = true;
                        queue.entries.push_back(entry);
                    }
                    _ => {
                        queue.entries.push_back(entry);
                    }
                }
                Ok(())
            }
        };

        match outcome {
            Err((entry, error)) => {
                debug!(%error, "failing submission");
                entry.fail(error, self.generator.buffer_pool());
            }
            Ok(()) => {
                trace!("queued submission");
                self.kick();
            }
        }
    }

    fn is_failed(&self) -> bool {
        self.engine.lock().state == engine::EngineState::Failed
    }

    fn close(&self) {
        let snapshot: Vec<FrameEntry> = {
            let mut queue = self.queue.lock();
            if queue.closed {
                return;
            }
            queue.closed = true;
            queue.entries.drain(..).collect()
        };

        debug!(pending = snapshot.len(), "closing");

        // Fail the engine first so an idle engine latches the error, then
        // cancel the snapshot outside every lock.
        self.engine_failed(Error::Closed);
        let pool = self.generator.buffer_pool();
        for entry in snapshot {
            entry.fail(Error::Closed, pool);
        }
    }
}
