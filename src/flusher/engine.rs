//! The iterating flush engine.
//!
//! The engine coalesces any number of producer kicks into a single logical
//! writer. A kick on an idle engine starts the processing loop on the
//! caller's thread; a kick mid-step only raises a flag the loop re-checks
//! before idling, and a kick while a write is in flight is absorbed
//! entirely, because the completion restarts the loop anyway. No lock is
//! ever held across the transport write or a callback invocation.
//!
//! Engine states:
//!
//! - `Idle` — nothing to do, waiting for a kick.
//! - `Processing` — draining the queue and deciding batch-vs-gather.
//! - `Pending` — one transport write in flight; no second write may start.
//! - `Called` — the in-flight write completed before the issuing step
//!   returned; the loop picks the completion up in place.
//! - `Failed` — terminal.

use std::collections::VecDeque;
use std::sync::Weak;

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::error::Error;
use crate::flusher::entry::{BatchMode, FrameEntry};
use crate::generator::{Generator, MAX_HEADER_LENGTH};
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EngineState {
    Idle,
    Processing,
    Pending,
    Called,
    Failed,
}

pub(crate) struct Engine {
    pub(crate) state: EngineState,
    /// Set by a kick that found the engine mid-step; the processing loop
    /// re-runs instead of idling when this is up.
    pub(crate) kicked: bool,
    /// Failure reported while the processing loop was active; the loop
    /// performs the cleanup once its current step returns.
    pub(crate) error: Option<Error>,
}

impl Engine {
    pub(crate) fn new() -> Self {
        Self {
            state: EngineState::Idle,
            kicked: false,
            error: None,
        }
    }
}

/// Queue state shared with the submit path. One mutex guards the queue,
/// the closed flag, and the latched failure.
pub(crate) struct SubmitQueue {
    pub(crate) entries: VecDeque<FrameEntry>,
    pub(crate) closed: bool,
    pub(crate) failure: Option<Error>,
}

impl SubmitQueue {
    pub(crate) fn new() -> Self {
        Self {
            entries: VecDeque::new(),
            closed: false,
            failure: None,
        }
    }
}

/// Work state owned by whichever thread currently drives the engine: the
/// drained slice, the aggregate, and the frozen aggregate of the write in
/// flight (kept so its storage can be reclaimed on completion).
pub(crate) struct FlushWork {
    pub(crate) entries: Vec<FrameEntry>,
    pub(crate) aggregate: Option<BytesMut>,
    pub(crate) written_aggregate: Option<Bytes>,
}

impl FlushWork {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
            aggregate: None,
            written_aggregate: None,
        }
    }
}

/// Outcome of one processing step.
enum Action {
    /// Queue empty, nothing buffered.
    Idle,
    /// A transport write was issued.
    Scheduled,
    /// The slice was coalesced into the aggregate; keep iterating.
    Loop,
}

pub(crate) struct Shared<T: Transport> {
    pub(crate) generator: Generator,
    pub(crate) transport: T,
    pub(crate) buffer_size: usize,
    pub(crate) max_gather: usize,
    pub(crate) max_queue: Option<usize>,
    pub(crate) queue: Mutex<SubmitQueue>,
    pub(crate) engine: Mutex<Engine>,
    pub(crate) work: Mutex<FlushWork>,
    pub(crate) this: Weak<Shared<T>>,
}

impl<T: Transport> Shared<T> {
    /// Wake the engine. Starts the processing loop only from `Idle`; in
    /// every other state the pending work is picked up by whoever already
    /// owns the loop.
    pub(crate) fn kick(&self) {
        let run = {
            let mut engine = self.engine.lock();
            match engine.state {
                EngineState::Idle => {
                    engine.state = EngineState::Processing;
                    true
                }
                EngineState::Processing => {
                    engine.kicked = true;
                    false
                }
                EngineState::Pending | EngineState::Called | EngineState::Failed => false,
            }
        };
        if run {
            self.processing();
        }
    }

    /// The processing loop. Exactly one thread runs this at a time; the
    /// state machine hands it over between producer threads and transport
    /// completion threads.
    fn processing(&self) {
        loop {
            let step = self.process();

            let mut engine = self.engine.lock();
            match engine.state {
                EngineState::Processing => match step {
                    Ok(Action::Loop) => {
                        drop(engine);
                    }
                    Ok(Action::Idle) => {
                        if engine.kicked {
                            engine.kicked = false;
                            drop(engine);
                            continue;
                        }
                        engine.state = EngineState::Idle;
                        return;
                    }
                    Ok(Action::Scheduled) => {
                        engine.state = EngineState::Pending;
                        return;
                    }
                    Err(error) => {
                        engine.state = EngineState::Failed;
                        drop(engine);
                        self.on_failure(error);
                        return;
                    }
                },
                EngineState::Called => {
                    // The write issued by this step completed inline.
                    engine.state = EngineState::Processing;
                    drop(engine);
                    self.on_write_success();
                }
                EngineState::Failed => {
                    let error = engine
                        .error
                        .take()
                        .unwrap_or_else(|| Error::Io("frame flusher failed".into()));
                    drop(engine);
                    self.on_failure(error);
                    return;
                }
                // Only this loop moves the engine out of Processing.
                EngineState::Idle | EngineState::Pending => return,
            }
        }
    }

    /// One step: drain a slice, decide, and either coalesce into the
    /// aggregate or issue a gather write. Callbacks fire after every lock
    /// is released.
    fn process(&self) -> Result<Action, Error> {
        let mut to_succeed: Vec<FrameEntry> = Vec::new();
        let mut write: Option<Vec<Bytes>> = None;

        let action = {
            let mut work = self.work.lock();

            let mut current = BatchMode::Auto;
            {
                let mut queue = self.queue.lock();
                let mut space = match work.aggregate.as_ref() {
                    Some(agg) => self.buffer_size.saturating_sub(agg.len()),
                    None => self.buffer_size,
                };
                while work.entries.len() < self.max_gather {
                    let Some(entry) = queue.entries.pop_front() else {
                        break;
                    };
                    current = current.combine(entry.batch);
                    if entry.is_sentinel() {
                        current = BatchMode::Off;
                    }
                    let approx_len = MAX_HEADER_LENGTH + entry.payload_len();
                    // Big frames bypass the aggregate rather than being copied.
                    if approx_len > self.buffer_size / 4 {
                        current = BatchMode::Off;
                    }
                    space = space.saturating_sub(approx_len);
                    if space == 0 {
                        current = BatchMode::Off;
                    }
                    work.entries.push(entry);
                }
            }

            trace!(
                entries = work.entries.len(),
                batch = ?current,
                "processing slice"
            );

            if work.entries.is_empty() {
                let buffered = work.aggregate.as_ref().is_some_and(|agg| !agg.is_empty());
                if buffered {
                    debug!("auto flushing aggregate");
                    self.flush_slice(&mut work, &mut to_succeed, &mut write)?
                } else {
                    self.release_aggregate(&mut work);
                    Action::Idle
                }
            } else if current == BatchMode::Off {
                self.flush_slice(&mut work, &mut to_succeed, &mut write)?
            } else {
                self.batch_slice(&mut work, &mut to_succeed)?
            }
        };

        let pool = self.generator.buffer_pool();
        for entry in to_succeed {
            entry.succeed(pool);
        }
        if let Some(buffers) = write {
            self.issue_write(buffers);
        }
        Ok(action)
    }

    /// Coalesce the slice into the aggregate and complete it synthetically.
    /// Buffered bytes count as delivered; no transport write is issued.
    fn batch_slice(
        &self,
        work: &mut FlushWork,
        to_succeed: &mut Vec<FrameEntry>,
    ) -> Result<Action, Error> {
        let mut aggregate = match work.aggregate.take() {
            Some(aggregate) => aggregate,
            None => {
                let aggregate = self.generator.buffer_pool().acquire(self.buffer_size)?;
                trace!(capacity = aggregate.capacity(), "acquired aggregate buffer");
                aggregate
            }
        };

        for entry in &work.entries {
            if let Some(frame) = entry.frame.as_ref() {
                self.generator.generate_header_into(frame, &mut aggregate);
                if !frame.payload().is_empty() {
                    aggregate.extend_from_slice(frame.payload());
                }
            }
        }
        debug!(
            frames = work.entries.len(),
            aggregated = aggregate.len(),
            "aggregated frames"
        );

        work.aggregate = Some(aggregate);
        to_succeed.extend(work.entries.drain(..));
        Ok(Action::Loop)
    }

    /// Write the aggregate (if non-empty) and each entry's header and
    /// payload as one gather write. The slice stays owned by the engine
    /// until the completion arrives.
    fn flush_slice(
        &self,
        work: &mut FlushWork,
        to_succeed: &mut Vec<FrameEntry>,
        write: &mut Option<Vec<Bytes>>,
    ) -> Result<Action, Error> {
        let mut buffers: Vec<Bytes> = Vec::with_capacity(work.entries.len() * 2 + 1);

        if let Some(aggregate) = work.aggregate.take() {
            if aggregate.is_empty() {
                self.generator.buffer_pool().release(aggregate);
            } else {
                debug!(bytes = aggregate.len(), "flushing aggregate");
                let frozen = aggregate.freeze();
                work.written_aggregate = Some(frozen.clone());
                buffers.push(frozen);
            }
        }

        for entry in work.entries.iter_mut() {
            // The sentinel contributes no bytes.
            let Some(frame) = entry.frame.as_ref() else {
                continue;
            };
            let header = self.generator.generate_header(frame)?.freeze();
            entry.header = Some(header.clone());
            buffers.push(header);
            if !frame.payload().is_empty() {
                buffers.push(frame.payload_bytes());
            }
        }

        if buffers.is_empty() {
            // Nothing to write; there may still be a sentinel to notify.
            to_succeed.extend(work.entries.drain(..));
            return Ok(Action::Idle);
        }

        debug!(
            frames = work.entries.len(),
            buffers = buffers.len(),
            "flushing"
        );
        *write = Some(buffers);
        Ok(Action::Scheduled)
    }

    fn release_aggregate(&self, work: &mut FlushWork) {
        if let Some(aggregate) = work.aggregate.take() {
            if aggregate.is_empty() {
                self.generator.buffer_pool().release(aggregate);
            } else {
                work.aggregate = Some(aggregate);
            }
        }
    }

    fn issue_write(&self, buffers: Vec<Bytes>) {
        let this = self.this.clone();
        self.transport.write(
            buffers,
            Box::new(move |result| {
                if let Some(shared) = this.upgrade() {
                    match result {
                        Ok(()) => shared.write_succeeded(),
                        Err(err) => shared.engine_failed(err.into()),
                    }
                }
            }),
        );
    }

    /// Transport completion, success path. May arrive on any thread, or
    /// inline on the thread that issued the write.
    pub(crate) fn write_succeeded(&self) {
        let resume = {
            let mut engine = self.engine.lock();
            match engine.state {
                EngineState::Pending => {
                    engine.state = EngineState::Processing;
                    true
                }
                EngineState::Processing => {
                    engine.state = EngineState::Called;
                    false
                }
                // A racing failure (close or a second error) already owns
                // the slice; the completion is dropped.
                _ => false,
            }
        };
        if resume {
            self.on_write_success();
            self.processing();
        }
    }

    /// Complete the in-flight slice: reclaim the flushed aggregate, then
    /// succeed every callback in drain order.
    fn on_write_success(&self) {
        let (written, entries) = {
            let mut work = self.work.lock();
            let entries: Vec<FrameEntry> = work.entries.drain(..).collect();
            (work.written_aggregate.take(), entries)
        };
        let pool = self.generator.buffer_pool();
        if let Some(written) = written {
            pool.recycle(written);
        }
        for entry in entries {
            entry.succeed(pool);
        }
    }

    /// Fail the engine. The first terminal error wins; later ones are
    /// logged and suppressed. If the processing loop is active the cleanup
    /// is deferred to it, so no cleanup ever races a step in progress.
    pub(crate) fn engine_failed(&self, error: Error) {
        let cleanup = {
            let mut engine = self.engine.lock();
            match engine.state {
                EngineState::Failed => {
                    debug!(%error, "engine already failed, suppressing");
                    None
                }
                EngineState::Processing | EngineState::Called => {
                    engine.state = EngineState::Failed;
                    engine.error = Some(error);
                    None
                }
                EngineState::Idle | EngineState::Pending => {
                    engine.state = EngineState::Failed;
                    Some(error)
                }
            }
        };
        if let Some(error) = cleanup {
            self.on_failure(error);
        }
    }

    /// Terminal cleanup: fail the in-flight slice, latch the failure, then
    /// fail everything still queued. Callback order follows acceptance
    /// order (slice first).
    fn on_failure(&self, error: Error) {
        warn!(%error, "frame flusher failed");

        let (aggregate, slice) = {
            let mut work = self.work.lock();
            work.written_aggregate = None;
            let slice: Vec<FrameEntry> = work.entries.drain(..).collect();
            (work.aggregate.take(), slice)
        };
        let pool = self.generator.buffer_pool();
        if let Some(aggregate) = aggregate {
            pool.release(aggregate);
        }

        let queued: Vec<FrameEntry> = {
            let mut queue = self.queue.lock();
            if queue.failure.is_none() {
                queue.failure = Some(error.clone());
            }
            queue.entries.drain(..).collect()
        };

        for entry in slice {
            entry.fail(error.clone(), pool);
        }
        for entry in queued {
            entry.fail(error.clone(), pool);
        }
    }
}

impl<T: Transport> Drop for Shared<T> {
    fn drop(&mut self) {
        // A transport may drop its completion without invoking it; any
        // submission still held here must not be silently discarded.
        let mut orphans: Vec<FrameEntry> = self.work.get_mut().entries.drain(..).collect();
        orphans.extend(self.queue.get_mut().entries.drain(..));
        for entry in orphans {
            entry.fail(Error::Closed, self.generator.buffer_pool());
        }
    }
}
