//! Completion callbacks for submitted frames.
//!
//! Every accepted submission completes its callback exactly once, with
//! success or with a single error. The capability consumes itself on
//! completion so double-notification is unrepresentable.

use crate::error::{Error, Result};

/// Completion capability attached to each submitted frame.
///
/// Implemented for any `FnOnce(Result<()>)` closure, so most call sites can
/// pass a closure directly:
///
/// ```rust,ignore
/// flusher.submit(frame, |result| println!("{result:?}"), BatchMode::Auto);
/// ```
pub trait WriteCallback: Send + 'static {
    /// The frame's bytes were handed to the transport (or coalesced into
    /// the aggregate buffer) successfully.
    fn succeeded(self: Box<Self>);

    /// The submission failed; `error` is the terminal cause.
    fn failed(self: Box<Self>, error: Error);
}

impl<F> WriteCallback for F
where
    F: FnOnce(Result<()>) + Send + 'static,
{
    fn succeeded(self: Box<Self>) {
        (*self)(Ok(()));
    }

    fn failed(self: Box<Self>, error: Error) {
        (*self)(Err(error));
    }
}

/// A callback that ignores the outcome, for fire-and-forget submissions.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCallback;

impl WriteCallback for NoopCallback {
    fn succeeded(self: Box<Self>) {}

    fn failed(self: Box<Self>, _error: Error) {}
}
