//! Error types for the frame flusher.
//!
//! The first terminal error a flusher encounters is latched; every
//! submission that arrives afterwards fails with a clone of it.

use thiserror::Error;

/// Result type alias for flusher operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can surface through a submission's write callback or from
/// flusher construction helpers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The flusher has been closed locally; no further frames are accepted
    /// and pending frames are cancelled with this error.
    #[error("connection has been closed locally")]
    Closed,

    /// A transport write failed. The message carries the underlying I/O
    /// error text.
    #[error("I/O error: {0}")]
    Io(String),

    /// Buffer acquisition failed because the requested capacity exceeds the
    /// pool's configured maximum. Fatal to the drain in progress.
    #[error("buffer pool exhausted: requested {requested} bytes (max: {max})")]
    PoolExhausted {
        /// Capacity that was requested.
        requested: usize,
        /// Largest capacity the pool will serve.
        max: usize,
    },

    /// The submit queue is bounded and full.
    #[error("submit queue full: {limit} entries")]
    QueueFull {
        /// Configured queue bound.
        limit: usize,
    },

    /// Invalid frame structure (control frame too large, fragmented control
    /// frame). Reported by [`Frame::validate`](crate::protocol::Frame::validate),
    /// never by the flusher itself.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}
