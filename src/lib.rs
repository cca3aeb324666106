//! # wsflush - Outbound WebSocket Frame Flusher
//!
//! `wsflush` is the write half of a WebSocket stack: a single-writer,
//! batching serializer that turns application-submitted frames into
//! on-the-wire byte sequences and hands them to a byte-oriented transport.
//!
//! ## Guarantees
//!
//! - **At most one concurrent write** to the underlying transport
//! - **Frame ordering** in acceptance order, with a PING-priority exception
//! - **Zero-copy of large payloads** via reference-counted [`bytes::Bytes`]
//! - **Exactly-once callback completion** for every submitted frame —
//!   success, failure, or cancellation on close
//!
//! Small frames are coalesced into a pooled aggregate buffer and written
//! in one batch; large frames bypass the copy and are gather-written
//! together with their freshly rendered headers.
//!
//! The HTTP upgrade handshake, incoming-frame parsing, payload masking,
//! and message fragmentation are all upstream concerns: this crate meets
//! its callers at exactly two seams, the [`FrameFlusher::submit`] entry
//! point and the [`Transport`] write capability it consumes.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use wsflush::{
//!     BatchMode, BufferPool, FlusherConfig, Frame, FrameFlusher, Generator, TokioTransport,
//! };
//!
//! let generator = Generator::new(Arc::new(BufferPool::new()));
//! let transport = TokioTransport::spawn(tcp_stream);
//! let flusher = FrameFlusher::new(generator, transport, FlusherConfig::default());
//!
//! flusher.submit(
//!     Frame::text("hello"),
//!     |result| println!("written: {result:?}"),
//!     BatchMode::Auto,
//! );
//! ```

pub mod buffer;
pub mod callback;
pub mod config;
pub mod error;
pub mod flusher;
pub mod generator;
pub mod protocol;
pub mod transport;

pub use buffer::BufferPool;
pub use callback::{NoopCallback, WriteCallback};
pub use config::FlusherConfig;
pub use error::{Error, Result};
pub use flusher::{BatchMode, FrameFlusher};
pub use generator::{Generator, MAX_HEADER_LENGTH};
pub use protocol::{Frame, OpCode};
pub use transport::{Transport, WriteCompletion};

#[cfg(feature = "async-tokio")]
pub use transport::TokioTransport;

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    struct DummyTransport;
    impl Transport for DummyTransport {
        fn write(&self, _buffers: Vec<bytes::Bytes>, completion: WriteCompletion) {
            completion(Ok(()));
        }
    }

    #[test]
    fn test_public_types_are_send() {
        assert_send::<Error>();
        assert_send::<FlusherConfig>();
        assert_send::<Frame>();
        assert_send::<OpCode>();
        assert_send::<BatchMode>();
        assert_send::<BufferPool>();
        assert_send::<Generator>();
        assert_send::<FrameFlusher<DummyTransport>>();
    }

    #[test]
    fn test_public_types_are_sync() {
        assert_sync::<Error>();
        assert_sync::<FlusherConfig>();
        assert_sync::<Frame>();
        assert_sync::<OpCode>();
        assert_sync::<BufferPool>();
        assert_sync::<Generator>();
        assert_sync::<FrameFlusher<DummyTransport>>();
    }
}
