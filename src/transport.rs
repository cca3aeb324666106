//! Byte-oriented transport capability consumed by the flush engine.

use bytes::Bytes;

/// Completion handle for a single gather write. Invoked exactly once.
pub type WriteCompletion = Box<dyn FnOnce(std::io::Result<()>) + Send + 'static>;

/// Gather-write transport.
///
/// All supplied byte ranges are written in order as one logical write, with
/// exactly one completion callback. The transport must drop its references
/// to `buffers` before (or promptly after) invoking `completion`, so that
/// pooled buffers can be reclaimed.
///
/// The completion may be invoked inline on the calling thread or later on
/// any other thread; the flush engine copes with both.
pub trait Transport: Send + Sync + 'static {
    /// Write `buffers` as a single logical gather write.
    fn write(&self, buffers: Vec<Bytes>, completion: WriteCompletion);
}

#[cfg(feature = "async-tokio")]
pub use tokio_impl::TokioTransport;

#[cfg(feature = "async-tokio")]
mod tokio_impl {
    use super::{Transport, WriteCompletion};
    use bytes::Bytes;
    use tokio::io::{AsyncWrite, AsyncWriteExt};
    use tokio::sync::mpsc;

    struct WriteJob {
        buffers: Vec<Bytes>,
        completion: WriteCompletion,
    }

    /// Adapter driving any [`AsyncWrite`] from a dedicated writer task.
    ///
    /// Writes are serialized through an unbounded channel; the flush engine
    /// never has more than one write outstanding, so the channel holds at
    /// most one job at a time.
    pub struct TokioTransport {
        tx: mpsc::UnboundedSender<WriteJob>,
    }

    impl TokioTransport {
        /// Spawn the writer task on the current tokio runtime.
        #[must_use]
        pub fn spawn<W>(mut writer: W) -> Self
        where
            W: AsyncWrite + Unpin + Send + 'static,
        {
            let (tx, mut rx) = mpsc::unbounded_channel::<WriteJob>();
            tokio::spawn(async move {
                while let Some(job) = rx.recv().await {
                    let WriteJob {
                        buffers,
                        completion,
                    } = job;

                    let mut result = Ok(());
                    for buf in &buffers {
                        if let Err(err) = writer.write_all(buf).await {
                            result = Err(err);
                            break;
                        }
                    }
                    if result.is_ok() {
                        result = writer.flush().await;
                    }

                    // Drop payload references before completing so the
                    // engine can reclaim pooled buffers.
                    drop(buffers);
                    completion(result);
                }
            });
            Self { tx }
        }
    }

    impl Transport for TokioTransport {
        fn write(&self, buffers: Vec<Bytes>, completion: WriteCompletion) {
            if let Err(rejected) = self.tx.send(WriteJob {
                buffers,
                completion,
            }) {
                let WriteJob {
                    buffers,
                    completion,
                } = rejected.0;
                drop(buffers);
                completion(Err(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "writer task terminated",
                )));
            }
        }
    }

}
