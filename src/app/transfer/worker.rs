//! Transfer worker: the producer side of the download pipeline
//!
//! A worker pumps bytes from the source stream into the spool buffer and,
//! when caching is on, into the cache sink, one chunk at a time. Each chunk
//! is committed atomically with respect to cancellation: the worker takes
//! the shared sink lock, re-checks the stop flags (a cancellation may have
//! arrived while it was blocked reading), writes to every live sink, and
//! only then advances the byte counters. A canceller can therefore never
//! observe a counter bump without the corresponding bytes being durably in
//! the sinks, and the worker never writes after a cancellation has been
//! accepted.
//!
//! Sink failures are caught independently per sink, so a broken cache file
//! does not stop delivery to the client for that chunk (or vice versa), but
//! either failure ends the attempt with a reason naming the sink at fault.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::{debug, trace, warn};

use super::types::{TerminalReason, TransferOutcome, TransferShared};

/// Type-erased readable source stream handed over by a retriever
pub type ProductSource = Box<dyn AsyncRead + Send + Unpin>;

/// Cancellable unit of work pumping one source stream into the shared sinks
pub struct TransferWorker {
    source: ProductSource,
    shared: Arc<TransferShared>,
    chunk_size: usize,
    initial_bytes: u64,
}

impl TransferWorker {
    /// Create a worker for a fresh attempt starting at byte zero
    pub fn new(source: ProductSource, shared: Arc<TransferShared>, chunk_size: usize) -> Self {
        Self {
            source,
            shared,
            chunk_size,
            initial_bytes: 0,
        }
    }

    /// Seed the worker with the byte count already delivered by earlier
    /// attempts. The source must already be positioned past those bytes.
    pub fn with_initial_bytes(mut self, initial_bytes: u64) -> Self {
        self.initial_bytes = initial_bytes;
        self
    }

    /// Run the transfer to a terminal outcome.
    ///
    /// Never panics on I/O trouble: every way the attempt can end is a
    /// representable [`TransferOutcome`]. The outcome is also recorded on
    /// the shared state before this returns, so observers holding only the
    /// shared handle see the same result as the caller of `run()`.
    pub async fn run(mut self) -> TransferOutcome {
        let mut total = self.initial_bytes;
        let mut buf = vec![0u8; self.chunk_size];

        debug!(
            "Transfer worker starting (resume at {} bytes, chunk size {})",
            total, self.chunk_size
        );

        loop {
            if let Some(outcome) = self.stop_requested_outcome(total) {
                return self.finish(outcome);
            }

            let read = self.source.read(&mut buf).await;

            let n = match read {
                Ok(n) => n,
                Err(e) => {
                    // A cancellation racing the blocking read surfaces here
                    // as an I/O error; report the lifecycle-consistent
                    // reason rather than a source failure.
                    if let Some(outcome) = self.stop_requested_outcome(total) {
                        return self.finish(outcome);
                    }
                    warn!("Source read failed after {} bytes: {}", total, e);
                    return self.finish(TransferOutcome::new(
                        total,
                        TerminalReason::SourceReadError,
                        Some(e.to_string()),
                    ));
                }
            };

            let mut sinks = self.shared.lock_sinks().await;

            // Re-check under the lock: a stop may have been accepted while
            // this worker was blocked in the read above.
            if let Some(outcome) = self.stop_requested_outcome(total) {
                drop(sinks);
                return self.finish(outcome);
            }

            if n == 0 {
                let flush_err = match sinks.cache.as_mut() {
                    Some(cache) => cache.flush().await.err(),
                    None => None,
                };
                if let Some(e) = flush_err {
                    warn!("Cache flush at EOF failed: {}", e);
                    sinks.cache = None;
                    drop(sinks);
                    return self.finish(TransferOutcome::new(
                        total,
                        TerminalReason::CacheSinkError,
                        Some(e.to_string()),
                    ));
                }
                drop(sinks);
                debug!("Transfer complete: {} bytes", total);
                return self.finish(TransferOutcome::new(total, TerminalReason::Complete, None));
            }

            let chunk = &buf[..n];

            let mut cache_err = None;
            if let Some(cache) = sinks.cache.as_mut() {
                if let Err(e) = cache.write_all(chunk).await {
                    cache_err = Some(e);
                }
            }

            let mut spool_err = None;
            if let Some(spool) = sinks.spool.as_mut() {
                match spool.append(chunk) {
                    Ok(flushed) => self.shared.store_bytes_written(flushed),
                    Err(e) => spool_err = Some(e),
                }
            }

            // The chunk has been consumed from the source and offered to
            // every live sink; the counters advance together with the
            // flushes, inside the lock.
            total += n as u64;
            self.shared.store_bytes_read(total);
            self.shared.mark_started();

            if cache_err.is_some() {
                // Nothing must write to the broken sink again.
                sinks.cache = None;
            }
            drop(sinks);

            trace!("Committed chunk of {} bytes ({} total)", n, total);

            if let Some(e) = spool_err {
                warn!("Spool write failed after {} bytes: {}", total, e);
                return self.finish(TransferOutcome::new(
                    total,
                    TerminalReason::ClientSinkError,
                    Some(e.to_string()),
                ));
            }
            if let Some(e) = cache_err {
                warn!("Cache write failed after {} bytes: {}", total, e);
                return self.finish(TransferOutcome::new(
                    total,
                    TerminalReason::CacheSinkError,
                    Some(e.to_string()),
                ));
            }
        }
    }

    /// Outcome to report if a stop flag is set, `None` otherwise.
    ///
    /// A client cancel wins over a monitor interrupt when both are set:
    /// cancellation is a clean terminal state and must never be retried.
    fn stop_requested_outcome(&self, total: u64) -> Option<TransferOutcome> {
        if self.shared.is_cancel_requested() {
            Some(TransferOutcome::new(total, TerminalReason::Canceled, None))
        } else if self.shared.is_interrupt_requested() {
            Some(TransferOutcome::new(
                total,
                TerminalReason::Interrupted,
                None,
            ))
        } else {
            None
        }
    }

    /// Record the outcome on the shared state and hand it back.
    fn finish(&self, outcome: TransferOutcome) -> TransferOutcome {
        self.shared.record_outcome(outcome.clone());
        self.shared.mark_started();
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::spool::SpoolBuffer;
    use crate::app::transfer::types::TransferState;

    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    /// Scripted source stream for driving the worker through exact
    /// chunk sequences, errors and EOF.
    struct ScriptedSource {
        steps: std::collections::VecDeque<ScriptStep>,
    }

    enum ScriptStep {
        Data(Vec<u8>),
        Error(io::ErrorKind),
    }

    impl ScriptedSource {
        fn new(steps: Vec<ScriptStep>) -> Self {
            Self {
                steps: steps.into_iter().collect(),
            }
        }
    }

    impl AsyncRead for ScriptedSource {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut tokio::io::ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            match self.steps.pop_front() {
                Some(ScriptStep::Data(data)) => {
                    buf.put_slice(&data);
                    Poll::Ready(Ok(()))
                }
                Some(ScriptStep::Error(kind)) => {
                    Poll::Ready(Err(io::Error::new(kind, "scripted failure")))
                }
                None => Poll::Ready(Ok(())), // EOF
            }
        }
    }

    fn make_shared() -> Arc<TransferShared> {
        Arc::new(TransferShared::new(
            TransferState::new(false, false),
            SpoolBuffer::new(64 * 1024),
            None,
        ))
    }

    /// Test a clean transfer to EOF
    ///
    /// All scripted chunks must land in the spool, the counters must match,
    /// and the outcome must be Complete.
    #[tokio::test]
    async fn test_complete_transfer() {
        let shared = make_shared();
        let source = ScriptedSource::new(vec![
            ScriptStep::Data(vec![1u8; 1000]),
            ScriptStep::Data(vec![2u8; 500]),
            ScriptStep::Data(vec![3u8; 500]),
        ]);

        let worker = TransferWorker::new(Box::new(source), shared.clone(), 4096);
        let outcome = worker.run().await;

        assert_eq!(outcome.reason, TerminalReason::Complete);
        assert_eq!(outcome.bytes_transferred, 2000);
        assert_eq!(shared.bytes_read(), 2000);
        assert_eq!(shared.bytes_written(), 2000);
        assert!(shared.is_started());
        assert_eq!(shared.outcome().unwrap().bytes_transferred, 2000);
    }

    /// Test that a source failure reports the bytes committed so far
    #[tokio::test]
    async fn test_source_error_reports_partial_bytes() {
        let shared = make_shared();
        let source = ScriptedSource::new(vec![
            ScriptStep::Data(vec![1u8; 700]),
            ScriptStep::Error(io::ErrorKind::ConnectionReset),
        ]);

        let worker = TransferWorker::new(Box::new(source), shared.clone(), 4096);
        let outcome = worker.run().await;

        assert_eq!(outcome.reason, TerminalReason::SourceReadError);
        assert_eq!(outcome.bytes_transferred, 700);
        assert!(outcome.message.is_some());
        assert_eq!(shared.bytes_written(), 700);
    }

    /// Test no-loss-under-cancel
    ///
    /// A cancel set between two chunk commits must produce an outcome whose
    /// byte count is exactly the committed chunks, never more or less.
    #[tokio::test]
    async fn test_cancel_between_chunks_is_exact() {
        let shared = make_shared();
        shared.request_cancel();

        let source = ScriptedSource::new(vec![ScriptStep::Data(vec![1u8; 100])]);
        let worker = TransferWorker::new(Box::new(source), shared.clone(), 4096)
            .with_initial_bytes(300);
        let outcome = worker.run().await;

        assert_eq!(outcome.reason, TerminalReason::Canceled);
        assert_eq!(outcome.bytes_transferred, 300);
        // No chunk may have been written after the cancel was accepted
        assert_eq!(shared.bytes_written(), 0);
    }

    /// Test that an interrupt racing a failing read wins over the read error
    #[tokio::test]
    async fn test_interrupt_beats_racing_read_error() {
        let shared = make_shared();
        shared.request_interrupt(None);

        let source = ScriptedSource::new(vec![ScriptStep::Error(io::ErrorKind::Interrupted)]);
        let worker = TransferWorker::new(Box::new(source), shared.clone(), 4096);
        let outcome = worker.run().await;

        assert_eq!(outcome.reason, TerminalReason::Interrupted);
    }

    /// Test a resumed worker seeds its counter without rewriting the spool
    #[tokio::test]
    async fn test_resume_seeds_byte_count() {
        let shared = make_shared();
        let source = ScriptedSource::new(vec![ScriptStep::Data(vec![9u8; 250])]);

        let worker =
            TransferWorker::new(Box::new(source), shared.clone(), 4096).with_initial_bytes(1000);
        let outcome = worker.run().await;

        assert_eq!(outcome.reason, TerminalReason::Complete);
        assert_eq!(outcome.bytes_transferred, 1250);
        assert_eq!(shared.bytes_read(), 1250);
        // Only the new chunk landed in this download's spool
        assert_eq!(shared.bytes_written(), 250);
    }

    /// Test that a cache sink failure names the cache, not the client
    ///
    /// The spool must still receive the chunk that broke the cache sink.
    #[tokio::test]
    async fn test_cache_sink_failure_does_not_stop_client_delivery() {
        struct FailingSink;
        impl tokio::io::AsyncWrite for FailingSink {
            fn poll_write(
                self: Pin<&mut Self>,
                _cx: &mut Context<'_>,
                _buf: &[u8],
            ) -> Poll<io::Result<usize>> {
                Poll::Ready(Err(io::Error::new(io::ErrorKind::Other, "disk full")))
            }
            fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
                Poll::Ready(Ok(()))
            }
            fn poll_shutdown(
                self: Pin<&mut Self>,
                _cx: &mut Context<'_>,
            ) -> Poll<io::Result<()>> {
                Poll::Ready(Ok(()))
            }
        }

        let shared = Arc::new(TransferShared::new(
            TransferState::new(true, false),
            SpoolBuffer::new(64 * 1024),
            Some(Box::new(FailingSink)),
        ));

        let source = ScriptedSource::new(vec![ScriptStep::Data(vec![5u8; 128])]);
        let worker = TransferWorker::new(Box::new(source), shared.clone(), 4096);
        let outcome = worker.run().await;

        assert_eq!(outcome.reason, TerminalReason::CacheSinkError);
        assert_eq!(outcome.bytes_transferred, 128);
        assert_eq!(shared.bytes_written(), 128);

        // The broken sink must be gone so nothing writes to it again
        let sinks = shared.lock_sinks().await;
        assert!(sinks.cache.is_none());
        assert!(sinks.spool.is_some());
    }
}
