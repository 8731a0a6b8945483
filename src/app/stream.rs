//! Client-facing product stream
//!
//! This is the object `download()` hands back to the caller. It reads from
//! the spool buffer concurrently with the worker writing into it, blocking
//! in a short sleep-poll loop while the transfer is still producing, and
//! reports end-of-stream only once every buffered byte has been consumed
//! and the download has completed.
//!
//! A failed download raises an I/O error on the first read that reaches the
//! failure point instead of silently returning EOF; losing that signal
//! would make a truncated download look successful.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::transfer::{DownloadLifecycle, TransferShared};

/// Byte stream over the spool buffer of one download.
///
/// Exactly one `ProductStream` exists per download; the caller owns closing
/// it exactly once.
#[derive(Debug)]
pub struct ProductStream {
    shared: Arc<TransferShared>,
    cursor: u64,
    poll_interval: Duration,
    closed: bool,
    failure_reported: bool,
}

impl ProductStream {
    /// Create a stream over the given transfer. Called by the orchestrator.
    pub(crate) fn new(shared: Arc<TransferShared>, poll_interval: Duration) -> Self {
        Self {
            shared,
            cursor: 0,
            poll_interval,
            closed: false,
            failure_reported: false,
        }
    }

    /// Read up to `buf.len()` bytes, waiting for the worker if necessary.
    ///
    /// Returns `Ok(0)` only at true end-of-stream: every produced byte has
    /// been consumed and the download reached a terminal state. While the
    /// transfer is in progress and no bytes are buffered, this polls with
    /// short sleeps; transient retry activity underneath is invisible here
    /// beyond a pause in delivery.
    ///
    /// # Errors
    ///
    /// A download that ends `Failed` (or is canceled out from under the
    /// reader) surfaces one `io::Error` carrying the terminal message;
    /// subsequent reads return EOF.
    pub async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "product stream is closed",
            ));
        }
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            if self.shared.bytes_written() > self.cursor {
                let mut sinks = self.shared.lock_sinks().await;
                let Some(spool) = sinks.spool.as_mut() else {
                    return Err(io::Error::new(
                        io::ErrorKind::BrokenPipe,
                        "spool buffer released",
                    ));
                };
                let n = spool.read_at(self.cursor, buf)?;
                if n > 0 {
                    self.cursor += n as u64;
                    return Ok(n);
                }
                drop(sinks);
            }

            match self.shared.lifecycle() {
                DownloadLifecycle::NotStarted | DownloadLifecycle::InProgress => {
                    tokio::time::sleep(self.poll_interval).await;
                }
                DownloadLifecycle::Completed => {
                    if self.shared.bytes_written() > self.cursor {
                        continue;
                    }
                    return Ok(0);
                }
                DownloadLifecycle::Failed => {
                    if self.shared.bytes_written() > self.cursor {
                        continue;
                    }
                    if !self.failure_reported {
                        self.failure_reported = true;
                        let detail = self
                            .shared
                            .outcome()
                            .and_then(|o| o.message)
                            .unwrap_or_else(|| "download failed".to_string());
                        return Err(io::Error::new(io::ErrorKind::Other, detail));
                    }
                    return Ok(0);
                }
                DownloadLifecycle::Canceled => {
                    if self.shared.bytes_written() > self.cursor {
                        continue;
                    }
                    if !self.failure_reported {
                        self.failure_reported = true;
                        return Err(io::Error::new(
                            io::ErrorKind::Interrupted,
                            "download canceled",
                        ));
                    }
                    return Ok(0);
                }
            }
        }
    }

    /// Read the remainder of the stream into a vector.
    pub async fn read_to_end(&mut self, out: &mut Vec<u8>) -> io::Result<usize> {
        let mut buf = vec![0u8; 64 * 1024];
        let mut total = 0;
        loop {
            let n = self.read(&mut buf).await?;
            if n == 0 {
                return Ok(total);
            }
            out.extend_from_slice(&buf[..n]);
            total += n;
        }
    }

    /// Bytes this stream has consumed so far
    pub fn bytes_consumed(&self) -> u64 {
        self.cursor
    }

    /// Whether `close()` has already run
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Close the stream and release the spool's backing storage.
    ///
    /// If the transfer attempt is still running and the download is not
    /// configured to keep filling the cache after the client walks away,
    /// the worker is canceled first. The spool is released unconditionally;
    /// a second `close()` is a no-op.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        let state = self.shared.state();
        let keep_caching = state.cache_enabled && state.continue_caching_on_cancel;
        let attempt_finished = self.shared.outcome().is_some();

        if !keep_caching && !attempt_finished {
            debug!("Client closed mid-transfer, canceling worker");
            self.shared.request_cancel();
            self.shared.abort_worker();
        }

        // Dropping the spool deletes its disk spillover, if any.
        let mut sinks = self.shared.lock_sinks().await;
        sinks.spool.take();
    }
}
