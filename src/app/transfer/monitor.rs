//! Stall monitor: liveness watchdog for a transfer attempt
//!
//! A source connection can accept the read call and then never return and
//! never error (the classic hung socket). A blocking read cannot escape that
//! on its own, so each attempt gets a watchdog task that samples the
//! worker's byte counter on a fixed period. A tick with no progress means
//! the attempt is stuck: the monitor sets the interrupt flag under the
//! shared sink lock (so an in-flight chunk commit finishes first), aborts
//! the worker's task, and exits.
//!
//! A monitor observing a recorded outcome exits quietly; the attempt is
//! already over.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::types::TransferShared;
use crate::app::events::{DownloadEventKind, EventSink};

/// Periodic watchdog that cancels a worker making no byte progress
pub struct StallMonitor {
    shared: Arc<TransferShared>,
    period: Duration,
    initial_delay: Duration,
    events: EventSink,
}

impl StallMonitor {
    /// Create a monitor for the given transfer
    pub fn new(
        shared: Arc<TransferShared>,
        period: Duration,
        initial_delay: Duration,
        events: EventSink,
    ) -> Self {
        Self {
            shared,
            period,
            initial_delay,
            events,
        }
    }

    /// Spawn the watchdog task.
    ///
    /// The returned handle can be aborted once the attempt has reached a
    /// terminal outcome through other means.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        tokio::time::sleep(self.initial_delay).await;

        let mut last_bytes = self.shared.bytes_read();
        let mut last_tick = Instant::now();

        loop {
            tokio::time::sleep(self.period).await;

            if self.shared.outcome().is_some() {
                debug!("Stall monitor exiting: attempt already finished");
                return;
            }

            let current = self.shared.bytes_read();
            if current > last_bytes {
                let elapsed = last_tick.elapsed().as_secs_f64();
                let rate = if elapsed > 0.0 {
                    (current - last_bytes) as f64 / elapsed
                } else {
                    0.0
                };
                debug!(
                    "Transfer progressing: {} bytes total ({:.0} B/s)",
                    current, rate
                );
                self.events.publish(DownloadEventKind::Progress {
                    bytes_transferred: current,
                    bytes_per_second: rate,
                });

                last_bytes = current;
                last_tick = Instant::now();
                continue;
            }

            // No progress since the previous observation: the attempt is
            // stalled. Take the sink lock first so a chunk commit that is
            // mid-flight completes before the interrupt becomes visible.
            {
                let _sinks = self.shared.lock_sinks().await;
                self.shared
                    .request_interrupt(Some(format!("no progress at {} bytes", current)));
            }
            self.shared.abort_worker();

            warn!(
                "Stalled transfer canceled after {:?} without progress ({} bytes)",
                self.period, current
            );
            self.events.publish(DownloadEventKind::Stalled {
                bytes_transferred: current,
            });
            return;
        }
    }
}
