//! Transfer type definitions and shared per-download state
//!
//! This module contains the value types produced and consumed by the
//! transfer pipeline (outcomes, lifecycle states) together with
//! [`TransferShared`], the single state object a download's worker, client
//! stream, stall monitor and orchestrator all hold a reference to.
//!
//! Concentrating the mutable state in one object makes the
//! check-flag-then-commit protocol structural: every mutation that matters
//! for correctness goes through the same lock, rather than relying on each
//! participant to remember the locking discipline.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex as StdMutex, RwLock};

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWrite;
use tokio::sync::{Mutex, MutexGuard};
use tokio::task::AbortHandle;
use tracing::debug;

use crate::app::spool::SpoolBuffer;

/// Why a transfer attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminalReason {
    /// The source stream reached EOF and every chunk was delivered
    Complete,
    /// The stall monitor (or another liveness guard) interrupted the attempt
    Interrupted,
    /// The client canceled the download
    Canceled,
    /// Writing to the client-facing spool buffer failed
    ClientSinkError,
    /// Writing to the cache file failed
    CacheSinkError,
    /// Reading from the source stream failed
    SourceReadError,
}

impl TerminalReason {
    /// Whether the orchestrator may retry an attempt that ended this way
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TerminalReason::Interrupted
                | TerminalReason::SourceReadError
                | TerminalReason::CacheSinkError
        )
    }
}

/// Terminal result record of one transfer attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferOutcome {
    /// Bytes read from the source and committed to the live sinks
    pub bytes_transferred: u64,
    /// Why the attempt ended
    pub reason: TerminalReason,
    /// Optional human-readable detail (usually the underlying I/O error)
    pub message: Option<String>,
}

impl TransferOutcome {
    /// Create a new outcome record
    pub fn new(bytes_transferred: u64, reason: TerminalReason, message: Option<String>) -> Self {
        Self {
            bytes_transferred,
            reason,
            message,
        }
    }

    /// Whether the attempt delivered the complete product
    pub fn is_success(&self) -> bool {
        self.reason == TerminalReason::Complete
    }
}

/// Coarse status of the overall download, shared across attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DownloadLifecycle {
    /// No worker has been submitted yet
    NotStarted,
    /// A worker is transferring (or a retry is pending)
    InProgress,
    /// The full product was delivered
    Completed,
    /// The client canceled the download
    Canceled,
    /// Retries are exhausted; no more bytes will arrive
    Failed,
}

impl DownloadLifecycle {
    /// Whether this state is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DownloadLifecycle::Completed | DownloadLifecycle::Canceled | DownloadLifecycle::Failed
        )
    }
}

/// Lifecycle state plus the caching flags the client stream consults
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferState {
    /// Current lifecycle stage
    pub lifecycle: DownloadLifecycle,
    /// Whether a cache sink is attached to this download
    pub cache_enabled: bool,
    /// Whether the worker keeps filling the cache after the client closes
    pub continue_caching_on_cancel: bool,
}

impl TransferState {
    /// Create the initial state for a new download
    pub fn new(cache_enabled: bool, continue_caching_on_cancel: bool) -> Self {
        Self {
            lifecycle: DownloadLifecycle::NotStarted,
            cache_enabled,
            continue_caching_on_cancel,
        }
    }
}

/// The writable cache destination, type-erased so stores can hand out plain
/// files, encrypted writers, or test doubles interchangeably.
pub type CacheSink = Box<dyn AsyncWrite + Send + Unpin>;

/// The two destinations a worker writes into, guarded together.
///
/// Either sink may be absent: the spool disappears when the client closes
/// while caching continues, and the cache sink is absent when caching is off
/// or has been disabled after a sink failure.
pub struct SinkSet {
    /// Client-facing spill-to-disk buffer
    pub spool: Option<SpoolBuffer>,
    /// Cache file sink
    pub cache: Option<CacheSink>,
}

impl std::fmt::Debug for SinkSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkSet")
            .field("spool", &self.spool)
            .field("cache", &self.cache.as_ref().map(|_| "<sink>"))
            .finish()
    }
}

/// Shared state of one download, referenced by every pipeline participant.
///
/// Locking layout:
/// - `sinks` is the chunk-commit critical section. The worker holds it while
///   writing a chunk and advancing the counters; the client stream holds it
///   while reading; cancellation requests that must not race a commit take
///   it first.
/// - The byte counters are atomics published from inside that critical
///   section, so lock-free observers (the stall monitor, the stream's
///   fast-path check) can never see a count ahead of the flushed bytes.
/// - Flags, lifecycle and the recorded outcome use their own short
///   uncontended locks and are never held across I/O.
#[derive(Debug)]
pub struct TransferShared {
    sinks: Mutex<SinkSet>,
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
    started: AtomicBool,
    interrupt_requested: AtomicBool,
    cancel_requested: AtomicBool,
    state: RwLock<TransferState>,
    outcome: StdMutex<Option<TransferOutcome>>,
    worker_abort: StdMutex<Option<AbortHandle>>,
}

impl TransferShared {
    /// Create shared state for a new download
    pub fn new(state: TransferState, spool: SpoolBuffer, cache: Option<CacheSink>) -> Self {
        Self {
            sinks: Mutex::new(SinkSet {
                spool: Some(spool),
                cache,
            }),
            bytes_read: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            started: AtomicBool::new(false),
            interrupt_requested: AtomicBool::new(false),
            cancel_requested: AtomicBool::new(false),
            state: RwLock::new(state),
            outcome: StdMutex::new(None),
            worker_abort: StdMutex::new(None),
        }
    }

    /// Lock the sink set (the chunk-commit critical section)
    pub async fn lock_sinks(&self) -> MutexGuard<'_, SinkSet> {
        self.sinks.lock().await
    }

    /// Bytes read from the source across all attempts
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::Acquire)
    }

    /// Bytes flushed into the spool and visible to the client stream
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Acquire)
    }

    /// Publish the source-side byte count. Callers must hold the sink lock.
    pub(crate) fn store_bytes_read(&self, total: u64) {
        self.bytes_read.store(total, Ordering::Release);
    }

    /// Publish the spool-side byte count. Callers must hold the sink lock
    /// and must have flushed the corresponding bytes first.
    pub(crate) fn store_bytes_written(&self, total: u64) {
        self.bytes_written.store(total, Ordering::Release);
    }

    /// Whether the first chunk (or a terminal outcome) has landed
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Flip the started flag
    pub(crate) fn mark_started(&self) {
        self.started.store(true, Ordering::Release);
    }

    /// Whether the stall monitor has asked the worker to stop
    pub fn is_interrupt_requested(&self) -> bool {
        self.interrupt_requested.load(Ordering::Acquire)
    }

    /// Whether the client has asked the worker to stop
    pub fn is_cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::Acquire)
    }

    /// Ask the worker to stop for liveness reasons.
    ///
    /// Records a best-effort `Interrupted` outcome immediately so callers
    /// racing the worker's scheduling can read a sensible status without
    /// waiting for the loop to notice the flag.
    pub fn request_interrupt(&self, message: Option<String>) {
        self.interrupt_requested.store(true, Ordering::Release);
        self.record_outcome_if_absent(TransferOutcome::new(
            self.bytes_read(),
            TerminalReason::Interrupted,
            message,
        ));
    }

    /// Ask the worker to stop on behalf of the client.
    ///
    /// Records a best-effort `Canceled` outcome immediately, mirroring
    /// [`request_interrupt`](Self::request_interrupt).
    pub fn request_cancel(&self) {
        self.cancel_requested.store(true, Ordering::Release);
        self.record_outcome_if_absent(TransferOutcome::new(
            self.bytes_read(),
            TerminalReason::Canceled,
            None,
        ));
    }

    /// Record the attempt outcome, replacing any manufactured placeholder.
    ///
    /// A terminal outcome also counts as "started" for the handshake in
    /// `download()`: there is something to observe now.
    pub(crate) fn record_outcome(&self, outcome: TransferOutcome) {
        let mut guard = self.outcome.lock().expect("outcome lock poisoned");
        *guard = Some(outcome);
        self.mark_started();
    }

    /// Record an outcome only if none exists yet
    fn record_outcome_if_absent(&self, outcome: TransferOutcome) {
        let mut guard = self.outcome.lock().expect("outcome lock poisoned");
        if guard.is_none() {
            *guard = Some(outcome);
        }
        self.mark_started();
    }

    /// Clear the recorded outcome before launching a fresh attempt
    pub(crate) fn clear_outcome_for_retry(&self) {
        let mut guard = self.outcome.lock().expect("outcome lock poisoned");
        *guard = None;
        self.interrupt_requested.store(false, Ordering::Release);
    }

    /// The most recent attempt outcome, if any
    pub fn outcome(&self) -> Option<TransferOutcome> {
        self.outcome.lock().expect("outcome lock poisoned").clone()
    }

    /// Snapshot of the lifecycle state and caching flags
    pub fn state(&self) -> TransferState {
        *self.state.read().expect("state lock poisoned")
    }

    /// Current lifecycle stage
    pub fn lifecycle(&self) -> DownloadLifecycle {
        self.state().lifecycle
    }

    /// Advance the lifecycle. Terminal states are sticky: a transition
    /// requested after one has been reached is ignored.
    pub(crate) fn set_lifecycle(&self, lifecycle: DownloadLifecycle) {
        let mut guard = self.state.write().expect("state lock poisoned");
        if guard.lifecycle.is_terminal() {
            debug!(
                "Ignoring lifecycle transition {:?} -> {:?}",
                guard.lifecycle, lifecycle
            );
            return;
        }
        guard.lifecycle = lifecycle;
    }

    /// Turn caching off for the remainder of the download
    pub(crate) fn disable_caching(&self) {
        let mut guard = self.state.write().expect("state lock poisoned");
        guard.cache_enabled = false;
    }

    /// Register the abort handle of the currently running worker task
    pub(crate) fn set_worker_abort(&self, handle: AbortHandle) {
        let mut guard = self.worker_abort.lock().expect("abort lock poisoned");
        *guard = Some(handle);
    }

    /// Abort the current worker task, if one is registered
    pub fn abort_worker(&self) {
        let guard = self.worker_abort.lock().expect("abort lock poisoned");
        if let Some(handle) = guard.as_ref() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_shared() -> TransferShared {
        TransferShared::new(
            TransferState::new(false, false),
            SpoolBuffer::new(1024),
            None,
        )
    }

    /// Test the outcome precedence rules
    ///
    /// A manufactured outcome must appear immediately on a cancel request,
    /// and a worker's authoritative outcome must replace it.
    #[test]
    fn test_manufactured_then_authoritative_outcome() {
        let shared = make_shared();
        assert!(shared.outcome().is_none());

        shared.request_cancel();
        let manufactured = shared.outcome().unwrap();
        assert_eq!(manufactured.reason, TerminalReason::Canceled);
        assert_eq!(manufactured.bytes_transferred, 0);

        shared.record_outcome(TransferOutcome::new(42, TerminalReason::Canceled, None));
        assert_eq!(shared.outcome().unwrap().bytes_transferred, 42);
    }

    /// Test that a second stop request does not clobber the first outcome
    #[test]
    fn test_concurrent_stop_requests_compose() {
        let shared = make_shared();
        shared.request_cancel();
        shared.request_interrupt(Some("stalled".to_string()));

        // Cancel arrived first; the interrupt must not overwrite it
        assert_eq!(shared.outcome().unwrap().reason, TerminalReason::Canceled);
        assert!(shared.is_cancel_requested());
        assert!(shared.is_interrupt_requested());
    }

    /// Test lifecycle transitions are sticky once terminal
    #[test]
    fn test_terminal_lifecycle_is_sticky() {
        let shared = make_shared();
        assert_eq!(shared.lifecycle(), DownloadLifecycle::NotStarted);

        shared.set_lifecycle(DownloadLifecycle::InProgress);
        shared.set_lifecycle(DownloadLifecycle::Canceled);
        assert_eq!(shared.lifecycle(), DownloadLifecycle::Canceled);

        shared.set_lifecycle(DownloadLifecycle::Completed);
        assert_eq!(shared.lifecycle(), DownloadLifecycle::Canceled);
    }

    /// Test retryability classification of terminal reasons
    #[test]
    fn test_retryable_reasons() {
        assert!(TerminalReason::Interrupted.is_retryable());
        assert!(TerminalReason::SourceReadError.is_retryable());
        assert!(TerminalReason::CacheSinkError.is_retryable());
        assert!(!TerminalReason::Canceled.is_retryable());
        assert!(!TerminalReason::Complete.is_retryable());
        assert!(!TerminalReason::ClientSinkError.is_retryable());
    }

    /// Test that clearing for retry resets the interrupt flag but keeps the
    /// cancel flag
    ///
    /// A client cancel is final; a monitor interrupt is per-attempt.
    #[test]
    fn test_clear_for_retry_preserves_cancel() {
        let shared = make_shared();
        shared.request_interrupt(None);
        shared.clear_outcome_for_retry();
        assert!(!shared.is_interrupt_requested());
        assert!(shared.outcome().is_none());

        shared.request_cancel();
        shared.clear_outcome_for_retry();
        assert!(shared.is_cancel_requested());
    }

    /// Test outcome serialization for observability surfaces
    #[test]
    fn test_outcome_serialization() {
        let outcome = TransferOutcome::new(
            2_097_152,
            TerminalReason::Complete,
            Some("done".to_string()),
        );
        let json = serde_json::to_string(&outcome).unwrap();
        let back: TransferOutcome = serde_json::from_str(&json).unwrap();
        assert_eq!(back.bytes_transferred, 2_097_152);
        assert_eq!(back.reason, TerminalReason::Complete);
    }
}
