//! Transfer core: worker, watchdog and shared per-download state
//!
//! One download owns exactly one [`TransferShared`] object. The transfer
//! worker writes through it, the client stream reads through it, the stall
//! monitor watches it, and the orchestrator sequences attempts over it.
//! The submodules are:
//!
//! - [`types`] - outcome and lifecycle value types plus [`TransferShared`]
//! - [`worker`] - the producer pumping source bytes into the sinks
//! - [`monitor`] - the no-progress watchdog

pub mod monitor;
pub mod types;
pub mod worker;

pub use monitor::StallMonitor;
pub use types::{
    CacheSink, DownloadLifecycle, SinkSet, TerminalReason, TransferOutcome, TransferShared,
    TransferState,
};
pub use worker::{ProductSource, TransferWorker};
