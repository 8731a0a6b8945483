//! Best-effort lifecycle event publishing
//!
//! Downloads can report their lifecycle transitions over a bounded channel
//! for status displays and logging. Publishing never blocks and never fails
//! the pipeline: a full or closed channel drops the event with a debug log,
//! exactly like an absent subscriber.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

/// What happened, without the envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DownloadEventKind {
    /// The first chunk (or a terminal outcome) has landed
    Started,
    /// Periodic progress observation from the stall monitor
    Progress {
        bytes_transferred: u64,
        bytes_per_second: f64,
    },
    /// The stall monitor canceled a stuck attempt
    Stalled { bytes_transferred: u64 },
    /// An attempt ended without completing the product
    AttemptFailed {
        attempt: u32,
        reason: String,
        message: Option<String>,
    },
    /// A new attempt is about to start
    Retrying { attempt: u32, resume_from: u64 },
    /// The full product was delivered
    Completed { bytes_transferred: u64 },
    /// The client canceled the download
    Canceled { bytes_transferred: u64 },
    /// Retries are exhausted
    Failed {
        bytes_transferred: u64,
        message: Option<String>,
    },
}

/// One lifecycle notification for one download
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadEvent {
    /// The product this event belongs to
    pub product_id: String,
    /// When the event was published
    pub timestamp: DateTime<Utc>,
    /// What happened
    pub kind: DownloadEventKind,
}

/// Non-blocking publisher handle carried by the pipeline components.
///
/// Cloneable and cheap; a disabled sink publishes to nobody.
#[derive(Debug, Clone)]
pub struct EventSink {
    product_id: String,
    tx: Option<mpsc::Sender<DownloadEvent>>,
}

impl EventSink {
    /// Create a sink publishing to the given channel
    pub fn new(product_id: impl Into<String>, tx: mpsc::Sender<DownloadEvent>) -> Self {
        Self {
            product_id: product_id.into(),
            tx: Some(tx),
        }
    }

    /// Create a sink that drops every event
    pub fn disabled() -> Self {
        Self {
            product_id: String::new(),
            tx: None,
        }
    }

    /// Publish an event without blocking.
    ///
    /// A full or closed channel drops the event; subscribers are an
    /// observability surface, not a correctness dependency.
    pub fn publish(&self, kind: DownloadEventKind) {
        let Some(tx) = &self.tx else {
            return;
        };

        let event = DownloadEvent {
            product_id: self.product_id.clone(),
            timestamp: Utc::now(),
            kind,
        };

        if let Err(e) = tx.try_send(event) {
            match e {
                mpsc::error::TrySendError::Full(_) => {
                    debug!("Event channel full, dropping update");
                }
                mpsc::error::TrySendError::Closed(_) => {
                    debug!("Event channel closed, dropping update");
                }
            }
        }
    }
}
