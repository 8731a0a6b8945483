//! Download orchestration
//!
//! The orchestrator is the entry point of the pipeline. `download()`
//! validates its inputs, opens the source stream through the retriever,
//! wires the spool buffer, transfer worker, stall monitor and client stream
//! around one shared state object, and hands the stream back to the caller
//! once a bounded "started" handshake fires.
//!
//! A supervisor task owns the retry loop across attempts: retryable
//! outcomes re-open the source, skip forward by the byte count already
//! delivered, and seed a fresh worker, up to the configured attempt budget.
//! A client cancel is never retried. Exhausting the budget surfaces a
//! terminal `Failed` lifecycle to the client stream; transient retry
//! activity is invisible to the client beyond a pause in byte delivery.

pub mod config;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub use config::{ConfigPresets, DownloadConfig, DownloadConfigBuilder};

use crate::app::events::{DownloadEvent, DownloadEventKind, EventSink};
use crate::app::retriever::Retriever;
use crate::app::spool::SpoolBuffer;
use crate::app::store::CacheStore;
use crate::app::stream::ProductStream;
use crate::app::transfer::{
    DownloadLifecycle, ProductSource, StallMonitor, TerminalReason, TransferOutcome,
    TransferShared, TransferState, TransferWorker,
};
use crate::constants::stream as stream_constants;
use crate::errors::{DownloadError, DownloadResult, RetrieveError, RetrieveResult};

/// Everything a caller gets back from one `download()` invocation
pub struct DownloadResponse {
    /// The product being downloaded
    pub product_id: String,
    /// Transport-level properties reported by the retriever
    pub properties: HashMap<String, String>,
    /// The byte stream to consume; the caller owns closing it exactly once
    pub stream: ProductStream,
    shared: Arc<TransferShared>,
}

impl std::fmt::Debug for DownloadResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadResponse")
            .field("product_id", &self.product_id)
            .field("properties", &self.properties)
            .finish_non_exhaustive()
    }
}

impl DownloadResponse {
    /// Snapshot of the lifecycle state and caching flags
    pub fn state(&self) -> TransferState {
        self.shared.state()
    }

    /// The most recent attempt outcome, if any
    pub fn outcome(&self) -> Option<TransferOutcome> {
        self.shared.outcome()
    }

    /// Bytes read from the source so far, across attempts
    pub fn bytes_transferred(&self) -> u64 {
        self.shared.bytes_read()
    }
}

/// Entry point for reliable product downloads
pub struct ProductDownloader {
    config: DownloadConfig,
    store: Option<Arc<dyn CacheStore>>,
    event_tx: Option<mpsc::Sender<DownloadEvent>>,
}

impl ProductDownloader {
    /// Create a downloader with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError::Configuration` for invalid settings.
    pub fn new(config: DownloadConfig) -> DownloadResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            store: None,
            event_tx: None,
        })
    }

    /// Attach a cache store. Without one, `cache_enabled` is ignored.
    pub fn with_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Open the lifecycle event channel and return its receiving end.
    ///
    /// Publishing is best-effort: a receiver that falls behind loses
    /// events, it never slows the pipeline down.
    pub fn event_channel(&mut self) -> mpsc::Receiver<DownloadEvent> {
        let (tx, rx) = mpsc::channel(self.config.event_buffer_size);
        self.event_tx = Some(tx);
        rx
    }

    /// The active configuration
    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// Start downloading a product and return its client stream.
    ///
    /// Returns once the transfer has produced its first chunk or reached a
    /// terminal outcome, bounded by `start_wait_timeout`; a producer slower
    /// than the bound does not block this call, stall detection is the
    /// monitor's job from then on.
    ///
    /// # Errors
    ///
    /// Fails fast on a blank product id and propagates retriever failures
    /// as setup errors. Failures after setup are reported through the
    /// stream and the lifecycle state instead.
    pub async fn download(
        &self,
        product_id: &str,
        retriever: Arc<dyn Retriever>,
    ) -> DownloadResult<DownloadResponse> {
        if product_id.trim().is_empty() {
            return Err(DownloadError::InvalidProductId);
        }

        let events = match &self.event_tx {
            Some(tx) => EventSink::new(product_id, tx.clone()),
            None => EventSink::disabled(),
        };

        info!("Starting download of {}", product_id);
        let retrieved = retriever.retrieve().await?;

        let mut cache_enabled = self.config.cache_enabled && self.store.is_some();
        if self.config.cache_enabled && self.store.is_none() {
            warn!("Caching requested but no cache store attached; continuing without");
        }

        let mut cache_sink = None;
        if cache_enabled {
            if let Some(store) = &self.store {
                match store.open_sink(product_id).await {
                    Ok(sink) => cache_sink = Some(sink),
                    Err(e) => {
                        // A cache problem must not stop delivery to the client.
                        warn!("Could not open cache sink for {}: {}", product_id, e);
                        cache_enabled = false;
                    }
                }
            }
        }

        let state = TransferState::new(cache_enabled, self.config.continue_caching_on_cancel);
        let shared = Arc::new(TransferShared::new(
            state,
            SpoolBuffer::new(self.config.spool_memory_limit),
            cache_sink,
        ));
        let stream = ProductStream::new(shared.clone(), self.config.stream_poll_interval);
        shared.set_lifecycle(DownloadLifecycle::InProgress);

        let supervisor = Supervisor {
            config: self.config.clone(),
            shared: shared.clone(),
            retriever,
            store: self.store.clone(),
            events: events.clone(),
            product_id: product_id.to_string(),
        };
        tokio::spawn(supervisor.run(retrieved.source));

        self.wait_for_start(&shared).await;
        events.publish(DownloadEventKind::Started);

        Ok(DownloadResponse {
            product_id: product_id.to_string(),
            properties: retrieved.properties,
            stream,
            shared,
        })
    }

    /// Block until the first chunk (or a terminal outcome) has landed,
    /// bounded by the configured handshake timeout.
    async fn wait_for_start(&self, shared: &Arc<TransferShared>) {
        let deadline = Instant::now() + self.config.start_wait_timeout;
        while !shared.is_started() {
            if Instant::now() >= deadline {
                debug!(
                    "No first chunk within {:?}, returning stream anyway",
                    self.config.start_wait_timeout
                );
                return;
            }
            tokio::time::sleep(stream_constants::START_POLL_INTERVAL).await;
        }
    }
}

/// Per-download task sequencing attempts and applying the retry policy
struct Supervisor {
    config: DownloadConfig,
    shared: Arc<TransferShared>,
    retriever: Arc<dyn Retriever>,
    store: Option<Arc<dyn CacheStore>>,
    events: EventSink,
    product_id: String,
}

impl Supervisor {
    async fn run(self, first_source: ProductSource) {
        let mut source = Some(first_source);
        let mut retries_used: u32 = 0;

        loop {
            let outcome = self
                .run_attempt(source.take().expect("source prepared for attempt"))
                .await;

            match outcome.reason {
                TerminalReason::Complete => {
                    self.finish_complete(&outcome).await;
                    return;
                }
                TerminalReason::Canceled => {
                    self.finish_canceled(&outcome).await;
                    return;
                }
                TerminalReason::ClientSinkError => {
                    // Nothing left to deliver into; retrying cannot help.
                    self.finish_failed(&outcome).await;
                    return;
                }
                TerminalReason::Interrupted
                | TerminalReason::SourceReadError
                | TerminalReason::CacheSinkError => {
                    if outcome.reason == TerminalReason::CacheSinkError {
                        self.drop_broken_cache().await;
                    }

                    match self.prepare_retry(&outcome, &mut retries_used).await {
                        Some(next_source) => {
                            self.shared.clear_outcome_for_retry();
                            source = Some(next_source);
                        }
                        None => {
                            if self.shared.is_cancel_requested() {
                                self.finish_canceled(&outcome).await;
                            } else {
                                self.finish_failed(&outcome).await;
                            }
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Run one transfer attempt to its outcome
    async fn run_attempt(&self, source: ProductSource) -> TransferOutcome {
        let resume_from = self.shared.bytes_read();
        let worker = TransferWorker::new(source, self.shared.clone(), self.config.chunk_size)
            .with_initial_bytes(resume_from);

        let handle = tokio::spawn(worker.run());
        self.shared.set_worker_abort(handle.abort_handle());

        let monitor = StallMonitor::new(
            self.shared.clone(),
            self.config.monitor_period,
            self.config.monitor_initial_delay,
            self.events.clone(),
        )
        .spawn();

        let outcome = match handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                // The task was aborted by the monitor or the client; the
                // manufactured outcome recorded at request time carries the
                // lifecycle-consistent reason.
                self.shared.outcome().unwrap_or_else(|| {
                    TransferOutcome::new(
                        self.shared.bytes_read(),
                        TerminalReason::SourceReadError,
                        Some(format!("worker task ended abnormally: {}", e)),
                    )
                })
            }
        };
        monitor.abort();

        self.shared.record_outcome(outcome.clone());
        outcome
    }

    /// Sleep, re-open the source and skip to the resume point.
    ///
    /// Burns one retry per iteration, including failed re-retrievals.
    /// Returns `None` when the budget is exhausted or the client canceled.
    async fn prepare_retry(
        &self,
        outcome: &TransferOutcome,
        retries_used: &mut u32,
    ) -> Option<ProductSource> {
        loop {
            *retries_used += 1;
            if *retries_used > self.config.max_retry_attempts {
                return None;
            }

            self.events.publish(DownloadEventKind::AttemptFailed {
                attempt: *retries_used,
                reason: format!("{:?}", outcome.reason),
                message: outcome.message.clone(),
            });
            info!(
                "Retrying {} (attempt {}/{}) in {:?}",
                self.product_id, retries_used, self.config.max_retry_attempts, self.config.retry_delay
            );
            tokio::time::sleep(self.config.retry_delay).await;

            if self.shared.is_cancel_requested() {
                debug!("Client canceled {} during retry delay", self.product_id);
                return None;
            }

            let resume_from = self.shared.bytes_read();
            match self.reopen_source(resume_from).await {
                Ok(source) => {
                    self.events.publish(DownloadEventKind::Retrying {
                        attempt: *retries_used,
                        resume_from,
                    });
                    return Some(source);
                }
                Err(e) => {
                    warn!("Re-retrieval of {} failed: {}", self.product_id, e);
                }
            }
        }
    }

    /// Open a fresh source stream and discard the bytes already delivered
    async fn reopen_source(&self, skip: u64) -> RetrieveResult<ProductSource> {
        let retrieved = self.retriever.retrieve().await?;
        if skip == 0 {
            return Ok(retrieved.source);
        }

        let mut limited = retrieved.source.take(skip);
        let skipped = tokio::io::copy(&mut limited, &mut tokio::io::sink()).await?;
        if skipped < skip {
            return Err(RetrieveError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!(
                    "source ended at {} bytes, before the resume point at {}",
                    skipped, skip
                ),
            )));
        }
        debug!("Skipped {} already-delivered bytes", skipped);
        Ok(limited.into_inner())
    }

    /// Take the cache sink out of rotation and drop the partial temp entry
    async fn drop_broken_cache(&self) {
        self.shared.disable_caching();
        self.shared.lock_sinks().await.cache.take();
        if let Some(store) = &self.store {
            if let Err(e) = store.discard(&self.product_id).await {
                warn!("Could not discard cache entry for {}: {}", self.product_id, e);
            }
        }
        warn!(
            "Caching disabled for the remainder of {} after a cache sink failure",
            self.product_id
        );
    }

    async fn finish_complete(&self, outcome: &TransferOutcome) {
        let cache = self.shared.lock_sinks().await.cache.take();
        if let Some(mut sink) = cache {
            if let Err(e) = sink.shutdown().await {
                warn!("Cache sink shutdown failed for {}: {}", self.product_id, e);
            }
            if let Some(store) = &self.store {
                match store.commit(&self.product_id).await {
                    Ok(()) => info!("Cache entry committed for {}", self.product_id),
                    Err(e) => warn!("Cache commit failed for {}: {}", self.product_id, e),
                }
            }
        }

        self.shared.set_lifecycle(DownloadLifecycle::Completed);
        info!(
            "Download of {} complete ({} bytes)",
            self.product_id, outcome.bytes_transferred
        );
        self.events.publish(DownloadEventKind::Completed {
            bytes_transferred: outcome.bytes_transferred,
        });
    }

    async fn finish_canceled(&self, outcome: &TransferOutcome) {
        self.discard_pending_cache().await;
        self.shared.set_lifecycle(DownloadLifecycle::Canceled);
        info!(
            "Download of {} canceled by the client after {} bytes",
            self.product_id, outcome.bytes_transferred
        );
        self.events.publish(DownloadEventKind::Canceled {
            bytes_transferred: outcome.bytes_transferred,
        });
    }

    async fn finish_failed(&self, outcome: &TransferOutcome) {
        self.discard_pending_cache().await;
        self.shared.set_lifecycle(DownloadLifecycle::Failed);
        warn!(
            "Download of {} failed after {} bytes: {:?}",
            self.product_id, outcome.bytes_transferred, outcome.reason
        );
        self.events.publish(DownloadEventKind::Failed {
            bytes_transferred: outcome.bytes_transferred,
            message: outcome.message.clone(),
        });
    }

    async fn discard_pending_cache(&self) {
        let had_sink = self.shared.lock_sinks().await.cache.take().is_some();
        if let Some(store) = &self.store {
            if had_sink || self.shared.state().cache_enabled {
                if let Err(e) = store.discard(&self.product_id).await {
                    warn!("Could not discard cache entry for {}: {}", self.product_id, e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Retriever yielding an in-memory payload, counting invocations
    struct StaticRetriever {
        payload: Vec<u8>,
        calls: AtomicU32,
    }

    impl StaticRetriever {
        fn new(payload: Vec<u8>) -> Self {
            Self {
                payload,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl Retriever for StaticRetriever {
        async fn retrieve(&self) -> RetrieveResult<crate::app::retriever::RetrievedProduct> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(crate::app::retriever::RetrievedProduct {
                source: Box::new(std::io::Cursor::new(self.payload.clone())),
                properties: HashMap::new(),
            })
        }
    }

    /// Retriever that always fails with NotFound
    struct MissingRetriever;

    #[async_trait]
    impl Retriever for MissingRetriever {
        async fn retrieve(&self) -> RetrieveResult<crate::app::retriever::RetrievedProduct> {
            Err(RetrieveError::NotFound {
                resource: "missing".to_string(),
            })
        }
    }

    /// Test fail-fast validation of the product id
    #[tokio::test]
    async fn test_blank_product_id_fails_fast() {
        let downloader = ProductDownloader::new(ConfigPresets::testing()).unwrap();
        let retriever = Arc::new(StaticRetriever::new(vec![0u8; 10]));

        let result = downloader.download("   ", retriever.clone()).await;
        assert!(matches!(result, Err(DownloadError::InvalidProductId)));
        // Nothing was retrieved
        assert_eq!(retriever.calls.load(Ordering::SeqCst), 0);
    }

    /// Test retriever failures surface synchronously as setup errors
    #[tokio::test]
    async fn test_retriever_failure_is_setup_error() {
        let downloader = ProductDownloader::new(ConfigPresets::testing()).unwrap();
        let result = downloader
            .download("product-1", Arc::new(MissingRetriever))
            .await;
        assert!(matches!(
            result,
            Err(DownloadError::Setup(RetrieveError::NotFound { .. }))
        ));
    }

    /// Test the started handshake: a ready payload means the response
    /// arrives with bytes already produced
    #[tokio::test]
    async fn test_started_handshake() {
        let downloader = ProductDownloader::new(ConfigPresets::testing()).unwrap();
        let retriever = Arc::new(StaticRetriever::new(vec![7u8; 2000]));

        let mut response = downloader.download("product-1", retriever).await.unwrap();
        assert!(response.bytes_transferred() > 0);

        let mut out = Vec::new();
        response.stream.read_to_end(&mut out).await.unwrap();
        assert_eq!(out.len(), 2000);
        response.stream.close().await;
    }

    /// Test invalid configuration is rejected at construction
    #[test]
    fn test_invalid_config_rejected() {
        let config = DownloadConfigBuilder::new().chunk_size(0).build_unchecked();
        assert!(matches!(
            ProductDownloader::new(config),
            Err(DownloadError::Configuration { .. })
        ));
    }
}
