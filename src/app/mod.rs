//! Core pipeline logic for Spool Fetcher
//!
//! This module contains the reliable-download pipeline: the spool buffer,
//! transfer worker, client stream, stall monitor and orchestrator, together
//! with the retriever and cache-store collaborator contracts.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use spool_fetcher::app::{ConfigPresets, HttpRetriever, ProductDownloader};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let downloader = ProductDownloader::new(ConfigPresets::production())?;
//! let retriever = Arc::new(HttpRetriever::new("https://example.com/big-file.bin")?);
//!
//! let mut response = downloader.download("big-file", retriever).await?;
//!
//! let mut buf = vec![0u8; 64 * 1024];
//! loop {
//!     let n = response.stream.read(&mut buf).await?;
//!     if n == 0 {
//!         break;
//!     }
//!     // consume &buf[..n] while the worker keeps producing
//! }
//! response.stream.close().await;
//! # Ok(())
//! # }
//! ```

pub mod events;
pub mod orchestrator;
pub mod retriever;
pub mod spool;
pub mod store;
pub mod stream;
pub mod transfer;

// Re-export main public API
pub use events::{DownloadEvent, DownloadEventKind, EventSink};
pub use orchestrator::{
    ConfigPresets, DownloadConfig, DownloadConfigBuilder, DownloadResponse, ProductDownloader,
};
pub use retriever::{HttpRetriever, RetrievedProduct, Retriever};
pub use spool::SpoolBuffer;
pub use store::{CacheStore, DirCacheStore};
pub use stream::ProductStream;
pub use transfer::{
    DownloadLifecycle, StallMonitor, TerminalReason, TransferOutcome, TransferShared,
    TransferState, TransferWorker,
};
