//! Prelude module for Spool Fetcher Library
//!
//! This module re-exports the most commonly used items from the library,
//! providing a convenient way to import everything needed for typical usage
//! with a single `use spool_fetcher::prelude::*;` statement.
//!
//! # Usage
//!
//! ```rust,no_run
//! use spool_fetcher::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let downloader = ProductDownloader::new(DownloadConfig::default())?;
//!     let retriever = Arc::new(HttpRetriever::new("https://example.com/data.bin")?);
//!
//!     let mut response = downloader.download("data", retriever).await?;
//!     let mut out = Vec::new();
//!     response.stream.read_to_end(&mut out).await?;
//!     response.stream.close().await;
//!     Ok(())
//! }
//! ```

// Core result types
pub use crate::errors::{AppError, Result};

// Essential app components that are used in most integrations
pub use crate::app::{
    CacheStore,
    ConfigPresets,

    DirCacheStore,
    // Configuration
    DownloadConfig,
    DownloadConfigBuilder,
    // Lifecycle and status types
    DownloadEvent,
    DownloadEventKind,
    DownloadLifecycle,
    DownloadResponse,

    HttpRetriever,
    // Core orchestration
    ProductDownloader,
    ProductStream,

    RetrievedProduct,
    // Collaborator contracts
    Retriever,
    TerminalReason,
    TransferOutcome,
};

// Commonly used constants
pub use crate::constants::{DEFAULT_CHUNK_SIZE, DELAY_BETWEEN_ATTEMPTS, MAX_RETRY_ATTEMPTS};

// Standard library re-exports that are commonly needed
pub use std::path::{Path, PathBuf};
pub use std::sync::Arc;

// Common external crate re-exports for convenience
pub use tokio;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prelude_imports() {
        // Verify that all essential types are available through prelude
        let _config = DownloadConfig::default();
        let _builder = DownloadConfigBuilder::new();
        let _preset = ConfigPresets::testing();

        // Test that constants are available
        assert_eq!(MAX_RETRY_ATTEMPTS, 3);
        assert!(DEFAULT_CHUNK_SIZE > 0);
    }

    #[test]
    fn test_std_reexports() {
        // Test that standard library re-exports work
        let _path = PathBuf::from("/tmp/test");

        // Arc should be available for shared ownership patterns
        let data = Arc::new(42);
        assert_eq!(*data, 42);
    }
}
