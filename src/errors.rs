//! Error types for Spool Fetcher
//!
//! This module defines error types for all components of the crate.
//! Errors are designed to be actionable and provide clear context for
//! debugging and user feedback.

use std::path::PathBuf;
use thiserror::Error;

/// Errors reported by a [`Retriever`](crate::app::Retriever) implementation
///
/// The download orchestrator translates every variant into a setup failure:
/// nothing is spawned and the caller sees the error synchronously.
#[derive(Error, Debug)]
pub enum RetrieveError {
    /// The requested product does not exist at the source
    #[error("Product not found: {resource}")]
    NotFound { resource: String },

    /// The source location uses a scheme or mechanism this retriever cannot serve
    #[error("Retrieval not supported for: {resource}")]
    NotSupported { resource: String },

    /// The upstream server answered with a non-success status
    #[error("Upstream server error: HTTP {status}")]
    Upstream { status: u16 },

    /// HTTP transport failure while opening the source stream
    #[error("HTTP request failed during retrieval")]
    Http(#[from] reqwest::Error),

    /// Invalid source location
    #[error("Invalid source URL: {url} - {reason}")]
    InvalidUrl { url: String, reason: String },

    /// I/O error while opening the source stream
    #[error("I/O error during retrieval")]
    Io(#[from] std::io::Error),
}

/// Cache store errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// Cache root not found or inaccessible
    #[error("Cache directory not accessible: {path}")]
    DirectoryNotAccessible { path: PathBuf },

    /// A commit was requested for a product with no open sink
    #[error("No pending cache entry to commit for: {product_id}")]
    NothingToCommit { product_id: String },

    /// Atomic rename from the temp sink to the final path failed
    #[error("Atomic cache commit failed: could not rename {temp_path} to {final_path}")]
    CommitFailed {
        temp_path: PathBuf,
        final_path: PathBuf,
    },

    /// I/O error during cache file operations
    #[error("Cache file I/O error")]
    Io(#[from] std::io::Error),
}

/// Download orchestration errors
///
/// These are the synchronous failures of `download()` itself. Failures of a
/// running transfer are never surfaced this way; they drive the retry policy
/// and eventually the `Failed` lifecycle state observed by the client stream.
#[derive(Error, Debug)]
pub enum DownloadError {
    /// The product identifier was empty or blank
    #[error("Product id must not be blank")]
    InvalidProductId,

    /// Invalid configuration value
    #[error("Invalid download configuration: {message}")]
    Configuration { message: String },

    /// The retriever failed to open the source stream
    #[error("Download setup failed")]
    Setup(#[from] RetrieveError),
}

/// Top-level application error that can represent any error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Retriever error
    #[error(transparent)]
    Retrieve(#[from] RetrieveError),

    /// Download orchestration error
    #[error(transparent)]
    Download(#[from] DownloadError),

    /// Cache store error
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Generic I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Generic application error with context
    #[error("Application error: {message}")]
    Generic { message: String },
}

impl AppError {
    /// Create a generic application error with a message
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    /// Check if the error is recoverable (transient)
    pub fn is_recoverable(&self) -> bool {
        match self {
            AppError::Retrieve(RetrieveError::Http(_))
            | AppError::Retrieve(RetrieveError::Upstream { .. })
            | AppError::Retrieve(RetrieveError::Io(_))
            | AppError::Download(DownloadError::Setup(RetrieveError::Http(_)))
            | AppError::Download(DownloadError::Setup(RetrieveError::Upstream { .. })) => true,

            AppError::Retrieve(RetrieveError::NotFound { .. })
            | AppError::Retrieve(RetrieveError::NotSupported { .. })
            | AppError::Download(DownloadError::InvalidProductId)
            | AppError::Download(DownloadError::Configuration { .. }) => false,

            _ => false,
        }
    }

    /// Get error category for logging and metrics
    pub fn category(&self) -> &'static str {
        match self {
            AppError::Retrieve(_) => "retrieve",
            AppError::Download(_) => "download",
            AppError::Store(_) => "store",
            AppError::Io(_) => "io",
            AppError::Generic { .. } => "generic",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;

/// Retriever result type alias
pub type RetrieveResult<T> = std::result::Result<T, RetrieveError>;

/// Cache store result type alias
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Download orchestration result type alias
pub type DownloadResult<T> = std::result::Result<T, DownloadError>;
