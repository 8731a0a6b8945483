//! Spool Fetcher Library
//!
//! A Rust library for streaming a large, potentially slow or unreliable
//! remote resource to exactly one client while optionally persisting a copy
//! to a local cache. Retrieval and consumption are decoupled through a
//! spill-to-disk buffer, a watchdog cancels stalled transfers, and failed
//! attempts are retried with resume.

pub mod app;
pub mod cli;
pub mod constants;
pub mod errors;
pub mod prelude;

// Re-export commonly used types for convenience
pub use errors::{AppError, Result};
