//! Command-line argument parsing for Spool Fetcher
//!
//! This module defines the CLI structure using clap derive macros. The
//! binary does one thing: fetch a URL through the reliable pipeline and
//! stream it to a file or stdout, optionally keeping a cached copy.

use std::path::PathBuf;

use clap::Parser;

/// Spool Fetcher - stream a remote resource reliably
#[derive(Parser, Debug)]
#[command(
    name = "spool_fetcher",
    version,
    about = "Stream a remote resource to a file or stdout with stall detection and resumable retries",
    long_about = "Fetches a single remote resource through a buffered, watchdog-protected pipeline.
Bytes are delivered to the destination while the transfer is still running; stalled
connections are detected and retried with resume, and a copy can be kept in a local cache."
)]
pub struct Cli {
    /// URL of the resource to fetch
    pub url: String,

    /// Write the resource to this file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Keep a cached copy under this directory
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Cache entry identifier (defaults to the last URL path segment)
    #[arg(long)]
    pub product_id: Option<String>,

    /// Finish filling the cache even if the local consumer stops early
    #[arg(long)]
    pub cache_on_cancel: bool,

    /// Maximum retry attempts after a failed transfer attempt
    #[arg(long, default_value_t = 3)]
    pub retries: u32,

    /// Seconds to wait between retry attempts
    #[arg(long, default_value_t = 10, value_name = "SECS")]
    pub retry_delay: u64,

    /// Seconds between stall watchdog checks
    #[arg(long, default_value_t = 5, value_name = "SECS")]
    pub monitor_period: u64,

    /// Transfer chunk size in bytes
    #[arg(long, default_value_t = 1024 * 1024)]
    pub chunk_size: usize,

    /// Suppress the progress display
    #[arg(short, long)]
    pub quiet: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Very verbose logging (debug level)
    #[arg(long)]
    pub very_verbose: bool,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Logging level derived from the verbosity flags
    pub fn log_level(&self) -> &'static str {
        if self.very_verbose {
            "debug"
        } else if self.verbose {
            "info"
        } else {
            "warn"
        }
    }

    /// Cache entry identifier: explicit flag or the last URL path segment
    pub fn resolved_product_id(&self) -> String {
        if let Some(id) = &self.product_id {
            return id.clone();
        }
        self.url
            .rsplit('/')
            .find(|segment| !segment.is_empty())
            .unwrap_or(&self.url)
            .to_string()
    }
}
