//! Spool Fetcher CLI application
//!
//! Command-line interface for streaming a single remote resource to a file
//! or stdout through the reliable download pipeline, with stall detection,
//! resumable retries and optional local caching.

use std::process;

use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use spool_fetcher::cli::{handle_fetch, Cli};
use spool_fetcher::errors::Result;

#[tokio::main]
async fn main() {
    let result = run().await;

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Main application logic
async fn run() -> Result<()> {
    let cli = Cli::parse_args();

    init_logging(&cli);

    info!("Spool Fetcher v{} starting", env!("CARGO_PKG_VERSION"));

    handle_fetch(cli).await
}

/// Initialize logging based on CLI verbosity settings
fn init_logging(cli: &Cli) {
    let log_level = cli.log_level();

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("spool_fetcher={}", log_level).parse().unwrap());

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
