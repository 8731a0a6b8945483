//! Command-line interface for Spool Fetcher
//!
//! Wires the argument surface to the download pipeline: builds the
//! configuration, the HTTP retriever and the optional directory cache
//! store, then pumps the client stream into the destination while the
//! progress display consumes lifecycle events.

pub mod args;
pub mod progress;

pub use args::Cli;
pub use progress::spawn_progress_display;

use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::app::{
    DirCacheStore, DownloadConfigBuilder, HttpRetriever, ProductDownloader,
};
use crate::errors::{AppError, Result};

/// Execute the fetch described by the CLI arguments
pub async fn handle_fetch(cli: Cli) -> Result<()> {
    let config = DownloadConfigBuilder::new()
        .max_retry_attempts(cli.retries)
        .retry_delay(Duration::from_secs(cli.retry_delay))
        .monitor_period(Duration::from_secs(cli.monitor_period))
        .chunk_size(cli.chunk_size)
        .cache_enabled(cli.cache_dir.is_some())
        .continue_caching_on_cancel(cli.cache_on_cancel)
        .build()?;

    let mut downloader = ProductDownloader::new(config)?;

    if let Some(cache_dir) = &cli.cache_dir {
        let store = DirCacheStore::new(cache_dir.clone()).await?;
        downloader = downloader.with_store(Arc::new(store));
    }

    let events = downloader.event_channel();

    let product_id = cli.resolved_product_id();
    let retriever = Arc::new(HttpRetriever::new(&cli.url).map_err(AppError::Retrieve)?);

    let mut response = downloader
        .download(&product_id, retriever)
        .await
        .map_err(AppError::Download)?;

    let content_length = response
        .properties
        .get(crate::constants::http::PROP_CONTENT_LENGTH)
        .and_then(|v| v.parse().ok());

    let display = if cli.quiet {
        drop(events);
        None
    } else {
        Some(spawn_progress_display(events, content_length))
    };

    let copied = match &cli.output {
        Some(path) => {
            let mut file = tokio::fs::File::create(path).await?;
            let n = copy_stream(&mut response, &mut file).await?;
            file.flush().await?;
            n
        }
        None => {
            let mut stdout = tokio::io::stdout();
            let n = copy_stream(&mut response, &mut stdout).await?;
            stdout.flush().await?;
            n
        }
    };

    response.stream.close().await;
    if let Some(display) = display {
        let _ = display.await;
    }

    info!("Fetched {} ({} bytes)", product_id, copied);
    Ok(())
}

/// Pump the client stream into the destination until end-of-stream
async fn copy_stream<W>(
    response: &mut crate::app::DownloadResponse,
    dest: &mut W,
) -> Result<u64>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; 64 * 1024];
    let mut total = 0u64;
    loop {
        let n = response.stream.read(&mut buf).await?;
        if n == 0 {
            return Ok(total);
        }
        dest.write_all(&buf[..n]).await?;
        total += n as u64;
    }
}
