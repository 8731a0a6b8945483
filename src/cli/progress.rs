//! Progress display for the fetch command
//!
//! Renders a single indicatif bar (or a byte spinner when the server did
//! not announce a content length) from the download event channel. The
//! display is an observer: it consumes best-effort events and never feeds
//! anything back into the pipeline.

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::app::{DownloadEvent, DownloadEventKind};

/// Spawn a task that drives a progress bar from download events.
///
/// The task ends when the channel closes or a terminal event arrives.
pub fn spawn_progress_display(
    mut rx: mpsc::Receiver<DownloadEvent>,
    total_bytes: Option<u64>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let bar = match total_bytes {
            Some(total) => {
                let bar = ProgressBar::new(total);
                bar.set_style(
                    ProgressStyle::with_template(
                        "{bar:40.cyan/blue} {bytes}/{total_bytes} ({bytes_per_sec}, {eta}) {msg}",
                    )
                    .expect("valid progress template")
                    .progress_chars("=>-"),
                );
                bar
            }
            None => {
                let bar = ProgressBar::new_spinner();
                bar.set_style(
                    ProgressStyle::with_template("{spinner} {bytes} ({bytes_per_sec}) {msg}")
                        .expect("valid progress template"),
                );
                bar
            }
        };

        while let Some(event) = rx.recv().await {
            match event.kind {
                DownloadEventKind::Started => {
                    bar.set_message("downloading");
                }
                DownloadEventKind::Progress {
                    bytes_transferred, ..
                } => {
                    bar.set_position(bytes_transferred);
                }
                DownloadEventKind::Stalled { bytes_transferred } => {
                    bar.set_position(bytes_transferred);
                    bar.set_message("stalled, canceling attempt");
                }
                DownloadEventKind::AttemptFailed { attempt, .. } => {
                    bar.set_message(format!("attempt {} failed", attempt));
                }
                DownloadEventKind::Retrying {
                    attempt,
                    resume_from,
                } => {
                    bar.set_position(resume_from);
                    bar.set_message(format!("retrying (attempt {})", attempt));
                }
                DownloadEventKind::Completed { bytes_transferred } => {
                    bar.set_position(bytes_transferred);
                    bar.finish_with_message("done");
                    break;
                }
                DownloadEventKind::Canceled { .. } => {
                    bar.abandon_with_message("canceled");
                    break;
                }
                DownloadEventKind::Failed { message, .. } => {
                    let detail = message.unwrap_or_else(|| "download failed".to_string());
                    bar.abandon_with_message(detail);
                    break;
                }
            }
        }
    })
}
