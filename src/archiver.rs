//! The [`Archiver`]: public entry points for archiving a whole group or a
//! single thread, plus cooperative cancellation.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::watch;
use url::Url;

use crate::assembler;
use crate::error::Result;
use crate::fetcher::Fetcher;
use crate::mbox::MboxWriter;
use crate::model::{RunSummary, TextFormat, ThreadListing};
use crate::render::Renderer;
use crate::worker;

/// Cloneable handle for interrupting a run from another task.
///
/// Cancelling stops new fetches from being issued; in-flight fetches
/// finish or time out, buffered complete threads are flushed, and the
/// archive is closed cleanly.
#[derive(Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Orchestrates the fetch -> parse -> assemble -> format pipeline.
///
/// Built via [`ArchiverBuilder`](crate::ArchiverBuilder). The two entry
/// points are mutually exclusive per run: [`archive_group`](Self::archive_group)
/// for a listing URL, [`archive_thread`](Self::archive_thread) for one
/// thread URL.
pub struct Archiver<R: Renderer> {
    pub(crate) fetcher: Fetcher<R>,
    pub(crate) concurrency: usize,
    pub(crate) thread_limit: Option<usize>,
    pub(crate) text_format: TextFormat,
    pub(crate) domain: String,
    pub(crate) cancel: Arc<watch::Sender<bool>>,
}

impl<R: Renderer> Archiver<R> {
    /// Handle for interrupting this archiver's runs.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tx: self.cancel.clone(),
        }
    }

    /// Archive every thread of the group behind `group_url` into the mbox
    /// file at `output`.
    ///
    /// The run completes with a summary even when individual threads fail;
    /// only an unusable URL or archive-file I/O aborts it.
    pub async fn archive_group(&self, group_url: &str, output: &Path) -> Result<RunSummary> {
        let url = Url::parse(group_url)?;
        let to_addr = group_address(&url);
        let mut writer =
            MboxWriter::create(output, self.text_format, self.domain.clone(), to_addr).await?;

        let cancel_rx = self.cancel.subscribe();
        let listings =
            assembler::list_threads(&self.fetcher, &url, self.thread_limit, &cancel_rx).await;
        tracing::info!(threads = listings.len(), "listing complete");

        let summary = worker::archive_threads(
            &self.fetcher,
            listings,
            self.concurrency,
            cancel_rx,
            &mut writer,
        )
        .await?;
        writer.finish().await?;
        log_summary(&summary, output);
        Ok(summary)
    }

    /// Archive the single thread behind `thread_url` into the mbox file at
    /// `output`.
    pub async fn archive_thread(&self, thread_url: &str, output: &Path) -> Result<RunSummary> {
        let url = Url::parse(thread_url)?;
        let to_addr = format!("thread@{}", url.host_str().unwrap_or("invalid.local"));
        let mut writer =
            MboxWriter::create(output, self.text_format, self.domain.clone(), to_addr).await?;

        let listing = ThreadListing {
            thread_id: thread_id_from_url(&url),
            thread_url: url.to_string(),
        };
        let summary = worker::archive_threads(
            &self.fetcher,
            vec![listing],
            1,
            self.cancel.subscribe(),
            &mut writer,
        )
        .await?;
        writer.finish().await?;
        log_summary(&summary, output);
        Ok(summary)
    }
}

fn log_summary(summary: &RunSummary, output: &Path) {
    tracing::info!(
        archived = summary.threads_archived,
        messages = summary.messages_written,
        failed = summary.failed.len(),
        output = %output.display(),
        "run complete"
    );
    for failed in &summary.failed {
        tracing::warn!(thread = %failed.thread_id, url = %failed.thread_url,
            cause = %failed.cause, "skipped thread");
    }
}

/// Group address for the `To` header: `{group}@{host}`, with the group
/// name taken from the path segment after `/g/` when present.
fn group_address(url: &Url) -> String {
    let host = url.host_str().unwrap_or("invalid.local");
    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|p| !p.is_empty()).collect())
        .unwrap_or_default();
    let name = segments
        .iter()
        .position(|s| *s == "g")
        .and_then(|i| segments.get(i + 1).copied())
        .or_else(|| segments.last().copied())
        .unwrap_or("group");
    format!("{name}@{host}")
}

/// Thread id from a thread URL: the segment after `/c/`, else the last
/// path segment.
fn thread_id_from_url(url: &Url) -> String {
    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|p| !p.is_empty()).collect())
        .unwrap_or_default();
    segments
        .iter()
        .position(|s| *s == "c")
        .and_then(|i| segments.get(i + 1).copied())
        .or_else(|| segments.last().copied())
        .unwrap_or("thread")
        .to_string()
}
