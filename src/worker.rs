//! Orchestrator internals: the bounded worker pool that fetches threads
//! concurrently and flushes them to the archive in discovery order.
//!
//! This module is internal -- users drive it through
//! [`Archiver`](crate::Archiver).

use std::collections::BTreeMap;

use futures::StreamExt;
use tokio::sync::watch;

use crate::assembler;
use crate::error::Result;
use crate::fetcher::Fetcher;
use crate::mbox::MboxWriter;
use crate::model::{FailedThread, RunSummary, ThreadArchive, ThreadListing};
use crate::render::Renderer;

/// Fetch every listed thread with at most `concurrency` in flight, and
/// append completed threads to `writer` in discovery order.
///
/// Completion order never leaks into the archive: results are buffered by
/// discovery index and flushed as a contiguous prefix. Per-thread failures
/// land in the summary; only writer I/O errors propagate.
pub(crate) async fn archive_threads<R: Renderer>(
    fetcher: &Fetcher<R>,
    listings: Vec<ThreadListing>,
    concurrency: usize,
    cancel: watch::Receiver<bool>,
    writer: &mut MboxWriter,
) -> Result<RunSummary> {
    let mut results = futures::stream::iter(listings.into_iter().enumerate())
        .map(|(index, listing)| {
            let cancel = cancel.clone();
            async move {
                if *cancel.borrow() {
                    return (
                        index,
                        Err(FailedThread {
                            thread_id: listing.thread_id.clone(),
                            thread_url: listing.thread_url,
                            cause: "cancelled before fetch".into(),
                        }),
                    );
                }
                tracing::info!(thread = %listing.thread_id, url = %listing.thread_url, "fetching thread");
                (
                    index,
                    assembler::collect_thread(fetcher, listing, &cancel).await,
                )
            }
        })
        .buffer_unordered(concurrency.max(1));

    let mut summary = RunSummary::default();
    let mut pending: BTreeMap<usize, std::result::Result<ThreadArchive, FailedThread>> =
        BTreeMap::new();
    let mut next_to_flush = 0usize;

    while let Some((index, result)) = results.next().await {
        pending.insert(index, result);
        while let Some(result) = pending.remove(&next_to_flush) {
            flush(result, writer, &mut summary).await?;
            next_to_flush += 1;
        }
    }
    Ok(summary)
}

async fn flush(
    result: std::result::Result<ThreadArchive, FailedThread>,
    writer: &mut MboxWriter,
    summary: &mut RunSummary,
) -> Result<()> {
    match result {
        Ok(thread) => {
            summary.messages_written += writer.write_thread(&thread).await?;
            summary.threads_archived += 1;
        }
        Err(failed) => {
            tracing::error!(thread = %failed.thread_id, cause = %failed.cause, "thread skipped");
            summary.failed.push(failed);
        }
    }
    Ok(())
}
