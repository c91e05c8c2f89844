//! # mbox_archiver
//!
//! Archives a threaded web discussion forum into a single portable mbox
//! file, preserving thread lineage.
//!
//! ## Overview
//!
//! The pipeline runs strictly forward: a retrying [`Fetcher`] pulls fully
//! rendered pages through an injected [`Renderer`] capability, the payload
//! parser recovers messages from the forum's embedded-JSON data blocks
//! with schema-tolerant shape discovery, the assembler walks listing and
//! thread pagination, and the mailbox formatter appends each thread to the
//! archive in discovery order. A bounded worker pool fetches threads
//! concurrently; per-thread failures are collected in the [`RunSummary`]
//! instead of aborting the run.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use mbox_archiver::{ArchiverBuilder, Renderer, RenderError, WaitHints};
//!
//! // Production renderers drive a browser-automation engine; this one
//! // just returns canned HTML.
//! struct Canned;
//!
//! impl Renderer for Canned {
//!     async fn render(&self, _url: &str, _hints: &WaitHints) -> Result<String, RenderError> {
//!         Ok("<html></html>".to_string())
//!     }
//! }
//!
//! # async fn example() -> mbox_archiver::Result<()> {
//! let archiver = ArchiverBuilder::new(Canned).concurrency(4).build();
//! let summary = archiver
//!     .archive_group("https://forum.example/g/demo", "demo.mbox".as_ref())
//!     .await?;
//! for failed in &summary.failed {
//!     eprintln!("skipped {}: {}", failed.thread_url, failed.cause);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Archives are deterministic: rerunning against byte-identical source
//! pages produces a byte-identical mbox file, regardless of concurrency.

pub mod archiver;
pub mod assembler;
pub mod config;
pub mod error;
pub mod fetcher;
mod listing;
pub mod mbox;
pub mod model;
pub mod payload;
pub mod render;
mod worker;

pub use archiver::{Archiver, CancelHandle};
pub use config::ArchiverBuilder;
pub use error::{ArchiveError, FetchError, PayloadError, Result};
pub use fetcher::{DEFAULT_USER_AGENT, FetchConfig, FetchResult, Fetcher};
pub use mbox::MboxWriter;
pub use model::{
    FailedThread, MessageRecord, RunSummary, TextFormat, ThreadArchive, ThreadListing,
};
pub use payload::parse_messages;
pub use render::{RenderError, Renderer, WaitHints};
