//! Core data types flowing through the pipeline: parsed messages, thread
//! listings, assembled threads and the end-of-run summary.

use chrono::{DateTime, Utc};

/// Placeholder sender name when the payload carries no usable name and no
/// email address to derive one from.
pub const UNKNOWN_SENDER: &str = "Unknown sender";

/// One message recovered from a thread page payload.
///
/// The parser fills the per-message fields and leaves `thread_id` and
/// `subject` empty; the assembler completes them and resolves
/// `parent_id` against the messages seen earlier in the thread.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageRecord {
    pub thread_id: String,
    pub message_id: String,
    /// Immediate parent in the reply tree; `None` for the thread root.
    pub parent_id: Option<String>,
    pub sender_name: String,
    /// Absent when the payload omits or redacts the address; the formatter
    /// synthesizes a placeholder from the message id instead.
    pub sender_email: Option<String>,
    pub subject: String,
    pub timestamp: DateTime<Utc>,
    /// Raw markup as found in the payload, converted at write time.
    pub body_html: String,
}

/// A thread discovered on a listing page, in discovery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadListing {
    pub thread_id: String,
    /// Absolute URL of the thread's first page.
    pub thread_url: String,
}

/// A fully collected thread: all pages fetched, messages deduplicated and
/// linked, ready for the formatter.
#[derive(Debug, Clone)]
pub struct ThreadArchive {
    pub listing: ThreadListing,
    pub subject: String,
    /// Messages in posting order; the first is the thread root.
    pub messages: Vec<MessageRecord>,
}

/// Output rendering for message bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextFormat {
    /// Keep the payload markup verbatim (`text/html` entries).
    #[default]
    Html,
    /// Structural conversion keeping emphasis, links and headings.
    Markdown,
    /// Structural conversion to bare text.
    Plaintext,
}

/// A thread that could not be archived, with the cause kept for the
/// summary. Failures never abort the run.
#[derive(Debug, Clone)]
pub struct FailedThread {
    pub thread_id: String,
    pub thread_url: String,
    pub cause: String,
}

/// Outcome of an archiving run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub threads_archived: usize,
    pub messages_written: usize,
    /// Threads skipped, in discovery order.
    pub failed: Vec<FailedThread>,
}

impl RunSummary {
    /// True when every discovered thread made it into the archive.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}
