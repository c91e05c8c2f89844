//! Error types for the `mbox_archiver` crate.

use crate::render::RenderError;

/// Errors that abort an archiving run.
///
/// Per-thread and per-page problems are *not* represented here -- they are
/// captured as [`FailedThread`](crate::FailedThread) entries in the run
/// summary. Only problems with the archive file itself (or an unusable
/// input URL) are fatal.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// The output archive could not be created or written.
    #[error("archive I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The group or thread URL could not be interpreted.
    #[error("invalid input URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// A type alias for `Result<T, ArchiveError>`.
pub type Result<T> = std::result::Result<T, ArchiveError>;

/// A page fetch that failed terminally, after retries where applicable.
#[derive(Debug, thiserror::Error)]
#[error("fetch of {url} failed after {attempts} attempt(s): {source}")]
pub struct FetchError {
    pub url: String,
    pub attempts: u32,
    #[source]
    pub source: RenderError,
}

/// Page-level parse failures.
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    /// The page contained no decodable data block resembling a message
    /// collection. Distinct from a decoded collection with zero messages.
    #[error("no decodable payload block found in page")]
    NoPayload,
}
