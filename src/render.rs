//! The [`Renderer`] capability trait: the crate's only source of page content.
//!
//! Production implementations drive a real browser-automation engine; test
//! implementations return canned HTML, so the parser and assembler can be
//! exercised without network or browser dependencies.

use std::future::Future;
use std::time::Duration;

/// Rendering knobs forwarded with every request.
#[derive(Clone, Debug)]
pub struct WaitHints {
    /// Overall navigation timeout.
    pub timeout: Duration,
    /// Extra wait after the page signals "loaded", for client-side rendering.
    pub load_wait: Duration,
    /// Identification string to send with the request.
    pub user_agent: String,
}

/// Why a render attempt failed.
///
/// The fetcher uses [`is_transient`](Self::is_transient) to decide whether
/// an attempt is worth retrying.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// The page did not finish loading within the timeout.
    #[error("navigation timed out")]
    Timeout,

    /// The connection could not be established or was dropped.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The server answered with a non-success HTTP status. `retry_after`
    /// carries a server-supplied wait hint when one was present.
    #[error("HTTP status {status}")]
    HttpStatus {
        status: u16,
        retry_after: Option<Duration>,
    },

    /// Any other engine-level failure.
    #[error("render failed: {0}")]
    Engine(String),
}

impl RenderError {
    /// True for failure classes that may succeed on a later attempt:
    /// timeouts, connection errors, 5xx and 429. Access denials (401/403)
    /// and missing pages (404) are permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            RenderError::Timeout | RenderError::Connection(_) => true,
            RenderError::HttpStatus { status, .. } => *status >= 500 || *status == 429,
            RenderError::Engine(_) => false,
        }
    }

    /// Server-supplied wait hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            RenderError::HttpStatus { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Trait for the injected page-rendering capability.
///
/// Implementations must be `Send + Sync + 'static` so they can be shared
/// across the worker pool.
///
/// # Implementing a test renderer
///
/// ```rust,no_run
/// use mbox_archiver::{Renderer, RenderError, WaitHints};
///
/// struct CannedPage(String);
///
/// impl Renderer for CannedPage {
///     async fn render(&self, _url: &str, _hints: &WaitHints) -> Result<String, RenderError> {
///         Ok(self.0.clone())
///     }
/// }
/// ```
pub trait Renderer: Send + Sync + 'static {
    /// Navigate to `url`, wait according to `hints`, and return the fully
    /// rendered document.
    fn render(
        &self,
        url: &str,
        hints: &WaitHints,
    ) -> impl Future<Output = std::result::Result<String, RenderError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_and_connection_errors_are_transient() {
        assert!(RenderError::Timeout.is_transient());
        assert!(RenderError::Connection("reset".into()).is_transient());
    }

    #[test]
    fn server_errors_and_throttling_are_transient() {
        for status in [500, 502, 503, 429] {
            let err = RenderError::HttpStatus {
                status,
                retry_after: None,
            };
            assert!(err.is_transient(), "status {status}");
        }
    }

    #[test]
    fn access_denials_are_permanent() {
        for status in [401, 403, 404, 410] {
            let err = RenderError::HttpStatus {
                status,
                retry_after: None,
            };
            assert!(!err.is_transient(), "status {status}");
        }
    }

    #[test]
    fn retry_after_only_on_http_status() {
        let hint = Duration::from_secs(7);
        let err = RenderError::HttpStatus {
            status: 429,
            retry_after: Some(hint),
        };
        assert_eq!(err.retry_after(), Some(hint));
        assert_eq!(RenderError::Timeout.retry_after(), None);
    }
}
