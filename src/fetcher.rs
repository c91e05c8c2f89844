//! Polite, retrying page fetcher over an injected [`Renderer`].

use std::time::Duration;

use tokio::time::sleep;

use crate::error::FetchError;
use crate::render::{RenderError, Renderer, WaitHints};

/// Browser-imitating identification string sent by default, to avoid
/// trivial signature-based blocking.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0 Safari/537.36";

/// Per-request fetch parameters. Immutable for the lifetime of a fetcher.
#[derive(Clone, Debug)]
pub struct FetchConfig {
    /// Politeness delay enforced before every request.
    pub delay: Duration,
    /// Extra wait after page load, for client-side rendering.
    pub load_wait: Duration,
    /// Navigation timeout per attempt.
    pub timeout: Duration,
    /// Identification string for outbound requests.
    pub user_agent: String,
    /// Number of *re*tries after the first attempt, for transient failures.
    pub max_retries: u32,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(1),
            load_wait: Duration::from_secs(2),
            timeout: Duration::from_secs(10),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_retries: 3,
        }
    }
}

/// A successfully rendered page.
#[derive(Clone, Debug)]
pub struct FetchResult {
    pub final_url: String,
    pub html: String,
}

/// Retrying fetcher wrapping the rendering capability.
///
/// Transient failures (timeout, connection error, 5xx, 429) are retried
/// with exponential backoff; permanent failures (401/403/404) fail the
/// request immediately. Either way a terminal failure is returned to the
/// caller as a [`FetchError`], never raised further.
pub struct Fetcher<R: Renderer> {
    renderer: R,
    config: FetchConfig,
    hints: WaitHints,
}

impl<R: Renderer> Fetcher<R> {
    pub fn new(renderer: R, config: FetchConfig) -> Self {
        let hints = WaitHints {
            timeout: config.timeout,
            load_wait: config.load_wait,
            user_agent: config.user_agent.clone(),
        };
        Self {
            renderer,
            config,
            hints,
        }
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Fetch the fully rendered HTML of `url`.
    ///
    /// Makes at most `max_retries + 1` attempts. The politeness delay is
    /// slept before every attempt, so request rate is bounded per caller.
    pub async fn fetch(&self, url: &str) -> Result<FetchResult, FetchError> {
        let mut attempt: u32 = 0;
        loop {
            sleep(self.config.delay).await;
            match self.renderer.render(url, &self.hints).await {
                Ok(html) => {
                    return Ok(FetchResult {
                        final_url: url.to_string(),
                        html,
                    });
                }
                Err(err) => {
                    attempt += 1;
                    if !err.is_transient() || attempt > self.config.max_retries {
                        if err.is_transient() {
                            tracing::warn!(url, attempts = attempt, %err, "retries exhausted");
                        } else {
                            tracing::warn!(url, %err, "permanent fetch failure");
                        }
                        return Err(FetchError {
                            url: url.to_string(),
                            attempts: attempt,
                            source: err,
                        });
                    }
                    let wait = self.backoff(attempt - 1, &err);
                    tracing::warn!(url, attempt, wait_ms = wait.as_millis() as u64, %err,
                        "transient fetch failure, backing off");
                    sleep(wait).await;
                }
            }
        }
    }

    /// Exponential backoff: `delay * 2^attempt`, never less than a
    /// server-supplied retry hint.
    fn backoff(&self, attempt: u32, err: &RenderError) -> Duration {
        let computed = self
            .config
            .delay
            .saturating_mul(2u32.saturating_pow(attempt));
        match err.retry_after() {
            Some(hint) if hint > computed => hint,
            _ => computed,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    /// Renderer that fails the first `failures` calls, then succeeds.
    struct FlakyRenderer {
        failures: u32,
        calls: Arc<AtomicU32>,
        error: fn() -> RenderError,
    }

    impl Renderer for FlakyRenderer {
        async fn render(&self, _url: &str, _hints: &WaitHints) -> Result<String, RenderError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err((self.error)())
            } else {
                Ok("<html></html>".to_string())
            }
        }
    }

    fn fast_config(max_retries: u32) -> FetchConfig {
        FetchConfig {
            delay: Duration::ZERO,
            load_wait: Duration::ZERO,
            max_retries,
            ..FetchConfig::default()
        }
    }

    #[tokio::test]
    async fn recovers_from_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let fetcher = Fetcher::new(
            FlakyRenderer {
                failures: 2,
                calls: calls.clone(),
                error: || RenderError::Timeout,
            },
            fast_config(3),
        );
        let result = fetcher.fetch("http://example.com/t").await.unwrap();
        assert_eq!(result.html, "<html></html>");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn transient_failure_attempted_exactly_max_retries_plus_one_times() {
        let calls = Arc::new(AtomicU32::new(0));
        let fetcher = Fetcher::new(
            FlakyRenderer {
                failures: u32::MAX,
                calls: calls.clone(),
                error: || RenderError::Connection("refused".into()),
            },
            fast_config(3),
        );
        let err = fetcher.fetch("http://example.com/t").await.unwrap_err();
        assert_eq!(err.attempts, 4);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn permanent_failure_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let fetcher = Fetcher::new(
            FlakyRenderer {
                failures: u32::MAX,
                calls: calls.clone(),
                error: || RenderError::HttpStatus {
                    status: 403,
                    retry_after: None,
                },
            },
            fast_config(5),
        );
        let err = fetcher.fetch("http://example.com/t").await.unwrap_err();
        assert_eq!(err.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn backoff_grows_exponentially_and_honors_server_hint() {
        let fetcher = Fetcher::new(
            FlakyRenderer {
                failures: 0,
                calls: Arc::new(AtomicU32::new(0)),
                error: || RenderError::Timeout,
            },
            FetchConfig {
                delay: Duration::from_millis(100),
                ..FetchConfig::default()
            },
        );
        assert_eq!(
            fetcher.backoff(0, &RenderError::Timeout),
            Duration::from_millis(100)
        );
        assert_eq!(
            fetcher.backoff(2, &RenderError::Timeout),
            Duration::from_millis(400)
        );
        let throttled = RenderError::HttpStatus {
            status: 429,
            retry_after: Some(Duration::from_secs(30)),
        };
        assert_eq!(fetcher.backoff(0, &throttled), Duration::from_secs(30));
    }
}
