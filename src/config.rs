//! Builder for configuring an [`Archiver`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::archiver::Archiver;
use crate::fetcher::{FetchConfig, Fetcher};
use crate::model::TextFormat;
use crate::render::Renderer;

/// Builder for configuring and creating an [`Archiver`].
///
/// All values arrive pre-validated from the caller (the CLI layer); the
/// builder only carries them. Defaults match polite single-stream
/// scraping: 1 s delay, 2 s load wait, 3 retries, concurrency 1, HTML
/// bodies.
///
/// # Example
///
/// ```rust,no_run
/// use std::time::Duration;
/// use mbox_archiver::{ArchiverBuilder, Renderer, RenderError, TextFormat, WaitHints};
///
/// # struct Browser;
/// # impl Renderer for Browser {
/// #     async fn render(&self, _url: &str, _hints: &WaitHints) -> Result<String, RenderError> {
/// #         Ok(String::new())
/// #     }
/// # }
/// # async fn example() -> mbox_archiver::Result<()> {
/// let archiver = ArchiverBuilder::new(Browser)
///     .delay(Duration::from_secs(2))
///     .concurrency(4)
///     .thread_limit(100)
///     .text_format(TextFormat::Markdown)
///     .build();
///
/// let summary = archiver
///     .archive_group("https://forum.example/g/demo", "demo.mbox".as_ref())
///     .await?;
/// println!("archived {} threads", summary.threads_archived);
/// # Ok(())
/// # }
/// ```
pub struct ArchiverBuilder<R: Renderer> {
    renderer: R,
    fetch: FetchConfig,
    concurrency: usize,
    thread_limit: Option<usize>,
    text_format: TextFormat,
    domain: String,
}

impl<R: Renderer> ArchiverBuilder<R> {
    /// Create a builder around the injected rendering capability.
    pub fn new(renderer: R) -> Self {
        Self {
            renderer,
            fetch: FetchConfig::default(),
            concurrency: 1,
            thread_limit: None,
            text_format: TextFormat::default(),
            domain: "scraped.local".to_string(),
        }
    }

    /// Politeness delay before each request. Enforced per worker, so the
    /// effective request rate scales with [`concurrency`](Self::concurrency).
    pub fn delay(mut self, delay: Duration) -> Self {
        self.fetch.delay = delay;
        self
    }

    /// Extra wait after page load, for client-side rendering.
    pub fn load_wait(mut self, wait: Duration) -> Self {
        self.fetch.load_wait = wait;
        self
    }

    /// Navigation timeout per fetch attempt.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.fetch.timeout = timeout;
        self
    }

    /// Identification string sent with every request.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.fetch.user_agent = user_agent.into();
        self
    }

    /// Retries after the first attempt, for transient failures.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.fetch.max_retries = retries;
        self
    }

    /// Maximum number of threads fetched in parallel.
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Stop listing after this many threads.
    pub fn thread_limit(mut self, limit: usize) -> Self {
        self.thread_limit = Some(limit);
        self
    }

    /// Body encoding for archived messages.
    pub fn text_format(mut self, format: TextFormat) -> Self {
        self.text_format = format;
        self
    }

    /// Domain used for synthesized Message-IDs and placeholder addresses.
    pub fn message_id_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    /// Consume the builder and return the configured [`Archiver`].
    pub fn build(self) -> Archiver<R> {
        let (cancel, _) = watch::channel(false);
        Archiver {
            fetcher: Fetcher::new(self.renderer, self.fetch),
            concurrency: self.concurrency,
            thread_limit: self.thread_limit,
            text_format: self.text_format,
            domain: self.domain,
            cancel: Arc::new(cancel),
        }
    }
}
