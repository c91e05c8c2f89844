use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mbox_archiver::{
    ArchiverBuilder, CancelHandle, RenderError, Renderer, TextFormat, WaitHints,
};
use serde_json::json;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Canned site helpers
// ---------------------------------------------------------------------------

const GROUP_URL: &str = "https://forum.example/g/demo";

fn listing_page(thread_ids: &[&str], next_token: Option<&str>) -> String {
    let mut html = String::from("<html><body>");
    for id in thread_ids {
        html.push_str(&format!(r#"<a href="/g/demo/c/{id}">{id}</a>"#));
    }
    if let Some(token) = next_token {
        html.push_str(&format!(r#"<a href="?pageToken={token}">more</a>"#));
    }
    html.push_str("</body></html>");
    html
}

fn msg_tuple(id: &str, email: Option<&str>, ts: i64, body: &str, parent: Option<&str>) -> serde_json::Value {
    let sender = match email {
        Some(e) => json!([[e]]),
        None => json!([[]]),
    };
    match parent {
        Some(p) => json!([[0, id, sender, [ts], p], [null, body]]),
        None => json!([[0, id, sender, [ts]], [null, body]]),
    }
}

fn thread_page(title: &str, tuples: Vec<serde_json::Value>) -> String {
    format!(
        "<html><head><title>{title}</title></head><body>\
         <script>AF_initDataCallback({{key: 'ds:6', isError: false, \
         data:[{}], sideChannel:{{}}}});</script></body></html>",
        serde_json::Value::Array(tuples)
    )
}

fn thread_url(id: &str) -> String {
    format!("https://forum.example/g/demo/c/{id}")
}

/// Three-thread demo site: t1 has a reply chain, t2 a message without a
/// sender email, t3 a single post.
fn demo_site() -> HashMap<String, String> {
    HashMap::from([
        (GROUP_URL.to_string(), listing_page(&["t1", "t2", "t3"], None)),
        (
            thread_url("t1"),
            thread_page(
                "Cookie jar heist",
                vec![
                    msg_tuple("m1", Some("alice@example.com"), 1_700_000_000, "<p>who took it?</p>", None),
                    msg_tuple("m2", Some("bob@example.com"), 1_700_000_060, "<p>not me</p>", Some("m1")),
                    msg_tuple("m3", Some("carol@example.com"), 1_700_000_120, "<p>suspicious</p>", Some("m2")),
                ],
            ),
        ),
        (
            thread_url("t2"),
            thread_page(
                "Anonymous tip",
                vec![
                    msg_tuple("m4", Some("dave@example.com"), 1_700_100_000, "<p>saw crumbs</p>", None),
                    msg_tuple("m5", None, 1_700_100_060, "<p>it was the dog, trust me on this one</p>", Some("m4")),
                ],
            ),
        ),
        (
            thread_url("t3"),
            thread_page(
                "Case closed",
                vec![msg_tuple("m6", Some("erin@example.com"), 1_700_200_000, "<p>dog confirmed</p>", None)],
            ),
        ),
    ])
}

// ---------------------------------------------------------------------------
// Fake renderers
// ---------------------------------------------------------------------------

/// Serves canned pages by URL; unknown URLs 404, listed URLs can be forced
/// to a specific status.
struct SiteRenderer {
    pages: HashMap<String, String>,
    statuses: HashMap<String, u16>,
}

impl SiteRenderer {
    fn new(pages: HashMap<String, String>) -> Self {
        Self {
            pages,
            statuses: HashMap::new(),
        }
    }

    fn with_status(mut self, url: impl Into<String>, status: u16) -> Self {
        self.statuses.insert(url.into(), status);
        self
    }
}

impl Renderer for SiteRenderer {
    async fn render(&self, url: &str, _hints: &WaitHints) -> Result<String, RenderError> {
        if let Some(&status) = self.statuses.get(url) {
            return Err(RenderError::HttpStatus {
                status,
                retry_after: None,
            });
        }
        match self.pages.get(url) {
            Some(html) => Ok(html.clone()),
            None => Err(RenderError::HttpStatus {
                status: 404,
                retry_after: None,
            }),
        }
    }
}

/// Tracks the peak number of simultaneous renders.
struct GaugeRenderer {
    pages: HashMap<String, String>,
    current: Arc<AtomicUsize>,
    max: Arc<AtomicUsize>,
}

impl Renderer for GaugeRenderer {
    async fn render(&self, url: &str, _hints: &WaitHints) -> Result<String, RenderError> {
        let n = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(n, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        let result = self.pages.get(url).cloned().ok_or(RenderError::HttpStatus {
            status: 404,
            retry_after: None,
        });
        self.current.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Fires the cancel handle the first time `trigger` is rendered.
struct CancellingRenderer {
    pages: HashMap<String, String>,
    trigger: String,
    handle: Arc<Mutex<Option<CancelHandle>>>,
}

impl Renderer for CancellingRenderer {
    async fn render(&self, url: &str, _hints: &WaitHints) -> Result<String, RenderError> {
        if url == self.trigger {
            if let Some(handle) = self.handle.lock().unwrap().take() {
                handle.cancel();
            }
        }
        self.pages.get(url).cloned().ok_or(RenderError::HttpStatus {
            status: 404,
            retry_after: None,
        })
    }
}

// ---------------------------------------------------------------------------
// Minimal mbox reader, standing in for standard mail tooling
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MboxEntry {
    headers: HashMap<String, String>,
    body: String,
}

fn parse_mbox(text: &str) -> Vec<MboxEntry> {
    let mut entries: Vec<MboxEntry> = Vec::new();
    let mut in_headers = false;
    for line in text.lines() {
        if line.starts_with("From ") {
            entries.push(MboxEntry::default());
            in_headers = true;
            continue;
        }
        let Some(entry) = entries.last_mut() else {
            continue;
        };
        if in_headers {
            if line.is_empty() {
                in_headers = false;
            } else if let Some((key, value)) = line.split_once(": ") {
                entry.headers.insert(key.to_string(), value.to_string());
            }
        } else {
            entry.body.push_str(line);
            entry.body.push('\n');
        }
    }
    entries
}

fn builder<R: Renderer>(renderer: R) -> ArchiverBuilder<R> {
    ArchiverBuilder::new(renderer)
        .delay(Duration::ZERO)
        .load_wait(Duration::ZERO)
        .max_retries(0)
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn archives_whole_group_in_discovery_order() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("demo.mbox");
    let archiver = builder(SiteRenderer::new(demo_site())).build();

    let summary = archiver.archive_group(GROUP_URL, &path).await.unwrap();
    assert_eq!(summary.threads_archived, 3);
    assert_eq!(summary.messages_written, 6);
    assert!(summary.is_complete());

    let text = std::fs::read_to_string(&path).unwrap();
    let entries = parse_mbox(&text);
    assert_eq!(entries.len(), 6);

    let ids: Vec<&str> = entries
        .iter()
        .map(|e| e.headers["Message-ID"].as_str())
        .collect();
    assert_eq!(
        ids,
        vec![
            "<m1@scraped.local>",
            "<m2@scraped.local>",
            "<m3@scraped.local>",
            "<m4@scraped.local>",
            "<m5@scraped.local>",
            "<m6@scraped.local>",
        ]
    );

    // Thread lineage: m3 replies to m2, with the full chain in References.
    assert_eq!(entries[2].headers["In-Reply-To"], "<m2@scraped.local>");
    assert_eq!(
        entries[2].headers["References"],
        "<m1@scraped.local> <m2@scraped.local>"
    );
    assert_eq!(entries[0].headers["To"], "demo@forum.example");
    assert_eq!(entries[0].headers["Subject"], "Cookie jar heist");
    assert_eq!(entries[5].headers["Date"], "Fri, 17 Nov 2023 05:46:40 +0000");
}

#[tokio::test]
async fn message_without_sender_email_gets_placeholder_address() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("demo.mbox");
    let archiver = builder(SiteRenderer::new(demo_site())).build();
    archiver.archive_group(GROUP_URL, &path).await.unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let entries = parse_mbox(&text);
    // m5 is the one without a sender email; all three t2/t3 siblings made it.
    let m5 = entries
        .iter()
        .find(|e| e.headers["Message-ID"] == "<m5@scraped.local>")
        .expect("m5 archived");
    assert!(m5.headers["From"].contains("<m5@scraped.local>"));
}

#[tokio::test]
async fn reruns_produce_byte_identical_archives() {
    let dir = TempDir::new().unwrap();
    let path_a = dir.path().join("a.mbox");
    let path_b = dir.path().join("b.mbox");

    let archiver = builder(SiteRenderer::new(demo_site())).concurrency(3).build();
    archiver.archive_group(GROUP_URL, &path_a).await.unwrap();
    archiver.archive_group(GROUP_URL, &path_b).await.unwrap();

    let a = std::fs::read(&path_a).unwrap();
    let b = std::fs::read(&path_b).unwrap();
    assert!(!a.is_empty());
    assert_eq!(a, b);
}

#[tokio::test]
async fn body_from_lines_are_escaped_for_mailbox_readers() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("demo.mbox");

    let pages = HashMap::from([
        (GROUP_URL.to_string(), listing_page(&["t1"], None)),
        (
            thread_url("t1"),
            thread_page(
                "Theft report",
                vec![
                    msg_tuple(
                        "m1",
                        Some("alice@example.com"),
                        1_700_000_000,
                        "<p>From someone stole my cookie</p>",
                        None,
                    ),
                    msg_tuple("m2", Some("bob@example.com"), 1_700_000_060, "<p>tragic</p>", Some("m1")),
                ],
            ),
        ),
    ]);
    let archiver = builder(SiteRenderer::new(pages))
        .text_format(TextFormat::Plaintext)
        .build();
    archiver.archive_group(GROUP_URL, &path).await.unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("\n>From someone stole my cookie\n"));
    // A standard reader still sees exactly two messages.
    assert_eq!(parse_mbox(&text).len(), 2);
}

#[tokio::test]
async fn forbidden_thread_is_skipped_and_reported() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("demo.mbox");
    let renderer = SiteRenderer::new(demo_site()).with_status(thread_url("t2"), 403);
    let archiver = builder(renderer).build();

    let summary = archiver.archive_group(GROUP_URL, &path).await.unwrap();
    assert_eq!(summary.threads_archived, 2);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].thread_id, "t2");
    assert!(summary.failed[0].cause.contains("403"));

    let text = std::fs::read_to_string(&path).unwrap();
    let entries = parse_mbox(&text);
    assert_eq!(entries.len(), 4);
    assert!(entries.iter().all(|e| e.headers["Message-ID"] != "<m4@scraped.local>"));
}

#[tokio::test]
async fn concurrent_fetches_never_exceed_the_configured_bound() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("demo.mbox");

    let mut pages = HashMap::from([(
        GROUP_URL.to_string(),
        listing_page(&["t1", "t2", "t3", "t4", "t5", "t6"], None),
    )]);
    for i in 1..=6 {
        pages.insert(
            thread_url(&format!("t{i}")),
            thread_page(
                "Subject",
                vec![msg_tuple(
                    &format!("m{i}"),
                    Some("a@example.com"),
                    1_700_000_000 + i,
                    "<p>body</p>",
                    None,
                )],
            ),
        );
    }
    let max = Arc::new(AtomicUsize::new(0));
    let renderer = GaugeRenderer {
        pages,
        current: Arc::new(AtomicUsize::new(0)),
        max: max.clone(),
    };
    let archiver = builder(renderer).concurrency(2).build();
    let summary = archiver.archive_group(GROUP_URL, &path).await.unwrap();

    assert_eq!(summary.threads_archived, 6);
    assert!(
        max.load(Ordering::SeqCst) <= 2,
        "peak concurrency was {}",
        max.load(Ordering::SeqCst)
    );
}

#[tokio::test]
async fn single_thread_mode_archives_one_thread() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("one.mbox");
    let archiver = builder(SiteRenderer::new(demo_site())).build();

    let summary = archiver
        .archive_thread(&thread_url("t1"), &path)
        .await
        .unwrap();
    assert_eq!(summary.threads_archived, 1);
    assert_eq!(summary.messages_written, 3);

    let entries = parse_mbox(&std::fs::read_to_string(&path).unwrap());
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].headers["To"], "thread@forum.example");
    assert!(entries.iter().all(|e| e.headers["Subject"] == "Cookie jar heist"));
}

#[tokio::test]
async fn cancellation_keeps_buffered_threads_and_reports_the_rest() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("demo.mbox");

    let handle_slot: Arc<Mutex<Option<CancelHandle>>> = Arc::new(Mutex::new(None));
    let renderer = CancellingRenderer {
        pages: demo_site(),
        trigger: thread_url("t2"),
        handle: handle_slot.clone(),
    };
    let archiver = builder(renderer).build();
    *handle_slot.lock().unwrap() = Some(archiver.cancel_handle());

    let summary = archiver.archive_group(GROUP_URL, &path).await.unwrap();

    // t1 finished before the cancel, t2 was in flight and completed, t3
    // was never started.
    assert_eq!(summary.threads_archived, 2);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].thread_id, "t3");
    assert!(summary.failed[0].cause.contains("cancelled"));

    // The archive is complete and parseable, no torn entries.
    let entries = parse_mbox(&std::fs::read_to_string(&path).unwrap());
    assert_eq!(entries.len(), 5);
    let ids: HashSet<&str> = entries
        .iter()
        .map(|e| e.headers["Message-ID"].as_str())
        .collect();
    assert!(ids.contains("<m1@scraped.local>"));
    assert!(ids.contains("<m5@scraped.local>"));
    assert!(!ids.contains("<m6@scraped.local>"));
}

#[tokio::test]
async fn archive_message_ids_match_the_pipeline_exactly() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("demo.mbox");
    let archiver = builder(SiteRenderer::new(demo_site())).build();
    let summary = archiver.archive_group(GROUP_URL, &path).await.unwrap();

    let entries = parse_mbox(&std::fs::read_to_string(&path).unwrap());
    assert_eq!(entries.len(), summary.messages_written);
    let ids: HashSet<&str> = entries
        .iter()
        .map(|e| e.headers["Message-ID"].as_str())
        .collect();
    assert_eq!(ids.len(), entries.len(), "Message-IDs are unique");
}

#[tokio::test]
async fn unwritable_archive_path_is_fatal() {
    let archiver = builder(SiteRenderer::new(demo_site())).build();
    let result = archiver
        .archive_group(GROUP_URL, "/nonexistent-dir/deep/out.mbox".as_ref())
        .await;
    assert!(matches!(result, Err(mbox_archiver::ArchiveError::Io(_))));
}
