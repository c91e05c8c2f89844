//! Thread assembly: walking listing pages into an ordered thread sequence,
//! and collecting one thread's messages across its pages.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use tokio::sync::watch;
use url::Url;

use crate::fetcher::Fetcher;
use crate::listing;
use crate::model::{FailedThread, MessageRecord, ThreadArchive, ThreadListing};
use crate::payload;
use crate::render::Renderer;

static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("title regex"));

static ENTITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&(?:#x?[0-9A-Fa-f]+|[A-Za-z]+);").expect("entity regex"));

/// Decode the character references that show up in title text. Unknown
/// named entities pass through verbatim.
fn decode_entities(raw: &str) -> String {
    ENTITY_RE
        .replace_all(raw, |caps: &regex::Captures<'_>| {
            let entity = &caps[0][1..caps[0].len() - 1];
            let decoded = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some(' '),
                _ => entity.strip_prefix('#').and_then(|num| {
                    let code = match num.strip_prefix(['x', 'X']) {
                        Some(hex) => u32::from_str_radix(hex, 16).ok(),
                        None => num.parse().ok(),
                    };
                    code.and_then(char::from_u32)
                }),
            };
            match decoded {
                Some(c) => c.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn page_title(html: &str) -> Option<String> {
    TITLE_RE
        .captures(html)
        .map(|caps| decode_entities(caps[1].trim()))
        .filter(|t| !t.is_empty())
}

fn page_url(base: &Url, token: Option<&str>) -> Url {
    match token {
        None => base.clone(),
        Some(token) => {
            let mut url = base.clone();
            url.query_pairs_mut().append_pair("pageToken", token);
            url
        }
    }
}

/// Walk the group's listing pages and return discovered threads in order.
///
/// Pagination is sequential; it stops when no further page is advertised,
/// when `limit` threads have been collected, or on cancellation. A listing
/// page that fails terminally ends pagination with partial results kept.
pub async fn list_threads<R: Renderer>(
    fetcher: &Fetcher<R>,
    group_url: &Url,
    limit: Option<usize>,
    cancel: &watch::Receiver<bool>,
) -> Vec<ThreadListing> {
    let mut listings: Vec<ThreadListing> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut token: Option<String> = None;
    let mut used_tokens: HashSet<String> = HashSet::new();

    loop {
        if *cancel.borrow() {
            tracing::info!("cancelled during listing pagination");
            break;
        }
        let url = page_url(group_url, token.as_deref());
        let page = match fetcher.fetch(url.as_str()).await {
            Ok(page) => page,
            Err(err) => {
                tracing::error!(url = url.as_str(), %err,
                    "listing page failed, keeping partial listing");
                break;
            }
        };

        let links = listing::thread_links(&page.html);
        if links.is_empty() {
            tracing::debug!(url = url.as_str(), "no thread links on listing page");
        }
        for (path, thread_id) in links {
            if !seen.insert(thread_id.clone()) {
                continue;
            }
            let thread_url = match group_url.join(&path) {
                Ok(url) => url.to_string(),
                Err(err) => {
                    tracing::warn!(%path, %err, "unjoinable thread link, skipping");
                    continue;
                }
            };
            listings.push(ThreadListing {
                thread_id,
                thread_url,
            });
            if limit.is_some_and(|n| listings.len() >= n) {
                tracing::info!(limit = listings.len(), "thread limit reached");
                return listings;
            }
        }

        token = listing::next_page_token(&page.html)
            .filter(|t| used_tokens.insert(t.clone()));
        if token.is_none() {
            break;
        }
    }
    listings
}

/// Fetch and parse every page of one thread, returning its messages in
/// posting order with thread linkage resolved.
///
/// A thread that recovers zero messages resolves to a [`FailedThread`]
/// carrying its cause; the error never propagates past this boundary.
pub async fn collect_thread<R: Renderer>(
    fetcher: &Fetcher<R>,
    listing: ThreadListing,
    cancel: &watch::Receiver<bool>,
) -> Result<ThreadArchive, FailedThread> {
    let fail = |cause: String| FailedThread {
        thread_id: listing.thread_id.clone(),
        thread_url: listing.thread_url.clone(),
        cause,
    };
    let base = match Url::parse(&listing.thread_url) {
        Ok(url) => url,
        Err(err) => return Err(fail(format!("invalid thread URL: {err}"))),
    };

    let mut messages: Vec<MessageRecord> = Vec::new();
    let mut seen_ids: HashSet<String> = HashSet::new();
    let mut subject = String::new();
    let mut token: Option<String> = None;
    let mut used_tokens: HashSet<String> = HashSet::new();
    let mut first_page_cause: Option<String> = None;
    let mut first_page = true;

    loop {
        if *cancel.borrow() {
            if messages.is_empty() {
                return Err(fail("cancelled before any message was fetched".into()));
            }
            tracing::info!(thread = %listing.thread_id, "cancelled mid-thread, keeping partial messages");
            break;
        }
        let url = page_url(&base, token.as_deref());
        let page = match fetcher.fetch(url.as_str()).await {
            Ok(page) => page,
            Err(err) => {
                if first_page {
                    first_page_cause = Some(err.to_string());
                } else {
                    tracing::warn!(url = url.as_str(), %err,
                        "thread page failed, keeping messages collected so far");
                }
                break;
            }
        };
        if first_page {
            subject = page_title(&page.html).unwrap_or_default();
        }

        match payload::parse_messages(&page.html) {
            Ok(batch) => {
                for msg in batch {
                    // A thread reopened from another entry point must not
                    // duplicate messages already seen.
                    if msg.message_id.is_empty() || seen_ids.insert(msg.message_id.clone()) {
                        messages.push(msg);
                    }
                }
            }
            Err(err) => {
                if first_page {
                    first_page_cause = Some(err.to_string());
                } else {
                    tracing::warn!(url = url.as_str(), %err, "thread page unparseable, stopping pagination");
                }
                break;
            }
        }
        first_page = false;

        token = listing::next_page_token(&page.html)
            .filter(|t| used_tokens.insert(t.clone()));
        if token.is_none() {
            break;
        }
    }

    if messages.is_empty() {
        let cause = first_page_cause.unwrap_or_else(|| "no messages recovered".into());
        tracing::error!(thread = %listing.thread_id, %cause, "thread failed");
        return Err(fail(cause));
    }

    link_thread(&listing.thread_id, &subject, &mut messages);
    Ok(ThreadArchive {
        listing,
        subject,
        messages,
    })
}

/// Fill in thread-level fields and resolve parent linkage.
///
/// An explicit parent survives only when it references a message seen
/// earlier in the thread, which also rules out cycles; anything else falls
/// back to the thread root (flat-parent policy). The root itself has no
/// parent. Messages without an id get a synthesized one, unique within the
/// archive by construction.
fn link_thread(thread_id: &str, subject: &str, messages: &mut [MessageRecord]) {
    let mut ids: Vec<String> = Vec::with_capacity(messages.len());
    for (i, msg) in messages.iter_mut().enumerate() {
        msg.thread_id = thread_id.to_string();
        msg.subject = subject.to_string();
        if msg.message_id.is_empty() {
            msg.message_id = format!("{thread_id}-p{i}");
            tracing::debug!(id = %msg.message_id, "synthesized missing message id");
        }
        ids.push(msg.message_id.clone());
    }

    let root = ids[0].clone();
    let mut earlier: HashSet<&str> = HashSet::new();
    for (i, msg) in messages.iter_mut().enumerate() {
        if i == 0 {
            msg.parent_id = None;
        } else {
            let keep = msg
                .parent_id
                .as_deref()
                .is_some_and(|p| p != msg.message_id && earlier.contains(p));
            if !keep {
                msg.parent_id = Some(root.clone());
            }
        }
        earlier.insert(ids[i].as_str());
    }
}
