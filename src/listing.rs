//! Parsing of group listing pages: thread links and pagination affordances.
//!
//! Listing pages expose thread links as `/c/<id>` paths (optionally under a
//! `/g/<group>` prefix) and signal further pages through a `pageToken`
//! parameter. Both are matched textually; listing markup varies too much
//! across frontend versions for structural selectors to hold.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

static THREAD_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:/g/[A-Za-z0-9_.-]+)?/c/([A-Za-z0-9_-]+)").expect("thread link regex")
});

static PAGE_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"pageToken=([A-Za-z0-9_%.=-]+)").expect("page token regex"));

/// Thread links found on a listing page, as `(path, thread_id)` pairs in
/// document order, deduplicated by thread id.
pub(crate) fn thread_links(html: &str) -> Vec<(String, String)> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut links = Vec::new();
    for caps in THREAD_LINK_RE.captures_iter(html) {
        let id = &caps[1];
        if seen.insert(id.to_string()) {
            links.push((caps[0].to_string(), id.to_string()));
        }
    }
    links
}

/// The next-page token, when the page advertises one.
pub(crate) fn next_page_token(html: &str) -> Option<String> {
    PAGE_TOKEN_RE
        .captures(html)
        .map(|caps| caps[1].to_string())
}
