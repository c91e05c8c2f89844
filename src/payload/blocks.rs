//! Extraction of embedded structured-data blocks from rendered pages.
//!
//! The forum ships its message data inside script-embedded
//! `AF_initDataCallback({key: ..., data: [...], ...})` calls. The `data`
//! value is a plain JSON array even though the surrounding call is a JS
//! object literal, so a string-aware balanced-bracket scan is enough to
//! slice it out for `serde_json`.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

static MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"AF_initDataCallback\s*\(").expect("marker regex"));

/// Decode every data block found in `html`, in document order.
///
/// Blocks that fail to decode are skipped with a debug log; the caller
/// decides whether ending up with zero blocks is a page-level failure.
pub(super) fn extract_blocks(html: &str) -> Vec<Value> {
    let mut blocks = Vec::new();
    for m in MARKER_RE.find_iter(html) {
        let tail = &html[m.end()..];
        let Some(data_pos) = tail.find("data:") else {
            tracing::debug!(offset = m.start(), "data block without data key, skipping");
            continue;
        };
        let Some(raw) = balanced_array(&tail[data_pos + "data:".len()..]) else {
            tracing::debug!(offset = m.start(), "unterminated data array, skipping");
            continue;
        };
        match serde_json::from_str::<Value>(raw) {
            Ok(value) => blocks.push(value),
            Err(err) => {
                tracing::debug!(offset = m.start(), %err, "undecodable data block, skipping");
            }
        }
    }
    blocks
}

/// Return the leading balanced `[...]` slice of `s`, tolerating embedded
/// strings with escapes. `None` if `s` does not start with an array or the
/// array never closes.
fn balanced_array(s: &str) -> Option<&str> {
    let start = s.find(|c: char| !c.is_whitespace())?;
    let bytes = s.as_bytes();
    if bytes[start] != b'[' {
        return None;
    }
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'[' => depth += 1,
            b']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}
