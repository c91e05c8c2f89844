//! Shape-based discovery of the message collection inside a decoded block.
//!
//! The forum's payload schema is undocumented and drifts across frontend
//! versions, so nothing here addresses fields by fixed index paths.
//! Instead, the message collection and its fields are recognized by shape:
//! a list of tuples whose leaves plausibly map to sender, timestamp and
//! body. Schema drift should only ever require touching this module.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::Value;

use crate::model::{MessageRecord, UNKNOWN_SENDER};

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email regex"));

static ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.-]{1,40}$").expect("id regex"));

/// Scalar leaves of a tuple, in pre-order document position.
enum Leaf<'a> {
    Num(f64),
    Str(&'a str),
}

fn flatten<'a>(value: &'a Value, out: &mut Vec<Leaf<'a>>) {
    match value {
        Value::Number(n) => {
            if let Some(f) = n.as_f64() {
                out.push(Leaf::Num(f));
            }
        }
        Value::String(s) => out.push(Leaf::Str(s)),
        Value::Array(items) => {
            for item in items {
                flatten(item, out);
            }
        }
        Value::Object(map) => {
            for item in map.values() {
                flatten(item, out);
            }
        }
        Value::Bool(_) | Value::Null => {}
    }
}

/// A tuple is message-like when it carries at least one number (a
/// timestamp candidate) and one non-empty string (a sender/body candidate).
fn is_message_like(value: &Value) -> bool {
    let mut leaves = Vec::new();
    flatten(value, &mut leaves);
    let has_num = leaves.iter().any(|l| matches!(l, Leaf::Num(_)));
    let has_str = leaves
        .iter()
        .any(|l| matches!(l, Leaf::Str(s) if !s.is_empty()));
    has_num && has_str
}

/// Locate the primary message collection in a decoded block: the array of
/// arrays with the most message-like elements. Pre-order traversal with a
/// strictly-greater comparison keeps the earliest candidate on ties, which
/// matches document order.
pub(super) fn find_collection(value: &Value) -> Option<&[Value]> {
    let mut best: Option<(&[Value], usize)> = None;
    walk(value, &mut best);
    best.map(|(items, _)| items)
}

fn walk<'a>(value: &'a Value, best: &mut Option<(&'a [Value], usize)>) {
    match value {
        Value::Array(items) => {
            if !items.is_empty() && items.iter().all(Value::is_array) {
                let score = items.iter().filter(|v| is_message_like(v)).count();
                if score > 0 && best.map_or(true, |(_, s)| score > s) {
                    *best = Some((items.as_slice(), score));
                }
            }
            for item in items {
                walk(item, best);
            }
        }
        Value::Object(map) => {
            for item in map.values() {
                walk(item, best);
            }
        }
        _ => {}
    }
}

/// Extract one [`MessageRecord`] from a message-like tuple.
///
/// Every field is recovered defensively: a missing or malformed field gets
/// a named default and a debug log, never dropping the message. Thread id
/// and subject are left empty here; the assembler fills them in.
pub(super) fn extract_message(tuple: &Value) -> Option<MessageRecord> {
    if !is_message_like(tuple) {
        return None;
    }
    let mut leaves = Vec::new();
    flatten(tuple, &mut leaves);

    let body_html = pick_body(&leaves);
    let sender_email = leaves.iter().find_map(|l| match l {
        Leaf::Str(s) if EMAIL_RE.is_match(s) => Some(s.to_string()),
        _ => None,
    });

    let id_like: Vec<&str> = leaves
        .iter()
        .filter_map(|l| match l {
            Leaf::Str(s) if ID_RE.is_match(s) && *s != body_html => Some(*s),
            _ => None,
        })
        .collect();
    let message_id = id_like.first().copied().unwrap_or_default().to_string();
    if message_id.is_empty() {
        tracing::debug!("message tuple without id-like field, deferring to assembler");
    }
    // The trailing id-like slot is the parent reference when the schema
    // exposes one; the assembler validates it against earlier messages.
    let parent_id = id_like
        .last()
        .filter(|s| **s != message_id)
        .map(|s| s.to_string());

    let sender_name = pick_sender(&leaves, &body_html, sender_email.as_deref());
    if sender_email.is_none() {
        tracing::debug!(%message_id, "sender email missing, placeholder will be synthesized");
    }
    if body_html.is_empty() {
        tracing::debug!(%message_id, "body missing, using empty default");
    }

    Some(MessageRecord {
        thread_id: String::new(),
        message_id,
        parent_id,
        sender_name,
        sender_email,
        subject: String::new(),
        timestamp: pick_timestamp(&leaves),
        body_html,
    })
}

/// Body heuristic: longest markup-bearing string wins; failing that, the
/// longest prose-length string; failing that, empty.
fn pick_body(leaves: &[Leaf<'_>]) -> String {
    let mut markup: Option<&str> = None;
    let mut prose: Option<&str> = None;
    for leaf in leaves {
        let Leaf::Str(s) = leaf else { continue };
        if s.contains('<') && s.contains('>') {
            if markup.is_none_or(|m| s.len() > m.len()) {
                markup = Some(s);
            }
        } else if s.len() >= 40 && prose.is_none_or(|p| s.len() > p.len()) {
            prose = Some(s);
        }
    }
    markup.or(prose).unwrap_or_default().to_string()
}

/// Sender heuristic: first spaced non-markup string, else the email local
/// part, else the placeholder constant.
fn pick_sender(leaves: &[Leaf<'_>], body: &str, email: Option<&str>) -> String {
    let spaced = leaves.iter().find_map(|l| match l {
        Leaf::Str(s)
            if s.contains(' ') && !s.contains('<') && s.len() <= 120 && *s != body =>
        {
            Some(s.to_string())
        }
        _ => None,
    });
    if let Some(name) = spaced {
        return name;
    }
    if let Some(email) = email {
        if let Some((local, _)) = email.split_once('@') {
            return local.to_string();
        }
    }
    tracing::debug!("sender name missing, using placeholder");
    UNKNOWN_SENDER.to_string()
}

/// Timestamp heuristic: first number that normalizes into a plausible
/// epoch (auto-detecting seconds/millis/micros), else the first
/// non-negative number taken as seconds, else the Unix epoch.
fn pick_timestamp(leaves: &[Leaf<'_>]) -> DateTime<Utc> {
    const EPOCH_2000: f64 = 946_684_800.0;
    const EPOCH_2100: f64 = 4_102_444_800.0;

    let numbers: Vec<f64> = leaves
        .iter()
        .filter_map(|l| match l {
            Leaf::Num(n) => Some(*n),
            _ => None,
        })
        .collect();

    let plausible = numbers.iter().find_map(|&n| {
        let secs = if n >= 1e14 {
            n / 1e6
        } else if n >= 1e11 {
            n / 1e3
        } else {
            n
        };
        (EPOCH_2000..=EPOCH_2100).contains(&secs).then_some(secs)
    });
    let secs = plausible.or_else(|| numbers.iter().copied().find(|&n| n >= 0.0));
    if secs.is_none() {
        tracing::debug!("timestamp missing, defaulting to epoch");
    }
    DateTime::from_timestamp(secs.unwrap_or(0.0) as i64, 0)
        .unwrap_or_else(|| DateTime::from_timestamp(0, 0).expect("epoch"))
}
