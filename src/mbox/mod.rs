//! The mailbox formatter: converts collected threads into mbox entries and
//! owns the single output archive handle.
//!
//! Entries use the classic unix `From ` separator with mboxrd quoting, so
//! the archive stays parseable by standard mailbox readers.

mod body;

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::error::Result;
use crate::model::{MessageRecord, TextFormat, ThreadArchive};

/// Single-writer mbox archive.
///
/// Threads complete concurrently, but entries are appended here in
/// discovery order by the orchestrator, so a rerun against unchanged pages
/// produces a byte-identical archive. Each entry is staged fully in memory
/// and appended with a single write; the archive never holds a torn entry.
pub struct MboxWriter {
    out: BufWriter<File>,
    text_format: TextFormat,
    domain: String,
    to_addr: String,
}

impl MboxWriter {
    /// Create (truncating) the archive at `path`.
    ///
    /// `domain` namespaces synthesized Message-IDs; `to_addr` is the group
    /// address written to every `To` header.
    pub async fn create(
        path: &Path,
        text_format: TextFormat,
        domain: String,
        to_addr: String,
    ) -> Result<Self> {
        let file = File::create(path).await?;
        Ok(Self {
            out: BufWriter::new(file),
            text_format,
            domain,
            to_addr,
        })
    }

    /// Append every message of `thread` to the archive, in thread order.
    /// Returns the number of entries written.
    pub async fn write_thread(&mut self, thread: &ThreadArchive) -> Result<usize> {
        let parents: HashMap<&str, &str> = thread
            .messages
            .iter()
            .filter_map(|m| {
                m.parent_id
                    .as_deref()
                    .map(|p| (m.message_id.as_str(), p))
            })
            .collect();

        for msg in &thread.messages {
            let ancestors = ancestor_chain(msg, &parents);
            let entry = format_entry(
                msg,
                &ancestors,
                &self.to_addr,
                &self.domain,
                self.text_format,
            );
            self.out.write_all(entry.as_bytes()).await?;
        }
        tracing::debug!(thread = %thread.listing.thread_id, messages = thread.messages.len(),
            "thread appended to archive");
        Ok(thread.messages.len())
    }

    /// Flush and close the archive.
    pub async fn finish(mut self) -> Result<()> {
        self.out.flush().await?;
        Ok(())
    }
}

/// Ancestor ids from thread root down to the immediate parent.
///
/// The assembler guarantees parents reference earlier messages, so the
/// walk terminates; the visited guard covers malformed input anyway.
fn ancestor_chain(msg: &MessageRecord, parents: &HashMap<&str, &str>) -> Vec<String> {
    let mut chain: Vec<String> = Vec::new();
    let mut cursor = msg.parent_id.as_deref();
    while let Some(id) = cursor {
        if chain.iter().any(|c| c == id) {
            break;
        }
        chain.push(id.to_string());
        cursor = parents.get(id).copied();
    }
    chain.reverse();
    chain
}

fn asctime(ts: &DateTime<Utc>) -> String {
    ts.format("%a %b %e %H:%M:%S %Y").to_string()
}

fn rfc2822(ts: &DateTime<Utc>) -> String {
    ts.format("%a, %d %b %Y %H:%M:%S +0000").to_string()
}

/// Header values must stay on one line: payload-derived text (subjects,
/// sender names) can carry embedded newlines, which would tear the header
/// block apart. Collapse every whitespace run to a single space.
fn header_value(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Escape body lines that a mailbox reader would mistake for a message
/// boundary: any line matching `^>*From ` gains one more `>` (mboxrd).
fn escape_from_lines(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    for line in body.split_inclusive('\n') {
        let bare = line.trim_start_matches('>');
        if bare.starts_with("From ") {
            out.push('>');
        }
        out.push_str(line);
    }
    out
}

/// Render one complete mbox entry: separator line, headers, blank line,
/// escaped body, trailing blank line.
fn format_entry(
    msg: &MessageRecord,
    ancestors: &[String],
    to_addr: &str,
    domain: &str,
    text_format: TextFormat,
) -> String {
    let addr = msg
        .sender_email
        .clone()
        .unwrap_or_else(|| format!("{}@{}", msg.message_id, domain));
    let content_type = match text_format {
        TextFormat::Html => "text/html",
        TextFormat::Markdown | TextFormat::Plaintext => "text/plain",
    };

    let mut entry = String::new();
    entry.push_str(&format!("From {} {}\n", addr, asctime(&msg.timestamp)));
    entry.push_str(&format!("From: {} <{}>\n", header_value(&msg.sender_name), addr));
    entry.push_str(&format!("To: {to_addr}\n"));
    entry.push_str(&format!("Subject: {}\n", header_value(&msg.subject)));
    entry.push_str(&format!("Date: {}\n", rfc2822(&msg.timestamp)));
    entry.push_str(&format!("Message-ID: <{}@{}>\n", msg.message_id, domain));
    if let Some(parent) = ancestors.last() {
        entry.push_str(&format!("In-Reply-To: <{parent}@{domain}>\n"));
        let refs: Vec<String> = ancestors
            .iter()
            .map(|id| format!("<{id}@{domain}>"))
            .collect();
        entry.push_str(&format!("References: {}\n", refs.join(" ")));
    }
    entry.push_str(&format!("Content-Type: {content_type}; charset=utf-8\n"));
    entry.push_str("Content-Transfer-Encoding: 8bit\n\n");

    let converted = body::convert(&msg.body_html, text_format);
    let escaped = escape_from_lines(&converted);
    entry.push_str(&escaped);
    if !escaped.ends_with('\n') {
        entry.push('\n');
    }
    entry.push('\n');
    entry
}
