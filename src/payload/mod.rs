//! Schema-tolerant parser for the forum's embedded-JSON message payload.
//!
//! A rendered page may carry the message list split across several data
//! blocks, in a schema that changes between frontend versions. This module
//! collects every block ([`blocks`]), discovers the message collection by
//! shape rather than by index path ([`shape`]), and merges the results in
//! document order with identity deduplication.

mod blocks;
mod shape;

use std::collections::HashSet;

use crate::error::PayloadError;
use crate::model::MessageRecord;

/// Parse every message found in a rendered thread page.
///
/// Messages come back in document-occurrence order, which on a single page
/// corresponds to posting order. A message appearing in more than one
/// block is emitted once, first occurrence winning.
///
/// Returns [`PayloadError::NoPayload`] when no decodable block resembles a
/// message collection; a decoded collection that yields zero messages is
/// `Ok(vec![])` (an empty-but-valid page).
pub fn parse_messages(html: &str) -> Result<Vec<MessageRecord>, PayloadError> {
    let decoded = blocks::extract_blocks(html);
    let mut found_collection = false;
    let mut seen: HashSet<String> = HashSet::new();
    let mut messages: Vec<MessageRecord> = Vec::new();

    for block in &decoded {
        let Some(collection) = shape::find_collection(block) else {
            continue;
        };
        found_collection = true;
        for tuple in collection {
            let Some(msg) = shape::extract_message(tuple) else {
                tracing::trace!("skipping non-message element in collection");
                continue;
            };
            // Identity dedup only applies to real ids; synthesized ids are
            // assigned later by the assembler and cannot collide.
            if !msg.message_id.is_empty() && !seen.insert(msg.message_id.clone()) {
                continue;
            }
            messages.push(msg);
        }
    }

    if !found_collection {
        tracing::debug!(
            blocks = decoded.len(),
            "no message collection recovered from page"
        );
        return Err(PayloadError::NoPayload);
    }
    Ok(messages)
}
