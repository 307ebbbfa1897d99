//! Splitting oversized tool results into agent-sized pieces

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Upper bound on chunks handed back for a single result
pub const MAX_CHUNKS: usize = 20;

/// A result split into pieces no larger than the configured size
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkedResult {
    /// Chunks the full result would need
    pub total_chunks: usize,
    pub chunks: Vec<Value>,
    /// True when `chunks` holds fewer than `total_chunks`
    pub truncated: bool,
}

impl ChunkedResult {
    fn from_chunks(mut chunks: Vec<Value>, max_chunks: usize) -> Self {
        let total_chunks = chunks.len();
        let truncated = total_chunks > max_chunks;
        chunks.truncate(max_chunks);
        Self {
            total_chunks,
            chunks,
            truncated,
        }
    }
}

/// Split text into pieces of at most `max_chars` characters.
///
/// A piece ends after the last newline inside its window when there is one,
/// otherwise exactly at the character limit.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut rest = text;

    while !rest.is_empty() {
        let end = match rest.char_indices().nth(max_chars) {
            Some((idx, _)) => idx,
            None => {
                chunks.push(rest.to_string());
                break;
            }
        };

        let split = match rest[..end].rfind('\n') {
            Some(idx) if idx > 0 => idx + 1,
            _ => end,
        };
        chunks.push(rest[..split].to_string());
        rest = &rest[split..];
    }

    chunks
}

/// Chunk a JSON value.
///
/// Arrays are batched item by item so every chunk stays valid JSON; an item
/// that alone exceeds the limit gets a batch of its own. Anything else is
/// pretty-printed and split as text.
pub fn chunk_value(value: &Value, max_chars: usize, max_chunks: usize) -> ChunkedResult {
    let serialized = serde_json::to_string(value).unwrap_or_default();
    if serialized.chars().count() <= max_chars {
        return ChunkedResult::from_chunks(vec![value.clone()], max_chunks);
    }

    let chunks = match value {
        Value::Array(items) => batch_items(items, max_chars),
        other => {
            let pretty = serde_json::to_string_pretty(other).unwrap_or(serialized);
            chunk_text(&pretty, max_chars)
                .into_iter()
                .map(Value::String)
                .collect()
        }
    };
    ChunkedResult::from_chunks(chunks, max_chunks)
}

fn batch_items(items: &[Value], max_chars: usize) -> Vec<Value> {
    let mut batches = Vec::new();
    let mut current: Vec<Value> = Vec::new();
    // Brackets of the enclosing array
    let mut current_size = 2;

    for item in items {
        let size = serde_json::to_string(item)
            .map(|s| s.chars().count())
            .unwrap_or(0);
        let separator = usize::from(!current.is_empty());

        if !current.is_empty() && current_size + separator + size > max_chars {
            batches.push(Value::Array(std::mem::take(&mut current)));
            current_size = 2;
        }
        current_size += usize::from(!current.is_empty()) + size;
        current.push(item.clone());
    }

    if !current.is_empty() {
        batches.push(Value::Array(current));
    }
    batches
}
