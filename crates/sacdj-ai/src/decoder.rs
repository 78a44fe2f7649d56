//! Tolerant decoding of JSON records from free-form model output.
//!
//! Models asked for "JSON only" still wrap answers in prose or markdown fences.
//! [`decode_record`] tries, in order:
//!
//! 1. the whole trimmed text as a JSON object;
//! 2. every balanced `{...}` substring, scanning left to right (nested braces
//!    and braces inside string literals are handled);
//! 3. the contents of every fenced code block, with or without a language tag.
//!
//! The first candidate that parses as a JSON object wins.

use serde_json::{Map, Value};

use crate::error::DecodeError;

/// A decoded model record.
pub type Record = Map<String, Value>;

/// Extract one JSON object from `text`.
pub fn decode_record(text: &str) -> Result<Record, DecodeError> {
    let trimmed = text.trim();

    if let Some(record) = parse_object(trimmed) {
        return Ok(record);
    }

    for candidate in brace_candidates(trimmed) {
        if let Some(record) = parse_object(candidate) {
            return Ok(record);
        }
    }

    for block in fenced_blocks(trimmed) {
        if let Some(record) = parse_object(block.trim()) {
            return Ok(record);
        }
    }

    Err(DecodeError {
        raw: text.to_string(),
    })
}

fn parse_object(candidate: &str) -> Option<Record> {
    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Balanced `{...}` substrings, in order of their opening brace.
fn brace_candidates(text: &str) -> impl Iterator<Item = &str> {
    text.char_indices()
        .filter(|&(_, c)| c == '{')
        .filter_map(move |(start, _)| matching_brace(text, start).map(|end| &text[start..=end]))
}

/// Byte index of the `}` closing the `{` at `start`, if any.
fn matching_brace(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + offset);
                }
            }
            _ => {}
        }
    }
    None
}

/// Contents of ```` ``` ```` fenced blocks. An info string on the opening line is skipped.
fn fenced_blocks(text: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut rest = text;

    while let Some(open) = rest.find("```") {
        let after_fence = &rest[open + 3..];
        // Skip the language tag, if the opening fence has one.
        let body_start = match after_fence.find('\n') {
            Some(nl) if after_fence[..nl].trim().chars().all(|c| c.is_ascii_alphanumeric()) => {
                nl + 1
            }
            _ => 0,
        };
        let body = &after_fence[body_start..];
        match body.find("```") {
            Some(close) => {
                blocks.push(&body[..close]);
                rest = &body[close + 3..];
            }
            None => break,
        }
    }
    blocks
}
