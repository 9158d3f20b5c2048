//! Response parsing: pull the JSON object out of a completion payload.
//!
//! Chat models like to wrap their JSON in prose ("Here is the structured
//! note: … Let me know if …") or Markdown fences. A greedy `\{.*\}` regex
//! would swallow trailing prose containing a brace, and a lazy one stops at
//! the first nested `}`. Instead we scan characters, tracking nesting depth
//! and whether we are inside a JSON string literal, and cut at the `}` that
//! brings depth back to zero.

use crate::error::AdimeError;
use crate::schema::{AdimeDocument, SECTION_KEYS};
use serde_json::Value;
use tracing::debug;

/// Locate the outermost balanced `{...}` span starting at the first `{`.
///
/// Braces inside string literals (including escaped quotes) do not count.
/// Returns `None` when there is no `{` or it is never closed.
pub fn find_json_span(text: &str) -> Option<&str> {
    balanced_span(text, text.find('{')?)
}

/// First balanced span that parses as JSON, trying each `{` in turn.
///
/// Prose such as "I kept {placeholders} as-is" ahead of the real object
/// produces a balanced but invalid span; scanning resumes at the next `{`.
fn first_json_value(text: &str) -> Option<Value> {
    text.match_indices('{').find_map(|(start, _)| {
        let span = balanced_span(text, start)?;
        serde_json::from_str(span).ok()
    })
}

fn balanced_span(text: &str, start: usize) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + ch.len_utf8();
                    return Some(&text[start..end]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Parse a completion payload into a schema-conforming document.
///
/// The object must carry all four ADIME sections as JSON objects; a
/// partially populated response is rejected rather than patched so the
/// caller can fall back to the rule-based parser.
pub fn parse_document(payload: &str) -> Result<AdimeDocument, AdimeError> {
    let value = match first_json_value(payload) {
        Some(value) => value,
        None => {
            debug!("No parseable JSON object span found; parsing whole payload");
            serde_json::from_str::<Value>(payload.trim()).map_err(|e| {
                AdimeError::MalformedResponse {
                    detail: format!("{} (payload starts with {:?})", e, preview(payload)),
                }
            })?
        }
    };

    let object = value
        .as_object()
        .ok_or_else(|| AdimeError::MalformedResponse {
            detail: "top-level JSON value is not an object".to_string(),
        })?;

    let missing: Vec<String> = SECTION_KEYS
        .iter()
        .filter(|key| !object.get(**key).is_some_and(Value::is_object))
        .map(|key| key.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(AdimeError::MissingSections { missing });
    }

    serde_json::from_value(value).map_err(|e| AdimeError::MalformedResponse {
        detail: e.to_string(),
    })
}

fn preview(payload: &str) -> &str {
    crate::prompts::char_prefix(payload.trim(), 40)
}
