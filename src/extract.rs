//! Recover one JSON object from free-form model text.
//!
//! Strips code fences, then scans from the first `{` tracking brace depth while
//! ignoring braces and quotes inside string literals (escape-aware). The first
//! point where depth returns to zero closes the candidate.

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("no '{{' found in model output")]
    NoObject,
    #[error("unbalanced braces in model output")]
    Unbalanced,
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
    #[error("JSON value is not an object")]
    NotAnObject,
}

/// Remove leading/trailing triple-backtick fences (with or without a language tag).
pub fn strip_code_fences(text: &str) -> &str {
    let mut body = text.trim();
    if let Some(rest) = body.strip_prefix("```") {
        // Drop the fence line, including any language tag.
        body = match rest.find('\n') {
            Some(nl) => &rest[nl + 1..],
            None => rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric()),
        };
    }
    let trimmed_end = body.trim_end();
    if let Some(rest) = trimmed_end.strip_suffix("```") {
        body = rest;
    }
    body.trim()
}

/// Find the first complete `{...}` in the text.
pub fn find_json_object(text: &str) -> Result<&str, ExtractError> {
    let start = text.find('{').ok_or(ExtractError::NoObject)?;
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape = false;

    for (i, ch) in text[start..].char_indices() {
        if in_string {
            if escape {
                escape = false;
            } else if ch == '\\' {
                escape = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(&text[start..=start + i]);
                }
            }
            _ => {}
        }
    }
    Err(ExtractError::Unbalanced)
}

/// Extract and parse the first JSON object in `text`.
pub fn extract_object(text: &str) -> Result<Map<String, Value>, ExtractError> {
    let candidate = find_json_object(strip_code_fences(text))?;
    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ExtractError::NotAnObject),
        Err(e) => Err(ExtractError::InvalidJson(e.to_string())),
    }
}
