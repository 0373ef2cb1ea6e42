//! Structural and style checks on an extracted day payload, plus the repair prompt
//! sent back to the model when a check fails.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::extract::ExtractError;
use crate::util::truncate_chars;

/// Repair attempts after the initial call (3 model calls in total).
pub const MAX_REPAIR_ATTEMPTS: usize = 2;

/// Bad output echoed back in a repair prompt is capped at this many characters.
const MAX_ECHOED_OUTPUT_CHARS: usize = 2_000;

/// A payload that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayPayload {
    pub outfit_style: String,
    pub outfit: String,
    pub schedule: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationFailure {
    #[error("failed to parse JSON object ({0})")]
    NoJsonObject(String),

    #[error("outfit is empty")]
    EmptyOutfit,

    #[error("schedule is empty")]
    EmptySchedule,

    #[error("outfit_style must be exactly \"{expected}\" but was \"{found}\"")]
    StyleMismatch { expected: String, found: String },

    #[error("the first line of outfit must start with \"style: {expected}\"")]
    MissingStyleMarker { expected: String },
}

fn style_marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^\s*(?:\[\s*(?i:style)\s*\]\s*[:：]|(?P<open>\[)\s*(?i:style)\s*[:：]|(?i:style)\s*[:：])\s*(?P<rest>.*)$",
        )
        .expect("style marker regex should compile")
    })
}

/// Text following a leading style marker on `line`, if there is one.
///
/// Accepts `style: X`, `[style]: X` and `[style: X]`.
pub fn strip_style_marker(line: &str) -> Option<&str> {
    let caps = style_marker_re().captures(line)?;
    let rest = caps.name("rest")?.as_str();
    let rest = if caps.name("open").is_some() {
        rest.split(']').next().unwrap_or(rest)
    } else {
        rest
    };
    Some(rest.trim())
}

/// True when the first line of `outfit` starts with a style marker followed by exactly `style`.
pub fn has_style_marker(outfit: &str, style: &str) -> bool {
    let first_line = outfit.trim_start().lines().next().unwrap_or("");
    let Some(rest) = strip_style_marker(first_line) else {
        return false;
    };
    match rest.strip_prefix(style) {
        Some(after) => after.chars().next().map_or(true, |c| !c.is_alphanumeric()),
        None => false,
    }
}

fn text_field(obj: &Map<String, Value>, name: &str) -> String {
    match obj.get(name) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

/// Check an extraction result against the required fields and, when set, the required style.
pub fn validate(
    extracted: Result<Map<String, Value>, ExtractError>,
    required_style: &str,
) -> Result<DayPayload, ValidationFailure> {
    let obj = extracted.map_err(|e| ValidationFailure::NoJsonObject(e.to_string()))?;

    let outfit = text_field(&obj, "outfit").trim().to_string();
    if outfit.is_empty() {
        return Err(ValidationFailure::EmptyOutfit);
    }
    let schedule = text_field(&obj, "schedule").trim().to_string();
    if schedule.is_empty() {
        return Err(ValidationFailure::EmptySchedule);
    }
    let outfit_style = text_field(&obj, "outfit_style").trim().to_string();

    if !required_style.is_empty() {
        if outfit_style != required_style {
            return Err(ValidationFailure::StyleMismatch {
                expected: required_style.to_string(),
                found: outfit_style,
            });
        }
        if !has_style_marker(&outfit, required_style) {
            return Err(ValidationFailure::MissingStyleMarker {
                expected: required_style.to_string(),
            });
        }
    }

    Ok(DayPayload {
        outfit_style,
        outfit,
        schedule,
    })
}

/// Corrective prompt for a failed attempt.
pub fn build_repair_prompt(
    failure: &ValidationFailure,
    required_style: &str,
    previous_output: &str,
) -> String {
    let mut prompt = String::with_capacity(1_024 + previous_output.len().min(MAX_ECHOED_OUTPUT_CHARS * 4));

    prompt.push_str("Your previous answer could not be used.\n");
    prompt.push_str(&format!("Problem: {}\n\n", failure));
    if !required_style.is_empty() {
        prompt.push_str(&format!(
            "The outfit style must be exactly \"{style}\". Set \"outfit_style\" to \"{style}\" \
             and start the first line of \"outfit\" with \"style: {style}\".\n",
            style = required_style
        ));
    }
    prompt.push_str(
        "Reply with JSON only (no code fences, no commentary) containing the fields \
         \"outfit_style\", \"outfit\" and \"schedule\".\n\n",
    );
    prompt.push_str("Previous answer:\n");
    prompt.push_str(truncate_chars(previous_output, MAX_ECHOED_OUTPUT_CHARS));
    prompt
}
