//! Lenient decoding of stored and LLM-produced JSON
//!
//! Older writers stored `keywords`, `timeline` and `prescriptions` as plain
//! strings while newer ones store sequences. Every helper here accepts both
//! shapes and yields the canonical sequence form, so reading a document is
//! also its migration. Values of an unexpected type decode to the empty
//! default instead of failing the whole document.

use serde::{Deserialize, Deserializer};
use serde_json::Value as JsonValue;

use crate::record::{NOT_AVAILABLE, Prescription};

/// Placeholder some writers stored instead of an empty keyword list
pub const NO_KEYWORDS: &str = "No main keywords found.";

/// Placeholder some writers stored instead of an empty prescription list
pub const NO_PRESCRIPTIONS: &str = "No prescriptions found.";

/// Render a JSON scalar as text. Numbers are kept, everything else is dropped.
pub fn scalar_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Most leading digits read from an age; the SQL store uses the same width
pub const MAX_AGE_DIGITS: usize = 9;

/// Parse the leading run of ASCII digits (`"72"`, `" 72 years"`), reading at
/// most [`MAX_AGE_DIGITS`] of them.
pub fn leading_number(text: &str) -> Option<u32> {
    let digits: String = text
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .take(MAX_AGE_DIGITS)
        .collect();
    digits.parse().ok()
}

/// Sequence of non-empty trimmed strings; a bare string becomes one item.
pub fn string_list_from_value(value: &JsonValue) -> Vec<String> {
    match value {
        JsonValue::Array(items) => items.iter().filter_map(scalar_text).filter_map(clean).collect(),
        other => scalar_text(other).and_then(clean).into_iter().collect(),
    }
}

pub fn keywords_from_value(value: &JsonValue) -> Vec<String> {
    match value {
        JsonValue::String(s) => split_keywords(s),
        JsonValue::Array(_) => string_list_from_value(value),
        _ => Vec::new(),
    }
}

pub fn timeline_from_value(value: &JsonValue) -> Vec<String> {
    match value {
        JsonValue::String(s) => split_timeline(s),
        JsonValue::Array(_) => string_list_from_value(value),
        _ => Vec::new(),
    }
}

pub fn prescriptions_from_value(value: &JsonValue) -> Vec<Prescription> {
    match value {
        JsonValue::String(s) => split_prescriptions(s),
        JsonValue::Array(items) => items.iter().filter_map(prescription_item).collect(),
        _ => Vec::new(),
    }
}

/// Comma-separated keyword string as written by the keyword editor
pub fn split_keywords(text: &str) -> Vec<String> {
    if text.trim() == NO_KEYWORDS {
        return Vec::new();
    }
    text.split(',').filter_map(|k| clean(k.to_string())).collect()
}

/// Timeline string: either a serialized JSON array or one event per line
pub fn split_timeline(text: &str) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.starts_with('[') {
        if let Ok(JsonValue::Array(items)) = serde_json::from_str::<JsonValue>(trimmed) {
            return string_list_from_value(&JsonValue::Array(items));
        }
    }
    lines(trimmed)
}

/// Prescription string with one `Drug: X, Dose: Y, ...` entry per line
pub fn split_prescriptions(text: &str) -> Vec<Prescription> {
    if text.trim() == NO_PRESCRIPTIONS {
        return Vec::new();
    }
    lines(text)
        .iter()
        .map(|line| Prescription::parse_line(line))
        .collect()
}

fn prescription_item(value: &JsonValue) -> Option<Prescription> {
    match value {
        JsonValue::Object(_) => serde_json::from_value(value.clone()).ok(),
        JsonValue::String(s) => clean(s.clone()).map(|line| Prescription::parse_line(&line)),
        _ => None,
    }
}

fn lines(text: &str) -> Vec<String> {
    text.lines().filter_map(|l| clean(l.to_string())).collect()
}

fn clean(text: String) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

// serde adapters ------------------------------------------------------------

pub fn text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = JsonValue::deserialize(deserializer)?;
    Ok(scalar_text(&value).unwrap_or_default())
}

/// Free-text demographic field, `"N/A"` when missing or blank
pub fn demographic<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = JsonValue::deserialize(deserializer)?;
    Ok(scalar_text(&value)
        .and_then(clean)
        .unwrap_or_else(|| NOT_AVAILABLE.to_string()))
}

pub fn string_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let value = JsonValue::deserialize(deserializer)?;
    Ok(string_list_from_value(&value))
}

pub fn keywords<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let value = JsonValue::deserialize(deserializer)?;
    Ok(keywords_from_value(&value))
}

pub fn timeline<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let value = JsonValue::deserialize(deserializer)?;
    Ok(timeline_from_value(&value))
}

pub fn prescriptions<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Vec<Prescription>, D::Error> {
    let value = JsonValue::deserialize(deserializer)?;
    Ok(prescriptions_from_value(&value))
}
