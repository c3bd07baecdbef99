//! Pull a JSON payload out of model output that may carry code fences or prose

use serde_json::Value as JsonValue;

use super::AiError;

/// Extract and parse the JSON object in `text`
pub fn extract_object(text: &str) -> Result<JsonValue, AiError> {
    extract(text, '{', '}')
}

/// Extract and parse the JSON array in `text`
pub fn extract_array(text: &str) -> Result<JsonValue, AiError> {
    extract(text, '[', ']')
}

fn extract(text: &str, open: char, close: char) -> Result<JsonValue, AiError> {
    let body = strip_fences(text.trim());

    if body.starts_with(open) {
        if let Ok(value) = serde_json::from_str(body) {
            return Ok(value);
        }
    }

    // Outermost delimited span, for replies with prose around the payload
    let (Some(start), Some(end)) = (body.find(open), body.rfind(close)) else {
        return Err(invalid(text));
    };
    if end < start {
        return Err(invalid(text));
    }
    serde_json::from_str(&body[start..=end]).map_err(|_| invalid(text))
}

/// Contents of the first ```` ``` ```` block, or the input when there is none
fn strip_fences(text: &str) -> &str {
    let Some(start) = text.find("```") else {
        return text;
    };
    let after = &text[start + 3..];
    // Skip the language tag, e.g. ```json
    let after = match after.find('\n') {
        Some(newline) if !after[..newline].contains(['{', '[']) => &after[newline + 1..],
        _ => after,
    };
    match after.find("```") {
        Some(end) => after[..end].trim(),
        None => after.trim(),
    }
}

fn invalid(text: &str) -> AiError {
    let excerpt: String = text.chars().take(200).collect();
    AiError::InvalidJson(excerpt)
}
