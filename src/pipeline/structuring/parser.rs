use serde_json::Value;

use super::types::StructuredRecord;
use super::StructuringError;

const NO_OBJECT_FOUND: &str = "no JSON object found in response";

/// Parse the service's reply into a structured record.
///
/// A reply that is exactly one JSON object is taken as-is. Anything else is
/// scavenged for the first balanced `{...}` span, which covers replies wrapped
/// in prose or markdown fences. Fails with `MalformedResponse` carrying the
/// reply verbatim when neither yields a JSON object.
pub fn parse_structured_response(response: &str) -> Result<StructuredRecord, StructuringError> {
    let trimmed = response.trim();

    let strict_failure = match parse_object(trimmed) {
        Ok(record) => return Ok(record),
        Err(detail) => detail,
    };
    tracing::debug!(reason = %strict_failure, "Reply is not a bare JSON object, scanning for one");

    let span = find_first_object(trimmed).ok_or_else(|| StructuringError::MalformedResponse {
        raw_response: response.to_string(),
        detail: NO_OBJECT_FOUND.to_string(),
    })?;

    parse_object(span).map_err(|detail| StructuringError::MalformedResponse {
        raw_response: response.to_string(),
        detail,
    })
}

fn parse_object(candidate: &str) -> Result<StructuredRecord, String> {
    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(fields)) => Ok(StructuredRecord::from_map(fields)),
        Ok(other) => Err(format!("expected a JSON object, found {}", value_kind(&other))),
        Err(e) => Err(e.to_string()),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Locate the first balanced `{...}` span in `text`.
///
/// Braces inside JSON string literals do not count toward nesting.
pub fn find_first_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + c.len_utf8();
                    return Some(&text[start..end]);
                }
            }
            _ => {}
        }
    }

    None
}
