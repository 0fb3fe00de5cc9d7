//! Request-body redaction for the request log

use serde_json::Value;

pub const REDACTED: &str = "[REDACTED]";

const SENSITIVE_FIELDS: &[&str] = &[
    "password",
    "passwd",
    "secret",
    "client_secret",
    "token",
    "access_token",
    "refresh_token",
    "id_token",
    "api_key",
    "apikey",
    "authorization",
    "private_key",
    "credentials",
];

const TRUNCATION_MARKER: &str = "…[truncated]";

fn is_sensitive(field: &str) -> bool {
    SENSITIVE_FIELDS
        .iter()
        .any(|sensitive| field.eq_ignore_ascii_case(sensitive))
}

/// Mask sensitive fields at any depth
pub fn redact_value(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (field, nested) in map.iter_mut() {
                if is_sensitive(field) {
                    *nested = Value::String(REDACTED.to_string());
                } else {
                    redact_value(nested);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(redact_value),
        _ => {}
    }
}

/// Redacted, size-capped copy of a request body for the log
///
/// `None` for empty or non-JSON bodies: raw bytes are never logged.
pub fn redact_body(body: &[u8], max_chars: usize) -> Option<String> {
    if body.is_empty() {
        return None;
    }
    let mut value: Value = serde_json::from_slice(body).ok()?;
    redact_value(&mut value);
    let rendered = value.to_string();
    Some(truncate_chars(&rendered, max_chars))
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{TRUNCATION_MARKER}", &text[..cut]),
        None => text.to_string(),
    }
}
