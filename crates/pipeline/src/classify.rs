//! Response classification
//!
//! Maps a status code plus optional parsed body onto an `ApiError`. Error
//! bodies come in several envelope shapes, all normalized into the same
//! `SubError` list:
//!
//! - `{"errors": [{"code": 32, "message": "..."}, "plain string", ...]}`
//! - `{"error": {"code": 64, "message": "..."}}` or `{"error": "..."}`
//! - `{"code": 88, "message": "..."}` (the body itself is the error)
//! - `{"detail": "..."}` (used only when nothing else yielded a message)
//!
//! A body that is empty or not JSON never fails classification; the error
//! then carries only the status and a generic message.

use serde_json::Value;

use crate::error::{ApiError, ApiErrorKind, SubError};

/// Parse a response body as JSON. Empty or malformed bodies yield `None`.
pub fn parse_body(body: &[u8]) -> Option<Value> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return None;
    }
    serde_json::from_slice(body).ok()
}

/// Whether a 2xx body signals an application-level failure.
///
/// Only structured envelopes count; flags like `"error": false` do not.
fn has_error_envelope(body: &Value) -> bool {
    let structured = |v: &Value| matches!(v, Value::Array(_) | Value::Object(_) | Value::String(_));
    body.get("errors").is_some_and(structured) || body.get("error").is_some_and(structured)
}

fn sub_error(entry: &Value) -> Option<SubError> {
    match entry {
        Value::String(message) => Some(SubError {
            code: None,
            message: Some(message.clone()),
        }),
        Value::Object(map) => {
            let code = map.get("code").and_then(Value::as_i64);
            let message = map
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string);
            if code.is_none() && message.is_none() {
                None
            } else {
                Some(SubError { code, message })
            }
        }
        _ => None,
    }
}

/// Extract every sub-error from a body, across all supported envelopes.
pub fn extract_sub_errors(body: &Value) -> Vec<SubError> {
    let mut errors = Vec::new();

    match body.get("errors") {
        Some(Value::Array(entries)) => errors.extend(entries.iter().filter_map(sub_error)),
        Some(entry) => errors.extend(sub_error(entry)),
        None => {}
    }

    match body.get("error") {
        Some(entry) if !entry.is_null() => errors.extend(sub_error(entry)),
        _ => errors.extend(sub_error(body)),
    }

    if errors.iter().all(|e| e.message.is_none()) {
        if let Some(detail) = body.get("detail").and_then(Value::as_str) {
            errors.push(SubError {
                code: None,
                message: Some(detail.to_string()),
            });
        }
    }

    errors
}

fn render_message(status: u16, errors: &[SubError]) -> String {
    let parts: Vec<String> = errors
        .iter()
        .map(SubError::to_string)
        .filter(|s| !s.is_empty())
        .collect();
    if parts.is_empty() {
        format!("HTTP {status}")
    } else {
        parts.join("; ")
    }
}

/// Classify a response. Returns `None` for a clean 2xx.
pub fn classify(status: u16, body: Option<&Value>) -> Option<ApiError> {
    let kind = match ApiErrorKind::from_status(status) {
        Some(kind) => kind,
        None if body.is_some_and(has_error_envelope) => ApiErrorKind::Application,
        None => return None,
    };

    let errors = body.map(extract_sub_errors).unwrap_or_default();
    let codes = errors.iter().filter_map(|e| e.code).collect();
    let message = render_message(status, &errors);

    Some(ApiError {
        kind,
        status,
        body: body.cloned(),
        errors,
        codes,
        message,
    })
}
