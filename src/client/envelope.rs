//! Response envelope normalization
//!
//! The backend answers in one of four envelope shapes. [`ResponseEnvelope::resolve`]
//! is the single discriminator; the probing order below is a contract.

use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};

use crate::core::{ClassifiedError, ErrorKind};

use super::classify::{extract_message, REQUEST_FAILED_MESSAGE};

/// Resolved envelope
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseEnvelope {
    /// `{success: true, data: [...], total: n}`, kept whole
    Page(JsonValue),
    /// `{success: true, data: T}`, unwrapped
    Data(JsonValue),
    /// `{success: false, error: {...}}`
    Failure(JsonValue),
    /// `{code, message, data}`
    Legacy { code: i64, body: JsonValue },
    /// Anything else, returned verbatim
    Unshaped(JsonValue),
}

/// Typed view of a [`ResponseEnvelope::Page`]
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total: u64,
}

fn is_page(obj: &Map<String, JsonValue>) -> bool {
    obj.get("data").map_or(false, JsonValue::is_array)
        && obj.get("total").map_or(false, JsonValue::is_number)
}

impl ResponseEnvelope {
    /// Shapes are probed in order: page, data, failure, legacy.
    pub fn resolve(body: JsonValue) -> Self {
        let JsonValue::Object(mut obj) = body else {
            return ResponseEnvelope::Unshaped(body);
        };

        let success = obj.get("success").and_then(JsonValue::as_bool);
        match success {
            Some(true) if is_page(&obj) => {
                return ResponseEnvelope::Page(JsonValue::Object(obj));
            }
            Some(true) if obj.contains_key("data") => {
                let data = obj.remove("data").unwrap_or(JsonValue::Null);
                return ResponseEnvelope::Data(data);
            }
            Some(false) if obj.contains_key("error") => {
                return ResponseEnvelope::Failure(JsonValue::Object(obj));
            }
            _ => {}
        }

        if obj.contains_key("data") {
            if let Some(code) = obj.get("code").and_then(JsonValue::as_i64) {
                return ResponseEnvelope::Legacy {
                    code,
                    body: JsonValue::Object(obj),
                };
            }
        }

        ResponseEnvelope::Unshaped(JsonValue::Object(obj))
    }

    /// Payload for the caller, or the classified failure the envelope carried.
    pub fn into_result(self, status: u16) -> Result<JsonValue, ClassifiedError> {
        match self {
            ResponseEnvelope::Page(envelope) => Ok(envelope),
            ResponseEnvelope::Data(data) => Ok(data),
            ResponseEnvelope::Unshaped(body) => Ok(body),
            ResponseEnvelope::Legacy { code: 200, body } => match body {
                JsonValue::Object(mut obj) => Ok(obj.remove("data").unwrap_or(JsonValue::Null)),
                other => Ok(other),
            },
            ResponseEnvelope::Legacy { body, .. } => {
                let message = body
                    .get("message")
                    .and_then(JsonValue::as_str)
                    .filter(|m| !m.is_empty())
                    .unwrap_or(REQUEST_FAILED_MESSAGE)
                    .to_string();
                Err(envelope_error(message, status, body))
            }
            ResponseEnvelope::Failure(body) => {
                let message =
                    extract_message(&body).unwrap_or_else(|| REQUEST_FAILED_MESSAGE.to_string());
                Err(envelope_error(message, status, body))
            }
        }
    }
}

fn envelope_error(message: String, status: u16, body: JsonValue) -> ClassifiedError {
    ClassifiedError::new(ErrorKind::RequestError, message)
        .with_status(status)
        .with_body(body)
}

/// Normalizes a successfully received body.
pub fn normalize(body: JsonValue, status: u16) -> Result<JsonValue, ClassifiedError> {
    ResponseEnvelope::resolve(body).into_result(status)
}

/// Parses a raw response body; empty or non-JSON bodies become `null`.
pub fn parse_body(raw: &[u8]) -> JsonValue {
    if raw.is_empty() {
        return JsonValue::Null;
    }
    serde_json::from_slice(raw).unwrap_or_else(|e| {
        log::debug!("Response body is not JSON: {e}");
        JsonValue::Null
    })
}
