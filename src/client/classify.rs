//! Error classification
//!
//! Maps (status, body, request) to a [`ClassifiedError`]. Pure: no session
//! mutation and no navigation happen here; the dispatcher acts on the result.

use serde_json::Value as JsonValue;

use crate::{
    core::{ClassifiedError, ErrorKind},
    request::RequestDescriptor,
};

use super::transport::TransportError;

pub const INVALID_CREDENTIALS_MESSAGE: &str = "Invalid credentials";
pub const REGISTRATION_FAILED_MESSAGE: &str = "Registration failed";
pub const SESSION_EXPIRED_MESSAGE: &str = "Session expired, please log in again";
pub const MISSING_TENANT_MESSAGE: &str = "Tenant context is not set, please log in again";
pub const REQUEST_FAILED_MESSAGE: &str = "Request failed";

/// FastAPI's default 404 detail
const NOT_FOUND_DETAIL: &str = "Not Found";

/// Backend phrases meaning the request reached a tenant-scoped route without a tenant.
const MISSING_TENANT_MARKERS: &[&str] = &["组织上下文未设置", "tenant"];

pub fn fallback_message(status: u16) -> String {
    format!("HTTP error! status: {status}")
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

/// FastAPI `detail`: a string, a list of `{msg, ...}` objects, or anything else.
fn detail_message(detail: &JsonValue) -> Option<String> {
    match detail {
        JsonValue::Null => None,
        JsonValue::String(s) => non_empty(s),
        JsonValue::Array(items) => match items.first().and_then(|i| i.get("msg")) {
            Some(JsonValue::String(msg)) => non_empty(msg),
            _ => Some(detail.to_string()),
        },
        other => Some(other.to_string()),
    }
}

/// Pulls the human-readable message out of an error body.
///
/// Precedence: `error.message`, `error.details`, `detail`, legacy `message`.
pub fn extract_message(body: &JsonValue) -> Option<String> {
    if let Some(error) = body.get("error") {
        if let Some(msg) = error.get("message").and_then(JsonValue::as_str) {
            if let Some(msg) = non_empty(msg) {
                return Some(msg);
            }
        }
        if let Some(details) = error.get("details").and_then(JsonValue::as_str) {
            if let Some(details) = non_empty(details) {
                return Some(details);
            }
        }
    }

    if let Some(msg) = body.get("detail").and_then(detail_message) {
        return Some(msg);
    }

    body.get("message")
        .and_then(JsonValue::as_str)
        .and_then(non_empty)
}

pub fn is_missing_tenant_message(message: &str) -> bool {
    let lowered = message.to_lowercase();
    MISSING_TENANT_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}

/// The call never produced an HTTP response.
pub fn network_error(err: &TransportError) -> ClassifiedError {
    ClassifiedError::new(
        ErrorKind::NetworkError,
        format!("Network connection failed: {err}"),
    )
}

/// Classifies a non-2xx response.
pub fn classify(status: u16, body: &JsonValue, descriptor: &RequestDescriptor) -> ClassifiedError {
    let extracted = extract_message(body);

    let (kind, message) = match status {
        401 if descriptor.is_public() => {
            let default = if descriptor.is_registration() {
                REGISTRATION_FAILED_MESSAGE
            } else {
                INVALID_CREDENTIALS_MESSAGE
            };
            (
                ErrorKind::InvalidCredentials,
                extracted.unwrap_or_else(|| default.to_string()),
            )
        }
        401 => (ErrorKind::SessionExpired, SESSION_EXPIRED_MESSAGE.to_string()),
        400 => (
            ErrorKind::ValidationError,
            extracted.unwrap_or_else(|| fallback_message(status)),
        ),
        404 => {
            let generic = body.get("detail").and_then(JsonValue::as_str) == Some(NOT_FOUND_DETAIL);
            let message = match extracted {
                Some(msg) if !generic => msg,
                _ => format!("Endpoint not found: {}", descriptor.path()),
            };
            (ErrorKind::NotFound, message)
        }
        500..=599 => (
            ErrorKind::ServerError,
            extracted.unwrap_or_else(|| fallback_message(status)),
        ),
        _ => (
            ErrorKind::RequestError,
            extracted.unwrap_or_else(|| fallback_message(status)),
        ),
    };

    ClassifiedError::new(kind, message)
        .with_status(status)
        .with_body(body.clone())
}
