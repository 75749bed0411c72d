//! Unified error handling for the client
//!
//! `ClassifiedError` is what the backend told us, already sorted into a stable
//! `ErrorKind`. `ClientError` wraps it together with the failures that never
//! reach the wire (configuration, storage, serialization).

use std::fmt;

use serde_json::Value as JsonValue;

/// Stable taxonomy callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No response at all (connection refused, DNS, timeout)
    NetworkError,

    /// 401 from a public endpoint such as login or registration
    InvalidCredentials,

    /// 401 from a protected endpoint
    SessionExpired,

    /// 400
    ValidationError,

    /// 404
    NotFound,

    /// 5xx
    ServerError,

    /// Anything else, including failed envelopes on a 2xx
    RequestError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NetworkError => "network_error",
            ErrorKind::InvalidCredentials => "invalid_credentials",
            ErrorKind::SessionExpired => "session_expired",
            ErrorKind::ValidationError => "validation_error",
            ErrorKind::NotFound => "not_found",
            ErrorKind::ServerError => "server_error",
            ErrorKind::RequestError => "request_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error annotated with its kind, the HTTP status (if any) and the raw body.
///
/// Immutable once built: fields are private and only exposed through accessors.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedError {
    kind: ErrorKind,
    message: String,
    status_code: Option<u16>,
    raw_body: Option<JsonValue>,
}

impl ClassifiedError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status_code: None,
            raw_body: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }

    pub fn with_body(mut self, body: JsonValue) -> Self {
        if !body.is_null() {
            self.raw_body = Some(body);
        }
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status_code(&self) -> Option<u16> {
        self.status_code
    }

    pub fn raw_body(&self) -> Option<&JsonValue> {
        self.raw_body.as_ref()
    }

    /// Same error with a different human-readable message.
    pub(crate) fn remessage(self, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..self
        }
    }
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ClassifiedError {}

/// Unified error type for the client
#[derive(Debug)]
pub enum ClientError {
    /// The backend (or the network in front of it) rejected the call
    Api(ClassifiedError),

    /// Configuration-related errors
    Configuration(String),

    /// Session storage I/O errors
    Storage(std::io::Error),

    /// Request or response (de)serialization errors
    Serialization(serde_json::Error),

    /// Internal errors
    Internal(String),
}

impl ClientError {
    /// The classified error, if this failure came from a dispatched call.
    pub fn classified(&self) -> Option<&ClassifiedError> {
        match self {
            ClientError::Api(err) => Some(err),
            _ => None,
        }
    }

    pub fn kind(&self) -> Option<ErrorKind> {
        self.classified().map(ClassifiedError::kind)
    }

    pub fn status_code(&self) -> Option<u16> {
        self.classified().and_then(ClassifiedError::status_code)
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Api(err) => write!(f, "{err}"),
            ClientError::Configuration(msg) => write!(f, "Configuration error: {msg}"),
            ClientError::Storage(err) => write!(f, "Session storage error: {err}"),
            ClientError::Serialization(err) => write!(f, "Serialization error: {err}"),
            ClientError::Internal(msg) => write!(f, "Internal error: {msg}"),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ClientError::Api(err) => Some(err),
            ClientError::Storage(err) => Some(err),
            ClientError::Serialization(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ClassifiedError> for ClientError {
    fn from(err: ClassifiedError) -> Self {
        ClientError::Api(err)
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        ClientError::Storage(err)
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Serialization(err)
    }
}

impl From<serde_yaml::Error> for ClientError {
    fn from(err: serde_yaml::Error) -> Self {
        ClientError::Configuration(err.to_string())
    }
}

impl From<validator::ValidationErrors> for ClientError {
    fn from(err: validator::ValidationErrors) -> Self {
        ClientError::Configuration(err.to_string())
    }
}

/// Result type alias for client operations
pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Helper trait for adding context to errors
pub trait ErrorContext<T> {
    fn with_context(self, context: &str) -> ClientResult<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: fmt::Display,
{
    fn with_context(self, context: &str) -> ClientResult<T> {
        self.map_err(|e| ClientError::Internal(format!("{context}: {e}")))
    }
}

#[macro_export]
macro_rules! config_error {
    ($msg:expr) => {
        $crate::core::ClientError::Configuration($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::core::ClientError::Configuration(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! internal_error {
    ($msg:expr) => {
        $crate::core::ClientError::Internal($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::core::ClientError::Internal(format!($fmt, $($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classified_error_accessors() {
        let err = ClassifiedError::new(ErrorKind::NotFound, "missing")
            .with_status(404)
            .with_body(json!({"detail": "missing"}));

        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.message(), "missing");
        assert_eq!(err.status_code(), Some(404));
        assert_eq!(err.raw_body(), Some(&json!({"detail": "missing"})));
        assert_eq!(err.to_string(), "missing");
    }

    #[test]
    fn test_null_body_is_not_kept() {
        let err = ClassifiedError::new(ErrorKind::ServerError, "boom").with_body(JsonValue::Null);
        assert!(err.raw_body().is_none());
    }

    #[test]
    fn test_client_error_kind() {
        let err: ClientError = ClassifiedError::new(ErrorKind::SessionExpired, "expired")
            .with_status(401)
            .into();
        assert_eq!(err.kind(), Some(ErrorKind::SessionExpired));
        assert_eq!(err.status_code(), Some(401));

        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ClientError = io_error.into();
        assert!(matches!(err, ClientError::Storage(_)));
        assert!(err.kind().is_none());
    }

    #[test]
    fn test_error_macros() {
        let err = config_error!("bad {}", "prefix");
        assert!(err.to_string().contains("Configuration error: bad prefix"));

        let err = internal_error!("oops");
        assert!(matches!(err, ClientError::Internal(_)));
    }

    #[test]
    fn test_with_context() {
        let result: Result<(), &str> = Err("inner");
        let err = result.with_context("outer").unwrap_err();
        assert_eq!(err.to_string(), "Internal error: outer: inner");
    }
}
