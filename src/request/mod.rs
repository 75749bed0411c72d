//! Request descriptors
//!
//! A [`RequestDescriptor`] is a transport-agnostic description of one call.
//! Whether it carries credentials is decided once, here, by matching the path
//! against the public endpoint allow-list.

use std::fmt;

use bytes::Bytes;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::utils::request::path_matches;

/// Public endpoints: no bearer token, no tenant header, 401 means bad credentials.
pub const DEFAULT_PUBLIC_PATHS: &[&str] = &[
    "/auth/login",
    "/auth/guest-login",
    "/auth/register",
    "/tenants/search",
    "/tenants/check-domain",
    "/public/share",
    "/infra/auth/login",
];

/// Public endpoints whose failures read as a failed registration rather than a failed login.
pub const REGISTRATION_PATHS: &[&str] = &["/auth/register"];

static DEFAULT_POLICY: Lazy<EndpointPolicy> = Lazy::new(EndpointPolicy::default);

#[allow(clippy::upper_case_acronyms)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HttpMethod {
    GET,
    POST,
    PUT,
    PATCH,
    DELETE,
}

impl HttpMethod {
    pub fn as_http(&self) -> http::Method {
        match self {
            HttpMethod::GET => http::Method::GET,
            HttpMethod::POST => http::Method::POST,
            HttpMethod::PUT => http::Method::PUT,
            HttpMethod::PATCH => http::Method::PATCH,
            HttpMethod::DELETE => http::Method::DELETE,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let method = match self {
            HttpMethod::GET => "GET",
            HttpMethod::POST => "POST",
            HttpMethod::PUT => "PUT",
            HttpMethod::PATCH => "PATCH",
            HttpMethod::DELETE => "DELETE",
        };
        write!(f, "{}", method)
    }
}

impl std::str::FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::GET),
            "POST" => Ok(HttpMethod::POST),
            "PUT" => Ok(HttpMethod::PUT),
            "PATCH" => Ok(HttpMethod::PATCH),
            "DELETE" => Ok(HttpMethod::DELETE),
            other => Err(format!("unsupported method: {other}")),
        }
    }
}

/// One part of a multipart body
#[derive(Clone, Debug, PartialEq)]
pub enum FormPart {
    Text(String),
    File {
        data: Bytes,
        file_name: String,
        content_type: Option<String>,
    },
}

/// Multipart body, sent without the JSON content type so the transport sets the boundary
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MultipartForm {
    parts: Vec<(String, FormPart)>,
}

impl MultipartForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push((name.into(), FormPart::Text(value.into())));
        self
    }

    pub fn file(
        mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        data: impl Into<Bytes>,
        content_type: Option<&str>,
    ) -> Self {
        self.parts.push((
            name.into(),
            FormPart::File {
                data: data.into(),
                file_name: file_name.into(),
                content_type: content_type.map(str::to_string),
            },
        ));
        self
    }

    pub fn parts(&self) -> &[(String, FormPart)] {
        &self.parts
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum RequestBody {
    /// Serialized to JSON
    Json(JsonValue),
    /// Already serialized, sent as-is
    Text(String),
    Multipart(MultipartForm),
}

impl RequestBody {
    pub fn is_multipart(&self) -> bool {
        matches!(self, RequestBody::Multipart(_))
    }
}

/// Decides which paths are public.
#[derive(Clone, Debug)]
pub struct EndpointPolicy {
    public_paths: Vec<String>,
    registration_paths: Vec<String>,
}

impl Default for EndpointPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_PUBLIC_PATHS.iter().map(|p| p.to_string()).collect())
    }
}

impl EndpointPolicy {
    pub fn new(public_paths: Vec<String>) -> Self {
        Self {
            public_paths,
            registration_paths: REGISTRATION_PATHS.iter().map(|p| p.to_string()).collect(),
        }
    }

    pub fn is_public(&self, path: &str) -> bool {
        self.public_paths.iter().any(|p| path_matches(path, p))
    }

    pub fn is_registration(&self, path: &str) -> bool {
        self.registration_paths.iter().any(|p| path_matches(path, p))
    }

    /// Start a descriptor for `path`, classified against this policy.
    pub fn describe(&self, method: HttpMethod, path: impl Into<String>) -> RequestDescriptor {
        let path = path.into();
        let requires_auth = !self.is_public(&path);
        let registration = self.is_registration(&path);
        RequestDescriptor {
            path,
            method,
            query: Vec::new(),
            body: None,
            headers: Vec::new(),
            requires_auth,
            registration,
        }
    }
}

/// Transport-agnostic description of one call
#[derive(Clone, Debug, PartialEq)]
pub struct RequestDescriptor {
    path: String,
    method: HttpMethod,
    query: Vec<(String, JsonValue)>,
    body: Option<RequestBody>,
    headers: Vec<(String, String)>,
    requires_auth: bool,
    registration: bool,
}

impl RequestDescriptor {
    /// Classified against the built-in public endpoint list.
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        DEFAULT_POLICY.describe(method, path)
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::POST, path)
    }

    /// Append one query entry. `null` (and `None`) entries are kept here and
    /// dropped when the URL is built.
    pub fn query(mut self, name: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn json(mut self, body: JsonValue) -> Self {
        self.body = Some(RequestBody::Json(body));
        self
    }

    pub fn text(mut self, body: impl Into<String>) -> Self {
        self.body = Some(RequestBody::Text(body.into()));
        self
    }

    pub fn multipart(mut self, form: MultipartForm) -> Self {
        self.body = Some(RequestBody::Multipart(form));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn query_pairs(&self) -> &[(String, JsonValue)] {
        &self.query
    }

    pub fn body(&self) -> Option<&RequestBody> {
        self.body.as_ref()
    }

    pub fn extra_headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn requires_auth(&self) -> bool {
        self.requires_auth
    }

    pub fn is_public(&self) -> bool {
        !self.requires_auth
    }

    pub fn is_registration(&self) -> bool {
        self.registration
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_public_classification() {
        assert!(!RequestDescriptor::post("/auth/login").requires_auth());
        assert!(!RequestDescriptor::post("/auth/guest-login").requires_auth());
        assert!(!RequestDescriptor::post("/auth/register/personal").requires_auth());
        assert!(!RequestDescriptor::get("/tenants/search?keyword=acme").requires_auth());
        assert!(!RequestDescriptor::get("/public/share/3f2a").requires_auth());
    }

    #[test]
    fn test_login_substring_is_protected() {
        // audit listings merely contain "login"
        assert!(RequestDescriptor::get("/core/login-logs").requires_auth());
        assert!(RequestDescriptor::get("/system/login_logs").requires_auth());
        assert!(RequestDescriptor::get("/core/users/login-history").requires_auth());
        assert!(RequestDescriptor::get("/apps/registers").requires_auth());
    }

    #[test]
    fn test_registration_flag() {
        assert!(RequestDescriptor::post("/auth/register").is_registration());
        assert!(!RequestDescriptor::post("/auth/login").is_registration());
    }

    #[test]
    fn test_custom_policy() {
        let policy = EndpointPolicy::new(vec!["/open".to_string()]);
        assert!(policy.describe(HttpMethod::GET, "/open/docs").is_public());
        assert!(policy.describe(HttpMethod::GET, "/auth/login").requires_auth());
    }

    #[test]
    fn test_builder_keeps_order() {
        let desc = RequestDescriptor::get("/apps/items")
            .query("page", 1)
            .query("keyword", Option::<String>::None)
            .header("X-Trace", "1");
        assert_eq!(desc.method(), HttpMethod::GET);
        assert_eq!(desc.query_pairs()[0], ("page".to_string(), json!(1)));
        assert_eq!(desc.query_pairs()[1], ("keyword".to_string(), json!(null)));
        assert_eq!(desc.extra_headers().len(), 1);
        assert!(desc.body().is_none());
    }

    #[test]
    fn test_method_parse() {
        assert_eq!("patch".parse::<HttpMethod>(), Ok(HttpMethod::PATCH));
        assert!("HEAD".parse::<HttpMethod>().is_err());
        assert_eq!(HttpMethod::DELETE.to_string(), "DELETE");
        assert_eq!(HttpMethod::PUT.as_http(), http::Method::PUT);
    }

    #[test]
    fn test_multipart_body() {
        let form = MultipartForm::new()
            .text("category", "drawings")
            .file("file", "a.pdf", b"%PDF".to_vec(), Some("application/pdf"));
        let desc = RequestDescriptor::post("/core/files/upload").multipart(form);
        assert!(desc.body().map(RequestBody::is_multipart).unwrap_or(false));
    }
}
