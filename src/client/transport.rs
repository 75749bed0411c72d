use std::{fmt, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use reqwest::{multipart, Url};

use crate::{
    core::{ClientResult, ErrorContext, Transport},
    request::{FormPart, MultipartForm},
};

/// Body as it goes on the wire
#[derive(Clone, Debug, PartialEq)]
pub enum WireBody {
    Empty,
    Bytes(Bytes),
    Multipart(MultipartForm),
}

#[derive(Clone, Debug)]
pub struct WireRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: WireBody,
}

#[derive(Clone, Debug)]
pub struct WireResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

impl WireResponse {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// No HTTP response was received
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportError {
    message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for TransportError {}

/// [`Transport`] backed by a pooled `reqwest::Client`
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> ClientResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .with_context("failed to build HTTP client")?;
        Ok(Self { http })
    }

    fn build_form(form: MultipartForm) -> Result<multipart::Form, TransportError> {
        let mut out = multipart::Form::new();
        for (name, part) in form.parts().iter().cloned() {
            out = match part {
                FormPart::Text(value) => out.text(name, value),
                FormPart::File {
                    data,
                    file_name,
                    content_type,
                } => {
                    let mut file = multipart::Part::bytes(data.to_vec()).file_name(file_name);
                    if let Some(ct) = content_type {
                        file = file
                            .mime_str(&ct)
                            .map_err(|e| TransportError::new(format!("invalid part type: {e}")))?;
                    }
                    out.part(name, file)
                }
            };
        }
        Ok(out)
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: WireRequest) -> Result<WireResponse, TransportError> {
        let WireRequest {
            method,
            url,
            headers,
            body,
        } = request;

        let mut builder = self.http.request(method, url).headers(headers);
        builder = match body {
            WireBody::Empty => builder,
            WireBody::Bytes(bytes) => builder.body(bytes),
            WireBody::Multipart(form) => builder.multipart(Self::build_form(form)?),
        };

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::new(e.to_string()))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::new(format!("failed to read response body: {e}")))?;

        Ok(WireResponse { status, body })
    }
}
