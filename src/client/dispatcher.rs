use std::sync::Arc;

use bytes::Bytes;
use http::{
    header::{AUTHORIZATION, CONTENT_TYPE},
    HeaderMap, HeaderName, HeaderValue,
};
use log::{debug, info, warn};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::{
    config, config_error, internal_error,
    core::{ClassifiedError, ClientError, ClientResult, ErrorContext, ErrorKind, Transport},
    metrics,
    request::{RequestBody, RequestDescriptor},
    session::{ActivityTracker, SessionStore},
    utils::request::build_url,
};

use super::{
    classify::{classify, is_missing_tenant_message, network_error, MISSING_TENANT_MESSAGE},
    envelope::{normalize, parse_body},
    transport::{WireBody, WireRequest},
};

const JSON_CONTENT_TYPE: &str = "application/json";

/// Turns descriptors into wire calls and wire responses into results.
///
/// Session teardown on a protected 401 happens here; navigation does not.
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    session: Arc<SessionStore>,
    activity: Arc<ActivityTracker>,
    base_url: String,
    api_prefix: String,
    tenant_header: HeaderName,
}

impl Dispatcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        session: Arc<SessionStore>,
        activity: Arc<ActivityTracker>,
        conf: &config::Client,
    ) -> ClientResult<Self> {
        let tenant_header = HeaderName::from_bytes(conf.tenant_header.as_bytes())
            .map_err(|e| config_error!("invalid tenant header '{}': {e}", conf.tenant_header))?;

        Ok(Self {
            transport,
            session,
            activity,
            base_url: conf.base_url.clone(),
            api_prefix: conf.api_prefix.clone(),
            tenant_header,
        })
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    pub async fn dispatch(&self, descriptor: &RequestDescriptor) -> ClientResult<JsonValue> {
        let trace_id = Uuid::new_v4();
        let method = descriptor.method().to_string();

        let request = self.build_request(descriptor)?;
        debug!("[{trace_id}] {method} {}", request.url);

        let result = self.execute(descriptor, request).await;
        match &result {
            Ok(_) => {
                debug!("[{trace_id}] {method} {} ok", descriptor.path());
                metrics::record_request(&method, "ok");
            }
            Err(e) => {
                let outcome = e.kind().map_or("internal", |kind| kind.as_str());
                info!("[{trace_id}] {method} {} failed: {e}", descriptor.path());
                metrics::record_request(&method, outcome);
            }
        }
        result
    }

    pub(crate) fn build_request(&self, descriptor: &RequestDescriptor) -> ClientResult<WireRequest> {
        let url = build_url(
            &self.base_url,
            &self.api_prefix,
            descriptor.path(),
            descriptor.query_pairs(),
        )
        .map_err(|e| internal_error!(e))?;

        let multipart = descriptor.body().map_or(false, RequestBody::is_multipart);

        let mut headers = HeaderMap::new();
        if !multipart {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
        }

        if descriptor.requires_auth() {
            let context = self.session.context();
            match context.token {
                Some(token) => {
                    let value = HeaderValue::from_str(&format!("Bearer {token}"))
                        .with_context("stored token is not a valid header value")?;
                    headers.insert(AUTHORIZATION, value);
                }
                None => warn!("Protected request {} sent without a token", descriptor.path()),
            }
            match context.tenant_id {
                Some(tenant_id) => {
                    let value = HeaderValue::from_str(&tenant_id)
                        .with_context("stored tenant id is not a valid header value")?;
                    headers.insert(self.tenant_header.clone(), value);
                }
                None => debug!("Protected request {} sent without a tenant id", descriptor.path()),
            }
        }

        for (name, value) in descriptor.extra_headers() {
            let name = HeaderName::from_bytes(name.as_bytes()).with_context("invalid header name")?;
            if multipart && name == CONTENT_TYPE {
                continue;
            }
            let value = HeaderValue::from_str(value).with_context("invalid header value")?;
            headers.insert(name, value);
        }

        let body = match descriptor.body() {
            None => WireBody::Empty,
            Some(RequestBody::Json(value)) => WireBody::Bytes(Bytes::from(serde_json::to_vec(value)?)),
            Some(RequestBody::Text(text)) => WireBody::Bytes(Bytes::from(text.clone())),
            Some(RequestBody::Multipart(form)) => WireBody::Multipart(form.clone()),
        };

        Ok(WireRequest {
            method: descriptor.method().as_http(),
            url,
            headers,
            body,
        })
    }

    async fn execute(
        &self,
        descriptor: &RequestDescriptor,
        request: WireRequest,
    ) -> ClientResult<JsonValue> {
        let response = match self.transport.send(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!("No response for {}: {e}", descriptor.path());
                return Err(network_error(&e).into());
            }
        };

        let status = response.status.as_u16();
        let body = parse_body(&response.body);

        if response.status.is_success() {
            if descriptor.requires_auth() {
                self.activity.touch();
            }
            return Ok(normalize(body, status)?);
        }

        Err(self.on_failure(descriptor, classify(status, &body, descriptor)))
    }

    fn on_failure(
        &self,
        descriptor: &RequestDescriptor,
        error: ClassifiedError,
    ) -> ClientError {
        match error.kind() {
            ErrorKind::SessionExpired => {
                if self.session.clear() {
                    info!("Session cleared after 401 on {}", descriptor.path());
                }
                error.into()
            }
            ErrorKind::ValidationError
                if descriptor.requires_auth() && is_missing_tenant_message(error.message()) =>
            {
                // one re-resolution; a recovered id is written back for the next call
                match self.session.tenant_id() {
                    Some(tenant_id) => {
                        info!("Tenant context re-resolved to {tenant_id} after rejection");
                        error.into()
                    }
                    None => error.remessage(MISSING_TENANT_MESSAGE).into(),
                }
            }
            _ => error.into(),
        }
    }
}
