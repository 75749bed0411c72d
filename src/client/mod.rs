//! Request pipeline
//!
//! [`ApiClient`] is the entry point every caller uses: it describes a call,
//! hands it to the [`Dispatcher`] and, on a session expiry, lets the
//! [`LoginRedirector`] decide whether to navigate.

pub mod classify;
pub mod dispatcher;
pub mod envelope;
pub mod transport;

use std::sync::Arc;

use log::info;
use serde::de::DeserializeOwned;
use serde_json::{json, Value as JsonValue};

use crate::{
    config::{Config, StorageKind},
    core::{ClientResult, Navigator, SessionStorage, Transport},
    internal_error,
    request::{EndpointPolicy, HttpMethod, MultipartForm, RequestDescriptor},
    session::{ActivityTracker, FileStorage, LoginRedirector, MemoryStorage, SessionStore},
};

pub use dispatcher::Dispatcher;
pub use envelope::{Page, ResponseEnvelope};
pub use transport::{ReqwestTransport, TransportError, WireBody, WireRequest, WireResponse};

const LOGIN_PATH: &str = "/auth/login";

pub struct ApiClientBuilder {
    config: Config,
    transport: Option<Arc<dyn Transport>>,
    storage: Option<Arc<dyn SessionStorage>>,
    navigator: Option<Arc<dyn Navigator>>,
}

impl ApiClientBuilder {
    /// Overrides the reqwest transport.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Overrides the storage selected in the session config.
    pub fn storage(mut self, storage: Arc<dyn SessionStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Enables the login redirect on session expiry.
    pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    pub fn build(self) -> ClientResult<ApiClient> {
        let Self {
            config,
            transport,
            storage,
            navigator,
        } = self;

        let transport = match transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(config.client.timeout)?),
        };

        let storage: Arc<dyn SessionStorage> = match storage {
            Some(storage) => storage,
            None => match config.session.storage {
                StorageKind::Memory => Arc::new(MemoryStorage::new()),
                StorageKind::File => Arc::new(FileStorage::open(&config.session.path)?),
            },
        };

        let session = Arc::new(SessionStore::new(storage.clone()));
        let activity = Arc::new(ActivityTracker::new(
            storage,
            config.session.activity_throttle,
        ));
        let dispatcher = Dispatcher::new(transport, session.clone(), activity, &config.client)?;

        let redirector = navigator.map(|navigator| {
            LoginRedirector::new(
                session,
                navigator,
                config.session.login_path.clone(),
                config.session.platform_login_path.clone(),
            )
        });

        Ok(ApiClient {
            dispatcher,
            policy: EndpointPolicy::new(config.client.public_paths),
            redirector,
        })
    }
}

pub struct ApiClient {
    dispatcher: Dispatcher,
    policy: EndpointPolicy,
    redirector: Option<LoginRedirector>,
}

impl ApiClient {
    pub fn builder(config: Config) -> ApiClientBuilder {
        ApiClientBuilder {
            config,
            transport: None,
            storage: None,
            navigator: None,
        }
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        self.dispatcher.session()
    }

    /// Descriptor classified against the configured public endpoints.
    pub fn describe(&self, method: HttpMethod, path: impl Into<String>) -> RequestDescriptor {
        self.policy.describe(method, path)
    }

    pub async fn send(&self, descriptor: &RequestDescriptor) -> ClientResult<JsonValue> {
        let result = self.dispatcher.dispatch(descriptor).await;
        if let (Err(e), Some(redirector)) = (&result, &self.redirector) {
            redirector.handle(e);
        }
        result
    }

    pub async fn send_as<T: DeserializeOwned>(&self, descriptor: &RequestDescriptor) -> ClientResult<T> {
        let value = self.send(descriptor).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn get(&self, path: &str) -> ClientResult<JsonValue> {
        self.send(&self.describe(HttpMethod::GET, path)).await
    }

    pub async fn post(&self, path: &str, body: JsonValue) -> ClientResult<JsonValue> {
        self.send(&self.describe(HttpMethod::POST, path).json(body)).await
    }

    pub async fn put(&self, path: &str, body: JsonValue) -> ClientResult<JsonValue> {
        self.send(&self.describe(HttpMethod::PUT, path).json(body)).await
    }

    pub async fn patch(&self, path: &str, body: JsonValue) -> ClientResult<JsonValue> {
        self.send(&self.describe(HttpMethod::PATCH, path).json(body)).await
    }

    pub async fn delete(&self, path: &str) -> ClientResult<JsonValue> {
        self.send(&self.describe(HttpMethod::DELETE, path)).await
    }

    pub async fn upload(&self, path: &str, form: MultipartForm) -> ClientResult<JsonValue> {
        self.send(&self.describe(HttpMethod::POST, path).multipart(form))
            .await
    }

    /// Logs in and stores token, tenant and profile in the session.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        tenant_domain: Option<&str>,
    ) -> ClientResult<JsonValue> {
        let mut body = json!({"username": username, "password": password});
        if let Some(domain) = tenant_domain {
            body["tenant_domain"] = json!(domain);
        }

        let response = self.post(LOGIN_PATH, body).await?;
        let token = response
            .get("access_token")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| internal_error!("login response has no access_token"))?;

        let user = response.get("user").cloned().filter(|u| !u.is_null());
        let tenant_id = match response.get("default_tenant_id") {
            Some(JsonValue::Number(n)) => Some(n.to_string()),
            Some(JsonValue::String(s)) if !s.is_empty() => Some(s.clone()),
            _ => None,
        };

        self.session()
            .establish(token, tenant_id.as_deref(), user)?;
        info!("Logged in as {username}");
        Ok(response)
    }

    /// Returns `false` if there was no session to clear.
    pub fn logout(&self) -> bool {
        self.session().clear()
    }
}
