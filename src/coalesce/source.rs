use std::{collections::HashMap, fmt, hash::Hash, str::FromStr, sync::Arc};

use async_trait::async_trait;
use log::debug;
use serde::Serialize;
use serde_json::{json, Value as JsonValue};

use crate::{
    client::ApiClient,
    config,
    core::{ClassifiedError, ClientResult, ErrorKind},
};

/// Identifier of a row-level lookup (a material id, a product code).
pub trait LookupKey:
    Clone + Eq + Hash + Ord + fmt::Display + FromStr + Serialize + Send + Sync + 'static
{
}

impl<T> LookupKey for T where
    T: Clone + Eq + Hash + Ord + fmt::Display + FromStr + Serialize + Send + Sync + 'static
{
}

/// Batched lookups answered in one call per batch.
#[async_trait]
pub trait BatchSource<K: LookupKey>: Send + Sync {
    async fn fetch_quantities(&self, keys: &[K]) -> ClientResult<HashMap<K, f64>>;

    /// Keys missing from the answer are left out; the registry defaults them.
    async fn fetch_configured(&self, keys: &[K]) -> ClientResult<HashMap<K, bool>>;
}

fn as_quantity(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.parse().ok(),
        JsonValue::Object(obj) => ["available_quantity", "quantity"]
            .iter()
            .find_map(|field| obj.get(*field).and_then(as_quantity)),
        _ => None,
    }
}

fn as_flag(value: &JsonValue) -> Option<bool> {
    match value {
        JsonValue::Bool(b) => Some(*b),
        JsonValue::Object(obj) => ["exists", "has_bom"]
            .iter()
            .find_map(|field| obj.get(*field).and_then(JsonValue::as_bool)),
        _ => None,
    }
}

/// Reads an object keyed by id; unparseable ids and values are skipped.
fn keyed_map<K: LookupKey, V>(
    body: JsonValue,
    convert: impl Fn(&JsonValue) -> Option<V>,
) -> HashMap<K, V> {
    let JsonValue::Object(obj) = body else {
        debug!("Batch lookup answered with a non-object body");
        return HashMap::new();
    };

    obj.iter()
        .filter_map(|(raw_key, value)| {
            let key = raw_key.parse::<K>().ok()?;
            let value = convert(value)?;
            Some((key, value))
        })
        .collect()
}

fn unexpected(what: &str, key: &impl fmt::Display) -> ClassifiedError {
    ClassifiedError::new(
        ErrorKind::RequestError,
        format!("Unexpected {what} response for {key}"),
    )
}

/// Lookup endpoints reached through the shared request pipeline
pub struct HttpLookupSource {
    client: Arc<ApiClient>,
    endpoints: config::Lookups,
}

impl HttpLookupSource {
    pub fn new(client: Arc<ApiClient>, endpoints: config::Lookups) -> Self {
        Self { client, endpoints }
    }

    async fn batch(&self, path: &str, keys: &[impl Serialize]) -> ClientResult<JsonValue> {
        self.client.post(path, json!({ "keys": keys })).await
    }

    /// Single-key quantity lookup, for consumers outside a registry scope.
    pub async fn fetch_quantity<K: fmt::Display>(&self, key: &K) -> ClientResult<f64> {
        let path = format!("{}/{key}", self.endpoints.quantity_single.trim_end_matches('/'));
        let value = self.client.get(&path).await?;
        as_quantity(&value).ok_or_else(|| unexpected("quantity", key).into())
    }

    pub async fn fetch_configured<K: fmt::Display>(&self, key: &K) -> ClientResult<bool> {
        let path = format!(
            "{}/{key}",
            self.endpoints.configured_single.trim_end_matches('/')
        );
        let value = self.client.get(&path).await?;
        as_flag(&value).ok_or_else(|| unexpected("flag", key).into())
    }
}

#[async_trait]
impl<K: LookupKey> BatchSource<K> for HttpLookupSource {
    async fn fetch_quantities(&self, keys: &[K]) -> ClientResult<HashMap<K, f64>> {
        let body = self.batch(&self.endpoints.quantity_batch, keys).await?;
        Ok(keyed_map(body, as_quantity))
    }

    async fn fetch_configured(&self, keys: &[K]) -> ClientResult<HashMap<K, bool>> {
        let body = self.batch(&self.endpoints.configured_batch, keys).await?;
        Ok(keyed_map(body, as_flag))
    }
}
