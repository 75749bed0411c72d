use once_cell::sync::Lazy;
use prometheus::{
    register_int_counter, register_int_counter_vec, Encoder, IntCounter, IntCounterVec,
    TextEncoder,
};

use crate::core::{ClientResult, ErrorContext};

// Dispatched calls by outcome
static REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "riveredge_client_requests_total",
        "Requests dispatched by the riveredge client",
        &[
            "method",  // HTTP method
            "outcome", // "ok" or the error kind
        ]
    )
    .unwrap()
});

static RETRIES: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "riveredge_client_retries_total",
        "Retry attempts scheduled by the back-off engine"
    )
    .unwrap()
});

static BATCH_CALLS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "riveredge_client_batch_calls_total",
        "Batched lookup calls issued by coalescing registries",
        &["batch", "outcome"]
    )
    .unwrap()
});

static KEYS_COALESCED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "riveredge_client_keys_coalesced_total",
        "Lookup keys fetched through a batched call"
    )
    .unwrap()
});

pub fn record_request(method: &str, outcome: &str) {
    REQUESTS.with_label_values(&[method, outcome]).inc();
}

pub fn record_retry() {
    RETRIES.inc();
}

pub fn record_batch(batch: &str, ok: bool) {
    let outcome = if ok { "ok" } else { "error" };
    BATCH_CALLS.with_label_values(&[batch, outcome]).inc();
}

pub fn record_coalesced(keys: usize) {
    KEYS_COALESCED.inc_by(keys as u64);
}

/// Text exposition of the default registry
pub fn render() -> ClientResult<String> {
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&prometheus::gather(), &mut buffer)
        .with_context("failed to encode metrics")?;
    String::from_utf8(buffer).with_context("metrics are not valid UTF-8")
}
