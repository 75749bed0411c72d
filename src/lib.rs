//! Client-side data-access layer of the RiverEdge business suite.
//!
//! It builds authenticated, tenant-scoped requests, normalizes the backend's
//! response envelopes, classifies failures, retries transient ones, and
//! coalesces bursts of per-row lookups into batched calls.

pub mod client;
pub mod coalesce;
pub mod config;
pub mod core;
pub mod logging;
pub mod metrics;
pub mod request;
pub mod resilience;
pub mod scheduler;
pub mod session;
pub(crate) mod utils;

pub use client::{ApiClient, ApiClientBuilder};
pub use core::{ClassifiedError, ClientError, ClientResult, ErrorKind};
