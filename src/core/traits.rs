//! Core traits for the client
//!
//! These are the seams between the pipeline and the outside world: the wire,
//! the clock, persisted storage, navigation and user-facing error reporting.
//! Each one has a production implementation in the crate and a fake in tests.

use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::client::transport::{TransportError, WireRequest, WireResponse};

use super::error::{ClientError, ClientResult};

/// Executes one wire request
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send the request. `Err` means no HTTP response was received.
    async fn send(&self, request: WireRequest) -> Result<WireResponse, TransportError>;
}

/// Cancels a task registered with [`Scheduler::schedule_once`].
///
/// Dropping the handle does not cancel the task.
pub struct TimerHandle {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl TimerHandle {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

/// Timer abstraction used for debounce windows and retry back-off
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Run `task` once after `delay`, unless cancelled first.
    fn schedule_once(&self, delay: Duration, task: BoxFuture<'static, ()>) -> TimerHandle;

    /// Suspend the caller for `delay`.
    async fn sleep(&self, delay: Duration);
}

/// Persisted key/value storage backing the session
pub trait SessionStorage: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str) -> ClientResult<()>;

    /// Remove a key. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> ClientResult<()>;
}

/// Navigation collaborator used for the login redirect
pub trait Navigator: Send + Sync {
    /// Path of the surface currently shown
    fn current_path(&self) -> String;

    fn navigate(&self, path: &str);
}

/// User-facing error surfaces used by the recovery strategies
pub trait ErrorReporter: Send + Sync {
    /// Non-fatal, transient notification
    fn warn(&self, message: &str);

    /// Visible error report
    fn report(&self, error: &ClientError);
}
