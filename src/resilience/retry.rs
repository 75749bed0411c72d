use std::{fmt, future::Future, sync::Arc, time::Duration};

use log::debug;

use crate::{
    config,
    core::{ClientError, ClientResult, ErrorKind, Scheduler},
    metrics,
};

/// Statuses worth another attempt: the gateway or the backend was momentarily unavailable.
const TRANSIENT_STATUSES: &[u16] = &[502, 503, 504];

pub type RetryPredicate = Arc<dyn Fn(&ClientError, u32) -> bool + Send + Sync>;
pub type RetryHook = Arc<dyn Fn(u32, &ClientError) + Send + Sync>;

/// `NetworkError`, or `ServerError` with 502/503/504. Nothing else is retried by default.
pub fn is_transient(error: &ClientError) -> bool {
    match error.kind() {
        Some(ErrorKind::NetworkError) => true,
        Some(ErrorKind::ServerError) => error
            .status_code()
            .map_or(false, |status| TRANSIENT_STATUSES.contains(&status)),
        _ => false,
    }
}

#[derive(Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub exponential: bool,
    should_retry: RetryPredicate,
    on_retry: Option<RetryHook>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(1000), true)
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("exponential", &self.exponential)
            .field("on_retry", &self.on_retry.is_some())
            .finish()
    }
}

impl From<&config::Retry> for RetryPolicy {
    fn from(conf: &config::Retry) -> Self {
        Self::new(conf.max_retries, conf.base_delay, conf.exponential)
    }
}

impl RetryPolicy {
    /// Policy with the default transient-failure predicate.
    pub fn new(max_retries: u32, base_delay: Duration, exponential: bool) -> Self {
        Self {
            max_retries,
            base_delay,
            exponential,
            should_retry: Arc::new(|error: &ClientError, _: u32| is_transient(error)),
            on_retry: None,
        }
    }

    /// Replaces the predicate; it receives the error and the zero-based retry index.
    pub fn retry_if(
        mut self,
        predicate: impl Fn(&ClientError, u32) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.should_retry = Arc::new(predicate);
        self
    }

    /// Called with the one-based retry number before each delay.
    pub fn on_retry(mut self, hook: impl Fn(u32, &ClientError) + Send + Sync + 'static) -> Self {
        self.on_retry = Some(Arc::new(hook));
        self
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        if !self.exponential {
            return self.base_delay;
        }
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

/// Runs `op`, re-invoking it after a back-off delay while the policy allows.
pub async fn with_retry<T, F, Fut>(
    mut op: F,
    policy: &RetryPolicy,
    scheduler: &dyn Scheduler,
) -> ClientResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ClientResult<T>>,
{
    let mut attempt = 0;
    loop {
        let error = match op().await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        if attempt >= policy.max_retries || !(policy.should_retry)(&error, attempt) {
            return Err(error);
        }

        if let Some(hook) = &policy.on_retry {
            hook(attempt + 1, &error);
        }

        let delay = policy.delay_for(attempt);
        debug!(
            "Retry {}/{} in {}ms after: {error}",
            attempt + 1,
            policy.max_retries,
            delay.as_millis()
        );
        metrics::record_retry();
        scheduler.sleep(delay).await;
        attempt += 1;
    }
}
