use std::{
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use log::debug;

/// Cancellation flag owned by one consumer outside any registry scope.
///
/// Once cancelled, results arriving through [`ConsumerGuard::apply`] are dropped.
#[derive(Debug, Clone, Default)]
pub struct ConsumerGuard {
    cancelled: Arc<AtomicBool>,
}

impl ConsumerGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Awaits `fut` and hands the output back only if still live.
    pub async fn apply<T>(&self, fut: impl Future<Output = T>) -> Option<T> {
        let output = fut.await;
        if self.is_cancelled() {
            debug!("Discarding a late lookup result");
            return None;
        }
        Some(output)
    }
}
