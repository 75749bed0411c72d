use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::core::{Scheduler, TimerHandle};

/// [`Scheduler`] on the tokio timer wheel.
///
/// The task is spawned on its own once the delay elapses, so cancelling a
/// handle after it fired never aborts a task half way.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioScheduler;

#[async_trait]
impl Scheduler for TokioScheduler {
    fn schedule_once(&self, delay: Duration, task: BoxFuture<'static, ()>) -> TimerHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let fired = cancelled.clone();

        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !fired.load(Ordering::SeqCst) {
                tokio::spawn(task);
            }
        });

        TimerHandle::new(move || {
            cancelled.store(true, Ordering::SeqCst);
            timer.abort();
        })
    }

    async fn sleep(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[tokio::test]
    async fn test_fires_once() {
        let count = Arc::new(AtomicU32::new(0));
        let task_count = count.clone();
        let _handle = TokioScheduler.schedule_once(
            Duration::from_millis(5),
            Box::pin(async move {
                task_count.fetch_add(1, Ordering::SeqCst);
            }),
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_task_never_runs() {
        let count = Arc::new(AtomicU32::new(0));
        let task_count = count.clone();
        let handle = TokioScheduler.schedule_once(
            Duration::from_millis(20),
            Box::pin(async move {
                task_count.fetch_add(1, Ordering::SeqCst);
            }),
        );
        handle.cancel();

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
