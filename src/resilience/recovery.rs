use std::future::Future;

use log::{debug, error, warn};

use crate::core::{ClientError, ClientResult, ErrorReporter, Scheduler};

use super::retry::{with_retry, RetryPolicy};

/// What to do when a wrapped call fails
#[derive(Debug, Clone)]
pub enum RecoveryStrategy<T> {
    Retry(RetryPolicy),
    /// Substitute a value and warn the user.
    Fallback(T),
    /// Swallow the failure.
    Ignore,
    /// Report the failure visibly and return it.
    Fail,
}

/// Runs `op` under `strategy`.
///
/// `Ok(None)` only comes back from [`RecoveryStrategy::Ignore`].
pub async fn with_recovery<T, F, Fut>(
    mut op: F,
    strategy: RecoveryStrategy<T>,
    scheduler: &dyn Scheduler,
    reporter: &dyn ErrorReporter,
) -> ClientResult<Option<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ClientResult<T>>,
{
    match strategy {
        RecoveryStrategy::Retry(policy) => with_retry(op, &policy, scheduler).await.map(Some),
        RecoveryStrategy::Fallback(value) => match op().await {
            Ok(result) => Ok(Some(result)),
            Err(e) => {
                reporter.warn(&format!("{e}, showing fallback data"));
                Ok(Some(value))
            }
        },
        RecoveryStrategy::Ignore => match op().await {
            Ok(result) => Ok(Some(result)),
            Err(e) => {
                debug!("Ignored error: {e}");
                Ok(None)
            }
        },
        RecoveryStrategy::Fail => match op().await {
            Ok(result) => Ok(Some(result)),
            Err(e) => {
                reporter.report(&e);
                Err(e)
            }
        },
    }
}

/// Reporter writing to the log, for headless callers
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn warn(&self, message: &str) {
        warn!("{message}");
    }

    fn report(&self, err: &ClientError) {
        match err.kind() {
            Some(kind) => error!("Request failed ({kind}): {err}"),
            None => error!("{err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        testing::{ManualScheduler, RecordingReporter},
        ClassifiedError, ErrorKind,
    };
    use std::{
        sync::atomic::{AtomicU32, Ordering},
        time::Duration,
    };

    fn failing() -> ClientError {
        ClassifiedError::new(ErrorKind::ServerError, "backend down")
            .with_status(503)
            .into()
    }

    #[tokio::test]
    async fn test_fallback_warns_and_substitutes() {
        let reporter = RecordingReporter::default();
        let out = with_recovery(
            || async { Err(failing()) },
            RecoveryStrategy::Fallback(vec![0u32]),
            &ManualScheduler::new(),
            &reporter,
        )
        .await
        .unwrap();

        assert_eq!(out, Some(vec![0]));
        assert_eq!(reporter.warnings().len(), 1);
        assert!(reporter.warnings()[0].contains("backend down"));
        assert!(reporter.reports().is_empty());
    }

    #[tokio::test]
    async fn test_ignore_swallows() {
        let reporter = RecordingReporter::default();
        let out: Option<u32> = with_recovery(
            || async { Err(failing()) },
            RecoveryStrategy::Ignore,
            &ManualScheduler::new(),
            &reporter,
        )
        .await
        .unwrap();

        assert!(out.is_none());
        assert!(reporter.warnings().is_empty());
        assert!(reporter.reports().is_empty());
    }

    #[tokio::test]
    async fn test_fail_reports_and_returns() {
        let reporter = RecordingReporter::default();
        let result: ClientResult<Option<u32>> = with_recovery(
            || async { Err(failing()) },
            RecoveryStrategy::Fail,
            &ManualScheduler::new(),
            &reporter,
        )
        .await;

        assert_eq!(result.unwrap_err().kind(), Some(ErrorKind::ServerError));
        assert_eq!(reporter.reports(), vec!["backend down".to_string()]);
    }

    #[tokio::test]
    async fn test_retry_delegates_to_back_off() {
        let scheduler = ManualScheduler::new();
        let calls = &AtomicU32::new(0);
        let out = with_recovery(
            move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(failing())
                } else {
                    Ok(7)
                }
            },
            RecoveryStrategy::Retry(RetryPolicy::new(2, Duration::from_millis(10), true)),
            &scheduler,
            &RecordingReporter::default(),
        )
        .await
        .unwrap();

        assert_eq!(out, Some(7));
        assert_eq!(scheduler.sleeps(), vec![Duration::from_millis(10)]);
    }

    #[tokio::test]
    async fn test_success_passes_through_every_strategy() {
        let reporter = RecordingReporter::default();
        let scheduler = ManualScheduler::new();
        for strategy in [
            RecoveryStrategy::Retry(RetryPolicy::default()),
            RecoveryStrategy::Fallback(0),
            RecoveryStrategy::Ignore,
            RecoveryStrategy::Fail,
        ] {
            let out = with_recovery(|| async { Ok(1) }, strategy, &scheduler, &reporter)
                .await
                .unwrap();
            assert_eq!(out, Some(1));
        }
        assert!(reporter.warnings().is_empty());
    }
}
