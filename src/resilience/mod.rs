//! Retry with back-off and the recovery strategies built on top of it.

pub mod recovery;
pub mod retry;

pub use recovery::{with_recovery, LogReporter, RecoveryStrategy};
pub use retry::{is_transient, with_retry, RetryPolicy};
