//! Fakes for the core traits, shared by the unit tests.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use futures::future::BoxFuture;
use http::StatusCode;
use serde_json::Value as JsonValue;

use crate::client::transport::{TransportError, WireRequest, WireResponse};

use super::{ClientError, ErrorReporter, Navigator, Scheduler, TimerHandle, Transport};

type Responder = Box<dyn Fn(&WireRequest) -> Result<WireResponse, TransportError> + Send + Sync>;

/// Transport answering from a closure and recording every request
pub(crate) struct MockTransport {
    responder: Responder,
    requests: Mutex<Vec<WireRequest>>,
}

impl MockTransport {
    pub fn new(
        responder: impl Fn(&WireRequest) -> Result<WireResponse, TransportError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Always answers `status` with `body` serialized as JSON.
    pub fn json(status: u16, body: JsonValue) -> Self {
        let raw = serde_json::to_vec(&body).unwrap();
        Self::new(move |_| {
            Ok(WireResponse::new(
                StatusCode::from_u16(status).unwrap(),
                raw.clone(),
            ))
        })
    }

    pub fn failing(message: &str) -> Self {
        let message = message.to_string();
        Self::new(move |_| Err(TransportError::new(message.clone())))
    }

    pub fn requests(&self) -> Vec<WireRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: WireRequest) -> Result<WireResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        // let concurrent callers interleave like real I/O would
        tokio::task::yield_now().await;
        (self.responder)(&request)
    }
}

struct ManualTimer {
    deadline: Duration,
    cancelled: Arc<AtomicBool>,
    task: BoxFuture<'static, ()>,
}

#[derive(Default)]
struct ManualState {
    now: Duration,
    timers: Vec<ManualTimer>,
    sleeps: Vec<Duration>,
}

/// Fake clock: timers only fire on [`ManualScheduler::advance`], sleeps return at once.
#[derive(Default)]
pub(crate) struct ManualScheduler {
    state: Mutex<ManualState>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves the clock forward and runs every timer that came due.
    pub async fn advance(&self, by: Duration) {
        let due: Vec<BoxFuture<'static, ()>> = {
            let mut state = self.state.lock().unwrap();
            state.now += by;
            let now = state.now;
            let (due, pending): (Vec<ManualTimer>, Vec<ManualTimer>) = state
                .timers
                .drain(..)
                .filter(|t| !t.cancelled.load(Ordering::SeqCst))
                .partition(|t| t.deadline <= now);
            state.timers = pending;
            due.into_iter().map(|t| t.task).collect()
        };

        for task in due {
            task.await;
        }
    }

    /// Timers scheduled and not yet fired or cancelled
    pub fn pending(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .timers
            .iter()
            .filter(|t| !t.cancelled.load(Ordering::SeqCst))
            .count()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.state.lock().unwrap().sleeps.clone()
    }
}

#[async_trait]
impl Scheduler for ManualScheduler {
    fn schedule_once(&self, delay: Duration, task: BoxFuture<'static, ()>) -> TimerHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let mut state = self.state.lock().unwrap();
        let deadline = state.now + delay;
        state.timers.push(ManualTimer {
            deadline,
            cancelled: cancelled.clone(),
            task,
        });
        TimerHandle::new(move || cancelled.store(true, Ordering::SeqCst))
    }

    async fn sleep(&self, delay: Duration) {
        self.state.lock().unwrap().sleeps.push(delay);
    }
}

/// Navigator remembering where it was sent
pub(crate) struct RecordingNavigator {
    current: Mutex<String>,
    visits: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn at(path: &str) -> Self {
        Self {
            current: Mutex::new(path.to_string()),
            visits: Mutex::new(Vec::new()),
        }
    }

    pub fn set_current(&self, path: &str) {
        *self.current.lock().unwrap() = path.to_string();
    }

    pub fn visits(&self) -> Vec<String> {
        self.visits.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn current_path(&self) -> String {
        self.current.lock().unwrap().clone()
    }

    fn navigate(&self, path: &str) {
        self.visits.lock().unwrap().push(path.to_string());
        self.set_current(path);
    }
}

#[derive(Default)]
pub(crate) struct RecordingReporter {
    warnings: Mutex<Vec<String>>,
    reports: Mutex<Vec<String>>,
}

impl RecordingReporter {
    pub fn warnings(&self) -> Vec<String> {
        self.warnings.lock().unwrap().clone()
    }

    pub fn reports(&self) -> Vec<String> {
        self.reports.lock().unwrap().clone()
    }
}

impl ErrorReporter for RecordingReporter {
    fn warn(&self, message: &str) {
        self.warnings.lock().unwrap().push(message.to_string());
    }

    fn report(&self, error: &ClientError) {
        self.reports.lock().unwrap().push(error.to_string());
    }
}
