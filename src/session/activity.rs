use std::{
    sync::{Arc, Mutex},
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use log::warn;

use crate::core::SessionStorage;

pub const LAST_ACTIVITY_KEY: &str = "last_activity_time";

/// Records the last successful authenticated call for the idle-timeout watchdog.
///
/// Writes are throttled: at most one per `throttle` window.
pub struct ActivityTracker {
    storage: Arc<dyn SessionStorage>,
    throttle: Duration,
    last_recorded: Mutex<Option<Instant>>,
}

impl ActivityTracker {
    pub fn new(storage: Arc<dyn SessionStorage>, throttle: Duration) -> Self {
        Self {
            storage,
            throttle,
            last_recorded: Mutex::new(None),
        }
    }

    /// Returns `true` if the timestamp was written.
    pub fn touch(&self) -> bool {
        self.touch_at(Instant::now(), SystemTime::now())
    }

    pub(crate) fn touch_at(&self, now: Instant, wall_clock: SystemTime) -> bool {
        {
            let mut last = self
                .last_recorded
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(previous) = *last {
                if now.saturating_duration_since(previous) < self.throttle {
                    return false;
                }
            }
            *last = Some(now);
        }

        let millis = wall_clock
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        if let Err(e) = self.storage.set(LAST_ACTIVITY_KEY, &millis.to_string()) {
            warn!("Failed to record last activity: {e}");
        }
        true
    }

    /// Last recorded activity, in milliseconds since the Unix epoch
    pub fn last_activity(&self) -> Option<u64> {
        self.storage
            .get(LAST_ACTIVITY_KEY)
            .and_then(|raw| raw.parse().ok())
    }
}
