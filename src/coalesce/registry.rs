use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard, Weak},
    time::Duration,
};

use log::{debug, warn};
use tokio::sync::watch;

use crate::{
    config::{self, DebounceMode},
    core::{Scheduler, TimerHandle},
    metrics,
};

use super::source::{BatchSource, LookupKey};

const QUANTITY_BATCH: &str = "quantity";
const CONFIGURED_BATCH: &str = "configured";

/// Lookup result as seen by a row
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Lookup<V> {
    Loading,
    Ready(V),
}

impl<V> Lookup<V> {
    pub fn ready(self) -> Option<V> {
        match self {
            Lookup::Ready(value) => Some(value),
            Lookup::Loading => None,
        }
    }
}

struct State<K> {
    pending: HashSet<K>,
    /// Only grows: a key is fetched at most once per scope.
    fetched: HashSet<K>,
    timer: Option<TimerHandle>,
    quantities: HashMap<K, f64>,
    configured: HashMap<K, bool>,
    closed: bool,
}

impl<K> Default for State<K> {
    fn default() -> Self {
        Self {
            pending: HashSet::new(),
            fetched: HashSet::new(),
            timer: None,
            quantities: HashMap::new(),
            configured: HashMap::new(),
            closed: false,
        }
    }
}

struct Inner<K: LookupKey> {
    state: Mutex<State<K>>,
    source: Arc<dyn BatchSource<K>>,
    scheduler: Arc<dyn Scheduler>,
    window: Duration,
    mode: DebounceMode,
    version: watch::Sender<u64>,
}

/// Per-scope registry merging row lookups into batched calls.
///
/// Rows register the keys they need; after the debounce window every key not
/// fetched before goes out in one quantity batch and one flag batch, issued in
/// parallel. Dropping the registry closes it: the pending timer is cancelled
/// and results still in flight are discarded.
pub struct CoalescingRegistry<K: LookupKey> {
    inner: Arc<Inner<K>>,
}

impl<K: LookupKey> CoalescingRegistry<K> {
    pub fn new(
        source: Arc<dyn BatchSource<K>>,
        scheduler: Arc<dyn Scheduler>,
        window: Duration,
        mode: DebounceMode,
    ) -> Self {
        let (version, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                source,
                scheduler,
                window,
                mode,
                version,
            }),
        }
    }

    pub fn from_config(
        source: Arc<dyn BatchSource<K>>,
        scheduler: Arc<dyn Scheduler>,
        conf: &config::Coalescing,
    ) -> Self {
        Self::new(source, scheduler, conf.window, conf.mode)
    }

    /// Idempotent. Starts (or, in sliding mode, restarts) the debounce window.
    pub fn register_key(&self, key: K) {
        let mut state = self.inner.lock();
        if state.closed || state.fetched.contains(&key) {
            return;
        }
        state.pending.insert(key);

        match self.inner.mode {
            DebounceMode::Fixed => {
                if state.timer.is_none() {
                    state.timer = Some(Inner::schedule_flush(&self.inner));
                }
            }
            DebounceMode::Sliding => {
                if let Some(timer) = state.timer.take() {
                    timer.cancel();
                }
                state.timer = Some(Inner::schedule_flush(&self.inner));
            }
        }
    }

    pub fn register_keys(&self, keys: impl IntoIterator<Item = K>) {
        for key in keys {
            self.register_key(key);
        }
    }

    pub fn quantity(&self, key: &K) -> Lookup<f64> {
        match self.inner.lock().quantities.get(key) {
            Some(quantity) => Lookup::Ready(*quantity),
            None => Lookup::Loading,
        }
    }

    pub fn configured(&self, key: &K) -> Lookup<bool> {
        match self.inner.lock().configured.get(key) {
            Some(flag) => Lookup::Ready(*flag),
            None => Lookup::Loading,
        }
    }

    /// Ticks once per completed flush.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.version.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Cancels the pending flush; later results are discarded.
    pub fn close(&self) {
        let timer = {
            let mut state = self.inner.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.pending.clear();
            state.timer.take()
        };
        if let Some(timer) = timer {
            timer.cancel();
        }
        debug!("Coalescing registry closed");
    }
}

impl<K: LookupKey> Drop for CoalescingRegistry<K> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<K: LookupKey> Inner<K> {
    fn lock(&self) -> MutexGuard<'_, State<K>> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn schedule_flush(this: &Arc<Self>) -> TimerHandle {
        let scope: Weak<Self> = Arc::downgrade(this);
        this.scheduler.schedule_once(
            this.window,
            Box::pin(async move {
                if let Some(inner) = scope.upgrade() {
                    inner.flush().await;
                }
            }),
        )
    }

    async fn flush(&self) {
        let to_fetch: Vec<K> = {
            let mut state = self.lock();
            state.timer = None;
            if state.closed {
                return;
            }
            let pending = std::mem::take(&mut state.pending);
            let mut keys: Vec<K> = pending
                .into_iter()
                .filter(|key| !state.fetched.contains(key))
                .collect();
            keys.sort();
            state.fetched.extend(keys.iter().cloned());
            keys
        };

        if to_fetch.is_empty() {
            return;
        }
        debug!("Flushing {} coalesced lookup keys", to_fetch.len());
        metrics::record_coalesced(to_fetch.len());

        let (quantities, configured) = futures::join!(
            self.source.fetch_quantities(&to_fetch),
            self.source.fetch_configured(&to_fetch)
        );

        let quantities = match quantities {
            Ok(map) => {
                metrics::record_batch(QUANTITY_BATCH, true);
                Some(map)
            }
            Err(e) => {
                metrics::record_batch(QUANTITY_BATCH, false);
                warn!("Quantity batch failed for {} keys: {e}", to_fetch.len());
                None
            }
        };

        let configured = match configured {
            Ok(mut map) => {
                metrics::record_batch(CONFIGURED_BATCH, true);
                for key in &to_fetch {
                    map.entry(key.clone()).or_insert(false);
                }
                Some(map)
            }
            Err(e) => {
                metrics::record_batch(CONFIGURED_BATCH, false);
                warn!("Configured-flag batch failed for {} keys: {e}", to_fetch.len());
                None
            }
        };

        {
            let mut state = self.lock();
            if state.closed {
                debug!("Registry closed during flush, dropping results");
                return;
            }
            if let Some(map) = quantities {
                state.quantities.extend(map);
            }
            if let Some(map) = configured {
                state.configured.extend(map);
            }
        }

        self.version.send_modify(|version| *version += 1);
    }
}
