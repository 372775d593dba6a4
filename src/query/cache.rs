//! Query Cache
//!
//! Key-addressed store of the latest known backend values. Each key has at
//! most one entry and at most one fetch in flight; readers arriving while a
//! fetch is pending attach to it instead of starting another. Every fetch
//! initiation bumps the entry's request generation, and a response whose
//! generation is no longer the latest is dropped without touching the entry.

use crate::error::{BackendError, SyncError};
use crate::query::entry::{QueryEntry, QueryStatus};
use crate::query::events::{CacheEvent, CacheEventBus};
use crate::query::QueryKey;
use chrono::Utc;
use futures::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

/// Future produced by a fetcher
pub type FetchFuture = BoxFuture<'static, Result<Value, BackendError>>;

/// Produces a fresh backend request for one key
pub type Fetcher = Arc<dyn Fn() -> FetchFuture + Send + Sync>;

type Waiter = oneshot::Sender<Result<Value, BackendError>>;

/// Cache-wide defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Freshness window; reads inside it never refetch
    #[serde(default = "default_stale_time_ms")]
    pub stale_time_ms: u64,

    /// Retry a transient failure once before surfacing it
    #[serde(default = "default_true")]
    pub retry_transient: bool,

    /// Delay before the automatic retry (milliseconds)
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Buffered cache events per receiver
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_stale_time_ms() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

fn default_retry_delay_ms() -> u64 {
    500
}

fn default_event_capacity() -> usize {
    256
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            stale_time_ms: default_stale_time_ms(),
            retry_transient: default_true(),
            retry_delay_ms: default_retry_delay_ms(),
            event_capacity: default_event_capacity(),
        }
    }
}

/// Per-key fetch behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOptions {
    pub stale_time: Duration,
    pub retry_transient: bool,
}

impl QueryOptions {
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            stale_time: Duration::from_millis(config.stale_time_ms),
            retry_transient: config.retry_transient,
        }
    }

    pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = stale_time;
        self
    }
}

/// Cache counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub fetches_started: usize,
    pub fetches_succeeded: usize,
    pub fetches_failed: usize,
    pub retries: usize,
    /// Readers that attached to an already pending fetch
    pub deduplicated: usize,
    /// Late responses dropped by the generation check
    pub discarded: usize,
}

struct InFlight {
    generation: u64,
    waiters: Vec<Waiter>,
}

struct Slot {
    entry: QueryEntry,
    options: QueryOptions,
    fetcher: Option<Fetcher>,
    in_flight: Option<InFlight>,
    observers: usize,
    /// Fetches at or below this generation cannot make the entry fresh again
    invalidated_through: Option<u64>,
    failed_at: Option<Instant>,
}

impl Slot {
    fn new(key: QueryKey, options: QueryOptions) -> Self {
        Self {
            entry: QueryEntry::idle(key),
            options,
            fetcher: None,
            in_flight: None,
            observers: 0,
            invalidated_through: None,
            failed_at: None,
        }
    }

    fn is_stale(&self, now: Instant) -> bool {
        if self.invalidated_through.is_some() {
            return true;
        }
        match self.entry.fetched_at {
            Some(fetched_at) => now.duration_since(fetched_at) > self.options.stale_time,
            None => true,
        }
    }

    /// Whether a plain read should start a fetch
    fn wants_fetch(&self, now: Instant) -> bool {
        if self.observers == 0 || self.in_flight.is_some() || self.fetcher.is_none() {
            return false;
        }
        if !self.is_stale(now) {
            return false;
        }
        // A failure is not re-requested by every re-render; it waits one
        // freshness window (or an invalidation / manual refetch).
        match self.failed_at {
            Some(failed_at) if self.invalidated_through.is_none() => {
                now.duration_since(failed_at) > self.options.stale_time
            }
            _ => true,
        }
    }

    fn snapshot(&self, now: Instant) -> QueryEntry {
        let mut entry = self.entry.clone();
        entry.is_stale = self.is_stale(now);
        entry
    }

    /// Mark a new fetch as in flight, superseding any pending one
    fn begin(&mut self, waiter: Option<Waiter>) -> Option<(u64, Fetcher, bool)> {
        let fetcher = self.fetcher.clone()?;
        self.entry.request_generation += 1;
        let generation = self.entry.request_generation;
        let mut waiters = self
            .in_flight
            .take()
            .map(|pending| pending.waiters)
            .unwrap_or_default();
        waiters.extend(waiter);
        self.in_flight = Some(InFlight {
            generation,
            waiters,
        });
        self.entry.status = QueryStatus::Loading;
        Some((generation, fetcher, self.options.retry_transient))
    }
}

/// Pending or already available result of a fetch request
pub struct FetchHandle {
    key: QueryKey,
    generation: Option<u64>,
    state: HandleState,
}

enum HandleState {
    Ready(Result<Value, BackendError>),
    Pending(oneshot::Receiver<Result<Value, BackendError>>),
}

impl FetchHandle {
    /// Generation of the fetch this handle started or joined (`None` when
    /// served from fresh cached data)
    pub fn generation(&self) -> Option<u64> {
        self.generation
    }

    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    /// Wait for the value
    pub async fn wait(self) -> Result<Value, SyncError> {
        match self.state {
            HandleState::Ready(result) => result.map_err(SyncError::from),
            HandleState::Pending(receiver) => receiver
                .await
                .map_err(|_| SyncError::FetchAbandoned(self.key))?
                .map_err(SyncError::from),
        }
    }
}

struct CacheInner {
    slots: Mutex<HashMap<QueryKey, Slot>>,
    stats: RwLock<CacheStats>,
    events: CacheEventBus,
    defaults: QueryOptions,
    retry_delay: Duration,
}

/// Shared handle to the session's query cache
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<CacheInner>,
}

impl QueryCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                slots: Mutex::new(HashMap::new()),
                stats: RwLock::new(CacheStats::default()),
                events: CacheEventBus::new(config.event_capacity),
                defaults: QueryOptions::from_config(config),
                retry_delay: Duration::from_millis(config.retry_delay_ms),
            }),
        }
    }

    pub fn default_options(&self) -> QueryOptions {
        self.inner.defaults.clone()
    }

    /// Register the fetcher for a key, creating the entry if needed.
    ///
    /// The first registered fetcher for a key is kept.
    pub fn register(&self, key: QueryKey, fetcher: Fetcher) {
        self.register_with_options(key, fetcher, None);
    }

    pub fn register_with_options(
        &self,
        key: QueryKey,
        fetcher: Fetcher,
        options: Option<QueryOptions>,
    ) {
        let mut slots = self.inner.slots.lock();
        let slot = slots.entry(key.clone()).or_insert_with(|| {
            Slot::new(
                key,
                options.clone().unwrap_or_else(|| self.inner.defaults.clone()),
            )
        });
        if slot.fetcher.is_none() {
            slot.fetcher = Some(fetcher);
        }
        if let Some(options) = options {
            slot.options = options;
        }
    }

    pub fn contains(&self, key: &QueryKey) -> bool {
        self.inner.slots.lock().contains_key(key)
    }

    pub fn keys(&self) -> Vec<QueryKey> {
        let mut keys: Vec<QueryKey> = self.inner.slots.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Snapshot without side effects
    pub fn peek(&self, key: &QueryKey) -> Option<QueryEntry> {
        let now = Instant::now();
        self.inner.slots.lock().get(key).map(|slot| slot.snapshot(now))
    }

    /// Current entry for `key`.
    ///
    /// When the entry is stale or empty, has an active observer and nothing
    /// is pending, a fetch is started and the returned snapshot is already
    /// `Loading`. Unknown keys read as an idle entry.
    pub fn read(&self, key: &QueryKey) -> QueryEntry {
        let now = Instant::now();
        let runtime = tokio::runtime::Handle::try_current().is_ok();
        let (snapshot, started) = {
            let mut slots = self.inner.slots.lock();
            let Some(slot) = slots.get_mut(key) else {
                return QueryEntry::idle(key.clone());
            };
            let started = if slot.wants_fetch(now) {
                if runtime {
                    slot.begin(None)
                } else {
                    warn!(key = %key, "Stale entry not refreshed: no async runtime");
                    None
                }
            } else {
                None
            };
            (slot.snapshot(now), started)
        };

        if let Some((generation, fetcher, retry)) = started {
            self.launch(key.clone(), generation, fetcher, retry);
        }
        snapshot
    }

    /// Resolve the value for `key`, joining a pending fetch if there is one.
    ///
    /// Fresh cached data is returned without a request.
    pub fn fetch(&self, key: &QueryKey) -> Result<FetchHandle, SyncError> {
        self.request(key, false)
    }

    /// Start a new fetch for `key` even if one is pending or the entry is
    /// fresh. A pending fetch is superseded: its waiters move to this one and
    /// its late response is discarded.
    pub fn refetch(&self, key: &QueryKey) -> Result<FetchHandle, SyncError> {
        self.request(key, true)
    }

    fn request(&self, key: &QueryKey, force: bool) -> Result<FetchHandle, SyncError> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(SyncError::RuntimeUnavailable);
        }
        let now = Instant::now();
        let (tx, rx) = oneshot::channel();

        let started = {
            let mut slots = self.inner.slots.lock();
            let slot = slots
                .get_mut(key)
                .ok_or_else(|| SyncError::UnknownQuery(key.clone()))?;
            if slot.fetcher.is_none() {
                return Err(SyncError::UnknownQuery(key.clone()));
            }

            if !force {
                if let Some(pending) = slot.in_flight.as_mut() {
                    pending.waiters.push(tx);
                    let generation = pending.generation;
                    drop(slots);
                    self.inner.stats.write().deduplicated += 1;
                    debug!(key = %key, generation, "Joined pending fetch");
                    return Ok(FetchHandle {
                        key: key.clone(),
                        generation: Some(generation),
                        state: HandleState::Pending(rx),
                    });
                }
                if !slot.is_stale(now) {
                    if let Some(data) = slot.entry.data.clone() {
                        return Ok(FetchHandle {
                            key: key.clone(),
                            generation: None,
                            state: HandleState::Ready(Ok(data)),
                        });
                    }
                }
            }

            slot.begin(Some(tx))
        };

        let Some((generation, fetcher, retry)) = started else {
            return Err(SyncError::UnknownQuery(key.clone()));
        };
        self.launch(key.clone(), generation, fetcher, retry);
        Ok(FetchHandle {
            key: key.clone(),
            generation: Some(generation),
            state: HandleState::Pending(rx),
        })
    }

    /// Store a value as if a fetch had just succeeded
    pub fn write(&self, key: &QueryKey, value: Value) {
        {
            let mut slots = self.inner.slots.lock();
            let slot = slots
                .entry(key.clone())
                .or_insert_with(|| Slot::new(key.clone(), self.inner.defaults.clone()));
            slot.entry.data = Some(value);
            slot.entry.fetched_at = Some(Instant::now());
            slot.entry.updated_at = Some(Utc::now());
            slot.entry.last_error = None;
            slot.failed_at = None;
            slot.invalidated_through = None;
            if slot.in_flight.is_none() {
                slot.entry.status = QueryStatus::Success;
            }
        }
        self.inner.events.emit(CacheEvent::Updated {
            key: key.clone(),
            generation: 0,
        });
    }

    /// Expire the entry for `key`. Returns whether the key has an active
    /// observer (and therefore should be refetched right away).
    pub fn invalidate(&self, key: &QueryKey) -> bool {
        let observed = {
            let mut slots = self.inner.slots.lock();
            let Some(slot) = slots.get_mut(key) else {
                return false;
            };
            slot.invalidated_through = Some(slot.entry.request_generation);
            slot.observers > 0
        };
        debug!(key = %key, observed, "Invalidated query");
        self.inner.events.emit(CacheEvent::Invalidated { key: key.clone() });
        observed
    }

    pub(crate) fn add_observer(&self, key: &QueryKey) {
        if let Some(slot) = self.inner.slots.lock().get_mut(key) {
            slot.observers += 1;
        }
    }

    pub(crate) fn remove_observer(&self, key: &QueryKey) {
        if let Some(slot) = self.inner.slots.lock().get_mut(key) {
            slot.observers = slot.observers.saturating_sub(1);
        }
    }

    pub fn observer_count(&self, key: &QueryKey) -> usize {
        self.inner
            .slots
            .lock()
            .get(key)
            .map(|slot| slot.observers)
            .unwrap_or(0)
    }

    pub fn is_fetching(&self, key: &QueryKey) -> bool {
        self.inner
            .slots
            .lock()
            .get(key)
            .map(|slot| slot.in_flight.is_some())
            .unwrap_or(false)
    }

    pub fn events(&self) -> broadcast::Receiver<CacheEvent> {
        self.inner.events.subscribe()
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.stats.read().clone()
    }

    fn launch(&self, key: QueryKey, generation: u64, fetcher: Fetcher, retry: bool) {
        self.inner.stats.write().fetches_started += 1;
        debug!(key = %key, generation, "Starting fetch");
        self.inner.events.emit(CacheEvent::FetchStarted {
            key: key.clone(),
            generation,
        });
        let cache = self.clone();
        tokio::spawn(async move {
            cache.run_fetch(key, generation, fetcher, retry).await;
        });
    }

    fn is_current(&self, key: &QueryKey, generation: u64) -> bool {
        self.inner
            .slots
            .lock()
            .get(key)
            .and_then(|slot| slot.in_flight.as_ref())
            .map(|pending| pending.generation == generation)
            .unwrap_or(false)
    }

    async fn run_fetch(self, key: QueryKey, generation: u64, fetcher: Fetcher, retry: bool) {
        let mut result = fetcher().await;

        let transient = match &result {
            Err(err) if err.is_transient() => Some(err.to_string()),
            _ => None,
        };
        if let Some(error) = transient {
            if retry && self.is_current(&key, generation) {
                warn!(
                    key = %key,
                    generation,
                    error = %error,
                    "Transient fetch failure, retrying once"
                );
                self.inner.stats.write().retries += 1;
                sleep(self.inner.retry_delay).await;
                if self.is_current(&key, generation) {
                    result = fetcher().await;
                }
            }
        }

        self.complete(&key, generation, result);
    }

    fn complete(&self, key: &QueryKey, generation: u64, result: Result<Value, BackendError>) {
        let waiters = {
            let mut slots = self.inner.slots.lock();
            let Some(slot) = slots.get_mut(key) else {
                return;
            };
            let is_latest = slot
                .in_flight
                .as_ref()
                .map(|pending| pending.generation == generation)
                .unwrap_or(false);
            if !is_latest {
                drop(slots);
                self.inner.stats.write().discarded += 1;
                debug!(key = %key, generation, "Discarded superseded response");
                self.inner.events.emit(CacheEvent::Discarded {
                    key: key.clone(),
                    generation,
                });
                return;
            }

            let waiters = slot
                .in_flight
                .take()
                .map(|pending| pending.waiters)
                .unwrap_or_default();

            match &result {
                Ok(value) => {
                    slot.entry.data = Some(value.clone());
                    slot.entry.fetched_at = Some(Instant::now());
                    slot.entry.updated_at = Some(Utc::now());
                    slot.entry.status = QueryStatus::Success;
                    slot.entry.last_error = None;
                    slot.failed_at = None;
                    if slot
                        .invalidated_through
                        .map(|through| generation > through)
                        .unwrap_or(false)
                    {
                        slot.invalidated_through = None;
                    }
                }
                Err(err) => {
                    // Previous data stays in place
                    slot.entry.status = QueryStatus::Error;
                    slot.entry.last_error = Some(err.clone());
                    slot.failed_at = Some(Instant::now());
                }
            }
            waiters
        };

        match &result {
            Ok(_) => {
                self.inner.stats.write().fetches_succeeded += 1;
                self.inner.events.emit(CacheEvent::Updated {
                    key: key.clone(),
                    generation,
                });
            }
            Err(err) => {
                self.inner.stats.write().fetches_failed += 1;
                warn!(key = %key, generation, error = %err, "Fetch failed");
                self.inner.events.emit(CacheEvent::Failed {
                    key: key.clone(),
                    generation,
                    error: err.clone(),
                });
            }
        }

        for tx in waiters {
            let _ = tx.send(result.clone());
        }
    }
}
