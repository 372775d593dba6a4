//! Fetch Scheduler
//!
//! Keeps one polling timer per subscribed key. The timer period is the
//! fastest cadence among the key's enabled subscriptions and is recomputed on
//! every tick, so cadences that depend on other cached state (for example
//! "poll faster while the loop is running") take effect without
//! resubscribing. A tick only reads the cache; the cache decides whether the
//! entry is stale enough to fetch.

use crate::error::SyncError;
use crate::query::{FetchHandle, Fetcher, QueryCache, QueryEntry, QueryKey, QueryOptions};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, trace, warn};

/// Cadence computed from current cache contents
pub type CadenceFn = Arc<dyn Fn(&QueryCache) -> Duration + Send + Sync>;

/// How often a subscription wants its key refreshed
#[derive(Clone)]
pub enum Cadence {
    /// Fetch on subscribe and on invalidation only
    Manual,
    Every(Duration),
    Dynamic(CadenceFn),
}

impl Cadence {
    pub fn every_ms(ms: u64) -> Self {
        Cadence::Every(Duration::from_millis(ms))
    }

    pub fn dynamic<F>(f: F) -> Self
    where
        F: Fn(&QueryCache) -> Duration + Send + Sync + 'static,
    {
        Cadence::Dynamic(Arc::new(f))
    }

    fn resolve(&self, cache: &QueryCache) -> Option<Duration> {
        match self {
            Cadence::Manual => None,
            Cadence::Every(interval) => Some(*interval),
            Cadence::Dynamic(f) => Some(f(cache)),
        }
    }
}

impl fmt::Debug for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cadence::Manual => write!(f, "Manual"),
            Cadence::Every(interval) => write!(f, "Every({:?})", interval),
            Cadence::Dynamic(_) => write!(f, "Dynamic"),
        }
    }
}

/// Identifies one subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// Everything needed to subscribe to a key
pub struct SubscriptionRequest {
    pub key: QueryKey,
    pub fetcher: Fetcher,
    pub options: Option<QueryOptions>,
    pub cadence: Cadence,
    pub enabled: bool,
}

impl SubscriptionRequest {
    pub fn new(key: QueryKey, fetcher: Fetcher, cadence: Cadence) -> Self {
        Self {
            key,
            fetcher,
            options: None,
            cadence,
            enabled: true,
        }
    }

    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.options = Some(options);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

struct SubscriptionState {
    cadence: Cadence,
    enabled: bool,
}

#[derive(Default)]
struct KeySchedule {
    subscriptions: BTreeMap<SubscriptionId, SubscriptionState>,
    timer: Option<JoinHandle<()>>,
}

impl KeySchedule {
    fn interval(&self, cache: &QueryCache) -> Option<Duration> {
        self.subscriptions
            .values()
            .filter(|sub| sub.enabled)
            .filter_map(|sub| sub.cadence.resolve(cache))
            .min()
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

struct SchedulerInner {
    cache: QueryCache,
    keys: Mutex<HashMap<QueryKey, KeySchedule>>,
    next_id: AtomicU64,
}

impl SchedulerInner {
    fn interval_for(&self, key: &QueryKey) -> Option<Duration> {
        self.keys
            .lock()
            .get(key)
            .and_then(|schedule| schedule.interval(&self.cache))
    }
}

impl Drop for SchedulerInner {
    fn drop(&mut self) {
        for schedule in self.keys.get_mut().values_mut() {
            schedule.cancel_timer();
        }
    }
}

/// Drives periodic refresh of subscribed keys
#[derive(Clone)]
pub struct FetchScheduler {
    inner: Arc<SchedulerInner>,
}

impl FetchScheduler {
    pub fn new(cache: QueryCache) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                cache,
                keys: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn cache(&self) -> &QueryCache {
        &self.inner.cache
    }

    /// Subscribe with an enabled subscription and default options
    pub fn subscribe(&self, key: QueryKey, fetcher: Fetcher, cadence: Cadence) -> Subscription {
        self.subscribe_with(SubscriptionRequest::new(key, fetcher, cadence))
    }

    pub fn subscribe_with(&self, request: SubscriptionRequest) -> Subscription {
        let SubscriptionRequest {
            key,
            fetcher,
            options,
            cadence,
            enabled,
        } = request;
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));

        self.inner
            .cache
            .register_with_options(key.clone(), fetcher, options);

        {
            let mut keys = self.inner.keys.lock();
            let schedule = keys.entry(key.clone()).or_default();
            schedule
                .subscriptions
                .insert(id, SubscriptionState { cadence, enabled });
            if enabled {
                self.inner.cache.add_observer(&key);
            }
            self.reschedule(&key, schedule);
        }

        debug!(key = %key, subscription = id.0, enabled, "Subscribed");
        if enabled {
            self.inner.cache.read(&key);
        }

        Subscription {
            id,
            key,
            enabled,
            scheduler: Arc::downgrade(&self.inner),
        }
    }

    /// Fastest cadence among the enabled subscriptions of `key`
    pub fn effective_interval(&self, key: &QueryKey) -> Option<Duration> {
        self.inner.interval_for(key)
    }

    pub fn has_timer(&self, key: &QueryKey) -> bool {
        self.inner
            .keys
            .lock()
            .get(key)
            .map(|schedule| schedule.timer.is_some())
            .unwrap_or(false)
    }

    pub fn subscription_count(&self, key: &QueryKey) -> usize {
        self.inner
            .keys
            .lock()
            .get(key)
            .map(|schedule| schedule.subscriptions.len())
            .unwrap_or(0)
    }

    /// Cancel every timer and drop all subscriptions
    pub fn shutdown(&self) {
        let drained: Vec<(QueryKey, KeySchedule)> = self.inner.keys.lock().drain().collect();
        for (key, mut schedule) in drained {
            schedule.cancel_timer();
            let observers = schedule
                .subscriptions
                .values()
                .filter(|sub| sub.enabled)
                .count();
            for _ in 0..observers {
                self.inner.cache.remove_observer(&key);
            }
        }
        debug!("Fetch scheduler shut down");
    }

    fn reschedule(&self, key: &QueryKey, schedule: &mut KeySchedule) {
        Self::restart_timer(&self.inner, key, schedule);
    }

    fn restart_timer(inner: &Arc<SchedulerInner>, key: &QueryKey, schedule: &mut KeySchedule) {
        schedule.cancel_timer();
        if schedule.interval(&inner.cache).is_none() {
            return;
        }
        if tokio::runtime::Handle::try_current().is_err() {
            warn!(key = %key, "No async runtime; polling disabled for key");
            return;
        }
        let weak = Arc::downgrade(inner);
        let key = key.clone();
        schedule.timer = Some(tokio::spawn(tick_loop(weak, key)));
    }

    fn set_enabled_inner(inner: &Arc<SchedulerInner>, key: &QueryKey, id: SubscriptionId, enabled: bool) {
        let changed = {
            let mut keys = inner.keys.lock();
            let Some(schedule) = keys.get_mut(key) else {
                return;
            };
            let Some(sub) = schedule.subscriptions.get_mut(&id) else {
                return;
            };
            if sub.enabled == enabled {
                false
            } else {
                sub.enabled = enabled;
                if enabled {
                    inner.cache.add_observer(key);
                } else {
                    inner.cache.remove_observer(key);
                }
                Self::restart_timer(inner, key, schedule);
                true
            }
        };
        if changed && enabled {
            inner.cache.read(key);
        }
    }

    fn unsubscribe_inner(inner: &Arc<SchedulerInner>, key: &QueryKey, id: SubscriptionId) {
        let mut keys = inner.keys.lock();
        let Some(schedule) = keys.get_mut(key) else {
            return;
        };
        let Some(sub) = schedule.subscriptions.remove(&id) else {
            return;
        };
        if sub.enabled {
            inner.cache.remove_observer(key);
        }
        if schedule.subscriptions.is_empty() {
            schedule.cancel_timer();
            keys.remove(key);
        } else {
            Self::restart_timer(inner, key, schedule);
        }
        debug!(key = %key, subscription = id.0, "Unsubscribed");
    }
}

async fn tick_loop(scheduler: Weak<SchedulerInner>, key: QueryKey) {
    loop {
        let interval = {
            let Some(inner) = scheduler.upgrade() else {
                return;
            };
            match inner.interval_for(&key) {
                Some(interval) => interval,
                None => return,
            }
        };
        sleep(interval).await;

        let Some(inner) = scheduler.upgrade() else {
            return;
        };
        trace!(key = %key, ?interval, "Poll tick");
        inner.cache.read(&key);
    }
}

/// Handle for one subscription; dropping it unsubscribes.
pub struct Subscription {
    id: SubscriptionId,
    key: QueryKey,
    enabled: bool,
    scheduler: Weak<SchedulerInner>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Enable or disable without losing the subscription
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if let Some(inner) = self.scheduler.upgrade() {
            FetchScheduler::set_enabled_inner(&inner, &self.key, self.id, enabled);
        }
    }

    /// Current entry, refreshing it if stale
    pub fn read(&self) -> Option<QueryEntry> {
        self.scheduler
            .upgrade()
            .map(|inner| inner.cache.read(&self.key))
    }

    /// Manual refetch, available even after an error was surfaced
    pub fn refetch(&self) -> Result<FetchHandle, SyncError> {
        let inner = self
            .scheduler
            .upgrade()
            .ok_or_else(|| SyncError::FetchAbandoned(self.key.clone()))?;
        inner.cache.refetch(&self.key)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.scheduler.upgrade() {
            FetchScheduler::unsubscribe_inner(&inner, &self.key, self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("enabled", &self.enabled)
            .finish()
    }
}
