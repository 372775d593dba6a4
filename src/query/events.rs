//! Cache change notifications for renderers.

use crate::error::BackendError;
use crate::query::QueryKey;
use tokio::sync::broadcast;

/// A change to one cache entry
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEvent {
    FetchStarted { key: QueryKey, generation: u64 },
    Updated { key: QueryKey, generation: u64 },
    Failed {
        key: QueryKey,
        generation: u64,
        error: BackendError,
    },
    Invalidated { key: QueryKey },
    /// A superseded response arrived and was dropped
    Discarded { key: QueryKey, generation: u64 },
}

impl CacheEvent {
    pub fn key(&self) -> &QueryKey {
        match self {
            CacheEvent::FetchStarted { key, .. }
            | CacheEvent::Updated { key, .. }
            | CacheEvent::Failed { key, .. }
            | CacheEvent::Invalidated { key }
            | CacheEvent::Discarded { key, .. } => key,
        }
    }
}

/// Fan-out channel for cache events.
///
/// Sending never blocks; with no receivers the event is dropped.
#[derive(Clone)]
pub struct CacheEventBus {
    sender: broadcast::Sender<CacheEvent>,
}

impl CacheEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn emit(&self, event: CacheEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.sender.subscribe()
    }
}
