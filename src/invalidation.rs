//! Invalidation Bus
//!
//! After a mutation succeeds, its declared keys are expired. Keys with an
//! active observer are refetched right away; the rest refetch on their next
//! read. Invalidation only sets a marker on the entry, so overlapping calls
//! never conflict; fetch de-duplication stays with the cache.

use crate::query::{QueryCache, QueryKey};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Keys a mutation makes stale when it succeeds
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationDescriptor {
    pub affected_keys: BTreeSet<QueryKey>,
}

impl MutationDescriptor {
    pub fn new<I>(keys: I) -> Self
    where
        I: IntoIterator<Item = QueryKey>,
    {
        Self {
            affected_keys: keys.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.affected_keys.is_empty()
    }
}

/// Outcome of one invalidation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvalidationReport {
    /// Keys that had a cache entry and are now stale
    pub marked: Vec<QueryKey>,
    /// Subset of `marked` with an observer, refetched immediately
    pub refetched: Vec<QueryKey>,
}

#[derive(Clone)]
pub struct InvalidationBus {
    cache: QueryCache,
}

impl InvalidationBus {
    pub fn new(cache: QueryCache) -> Self {
        Self { cache }
    }

    /// Expire every key in `keys`.
    ///
    /// Observed keys get a new fetch before this returns, so the next read
    /// sees `Loading` (or the refreshed value), never the pre-mutation data
    /// as fresh.
    pub fn invalidate<'a, I>(&self, keys: I) -> InvalidationReport
    where
        I: IntoIterator<Item = &'a QueryKey>,
    {
        let mut report = InvalidationReport::default();
        for key in keys {
            if !self.cache.contains(key) {
                continue;
            }
            let observed = self.cache.invalidate(key);
            report.marked.push(key.clone());
            if !observed {
                continue;
            }
            match self.cache.refetch(key) {
                // The handle is not awaited; completion lands in the cache.
                Ok(_) => report.refetched.push(key.clone()),
                Err(err) => warn!(key = %key, error = %err, "Refetch after invalidation failed to start"),
            }
        }
        debug!(
            marked = report.marked.len(),
            refetched = report.refetched.len(),
            "Invalidation pass complete"
        );
        report
    }

    pub fn apply(&self, mutation: &MutationDescriptor) -> InvalidationReport {
        self.invalidate(&mutation.affected_keys)
    }
}
