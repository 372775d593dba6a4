//! Query cache: keys, entries, change events and the store itself.

pub mod cache;
pub mod entry;
pub mod events;
pub mod key;

pub use cache::{
    CacheConfig, CacheStats, FetchFuture, FetchHandle, Fetcher, QueryCache, QueryOptions,
};
pub use entry::{QueryEntry, QueryStatus, QueryView};
pub use events::CacheEvent;
pub use key::{KeySegment, QueryKey};
