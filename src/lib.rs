//! factory-sync: Client-side Synchronization for an Agent Factory Dashboard
//!
//! Keeps an interactive view of projects, their running loops and the agent
//! library consistent with a backend: a keyed query cache with
//! stale-while-revalidate semantics, cadence-driven polling, mutation-driven
//! invalidation, and the pure derivations (catalog merge, runtime override
//! resolution, command palette) renderers consume.

pub mod backend;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod invalidation;
pub mod logging;
pub mod overrides;
pub mod palette;
pub mod query;
pub mod scheduler;
pub mod session;
pub mod types;

pub use error::{BackendError, SyncError};
pub use query::{QueryCache, QueryEntry, QueryKey, QueryStatus};
pub use session::{Command, Query, SyncSession};
