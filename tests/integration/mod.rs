//! Integration tests for factory-sync

mod config_integration;
mod invalidation_flow;
mod query_cache;
mod scheduler_cadence;
mod session_mutations;
mod test_utils;
