//! Shared test utilities for integration tests
//!
//! Scripted fetchers with virtual-time latency, helpers that wait for cache
//! entries to settle, and XDG environment isolation for config tests.

use factory_sync::query::{Fetcher, QueryCache, QueryEntry, QueryKey, QueryStatus};
use factory_sync::BackendError;
use futures::FutureExt;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// One scripted backend response
#[derive(Clone)]
pub struct Step {
    pub delay: Duration,
    pub result: Result<Value, BackendError>,
}

impl Step {
    pub fn ok(delay_ms: u64, value: Value) -> Self {
        Self {
            delay: Duration::from_millis(delay_ms),
            result: Ok(value),
        }
    }

    pub fn err(delay_ms: u64, error: BackendError) -> Self {
        Self {
            delay: Duration::from_millis(delay_ms),
            result: Err(error),
        }
    }
}

/// Fetcher that answers from `steps` in call order; the last step repeats.
/// Returns the fetcher and its call counter.
pub fn scripted(steps: Vec<Step>) -> (Fetcher, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let script = Arc::new(Mutex::new(VecDeque::from(steps)));
    let counter = Arc::clone(&calls);
    let fetcher: Fetcher = Arc::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        let step = {
            let mut script = script.lock().unwrap();
            if script.len() > 1 {
                script.pop_front()
            } else {
                script.front().cloned()
            }
        };
        async move {
            let step = step.expect("script must not be empty");
            tokio::time::sleep(step.delay).await;
            step.result
        }
        .boxed()
    });
    (fetcher, calls)
}

/// Yield (advancing virtual time) until `key` is no longer loading
pub async fn settle(cache: &QueryCache, key: &QueryKey) -> QueryEntry {
    tokio::time::timeout(Duration::from_secs(60), async {
        loop {
            if let Some(entry) = cache.peek(key) {
                if entry.status != QueryStatus::Loading && !cache.is_fetching(key) {
                    return entry;
                }
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("entry did not settle")
}

/// Yield until `check` holds
pub async fn eventually<F: Fn() -> bool>(check: F) {
    tokio::time::timeout(Duration::from_secs(60), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("condition never held")
}

/// Global mutex to serialize environment variable access across all tests
static ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

const ISOLATED_VARS: [&str; 3] = ["HOME", "XDG_CONFIG_HOME", "FACTORY_SYNC_ENV"];

/// Run `f` with HOME and XDG_CONFIG_HOME inside `test_dir` and no
/// FACTORY_SYNC_ENV, restoring the previous values afterwards
pub fn with_xdg_env<F, R>(test_dir: &TempDir, f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let saved: Vec<(&str, Option<String>)> = ISOLATED_VARS
        .iter()
        .map(|name| (*name, std::env::var(name).ok()))
        .collect();

    let home = test_dir.path().join("home");
    let config_home = test_dir.path().join("config");
    std::fs::create_dir_all(&home).unwrap();
    std::fs::create_dir_all(&config_home).unwrap();
    std::env::set_var("HOME", &home);
    std::env::set_var("XDG_CONFIG_HOME", &config_home);
    std::env::remove_var("FACTORY_SYNC_ENV");

    let result = f();

    for (name, value) in saved {
        match value {
            Some(value) => std::env::set_var(name, value),
            None => std::env::remove_var(name),
        }
    }
    result
}
