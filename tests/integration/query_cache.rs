//! Query cache behavior under concurrent and failing fetches

use super::test_utils::{eventually, scripted, settle, Step};
use factory_sync::query::{CacheConfig, CacheEvent, QueryCache, QueryKey, QueryStatus};
use factory_sync::BackendError;
use futures::future::join_all;
use serde_json::json;
use std::sync::atomic::Ordering;
use std::time::Duration;

fn logs_key() -> QueryKey {
    QueryKey::new("logs").with("p1").with(200u32)
}

#[tokio::test(start_paused = true)]
async fn test_superseded_response_is_discarded() {
    let cache = QueryCache::new(&CacheConfig::default());
    let key = logs_key();
    let (fetcher, calls) = scripted(vec![
        Step::ok(500, json!(["old"])),
        Step::ok(10, json!(["new"])),
    ]);
    cache.register(key.clone(), fetcher);

    let first = cache.fetch(&key).unwrap();
    let second = cache.refetch(&key).unwrap();
    assert_eq!(first.generation(), Some(1));
    assert_eq!(second.generation(), Some(2));

    // The first caller's waiter moved to the newer fetch
    assert_eq!(first.wait().await.unwrap(), json!(["new"]));
    assert_eq!(second.wait().await.unwrap(), json!(["new"]));

    eventually(|| cache.stats().discarded == 1).await;
    let entry = cache.peek(&key).unwrap();
    assert_eq!(entry.data, Some(json!(["new"])));
    assert_eq!(entry.status, QueryStatus::Success);
    assert_eq!(entry.request_generation, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_readers_share_one_fetch() {
    let cache = QueryCache::new(&CacheConfig::default());
    let key = QueryKey::new("projects");
    let (fetcher, calls) = scripted(vec![Step::ok(100, json!([{"id": "p1"}]))]);
    cache.register(key.clone(), fetcher);

    let handles: Vec<_> = (0..3).map(|_| cache.fetch(&key).unwrap()).collect();
    let results = join_all(handles.into_iter().map(|h| h.wait())).await;

    for result in results {
        assert_eq!(result.unwrap(), json!([{"id": "p1"}]));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let stats = cache.stats();
    assert_eq!(stats.fetches_started, 1);
    assert_eq!(stats.deduplicated, 2);
}

#[tokio::test(start_paused = true)]
async fn test_transient_failure_retries_once_then_keeps_old_data() {
    let cache = QueryCache::new(&CacheConfig::default());
    let key = QueryKey::new("status").with("p1");
    let (fetcher, calls) = scripted(vec![
        Step::ok(0, json!({"is_running": false})),
        Step::err(0, BackendError::Transient("connection reset".to_string())),
        Step::err(0, BackendError::Transient("connection reset".to_string())),
    ]);
    cache.register(key.clone(), fetcher);
    cache.fetch(&key).unwrap().wait().await.unwrap();

    let err = cache.refetch(&key).unwrap().wait().await.unwrap_err();
    assert_eq!(
        err.backend(),
        Some(&BackendError::Transient("connection reset".to_string()))
    );

    let entry = cache.peek(&key).unwrap();
    assert_eq!(entry.status, QueryStatus::Error);
    assert_eq!(entry.data, Some(json!({"is_running": false})));
    assert!(entry.last_error.as_ref().map(|e| e.is_transient()).unwrap_or(false));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(cache.stats().retries, 1);
}

#[tokio::test(start_paused = true)]
async fn test_transient_failure_recovers_on_retry() {
    let cache = QueryCache::new(&CacheConfig::default());
    let key = QueryKey::new("settings");
    let (fetcher, calls) = scripted(vec![
        Step::err(0, BackendError::Transient("timeout".to_string())),
        Step::ok(0, json!({"default_engine": "claude"})),
    ]);
    cache.register(key.clone(), fetcher);

    let value = cache.fetch(&key).unwrap().wait().await.unwrap();
    assert_eq!(value, json!({"default_engine": "claude"}));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    let entry = cache.peek(&key).unwrap();
    assert_eq!(entry.status, QueryStatus::Success);
    assert!(entry.last_error.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_non_transient_failure_is_not_retried() {
    let cache = QueryCache::new(&CacheConfig::default());
    let key = QueryKey::new("status").with("ghost");
    let (fetcher, calls) = scripted(vec![Step::err(
        0,
        BackendError::NotFound("project 'ghost'".to_string()),
    )]);
    cache.register(key.clone(), fetcher);

    assert!(cache.fetch(&key).unwrap().wait().await.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.stats().retries, 0);
    assert_eq!(cache.peek(&key).unwrap().status, QueryStatus::Error);
}

#[tokio::test(start_paused = true)]
async fn test_fetch_started_before_invalidation_leaves_entry_stale() {
    let cache = QueryCache::new(&CacheConfig::default());
    let key = QueryKey::new("projects");
    let (fetcher, _calls) = scripted(vec![Step::ok(200, json!([]))]);
    cache.register(key.clone(), fetcher);

    let handle = cache.fetch(&key).unwrap();
    assert!(!cache.invalidate(&key));
    handle.wait().await.unwrap();

    let entry = settle(&cache, &key).await;
    assert_eq!(entry.status, QueryStatus::Success);
    assert!(entry.is_stale);

    // A fetch issued after the invalidation makes it fresh again
    cache.fetch(&key).unwrap().wait().await.unwrap();
    assert!(!cache.peek(&key).unwrap().is_stale);
}

#[tokio::test(start_paused = true)]
async fn test_entry_goes_stale_after_stale_time() {
    let cache = QueryCache::new(&CacheConfig::default());
    let key = QueryKey::new("consensus").with("p1");
    let (fetcher, calls) = scripted(vec![Step::ok(0, json!({"cycle": 1}))]);
    cache.register(key.clone(), fetcher);

    cache.fetch(&key).unwrap().wait().await.unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(!cache.peek(&key).unwrap().is_stale);
    cache.fetch(&key).unwrap().wait().await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(cache.peek(&key).unwrap().is_stale);
    cache.fetch(&key).unwrap().wait().await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_events_report_fetch_lifecycle() {
    let cache = QueryCache::new(&CacheConfig::default());
    let mut events = cache.events();
    let key = QueryKey::new("libraryToggles");
    let (fetcher, _calls) = scripted(vec![Step::ok(5, json!({}))]);
    cache.register(key.clone(), fetcher);

    cache.fetch(&key).unwrap().wait().await.unwrap();
    assert_eq!(
        events.recv().await.unwrap(),
        CacheEvent::FetchStarted {
            key: key.clone(),
            generation: 1
        }
    );
    assert_eq!(
        events.recv().await.unwrap(),
        CacheEvent::Updated {
            key: key.clone(),
            generation: 1
        }
    );
}
