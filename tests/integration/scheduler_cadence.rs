//! Polling cadence selection and timer lifecycle over virtual time

use super::test_utils::{scripted, settle, Step};
use factory_sync::config::PollingConfig;
use factory_sync::query::{CacheConfig, QueryCache, QueryKey};
use factory_sync::scheduler::{Cadence, FetchScheduler};
use factory_sync::session::running_aware;
use serde_json::json;
use std::sync::atomic::Ordering;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_fastest_subscription_sets_polling_rate() {
    let cache = QueryCache::new(&CacheConfig::default());
    let scheduler = FetchScheduler::new(cache.clone());
    let key = QueryKey::new("cycles").with("p1");
    let (fetcher, calls) = scripted(vec![Step::ok(0, json!([]))]);

    let slow = scheduler.subscribe(key.clone(), fetcher.clone(), Cadence::every_ms(10_000));
    let fast = scheduler.subscribe(key.clone(), fetcher, Cadence::every_ms(3_000));
    assert_eq!(
        scheduler.effective_interval(&key),
        Some(Duration::from_millis(3_000))
    );

    // Initial fetch plus ticks at 3s, 6s and 9s
    tokio::time::sleep(Duration::from_millis(9_500)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 4);

    drop(fast);
    assert_eq!(
        scheduler.effective_interval(&key),
        Some(Duration::from_millis(10_000))
    );
    tokio::time::sleep(Duration::from_millis(9_000)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    tokio::time::sleep(Duration::from_millis(1_100)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 5);

    drop(slow);
    assert_eq!(scheduler.effective_interval(&key), None);
    assert!(!scheduler.has_timer(&key));
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 5);
}

#[tokio::test(start_paused = true)]
async fn test_disabled_subscription_does_not_poll() {
    let cache = QueryCache::new(&CacheConfig::default());
    let scheduler = FetchScheduler::new(cache.clone());
    let key = QueryKey::new("events").with("p1").with(50u32);
    let (fetcher, calls) = scripted(vec![Step::ok(0, json!([]))]);

    let mut sub = scheduler.subscribe(key.clone(), fetcher, Cadence::every_ms(2_000));
    settle(&cache, &key).await;
    sub.set_enabled(false);
    let before = calls.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(calls.load(Ordering::SeqCst), before);
    assert_eq!(cache.observer_count(&key), 0);

    sub.set_enabled(true);
    settle(&cache, &key).await;
    assert_eq!(calls.load(Ordering::SeqCst), before + 1);
}

#[tokio::test(start_paused = true)]
async fn test_running_aware_cadence_speeds_up_when_loop_starts() {
    let cache = QueryCache::new(&CacheConfig::default());
    let scheduler = FetchScheduler::new(cache.clone());
    let polling = PollingConfig::default();
    let status_key = QueryKey::new("status").with("p1");
    let logs_key = QueryKey::new("logs").with("p1").with(200u32);
    let (fetcher, calls) = scripted(vec![Step::ok(0, json!(["line"]))]);

    let _logs = scheduler.subscribe(
        logs_key.clone(),
        fetcher,
        running_aware(
            "p1".to_string(),
            Duration::from_millis(polling.logs_running_ms),
            Duration::from_millis(polling.idle_ms),
        ),
    );
    assert_eq!(
        scheduler.effective_interval(&logs_key),
        Some(Duration::from_millis(polling.idle_ms))
    );
    // Let the timer start its idle sleep
    settle(&cache, &logs_key).await;

    cache.write(
        &status_key,
        json!({
            "is_running": true,
            "pid": 4001,
            "current_cycle": 0,
            "total_cycles": 0,
            "consecutive_errors": 0,
            "last_cycle_at": null,
            "uptime_seconds": 0
        }),
    );
    assert_eq!(
        scheduler.effective_interval(&logs_key),
        Some(Duration::from_millis(polling.logs_running_ms))
    );

    // The idle sleep already in progress finishes first; later ticks use the fast rate
    tokio::time::sleep(Duration::from_millis(polling.idle_ms + 3 * polling.logs_running_ms + 100)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 5);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_all_polling() {
    let cache = QueryCache::new(&CacheConfig::default());
    let scheduler = FetchScheduler::new(cache.clone());
    let key = QueryKey::new("projects");
    let (fetcher, calls) = scripted(vec![Step::ok(0, json!([]))]);

    let _sub = scheduler.subscribe(key.clone(), fetcher, Cadence::every_ms(1_500));
    settle(&cache, &key).await;
    scheduler.shutdown();
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!scheduler.has_timer(&key));
}
