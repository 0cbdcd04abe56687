//! Contest cache integration tests
//!
//! Covers reloads through the API, warm starts from the store, failure
//! reporting to `reload_now` callers and the assembled cache system.

use std::sync::Arc;
use std::time::Duration;

use cfmirror::api::ApiError;
use cfmirror::cache::{CacheError, CacheSystem, ContestCache};
use cfmirror::config::CacheConfig;
use cfmirror::events::{Event, EventKind, EventSystem};
use cfmirror::models::Phase;
use cfmirror::storage::CacheStore;

use crate::common::{contest, eventually, fast_config, finished_contest, now, problem, store, MockApi};

fn sample_contests() -> Vec<cfmirror::models::Contest> {
    vec![
        finished_contest(1, "Codeforces Round 1", 86_400),
        contest(2, "Codeforces Round 2", Phase::Before, now() + 86_400, 7200),
    ]
}

#[tokio::test]
async fn test_reload_now_stores_and_publishes() {
    let api = MockApi::new();
    api.set_contests(sample_contests());
    let store = store();
    let events = Arc::new(EventSystem::new());
    let config = CacheConfig::default();
    let cache = ContestCache::new(api.clone(), store.clone(), events.clone(), config.clone());

    let pending = events.subscribe_once(EventKind::ContestListRefresh);
    cache.reload_now().await.unwrap();

    match pending.wait(Some(Duration::from_secs(1))).await.unwrap() {
        Event::ContestListRefresh { contests } => assert_eq!(contests.len(), 2),
        other => panic!("Unexpected event: {other:?}"),
    }

    assert_eq!(store.fetch_contests().unwrap().len(), 2);
    assert_eq!(cache.get_contest(2).unwrap().phase, Phase::Before);
    assert!(matches!(cache.get_contest(3), Err(CacheError::ContestNotFound(3))));
    assert_eq!(cache.get_contests_in_phase(Phase::Finished).len(), 1);
    assert!(cache.get_running_contests().is_empty());

    // Next start is a day away, well past the activation lead
    assert_eq!(cache.next_delay(), config.contest_reload());
}

#[tokio::test]
async fn test_reload_failure_is_reported_and_keeps_snapshot() {
    let api = MockApi::new();
    api.set_contests(sample_contests());
    let events = Arc::new(EventSystem::new());
    let config = CacheConfig::default();
    let cache = ContestCache::new(api.clone(), store(), events, config.clone());

    cache.reload_now().await.unwrap();
    assert_eq!(cache.snapshot().contests.len(), 2);

    api.fail_contest_list(true);
    let err = cache.reload_now().await.unwrap_err();
    assert!(matches!(err, CacheError::RefreshFailed(_)));
    assert!(matches!(err.root(), CacheError::Api(ApiError::Http { status: 503 })));
    assert!(err.is_recoverable());

    // The previous snapshot survives and the retry comes sooner
    assert_eq!(cache.snapshot().contests.len(), 2);
    assert_eq!(cache.next_delay(), config.contest_exception_delay());

    api.fail_contest_list(false);
    cache.reload_now().await.unwrap();
    assert_eq!(cache.next_delay(), config.contest_reload());
}

#[tokio::test]
async fn test_warm_start_from_disk() {
    let api = MockApi::new();
    api.fail_contest_list(true);
    let store = store();
    store.cache_contests(&sample_contests()).unwrap();

    let events = Arc::new(EventSystem::new());
    let cache = ContestCache::new(api.clone(), store, events.clone(), CacheConfig::default());

    let pending = events.subscribe_once(EventKind::ContestListRefresh);
    cache.run().await.unwrap();
    assert!(cache.task().running());

    match pending.wait(Some(Duration::from_secs(1))).await.unwrap() {
        Event::ContestListRefresh { contests } => assert_eq!(contests.len(), 2),
        other => panic!("Unexpected event: {other:?}"),
    }
    assert_eq!(cache.get_contest(1).unwrap().name, "Codeforces Round 1");

    // The failing API reload leaves the disk data in place
    assert!(eventually(|| api.calls("contest.list") > 0, Duration::from_secs(2)).await);
    assert_eq!(cache.snapshot().contests.len(), 2);

    cache.stop().await;
    assert!(!cache.task().running());
}

#[tokio::test]
async fn test_cache_system_run_and_shutdown() {
    let api = MockApi::new();
    api.set_contests(sample_contests());
    api.set_problems(vec![problem(1, "A", "Watermelon", Some(800))]);

    let events = Arc::new(EventSystem::new());
    let caches = CacheSystem::new(api.clone(), store(), events.clone(), fast_config());

    caches.run().await.unwrap();
    assert_eq!(events.listener_count(EventKind::RatingChangesUpdate), 1);
    assert!(
        eventually(
            || caches.contest.snapshot().contests.len() == 2,
            Duration::from_secs(5)
        )
        .await
    );

    caches.problem.reload_now().await.unwrap();
    assert!(caches.problem.problem_by_name("Watermelon").is_some());

    caches.shutdown().await;
    assert!(!caches.contest.task().running());
    assert_eq!(events.listener_count(EventKind::RatingChangesUpdate), 0);
}
