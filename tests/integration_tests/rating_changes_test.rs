//! Rating changes cache integration tests

use std::sync::Arc;
use std::time::Duration;

use cfmirror::cache::{CacheError, CacheSystem};
use cfmirror::config::CacheConfig;
use cfmirror::events::{Event, EventKind, EventSystem};
use cfmirror::storage::CacheStore;

use crate::common::{eventually, fast_config, finished_contest, now, rating_change, store, MockApi};

#[tokio::test]
async fn test_fetch_contest_and_current_rating() {
    let api = MockApi::new();
    api.set_contests(vec![finished_contest(7, "Codeforces Round 7", 2 * 86_400)]);
    let t = now() - 86_400;
    api.set_rating_changes(
        7,
        vec![
            rating_change(7, "alice", 1500, 1550, t),
            rating_change(7, "bob", 1600, 1580, t),
        ],
    );

    let caches = CacheSystem::new(
        api.clone(),
        store(),
        Arc::new(EventSystem::new()),
        CacheConfig::default(),
    );
    caches.contest.reload_now().await.unwrap();

    let cache = &caches.rating_changes;
    assert_eq!(cache.fetch_contest(7).await.unwrap(), 2);
    assert!(cache.has_rating_changes_saved(7).unwrap());

    assert_eq!(cache.get_current_rating("alice", false), Some(1550));
    assert_eq!(cache.get_current_rating("carol", false), None);
    assert_eq!(cache.get_current_rating("carol", true), Some(1500));

    let mut ratings = cache.get_all_ratings();
    ratings.sort_unstable();
    assert_eq!(ratings, vec![1550, 1580]);

    let history = cache.get_rating_changes_for_handle("alice").unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].contest_name, "Codeforces Round 7");

    assert!(matches!(
        cache.fetch_contest(999).await,
        Err(CacheError::ContestNotFound(999))
    ));
}

#[tokio::test]
async fn test_fetch_missing_then_all() {
    let api = MockApi::new();
    api.set_contests(vec![
        finished_contest(7, "Codeforces Round 7", 3 * 86_400),
        finished_contest(8, "Codeforces Round 8", 2 * 86_400),
    ]);
    let t = now() - 86_400;
    api.set_rating_changes(
        7,
        vec![
            rating_change(7, "alice", 1500, 1550, t),
            rating_change(7, "bob", 1600, 1580, t),
        ],
    );
    api.set_rating_changes(8, vec![rating_change(8, "alice", 1550, 1600, t + 100)]);

    let store = store();
    store
        .save_rating_changes(&[rating_change(7, "alice", 1500, 1550, t)])
        .unwrap();

    let caches = CacheSystem::new(
        api.clone(),
        store.clone(),
        Arc::new(EventSystem::new()),
        CacheConfig::default(),
    );
    caches.contest.reload_now().await.unwrap();

    // Contest 7 already has changes stored
    assert_eq!(caches.rating_changes.fetch_missing_contests().await.unwrap(), 1);
    assert_eq!(api.calls("contest.ratingChanges"), 1);
    assert_eq!(caches.rating_changes.get_current_rating("alice", false), Some(1600));

    assert_eq!(caches.rating_changes.fetch_all_contests().await.unwrap(), 3);
    assert_eq!(store.get_rating_changes_for_contest(7).unwrap().len(), 2);
    assert_eq!(store.get_all_rating_changes().unwrap().len(), 3);
}

#[tokio::test]
async fn test_monitor_publishes_rating_changes_update() {
    let api = MockApi::new();
    api.set_contests(vec![
        finished_contest(20, "Codeforces Round 20", 3600),
        // Blacklisted
        finished_contest(1308, "Codeforces Global Round 7", 3600),
    ]);
    api.set_rating_changes(20, vec![rating_change(20, "alice", 1500, 1520, now())]);

    let store = store();
    let events = Arc::new(EventSystem::new());
    let caches = CacheSystem::new(api.clone(), store.clone(), events.clone(), fast_config());
    caches.rating_changes.run().unwrap();

    let pending = events.subscribe_once(EventKind::RatingChangesUpdate);
    caches.contest.reload_now().await.unwrap();

    match pending.wait(Some(Duration::from_secs(5))).await.unwrap() {
        Event::RatingChangesUpdate {
            contest,
            rating_changes,
        } => {
            assert_eq!(contest.id, 20);
            assert_eq!(rating_changes.len(), 1);
        }
        other => panic!("Unexpected event: {other:?}"),
    }
    assert!(store.has_rating_changes_saved(20).unwrap());
    assert!(!store.has_rating_changes_saved(1308).unwrap());
    assert!(caches
        .rating_changes
        .monitored_contests()
        .iter()
        .all(|c| c.id != 1308));

    // Published changes end the monitoring on the next poll
    assert!(
        eventually(
            || caches.rating_changes.monitored_contests().is_empty(),
            Duration::from_secs(5)
        )
        .await
    );

    caches.rating_changes.stop().await;
}
