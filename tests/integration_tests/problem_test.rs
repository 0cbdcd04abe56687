//! Problem and problemset cache integration tests

use std::sync::Arc;
use std::time::Duration;

use cfmirror::cache::{CacheError, CacheSystem};
use cfmirror::config::CacheConfig;
use cfmirror::events::EventSystem;
use cfmirror::storage::CacheStore;

use crate::common::{eventually, finished_contest, problem, store, MockApi};

// ============================================================================
// Problem Cache
// ============================================================================

#[tokio::test]
async fn test_problem_reload_filters_and_stores() {
    let api = MockApi::new();
    api.set_contests(vec![
        finished_contest(1, "Codeforces Round 1", 86_400),
        finished_contest(2, "Codeforces Round 2", 86_400),
    ]);

    let mut special = problem(2, "A", "Gamma", Some(1200));
    special.tags = vec!["*special".to_string()];
    api.set_problems(vec![
        problem(1, "A", "Alpha", Some(800)),
        problem(1, "B", "Beta", None),
        special,
        problem(3, "A", "Delta", Some(900)),
        problem(2, "B", "Alpha", Some(1000)),
        problem(2, "C", "Epsilon", Some(1500)),
    ]);

    let store = store();
    let caches = CacheSystem::new(
        api.clone(),
        store.clone(),
        Arc::new(EventSystem::new()),
        CacheConfig::default(),
    );
    caches.contest.reload_now().await.unwrap();
    caches.problem.reload_now().await.unwrap();

    let names: Vec<String> = caches.problem.problems().into_iter().map(|p| p.name).collect();
    assert_eq!(names, vec!["Alpha", "Epsilon"]);

    // The later duplicate wins
    let alpha = caches.problem.problem_by_name("Alpha").unwrap();
    assert_eq!(alpha.contest_id, Some(2));
    assert_eq!(alpha.rating, Some(1000));

    assert!(caches.problem.problem_by_name("Beta").is_none());
    assert!(caches.problem.problem_by_name("Gamma").is_none());
    assert!(caches.problem.problem_by_name("Delta").is_none());
    assert_eq!(store.fetch_problems().unwrap().len(), 2);
}

#[tokio::test]
async fn test_problem_warm_start_from_disk() {
    let api = MockApi::new();
    let store = store();
    store
        .cache_problems(&[problem(1, "A", "Stored", Some(800))])
        .unwrap();

    let caches = CacheSystem::new(
        api.clone(),
        store,
        Arc::new(EventSystem::new()),
        CacheConfig::default(),
    );
    caches.problem.run().await.unwrap();

    // Loaded before the first API reload gets a chance to run
    assert!(caches.problem.problem_by_name("Stored").is_some());
    caches.problem.stop().await;
}

// ============================================================================
// Problemset Cache
// ============================================================================

#[tokio::test]
async fn test_problemset_update_for_contest() {
    let api = MockApi::new();
    let div1 = finished_contest(5, "Codeforces Round 5 (Div. 1)", 86_400);
    let mut div2 = finished_contest(6, "Codeforces Round 5 (Div. 2)", 86_400);
    div2.start_time = div1.start_time;
    let start = div1.start_time.unwrap();
    api.set_contests(vec![div1.clone(), div2.clone()]);
    api.set_standings(
        div1,
        vec![problem(5, "A", "Shared", Some(1900)), problem(5, "B", "Hard", Some(2400))],
        Vec::new(),
    );
    api.set_standings(
        div2,
        vec![problem(6, "A", "Easy", Some(800)), problem(6, "C", "Shared", Some(1900))],
        Vec::new(),
    );

    let caches = CacheSystem::new(
        api.clone(),
        store(),
        Arc::new(EventSystem::new()),
        CacheConfig::default(),
    );
    caches.contest.reload_now().await.unwrap();

    assert_eq!(caches.problemset.update_for_contest(5).await.unwrap(), 2);
    assert_eq!(caches.problemset.get_problemset(5).unwrap().len(), 2);
    assert_eq!(caches.problemset.contests_for_problem("Shared", start), vec![5]);
    assert!(matches!(
        caches.problemset.get_problemset(6),
        Err(CacheError::ProblemsetNotCached(6))
    ));
    assert!(matches!(
        caches.problemset.update_for_contest(999).await,
        Err(CacheError::ContestNotFound(999))
    ));

    assert_eq!(caches.problemset.update_for_all().await.unwrap(), 4);
    let mut shared = caches.problemset.contests_for_problem("Shared", start);
    shared.sort_unstable();
    assert_eq!(shared, vec![5, 6]);
    assert_eq!(caches.problemset.problems().len(), 4);
}

#[tokio::test]
async fn test_problemset_refreshes_on_contest_list_event() {
    let api = MockApi::new();
    let round = finished_contest(5, "Codeforces Round 5", 3600);
    api.set_contests(vec![round.clone()]);
    api.set_standings(
        round.clone(),
        vec![problem(5, "A", "Fresh", None), problem(5, "B", "Rated", Some(1200))],
        Vec::new(),
    );

    let store = store();
    let caches = CacheSystem::new(
        api.clone(),
        store.clone(),
        Arc::new(EventSystem::new()),
        CacheConfig::default(),
    );
    caches.problemset.run().unwrap();
    caches.contest.reload_now().await.unwrap();

    assert!(
        eventually(
            || store.fetch_problemset(5).map(|p| p.len() == 2).unwrap_or(false),
            Duration::from_secs(5)
        )
        .await
    );

    // Problems still unrated are refetched on the next refresh
    api.set_standings(
        round,
        vec![problem(5, "A", "Fresh", Some(1600)), problem(5, "B", "Rated", Some(1200))],
        Vec::new(),
    );
    caches.contest.reload_now().await.unwrap();

    assert!(
        eventually(
            || {
                store
                    .fetch_problemset(5)
                    .map(|p| p.iter().all(|p| p.rating.is_some()))
                    .unwrap_or(false)
            },
            Duration::from_secs(5)
        )
        .await
    );

    caches.problemset.stop().await;
}
