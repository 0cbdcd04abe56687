//! Ranklist cache integration tests

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use cfmirror::cache::{CacheError, CacheSystem, RanklistMode};
use cfmirror::config::CacheConfig;
use cfmirror::events::EventSystem;
use cfmirror::models::{Contest, ParticipantType, Phase, RanklistRow};
use cfmirror::ranklist::{RanklistError, RanklistStatus};

use crate::common::{
    contest, eventually, fast_config, finished_contest, now, problem, rating_change, row, store,
    team_row, user, MockApi,
};

fn standard_rows() -> Vec<RanklistRow> {
    vec![
        row("alice", 1, 3.0, ParticipantType::Contestant),
        row("bob", 2, 2.0, ParticipantType::Contestant),
        row("carol", 3, 1.0, ParticipantType::Contestant),
        row("dave", 1, 4.0, ParticipantType::Practice),
    ]
}

fn setup(api: &Arc<MockApi>, contest: Contest, rows: Vec<RanklistRow>, config: CacheConfig) -> CacheSystem {
    api.set_standings(contest.clone(), vec![problem(contest.id, "A", "Task", None)], rows);
    api.set_contests(vec![contest]);
    CacheSystem::new(api.clone(), store(), Arc::new(EventSystem::new()), config)
}

fn handles(deltas: &HashMap<String, i32>) -> HashSet<&str> {
    deltas.keys().map(String::as_str).collect()
}

#[tokio::test]
async fn test_predicted_ranklist() {
    let api = MockApi::new();
    api.set_rated_list(vec![user("alice", Some(1500)), user("bob", Some(1500))]);
    let round = finished_contest(30, "Codeforces Round 930 (Div. 2)", 3600);
    let caches = setup(&api, round, standard_rows(), CacheConfig::default());

    let ranklist = caches
        .ranklist
        .generate_ranklist(30, RanklistMode::Predict, false)
        .await
        .unwrap();

    assert!(ranklist.is_rated());
    assert_eq!(ranklist.status(), RanklistStatus::Predicted);
    // carol is not on the rated list and falls back to the default rating
    assert_eq!(handles(ranklist.deltas()), HashSet::from(["alice", "bob", "carol"]));

    let alice = ranklist.get_delta("alice").unwrap().unwrap();
    let carol = ranklist.get_delta("carol").unwrap().unwrap();
    assert!(alice > 0);
    assert!(carol < 0);
    assert!(ranklist.deltas().values().sum::<i32>() <= 0);

    // Practice rows are not part of the official ranklist
    assert!(matches!(
        ranklist.get_standing_row("dave"),
        Err(RanklistError::HandleNotPresent { .. })
    ));
}

#[tokio::test]
async fn test_fetch_mode_uses_published_changes() {
    let api = MockApi::new();
    let round = finished_contest(30, "Codeforces Round 930 (Div. 2)", 86_400);
    let t = now();
    api.set_rating_changes(
        30,
        vec![
            rating_change(30, "alice", 1500, 1540, t),
            rating_change(30, "bob", 1500, 1490, t),
            rating_change(30, "carol", 1500, 1470, t),
        ],
    );
    let caches = setup(&api, round, standard_rows(), CacheConfig::default());

    let ranklist = caches
        .ranklist
        .generate_ranklist(30, RanklistMode::Fetch, false)
        .await
        .unwrap();

    assert_eq!(ranklist.status(), RanklistStatus::Final);
    assert_eq!(ranklist.deltas().get("alice"), Some(&40));
    assert_eq!(ranklist.deltas().get("carol"), Some(&-30));
    assert_eq!(api.calls("user.ratedList"), 0);
}

#[tokio::test]
async fn test_fetch_mode_falls_back_to_prediction() {
    let api = MockApi::new();
    api.set_rated_list(vec![user("alice", Some(1500)), user("bob", Some(1500))]);
    let round = finished_contest(30, "Codeforces Round 930 (Div. 2)", 3600);
    let caches = setup(&api, round, standard_rows(), CacheConfig::default());

    let ranklist = caches
        .ranklist
        .generate_ranklist(30, RanklistMode::Fetch, false)
        .await
        .unwrap();

    assert_eq!(ranklist.status(), RanklistStatus::Predicted);
    assert_eq!(ranklist.deltas().len(), 3);
}

#[tokio::test]
async fn test_nonstandard_and_team_contests_are_unrated() {
    let api = MockApi::new();
    let fools = finished_contest(31, "April Fools Day Contest 2024", 3600);
    let caches = setup(&api, fools, standard_rows(), CacheConfig::default());

    let ranklist = caches
        .ranklist
        .generate_ranklist(31, RanklistMode::Predict, false)
        .await
        .unwrap();
    assert!(!ranklist.is_rated());
    assert!(matches!(
        ranklist.get_delta("alice"),
        Err(RanklistError::ContestNotRated { .. })
    ));

    let teams = finished_contest(32, "Codeforces Round 932", 3600);
    api.set_standings(
        teams,
        Vec::new(),
        vec![team_row(77, &["alice", "bob"], 1, 2.0), team_row(78, &["carol"], 2, 1.0)],
    );
    let ranklist = caches
        .ranklist
        .generate_ranklist(32, RanklistMode::Predict, false)
        .await
        .unwrap();
    assert!(!ranklist.is_rated());
    assert!(ranklist.get_standing_row("77").is_ok());
}

#[tokio::test]
async fn test_educational_drops_high_rated_handles() {
    let api = MockApi::new();
    api.set_rated_list(vec![
        user("alice", Some(2400)),
        user("bob", Some(1500)),
        user("carol", Some(1400)),
    ]);
    let round = finished_contest(33, "Educational Codeforces Round 170 (Rated for Div. 2)", 3600);
    let caches = setup(&api, round, standard_rows(), CacheConfig::default());

    let ranklist = caches
        .ranklist
        .generate_ranklist(33, RanklistMode::Predict, false)
        .await
        .unwrap();

    assert_eq!(handles(ranklist.deltas()), HashSet::from(["bob", "carol"]));
    let ranked: Vec<(&str, i32)> = ranklist
        .standings
        .iter()
        .map(|r| (r.party.first_handle().unwrap(), r.rank))
        .collect();
    assert_eq!(ranked, vec![("bob", 1), ("carol", 2)]);
}

#[tokio::test]
async fn test_vc_ranklist_rates_only_virtual_participants() {
    let api = MockApi::new();
    let round = finished_contest(34, "Codeforces Round 934 (Div. 2)", 86_400);
    let t = now();
    api.set_rating_changes(
        34,
        vec![
            rating_change(34, "alice", 1500, 1540, t),
            rating_change(34, "bob", 1500, 1470, t),
        ],
    );
    let rows = vec![
        row("alice", 1, 3.0, ParticipantType::Contestant),
        row("vc", 2, 2.0, ParticipantType::Virtual),
        row("bob", 3, 1.0, ParticipantType::Contestant),
        row("other_vc", 2, 2.0, ParticipantType::Virtual),
        row("dave", 1, 4.0, ParticipantType::Practice),
    ];
    let caches = setup(&api, round, rows, CacheConfig::default());

    let vc_ratings = HashMap::from([("vc".to_string(), 1500)]);
    let ranklist = caches
        .ranklist
        .generate_vc_ranklist(34, &vc_ratings)
        .await
        .unwrap();

    assert_eq!(ranklist.status(), RanklistStatus::Predicted);
    assert_eq!(handles(ranklist.deltas()), HashSet::from(["vc"]));
    let ranks: Vec<i32> = ranklist.standings.iter().map(|r| r.rank).collect();
    assert_eq!(ranks, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_running_contest_ranklist_is_monitored() {
    let api = MockApi::new();
    api.set_rated_list(vec![user("alice", Some(1500)), user("bob", Some(1700))]);
    let live = contest(40, "Codeforces Round 940 (Div. 2)", Phase::Coding, now() - 1800, 7200);
    let caches = setup(&api, live.clone(), standard_rows(), fast_config());

    caches.ranklist.run().unwrap();
    caches.contest.reload_now().await.unwrap();

    assert!(
        eventually(
            || caches.ranklist.get_ranklist(&live, false).is_ok(),
            Duration::from_secs(5)
        )
        .await
    );
    assert_eq!(caches.ranklist.monitored_contests().len(), 1);

    let cached = caches.ranklist.get_ranklist(&live, false).unwrap();
    assert!(cached.is_rated());
    assert!(matches!(
        caches.ranklist.get_ranklist(&live, true),
        Err(CacheError::RanklistNotMonitored(_))
    ));

    caches.ranklist.stop().await;
}
