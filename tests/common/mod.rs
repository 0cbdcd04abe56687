//! Common test utilities

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use cfmirror::api::{
    ApiError, ApiResult, CodeforcesApi, ProblemsetQuery, ProblemsetResponse, Standings,
    StandingsQuery,
};
use cfmirror::config::CacheConfig;
use cfmirror::models::{
    Contest, Member, ParticipantType, Party, Phase, Problem, RanklistRow, RatingChange, User,
};
use cfmirror::storage::SqliteCacheStore;

// ============================================================================
// Scripted API
// ============================================================================

/// In-memory stand-in for the Codeforces API
#[derive(Default)]
pub struct MockApi {
    contests: Mutex<Vec<Contest>>,
    problems: Mutex<Vec<Problem>>,
    standings: Mutex<HashMap<i32, Standings>>,
    rating_changes: Mutex<HashMap<i32, Vec<RatingChange>>>,
    rated_list: Mutex<Vec<User>>,
    fail_contest_list: AtomicBool,
    calls: Mutex<Vec<String>>,
}

impl MockApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_contests(&self, contests: Vec<Contest>) {
        *self.contests.lock().unwrap() = contests;
    }

    pub fn set_problems(&self, problems: Vec<Problem>) {
        *self.problems.lock().unwrap() = problems;
    }

    pub fn set_standings(&self, contest: Contest, problems: Vec<Problem>, rows: Vec<RanklistRow>) {
        self.standings.lock().unwrap().insert(
            contest.id,
            Standings {
                contest,
                problems,
                rows,
            },
        );
    }

    pub fn set_rating_changes(&self, contest_id: i32, changes: Vec<RatingChange>) {
        self.rating_changes.lock().unwrap().insert(contest_id, changes);
    }

    pub fn set_rated_list(&self, users: Vec<User>) {
        *self.rated_list.lock().unwrap() = users;
    }

    pub fn fail_contest_list(&self, fail: bool) {
        self.fail_contest_list.store(fail, Ordering::SeqCst);
    }

    /// Number of calls made to `method`
    pub fn calls(&self, method: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|m| *m == method).count()
    }

    fn record(&self, method: &str) {
        self.calls.lock().unwrap().push(method.to_string());
    }
}

#[async_trait]
impl CodeforcesApi for MockApi {
    async fn contest_list(&self, _gym: Option<bool>) -> ApiResult<Vec<Contest>> {
        self.record("contest.list");
        if self.fail_contest_list.load(Ordering::SeqCst) {
            return Err(ApiError::Http { status: 503 });
        }
        Ok(self.contests.lock().unwrap().clone())
    }

    async fn contest_rating_changes(&self, contest_id: i32) -> ApiResult<Vec<RatingChange>> {
        self.record("contest.ratingChanges");
        self.rating_changes
            .lock()
            .unwrap()
            .get(&contest_id)
            .cloned()
            .ok_or_else(|| ApiError::RatingChangesUnavailable {
                contest_id,
                comment: "contestId: Rating changes are unavailable for this contest".to_string(),
            })
    }

    async fn contest_standings(&self, query: &StandingsQuery) -> ApiResult<Standings> {
        self.record("contest.standings");
        let mut standings = self
            .standings
            .lock()
            .unwrap()
            .get(&query.contest_id)
            .cloned()
            .ok_or_else(|| ApiError::ContestNotFound {
                contest_id: query.contest_id,
                comment: format!("contestId: Contest with id {} not found", query.contest_id),
            })?;

        if query.show_unofficial != Some(true) {
            standings.rows.retain(|row| {
                matches!(
                    row.party.participant_type,
                    ParticipantType::Contestant | ParticipantType::OutOfCompetition
                )
            });
        }
        let from = query.from.unwrap_or(1).max(1) as usize - 1;
        let count = query.count.map_or(usize::MAX, |c| c as usize);
        standings.rows = standings.rows.into_iter().skip(from).take(count).collect();
        Ok(standings)
    }

    async fn problemset_problems(&self, _query: &ProblemsetQuery) -> ApiResult<ProblemsetResponse> {
        self.record("problemset.problems");
        Ok(ProblemsetResponse {
            problems: self.problems.lock().unwrap().clone(),
            problem_statistics: Vec::new(),
        })
    }

    async fn user_info(&self, handles: &[String]) -> ApiResult<Vec<User>> {
        self.record("user.info");
        let rated = self.rated_list.lock().unwrap();
        Ok(rated
            .iter()
            .filter(|user| handles.contains(&user.handle))
            .cloned()
            .collect())
    }

    async fn user_rated_list(&self, _active_only: Option<bool>) -> ApiResult<Vec<User>> {
        self.record("user.ratedList");
        Ok(self.rated_list.lock().unwrap().clone())
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn now() -> i64 {
    Utc::now().timestamp()
}

pub fn store() -> Arc<SqliteCacheStore> {
    Arc::new(SqliteCacheStore::in_memory().unwrap())
}

/// Cache configuration with short polls so background tasks act quickly
pub fn fast_config() -> CacheConfig {
    CacheConfig {
        rating_changes_poll_secs: 1,
        ranklist_poll_secs: 1,
        ..CacheConfig::default()
    }
}

pub fn contest(id: i32, name: &str, phase: Phase, start: i64, duration: i64) -> Contest {
    Contest {
        id,
        name: name.to_string(),
        start_time: Some(start),
        duration: Some(duration),
        kind: "CF".to_string(),
        phase,
        prepared_by: None,
    }
}

/// A two hour round that ended `ended_ago` seconds ago
pub fn finished_contest(id: i32, name: &str, ended_ago: i64) -> Contest {
    contest(id, name, Phase::Finished, now() - ended_ago - 7200, 7200)
}

pub fn problem(contest_id: i32, index: &str, name: &str, rating: Option<i32>) -> Problem {
    Problem {
        contest_id: Some(contest_id),
        problemset_name: None,
        index: index.to_string(),
        name: name.to_string(),
        kind: "PROGRAMMING".to_string(),
        points: None,
        rating,
        tags: Vec::new(),
    }
}

pub fn row(handle: &str, rank: i32, points: f64, participant_type: ParticipantType) -> RanklistRow {
    RanklistRow {
        party: Party {
            contest_id: None,
            members: vec![Member {
                handle: handle.to_string(),
            }],
            participant_type,
            team_id: None,
            team_name: None,
            ghost: false,
            room: None,
            start_time: None,
        },
        rank,
        points,
        penalty: 0,
        problem_results: Vec::new(),
    }
}

pub fn team_row(team_id: i32, handles: &[&str], rank: i32, points: f64) -> RanklistRow {
    let mut row = row(handles[0], rank, points, ParticipantType::Contestant);
    row.party.members = handles
        .iter()
        .map(|h| Member {
            handle: h.to_string(),
        })
        .collect();
    row.party.team_id = Some(team_id);
    row.party.team_name = Some(format!("team{team_id}"));
    row
}

pub fn rating_change(contest_id: i32, handle: &str, old: i32, new: i32, time: i64) -> RatingChange {
    RatingChange {
        contest_id,
        contest_name: String::new(),
        handle: handle.to_string(),
        rank: 1,
        rating_update_time: time,
        old_rating: old,
        new_rating: new,
    }
}

pub fn user(handle: &str, rating: Option<i32>) -> User {
    User {
        handle: handle.to_string(),
        rating,
        max_rating: rating,
        rank: None,
        contribution: 0,
        organization: None,
        last_online_time_seconds: 0,
        registration_time_seconds: 0,
    }
}

/// Poll `condition` until it holds or `timeout` passes
pub async fn eventually<F: Fn() -> bool>(condition: F, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}
