//! Scripted API and fixtures shared by the cache unit tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::api::{
    ApiError, ApiResult, CodeforcesApi, ProblemsetQuery, ProblemsetResponse, Standings,
    StandingsQuery,
};
use crate::config::CacheConfig;
use crate::events::EventSystem;
use crate::models::{Contest, Phase, Problem, RatingChange, User};
use crate::storage::SqliteCacheStore;

use super::ContestCache;

/// Answers contest lists and standings from memory
#[derive(Default)]
pub(crate) struct StubApi {
    contests: Mutex<Vec<Contest>>,
    standings: Mutex<HashMap<i32, Standings>>,
    fail_standings: AtomicBool,
    standings_calls: AtomicUsize,
}

impl StubApi {
    pub(crate) fn set_contests(&self, contests: Vec<Contest>) {
        *self.contests.lock().unwrap() = contests;
    }

    pub(crate) fn set_problems(&self, contest: Contest, problems: Vec<Problem>) {
        self.standings.lock().unwrap().insert(
            contest.id,
            Standings {
                contest,
                problems,
                rows: Vec::new(),
            },
        );
    }

    pub(crate) fn fail_standings(&self, fail: bool) {
        self.fail_standings.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn standings_calls(&self) -> usize {
        self.standings_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CodeforcesApi for StubApi {
    async fn contest_list(&self, _gym: Option<bool>) -> ApiResult<Vec<Contest>> {
        Ok(self.contests.lock().unwrap().clone())
    }

    async fn contest_rating_changes(&self, contest_id: i32) -> ApiResult<Vec<RatingChange>> {
        Err(ApiError::RatingChangesUnavailable {
            contest_id,
            comment: "contestId: Rating changes are unavailable for this contest".to_string(),
        })
    }

    async fn contest_standings(&self, query: &StandingsQuery) -> ApiResult<Standings> {
        self.standings_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_standings.load(Ordering::SeqCst) {
            return Err(ApiError::Http { status: 503 });
        }
        self.standings
            .lock()
            .unwrap()
            .get(&query.contest_id)
            .cloned()
            .ok_or_else(|| ApiError::ContestNotFound {
                contest_id: query.contest_id,
                comment: format!("contestId: Contest with id {} not found", query.contest_id),
            })
    }

    async fn problemset_problems(&self, _query: &ProblemsetQuery) -> ApiResult<ProblemsetResponse> {
        Ok(ProblemsetResponse {
            problems: Vec::new(),
            problem_statistics: Vec::new(),
        })
    }

    async fn user_info(&self, _handles: &[String]) -> ApiResult<Vec<User>> {
        Ok(Vec::new())
    }

    async fn user_rated_list(&self, _active_only: Option<bool>) -> ApiResult<Vec<User>> {
        Ok(Vec::new())
    }
}

pub(crate) fn store() -> Arc<SqliteCacheStore> {
    Arc::new(SqliteCacheStore::in_memory().unwrap())
}

pub(crate) fn contest(id: i32, phase: Phase, start: i64) -> Contest {
    Contest {
        id,
        name: format!("Codeforces Round {id}"),
        start_time: Some(start),
        duration: Some(7200),
        kind: "CF".to_string(),
        phase,
        prepared_by: None,
    }
}

pub(crate) fn problem(contest_id: i32, index: &str, rating: Option<i32>) -> Problem {
    Problem {
        contest_id: Some(contest_id),
        problemset_name: None,
        index: index.to_string(),
        name: format!("Problem {index}"),
        kind: "PROGRAMMING".to_string(),
        points: None,
        rating,
        tags: Vec::new(),
    }
}

/// Contest cache loaded from `api`, with nothing running
pub(crate) async fn contest_cache(
    api: Arc<StubApi>,
    store: Arc<SqliteCacheStore>,
    events: Arc<EventSystem>,
    config: CacheConfig,
) -> Arc<ContestCache> {
    let contests = ContestCache::new(api, store, events, config);
    contests.reload_now().await.unwrap();
    contests
}
