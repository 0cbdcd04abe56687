//! Per-contest problem lists
//!
//! Problem lists are refetched for contests that finished recently and whose
//! stored list is missing or still has unrated problems. The stored lists
//! back name-based lookups across divisions.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, Weak};

use super::contest::ContestCache;
use super::{read_snapshot, swap_snapshot, CacheError, CacheResult};
use crate::api::{CodeforcesApi, StandingsQuery};
use crate::config::CacheConfig;
use crate::events::{EventKind, EventSystem};
use crate::metrics;
use crate::models::{Contest, Phase, Problem};
use crate::scheduler::{Task, Waiter};
use crate::storage::CacheStore;
use crate::utils::unix_now;

const CACHE_NAME: &str = "problemset";

/// Problems sharing a name and a contest start time, across divisions
pub type ProblemKey = (String, i64);

#[derive(Debug, Default)]
struct ProblemsetIndex {
    problems: Vec<Problem>,
    problem_to_contests: HashMap<ProblemKey, Vec<i32>>,
}

/// Cache of problem lists for finished contests
pub struct ProblemsetCache {
    api: Arc<dyn CodeforcesApi>,
    store: Arc<dyn CacheStore>,
    contests: Arc<ContestCache>,
    config: CacheConfig,
    index: RwLock<Arc<ProblemsetIndex>>,
    update_lock: tokio::sync::Mutex<()>,
    update_task: Task,
}

impl ProblemsetCache {
    pub fn new(
        api: Arc<dyn CodeforcesApi>,
        store: Arc<dyn CacheStore>,
        events: Arc<EventSystem>,
        contests: Arc<ContestCache>,
        config: CacheConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let weak = weak.clone();
            let update_task = Task::builder("ProblemsetCacheUpdate")
                .waiter(Waiter::for_event(events, EventKind::ContestListRefresh))
                .build(move |_| {
                    let weak = weak.clone();
                    async move {
                        if let Some(cache) = weak.upgrade() {
                            cache.update_monitored().await?;
                        }
                        Ok(())
                    }
                });

            Self {
                api,
                store,
                contests,
                config,
                index: RwLock::new(Arc::new(ProblemsetIndex::default())),
                update_lock: tokio::sync::Mutex::new(()),
                update_task,
            }
        })
    }

    pub fn run(&self) -> CacheResult<()> {
        if self.store.problemset_empty()? {
            tracing::warn!("Problemset cache on disk is empty. This must be populated manually before use.");
        }
        self.update_task.start()?;
        Ok(())
    }

    pub async fn stop(&self) {
        self.update_task.stop().await;
    }

    /// Refetch one contest's problems, replacing what is stored.
    ///
    /// Returns the number of problems saved.
    pub async fn update_for_contest(&self, contest_id: i32) -> CacheResult<usize> {
        let _guard = self.update_lock.lock().await;
        let contest = self.contests.get_contest(contest_id)?;
        let problems = self.fetch_for_contest(contest.id).await;
        self.store.clear_problemset(Some(contest_id))?;
        self.save_problems(&problems)?;
        self.update_from_disk()?;
        Ok(problems.len())
    }

    /// Refetch every finished contest's problems, replacing what is stored
    pub async fn update_for_all(&self) -> CacheResult<usize> {
        let _guard = self.update_lock.lock().await;
        let contests = self.contests.get_contests_in_phase(Phase::Finished);
        let mut problems = Vec::new();
        for contest in &contests {
            problems.extend(self.fetch_for_contest(contest.id).await);
        }
        self.store.clear_problemset(None)?;
        self.save_problems(&problems)?;
        self.update_from_disk()?;
        Ok(problems.len())
    }

    /// Stored problems of one contest
    pub fn get_problemset(&self, contest_id: i32) -> CacheResult<Vec<Problem>> {
        let problems = self.store.fetch_problemset(contest_id)?;
        if problems.is_empty() {
            return Err(CacheError::ProblemsetNotCached(contest_id));
        }
        Ok(problems)
    }

    /// Ids of contests that share a problem with this name and start time
    pub fn contests_for_problem(&self, name: &str, start_time: i64) -> Vec<i32> {
        read_snapshot(&self.index)
            .problem_to_contests
            .get(&(name.to_string(), start_time))
            .cloned()
            .unwrap_or_default()
    }

    /// Every stored problem, as of the last update
    pub fn problems(&self) -> Vec<Problem> {
        read_snapshot(&self.index).problems.clone()
    }

    async fn update_monitored(&self) -> CacheResult<()> {
        let _guard = self.update_lock.lock().await;
        let _timer = metrics::start_refresh_timer(CACHE_NAME);

        let contests = self.contests.get_contests_in_phase(Phase::Finished);
        let result = self.refresh(&contests).await;
        metrics::record_cache_refresh(CACHE_NAME, result.is_ok());
        result
    }

    async fn refresh(&self, contests: &[Contest]) -> CacheResult<()> {
        let (new_problems, updated_problems) = self.fetch_monitored(contests, unix_now()).await?;

        let mut problems = new_problems;
        let new_count = problems.len();
        problems.extend(updated_problems);
        self.save_problems(&problems)?;
        self.update_from_disk()?;

        tracing::info!(
            new = new_count,
            updated = problems.len() - new_count,
            "Problemsets refreshed"
        );
        Ok(())
    }

    /// Problems of monitored contests: all problems of contests with nothing
    /// stored, and newly rated problems of contests stored with unrated ones.
    async fn fetch_monitored(
        &self,
        contests: &[Contest],
        now: i64,
    ) -> CacheResult<(Vec<Problem>, Vec<Problem>)> {
        let retention = self.config.problemset_retention_secs as i64;
        let mut new_contests = Vec::new();
        let mut to_refetch = Vec::new();

        for contest in contests {
            let Some(end) = contest.end_time() else {
                continue;
            };
            if now > end + retention {
                continue;
            }

            let stored = self.store.fetch_problemset(contest.id)?;
            if stored.is_empty() {
                new_contests.push(contest.id);
                continue;
            }
            let rated: HashSet<String> = stored
                .iter()
                .filter(|p| p.rating.is_some())
                .map(|p| p.index.clone())
                .collect();
            if rated.len() < stored.len() {
                to_refetch.push((contest.id, rated));
            }
        }
        metrics::set_monitored_contests(CACHE_NAME, new_contests.len() + to_refetch.len());

        let mut new_problems = Vec::new();
        for contest_id in new_contests {
            new_problems.extend(self.fetch_for_contest(contest_id).await);
        }

        let mut updated_problems = Vec::new();
        for (contest_id, rated) in to_refetch {
            updated_problems.extend(
                self.fetch_for_contest(contest_id)
                    .await
                    .into_iter()
                    .filter(|p| p.rating.is_some() && !rated.contains(&p.index)),
            );
        }

        Ok((new_problems, updated_problems))
    }

    /// Problems listed in the standings. API failures yield no problems.
    async fn fetch_for_contest(&self, contest_id: i32) -> Vec<Problem> {
        let query = StandingsQuery::new(contest_id).from(1).count(1);
        match self.api.contest_standings(&query).await {
            Ok(standings) => standings.problems,
            Err(e) => {
                tracing::warn!(contest_id, error = %e, "Problemset fetch failed");
                Vec::new()
            }
        }
    }

    fn save_problems(&self, problems: &[Problem]) -> CacheResult<()> {
        let saved = self.store.cache_problemset(problems)?;
        tracing::info!(count = saved, "Saved problems to database");
        Ok(())
    }

    fn update_from_disk(&self) -> CacheResult<()> {
        let problems = self.store.fetch_problems2()?;
        let contests = self.contests.snapshot();

        let mut problem_to_contests: HashMap<ProblemKey, Vec<i32>> = HashMap::new();
        for problem in &problems {
            let Some(contest) = problem.contest_id.and_then(|id| contests.get(id)) else {
                continue;
            };
            let Some(start) = contest.start_time else {
                continue;
            };
            problem_to_contests
                .entry((problem.name.clone(), start))
                .or_default()
                .push(contest.id);
        }

        metrics::set_cached_items(CACHE_NAME, problems.len());
        swap_snapshot(
            &self.index,
            ProblemsetIndex {
                problems,
                problem_to_contests,
            },
        );
        Ok(())
    }
}
