//! Global problem set cache

use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};

use chrono::{DateTime, Utc};

use super::contest::ContestCache;
use super::reload::ReloadState;
use super::{read_snapshot, swap_snapshot, CacheResult};
use crate::api::{CodeforcesApi, ProblemsetQuery};
use crate::config::CacheConfig;
use crate::metrics;
use crate::models::Problem;
use crate::scheduler::{Task, Waiter};
use crate::storage::CacheStore;

const CACHE_NAME: &str = "problem";

/// Problems carrying this tag are never cached
pub const SPECIAL_PROBLEM_TAG: &str = "*special";

/// Problems keyed by name
#[derive(Debug, Default)]
pub struct ProblemSnapshot {
    pub problems: Vec<Problem>,
    pub fetched_at: Option<DateTime<Utc>>,
    by_name: HashMap<String, usize>,
}

impl ProblemSnapshot {
    /// Index `problems` by name. A later problem with the same name replaces
    /// an earlier one in place.
    pub fn build(problems: impl IntoIterator<Item = Problem>, fetched_at: DateTime<Utc>) -> Self {
        let mut kept: Vec<Problem> = Vec::new();
        let mut by_name = HashMap::new();

        for problem in problems {
            match by_name.get(&problem.name) {
                Some(&i) => kept[i] = problem,
                None => {
                    by_name.insert(problem.name.clone(), kept.len());
                    kept.push(problem);
                }
            }
        }

        Self {
            problems: kept,
            fetched_at: Some(fetched_at),
            by_name,
        }
    }

    pub fn get(&self, name: &str) -> Option<&Problem> {
        self.by_name.get(name).map(|&i| &self.problems[i])
    }

    pub fn len(&self) -> usize {
        self.problems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
    }
}

/// Whether a problem fetched from the API should be cached
pub fn keep_problem(problem: &Problem, contest_known: impl Fn(i32) -> bool) -> bool {
    problem.has_metadata()
        && problem.contest_id.is_some_and(contest_known)
        && !problem.has_tag(SPECIAL_PROBLEM_TAG)
}

/// Cache of every rated problem from a known contest
pub struct ProblemCache {
    api: Arc<dyn CodeforcesApi>,
    store: Arc<dyn CacheStore>,
    contests: Arc<ContestCache>,
    snapshot: RwLock<Arc<ProblemSnapshot>>,
    reload: ReloadState,
    update_task: Task,
}

impl ProblemCache {
    pub fn new(
        api: Arc<dyn CodeforcesApi>,
        store: Arc<dyn CacheStore>,
        contests: Arc<ContestCache>,
        config: CacheConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let weak = weak.clone();
            let update_task = Task::builder("ProblemCacheUpdate")
                .waiter(Waiter::fixed_delay(config.problem_reload()))
                .build(move |_| {
                    let weak = weak.clone();
                    async move {
                        if let Some(cache) = weak.upgrade() {
                            cache.reload.run(cache.reload_problems()).await?;
                        }
                        Ok(())
                    }
                });

            Self {
                api,
                store,
                contests,
                snapshot: RwLock::new(Arc::new(ProblemSnapshot::default())),
                reload: ReloadState::new(),
                update_task,
            }
        })
    }

    pub async fn run(&self) -> CacheResult<()> {
        self.try_disk().await?;
        self.update_task.start()?;
        Ok(())
    }

    pub async fn stop(&self) {
        self.update_task.stop().await;
    }

    /// Reload now, or wait for the reload in progress
    pub async fn reload_now(&self) -> CacheResult<()> {
        self.reload.reload_with(&self.update_task).await
    }

    pub fn problem_by_name(&self, name: &str) -> Option<Problem> {
        self.snapshot().get(name).cloned()
    }

    pub fn problems(&self) -> Vec<Problem> {
        self.snapshot().problems.clone()
    }

    pub fn snapshot(&self) -> Arc<ProblemSnapshot> {
        read_snapshot(&self.snapshot)
    }

    async fn try_disk(&self) -> CacheResult<()> {
        let _guard = self.reload.lock().await;
        let problems = self.store.fetch_problems()?;
        if problems.is_empty() {
            tracing::info!("Problem cache on disk is empty");
            return Ok(());
        }

        let snapshot = ProblemSnapshot::build(problems, Utc::now());
        tracing::info!(count = snapshot.len(), "Problems fetched from disk");
        metrics::set_cached_items(CACHE_NAME, snapshot.len());
        swap_snapshot(&self.snapshot, snapshot);
        Ok(())
    }

    async fn reload_problems(&self) -> CacheResult<()> {
        let _timer = metrics::start_refresh_timer(CACHE_NAME);
        let result = self.fetch_and_store().await;
        metrics::record_cache_refresh(CACHE_NAME, result.is_ok());
        result
    }

    async fn fetch_and_store(&self) -> CacheResult<()> {
        let response = self
            .api
            .problemset_problems(&ProblemsetQuery::default())
            .await?;
        tracing::info!(count = response.problems.len(), "Problems fetched from API");

        let contests = self.contests.snapshot();
        let snapshot = ProblemSnapshot::build(
            response
                .problems
                .into_iter()
                .filter(|p| keep_problem(p, |id| contests.get(id).is_some())),
            Utc::now(),
        );
        tracing::info!(count = snapshot.len(), "Keeping problems");

        let stored = self.store.cache_problems(&snapshot.problems)?;
        tracing::info!(count = stored, "Problems stored in database");

        metrics::set_cached_items(CACHE_NAME, snapshot.len());
        swap_snapshot(&self.snapshot, snapshot);
        Ok(())
    }
}
