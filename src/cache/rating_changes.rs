//! Official rating changes
//!
//! Finished contests stay monitored until their rating changes are published
//! or the rating changes window since the contest end runs out. Stored
//! changes also provide the latest known rating of every handle.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock, Weak};

use super::contest::ContestCache;
use super::{lock, read_snapshot, swap_snapshot, CacheResult};
use crate::api::CodeforcesApi;
use crate::config::CacheConfig;
use crate::events::{Event, EventKind, EventSystem};
use crate::metrics;
use crate::models::{Contest, Phase, RatingChange};
use crate::scheduler::{Task, Waiter};
use crate::storage::CacheStore;
use crate::utils::unix_now;

const CACHE_NAME: &str = "rating_changes";

type ContestChanges = (Contest, Vec<RatingChange>);

/// Cache of published rating changes
pub struct RatingChangesCache {
    api: Arc<dyn CodeforcesApi>,
    store: Arc<dyn CacheStore>,
    events: Arc<EventSystem>,
    contests: Arc<ContestCache>,
    config: CacheConfig,
    blacklist: HashSet<i32>,
    monitored: Mutex<Vec<Contest>>,
    handle_ratings: RwLock<Arc<HashMap<String, i32>>>,
    update_lock: tokio::sync::Mutex<()>,
    update_task: Task,
    monitor_task: Task,
}

impl RatingChangesCache {
    pub fn new(
        api: Arc<dyn CodeforcesApi>,
        store: Arc<dyn CacheStore>,
        events: Arc<EventSystem>,
        contests: Arc<ContestCache>,
        config: CacheConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let update_task = Task::builder("RatingChangesCacheUpdate")
                .waiter(Waiter::for_event(events.clone(), EventKind::ContestListRefresh))
                .build({
                    let weak = weak.clone();
                    move |_| {
                        let weak = weak.clone();
                        async move {
                            if let Some(cache) = weak.upgrade() {
                                cache.update_monitored().await?;
                            }
                            Ok(())
                        }
                    }
                });

            let monitor_task = Task::builder("RatingChangesCacheUpdate.MonitorNewlyFinishedContests")
                .waiter(Waiter::fixed_delay(config.rating_changes_poll()))
                .build({
                    let weak = weak.clone();
                    move |_| {
                        let weak = weak.clone();
                        async move {
                            if let Some(cache) = weak.upgrade() {
                                cache.poll_monitored().await?;
                            }
                            Ok(())
                        }
                    }
                });

            Self {
                api,
                store,
                events,
                contests,
                blacklist: config.blacklist(),
                config,
                monitored: Mutex::new(Vec::new()),
                handle_ratings: RwLock::new(Arc::new(HashMap::new())),
                update_lock: tokio::sync::Mutex::new(()),
                update_task,
                monitor_task,
            }
        })
    }

    pub fn run(&self) -> CacheResult<()> {
        self.refresh_handle_cache()?;
        if read_snapshot(&self.handle_ratings).is_empty() {
            tracing::warn!("Rating changes cache on disk is empty. This must be populated manually before use.");
        }
        self.update_task.start()?;
        Ok(())
    }

    pub async fn stop(&self) {
        self.update_task.stop().await;
        self.monitor_task.stop().await;
    }

    // ========================================================================
    // Manual triggers
    // ========================================================================

    /// Refetch one contest's rating changes, replacing what is stored.
    ///
    /// Returns the number of rating changes saved.
    pub async fn fetch_contest(&self, contest_id: i32) -> CacheResult<usize> {
        let contest = self.contests.get_contest(contest_id)?;
        let changes = self.fetch(&[contest]).await;
        self.store.clear_rating_changes(Some(contest_id))?;
        self.save_changes(&changes)
    }

    /// Drop every stored change, then fetch all finished contests
    pub async fn fetch_all_contests(&self) -> CacheResult<usize> {
        self.store.clear_rating_changes(None)?;
        self.fetch_missing_contests().await
    }

    /// Fetch finished contests that have no stored changes, in batches
    pub async fn fetch_missing_contests(&self) -> CacheResult<usize> {
        let mut missing = Vec::new();
        for contest in self.contests.get_contests_in_phase(Phase::Finished) {
            if !self.store.has_rating_changes_saved(contest.id)? {
                missing.push(contest);
            }
        }
        tracing::info!(count = missing.len(), "Fetching rating changes for contests without any");

        let mut total = 0;
        for batch in missing.chunks(self.config.fetch_batch_size.max(1)) {
            let changes = self.fetch(batch).await;
            total += self.save_changes(&changes)?;
        }
        Ok(total)
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    /// Latest stored rating of `handle`, or the default rating when asked for
    pub fn get_current_rating(&self, handle: &str, default_if_absent: bool) -> Option<i32> {
        read_snapshot(&self.handle_ratings)
            .get(handle)
            .copied()
            .or_else(|| default_if_absent.then_some(self.config.default_rating))
    }

    pub fn get_all_ratings(&self) -> Vec<i32> {
        read_snapshot(&self.handle_ratings).values().copied().collect()
    }

    /// Latest rating of every handle with stored changes
    pub fn handle_ratings(&self) -> Arc<HashMap<String, i32>> {
        read_snapshot(&self.handle_ratings)
    }

    pub fn get_users_with_more_than_n_contests(&self, time_cutoff: i64, n: usize) -> CacheResult<Vec<String>> {
        Ok(self.store.get_users_with_more_than_n_contests(time_cutoff, n)?)
    }

    pub fn get_rating_changes_for_contest(&self, contest_id: i32) -> CacheResult<Vec<RatingChange>> {
        Ok(self.store.get_rating_changes_for_contest(contest_id)?)
    }

    pub fn get_rating_changes_for_handle(&self, handle: &str) -> CacheResult<Vec<RatingChange>> {
        Ok(self.store.get_rating_changes_for_handle(handle)?)
    }

    pub fn has_rating_changes_saved(&self, contest_id: i32) -> CacheResult<bool> {
        Ok(self.store.has_rating_changes_saved(contest_id)?)
    }

    /// Finished within the rating changes window and nothing stored yet
    pub fn is_newly_finished_without_rating_changes(&self, contest: &Contest) -> CacheResult<bool> {
        self.is_awaiting_changes(contest, unix_now())
    }

    pub fn is_blacklisted(&self, contest: &Contest) -> bool {
        self.blacklist.contains(&contest.id)
    }

    pub fn monitored_contests(&self) -> Vec<Contest> {
        lock(&self.monitored).clone()
    }

    fn is_awaiting_changes(&self, contest: &Contest, now: i64) -> CacheResult<bool> {
        let window = self.config.rating_changes_window_secs as i64;
        let recent = contest.phase == Phase::Finished
            && contest.end_time().is_some_and(|end| now - end < window);
        Ok(recent && !self.store.has_rating_changes_saved(contest.id)?)
    }

    fn awaiting_changes(&self, contests: Vec<Contest>) -> CacheResult<Vec<Contest>> {
        let now = unix_now();
        let mut kept = Vec::new();
        for contest in contests {
            if !self.is_blacklisted(&contest) && self.is_awaiting_changes(&contest, now)? {
                kept.push(contest);
            }
        }
        Ok(kept)
    }

    // ========================================================================
    // Tasks
    // ========================================================================

    async fn update_monitored(&self) -> CacheResult<()> {
        let _guard = self.update_lock.lock().await;
        let to_monitor = self.awaiting_changes(self.contests.get_contests_in_phase(Phase::Finished))?;

        let current: HashSet<i32> = lock(&self.monitored).iter().map(|c| c.id).collect();
        let new: HashSet<i32> = to_monitor.iter().map(|c| c.id).collect();
        if current == new {
            return Ok(());
        }

        self.monitor_task.stop().await;
        metrics::set_monitored_contests(CACHE_NAME, to_monitor.len());
        let start = !to_monitor.is_empty();
        tracing::info!(contests = ?new, "Monitoring contests for rating changes");
        *lock(&self.monitored) = to_monitor;
        if start {
            self.monitor_task.start()?;
        }
        Ok(())
    }

    async fn poll_monitored(&self) -> CacheResult<()> {
        let monitored = self.awaiting_changes(self.monitored_contests())?;
        *lock(&self.monitored) = monitored.clone();
        metrics::set_monitored_contests(CACHE_NAME, monitored.len());

        if monitored.is_empty() {
            tracing::info!("Rating changes fetched for contests that were being monitored");
            self.monitor_task.stop().await;
            return Ok(());
        }

        let _timer = metrics::start_refresh_timer(CACHE_NAME);
        let mut changes = self.fetch(&monitored).await;
        changes.sort_by_key(|(_, c)| c.first().map(|change| change.rating_update_time));
        let saved = self.save_changes(&changes);
        metrics::record_cache_refresh(CACHE_NAME, saved.is_ok());
        saved?;

        for (contest, rating_changes) in changes {
            self.events
                .dispatch(Event::rating_changes_update(contest, rating_changes));
        }
        Ok(())
    }

    /// Fetch changes per contest, skipping contests that fail or have none
    async fn fetch(&self, contests: &[Contest]) -> Vec<ContestChanges> {
        let mut all_changes = Vec::new();
        for contest in contests {
            match self.api.contest_rating_changes(contest.id).await {
                Ok(changes) => {
                    tracing::info!(contest_id = contest.id, count = changes.len(), "Rating changes fetched");
                    if !changes.is_empty() {
                        all_changes.push((contest.clone(), changes));
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        contest_id = contest.id,
                        error = %e,
                        "Fetch rating changes failed, ignoring"
                    );
                }
            }
        }
        all_changes
    }

    fn save_changes(&self, changes: &[ContestChanges]) -> CacheResult<usize> {
        let flattened: Vec<RatingChange> = changes
            .iter()
            .flat_map(|(_, changes)| changes.iter().cloned())
            .collect();
        if flattened.is_empty() {
            return Ok(0);
        }

        let saved = self.store.save_rating_changes(&flattened)?;
        tracing::info!(count = saved, "Saved rating changes to database");
        self.refresh_handle_cache()?;
        Ok(saved)
    }

    fn refresh_handle_cache(&self) -> CacheResult<()> {
        let ratings = self.store.get_latest_rating_by_handle()?;
        tracing::info!(handles = ratings.len(), "Ratings cached");
        metrics::set_cached_items(CACHE_NAME, ratings.len());
        swap_snapshot(&self.handle_ratings, ratings);
        Ok(())
    }
}
