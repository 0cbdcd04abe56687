//! Contest list cache
//!
//! Reloads `contest.list` on a delay that shrinks while contests are about to
//! start or running, and publishes the new list to every subscriber.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::reload::ReloadState;
use super::{lock, read_snapshot, swap_snapshot, CacheError, CacheResult};
use crate::api::CodeforcesApi;
use crate::config::CacheConfig;
use crate::events::{Event, EventSystem};
use crate::metrics;
use crate::models::{Contest, Phase};
use crate::scheduler::{Task, Waiter};
use crate::storage::CacheStore;
use crate::utils::{duration_until, unix_now};

const CACHE_NAME: &str = "contest";

/// One complete, indexed contest list
#[derive(Debug, Default)]
pub struct ContestSnapshot {
    /// Sorted by start time, then id
    pub contests: Vec<Contest>,
    pub fetched_at: Option<DateTime<Utc>>,
    by_id: HashMap<i32, usize>,
    by_phase: HashMap<Phase, Vec<Contest>>,
    running: Vec<Contest>,
}

impl ContestSnapshot {
    pub fn build(mut contests: Vec<Contest>, fetched_at: DateTime<Utc>) -> Self {
        contests.sort_by_key(|c| (c.start_time, c.id));

        let mut by_phase: HashMap<Phase, Vec<Contest>> =
            Phase::ALL.into_iter().map(|phase| (phase, Vec::new())).collect();
        let mut by_id = HashMap::with_capacity(contests.len());
        let mut running = Vec::new();

        for (i, contest) in contests.iter().enumerate() {
            by_phase.entry(contest.phase).or_default().push(contest.clone());
            by_id.insert(contest.id, i);
            if contest.is_running() {
                running.push(contest.clone());
            }
        }

        Self {
            contests,
            fetched_at: Some(fetched_at),
            by_id,
            by_phase,
            running,
        }
    }

    pub fn get(&self, contest_id: i32) -> Option<&Contest> {
        self.by_id.get(&contest_id).map(|&i| &self.contests[i])
    }

    pub fn in_phase(&self, phase: Phase) -> &[Contest] {
        self.by_phase.get(&phase).map(Vec::as_slice).unwrap_or_default()
    }

    /// Contests coding or being judged
    pub fn running(&self) -> &[Contest] {
        &self.running
    }

    /// Delay until the next reload, given the time `now` in unix seconds.
    ///
    /// The normal delay is shortened to the moment a contest enters its
    /// activation lead, to the active delay once it is inside it, and to the
    /// active delay whenever a contest is running.
    pub fn next_delay(&self, now: i64, config: &CacheConfig) -> Duration {
        let active = config.contest_active_delay();
        let lead = config.contest_activation_lead_secs as i64;
        let mut delay = config.contest_reload();

        for contest in self.in_phase(Phase::Before) {
            let Some(start) = contest.start_time else {
                continue;
            };
            let activate_at = start - lead;
            let candidate = if activate_at > now {
                duration_until(activate_at, now)
            } else {
                duration_until(start, now).min(active)
            };
            delay = delay.min(candidate);
        }

        if !self.running.is_empty() {
            delay = delay.min(active);
        }
        delay
    }
}

/// Cache of all contests
pub struct ContestCache {
    api: Arc<dyn CodeforcesApi>,
    store: Arc<dyn CacheStore>,
    events: Arc<EventSystem>,
    config: CacheConfig,
    snapshot: RwLock<Arc<ContestSnapshot>>,
    reload: ReloadState,
    next_delay: Mutex<Duration>,
    update_task: Task,
}

impl ContestCache {
    pub fn new(
        api: Arc<dyn CodeforcesApi>,
        store: Arc<dyn CacheStore>,
        events: Arc<EventSystem>,
        config: CacheConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let update_task = Task::builder("ContestCacheUpdate")
                .waiter(Waiter::dynamic_delay({
                    let weak = weak.clone();
                    let fallback = config.contest_reload();
                    move || weak.upgrade().map_or(fallback, |cache| cache.next_delay())
                }))
                .exception_handler({
                    let weak = weak.clone();
                    move |_| {
                        let weak = weak.clone();
                        async move {
                            if let Some(cache) = weak.upgrade() {
                                *lock(&cache.next_delay) = cache.config.contest_exception_delay();
                            }
                        }
                    }
                })
                .build({
                    let weak = weak.clone();
                    move |_| {
                        let weak = weak.clone();
                        async move {
                            if let Some(cache) = weak.upgrade() {
                                cache.reload.run(cache.reload_contests()).await?;
                            }
                            Ok(())
                        }
                    }
                });

            Self {
                api,
                store,
                events,
                next_delay: Mutex::new(config.contest_reload()),
                config,
                snapshot: RwLock::new(Arc::new(ContestSnapshot::default())),
                reload: ReloadState::new(),
                update_task,
            }
        })
    }

    /// Load the stored list, then start periodic reloads
    pub async fn run(&self) -> CacheResult<()> {
        self.try_disk().await?;
        self.update_task.start()?;
        Ok(())
    }

    pub async fn stop(&self) {
        self.update_task.stop().await;
    }

    /// Reload now, or wait for the reload in progress.
    ///
    /// Fails with the error of that reload, if it failed.
    pub async fn reload_now(&self) -> CacheResult<()> {
        self.reload.reload_with(&self.update_task).await
    }

    pub fn get_contest(&self, contest_id: i32) -> CacheResult<Contest> {
        self.snapshot()
            .get(contest_id)
            .cloned()
            .ok_or(CacheError::ContestNotFound(contest_id))
    }

    pub fn get_contests_in_phase(&self, phase: Phase) -> Vec<Contest> {
        self.snapshot().in_phase(phase).to_vec()
    }

    pub fn get_running_contests(&self) -> Vec<Contest> {
        self.snapshot().running().to_vec()
    }

    /// The current contest list and its indices
    pub fn snapshot(&self) -> Arc<ContestSnapshot> {
        read_snapshot(&self.snapshot)
    }

    /// Delay the update task will wait before its next reload
    pub fn next_delay(&self) -> Duration {
        *lock(&self.next_delay)
    }

    pub fn task(&self) -> &Task {
        &self.update_task
    }

    async fn try_disk(&self) -> CacheResult<()> {
        let _guard = self.reload.lock().await;
        let contests = self.store.fetch_contests()?;
        if contests.is_empty() {
            tracing::info!("Contest cache on disk is empty");
            return Ok(());
        }
        self.update(contests, false)?;
        Ok(())
    }

    async fn reload_contests(&self) -> CacheResult<()> {
        let _timer = metrics::start_refresh_timer(CACHE_NAME);
        let result = match self.api.contest_list(None).await {
            Ok(contests) => self.update(contests, true),
            Err(e) => Err(e.into()),
        };
        metrics::record_cache_refresh(CACHE_NAME, result.is_ok());

        *lock(&self.next_delay) = result?;
        Ok(())
    }

    fn update(&self, contests: Vec<Contest>, from_api: bool) -> CacheResult<Duration> {
        tracing::info!(
            count = contests.len(),
            source = if from_api { "api" } else { "disk" },
            "Contests fetched"
        );

        let snapshot = ContestSnapshot::build(contests, Utc::now());
        if from_api {
            let stored = self.store.cache_contests(&snapshot.contests)?;
            tracing::info!(count = stored, "Contests stored in database");
        }

        let delay = snapshot.next_delay(unix_now(), &self.config);
        let published = snapshot.contests.clone();
        metrics::set_cached_items(CACHE_NAME, published.len());
        swap_snapshot(&self.snapshot, snapshot);

        tracing::debug!(delay_secs = delay.as_secs(), "Next contest reload scheduled");
        self.events.dispatch(Event::contest_list_refresh(published));
        Ok(delay)
    }
}
