//! Ranklists of running and recently finished contests
//!
//! Monitored contests are polled for standings; each poll builds a new
//! [`Ranklist`] with predicted deltas and replaces the cached one. A contest
//! stops being monitored once it is finished and its official rating changes
//! are stored, or once it leaves the rating changes window.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock, Weak};

use chrono::Utc;
use tokio::time::Instant;

use super::contest::ContestCache;
use super::rating_changes::RatingChangesCache;
use super::{lock, read_snapshot, swap_snapshot, CacheError, CacheResult};
use crate::api::{ApiError, CodeforcesApi, Standings, StandingsQuery};
use crate::config::CacheConfig;
use crate::events::{EventKind, EventSystem, Listener};
use crate::metrics;
use crate::models::{Contest, ParticipantType, Phase, RanklistRow};
use crate::ranklist::{Ranklist, RanklistStatus};
use crate::scheduler::{Task, Waiter};

const CACHE_NAME: &str = "ranklist";

/// How deltas of a generated ranklist are obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RanklistMode {
    /// Use published rating changes, predicting only if there are none
    Fetch,
    /// Always predict
    Predict,
}

type RatedList = (Instant, Arc<HashMap<String, i32>>);

/// Cache of ranklists for monitored contests
pub struct RanklistCache {
    api: Arc<dyn CodeforcesApi>,
    events: Arc<EventSystem>,
    contests: Arc<ContestCache>,
    rating_changes: Arc<RatingChangesCache>,
    config: CacheConfig,
    monitored: Mutex<Vec<Contest>>,
    ranklists: RwLock<Arc<HashMap<i32, Arc<Ranklist>>>>,
    rated_list: tokio::sync::Mutex<Option<RatedList>>,
    update_lock: tokio::sync::Mutex<()>,
    update_task: Task,
    monitor_task: Task,
    rating_changes_listener: Listener,
}

impl RanklistCache {
    pub fn new(
        api: Arc<dyn CodeforcesApi>,
        events: Arc<EventSystem>,
        contests: Arc<ContestCache>,
        rating_changes: Arc<RatingChangesCache>,
        config: CacheConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let update_task = Task::builder("RanklistCacheUpdate")
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

            let monitor_task = Task::builder("RanklistCacheUpdate.MonitorActiveContests")
                .waiter(Waiter::fixed_delay(config.ranklist_poll()))
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

            // Contests whose changes were just published leave the monitored set
            let rating_changes_listener = Listener::new(
                "RanklistCacheRatingChangesUpdate",
                EventKind::RatingChangesUpdate,
                {
                    let weak = weak.clone();
                    move |_| {
                        let weak = weak.clone();
                        async move {
                            if let Some(cache) = weak.upgrade() {
                                cache.update_task.manual_trigger(None).await;
                            }
                            Ok(())
                        }
                    }
                },
            )
            .with_lock();

            Self {
                api,
                events,
                contests,
                rating_changes,
                config,
                monitored: Mutex::new(Vec::new()),
                ranklists: RwLock::new(Arc::new(HashMap::new())),
                rated_list: tokio::sync::Mutex::new(None),
                update_lock: tokio::sync::Mutex::new(()),
                update_task,
                monitor_task,
                rating_changes_listener,
            }
        })
    }

    pub fn run(&self) -> CacheResult<()> {
        self.events.add_listener(self.rating_changes_listener.clone());
        self.update_task.start()?;
        Ok(())
    }

    pub async fn stop(&self) {
        if let Err(e) = self.events.remove_listener(&self.rating_changes_listener) {
            tracing::debug!(error = %e, "Ranklist listener was not registered");
        }
        self.update_task.stop().await;
        self.monitor_task.stop().await;
    }

    /// Cached ranklist of a monitored contest.
    ///
    /// Only ranklists including unofficial participants are cached, so asking
    /// for the official one always fails.
    pub fn get_ranklist(&self, contest: &Contest, show_official: bool) -> CacheResult<Arc<Ranklist>> {
        if show_official {
            return Err(CacheError::RanklistNotMonitored(contest.name.clone()));
        }
        read_snapshot(&self.ranklists)
            .get(&contest.id)
            .cloned()
            .ok_or_else(|| CacheError::RanklistNotMonitored(contest.name.clone()))
    }

    pub fn monitored_contests(&self) -> Vec<Contest> {
        lock(&self.monitored).clone()
    }

    /// Effective rating of every rated user, refreshed after the rated list TTL
    pub async fn users_effective_rating(&self) -> CacheResult<Arc<HashMap<String, i32>>> {
        let mut cached = self.rated_list.lock().await;
        if let Some((fetched_at, ratings)) = cached.as_ref() {
            if fetched_at.elapsed() < self.config.rated_list_ttl() {
                return Ok(ratings.clone());
            }
        }

        let users = self.api.user_rated_list(Some(false)).await?;
        let ratings: Arc<HashMap<String, i32>> = Arc::new(
            users
                .into_iter()
                .map(|user| {
                    let rating = user.effective_rating();
                    (user.handle, rating)
                })
                .collect(),
        );
        tracing::info!(users = ratings.len(), "Rated list fetched");
        *cached = Some((Instant::now(), ratings.clone()));
        Ok(ratings)
    }

    // ========================================================================
    // Ranklist generation
    // ========================================================================

    /// Build a fresh ranklist for a contest
    pub async fn generate_ranklist(
        &self,
        contest_id: i32,
        mode: RanklistMode,
        show_unofficial: bool,
    ) -> CacheResult<Ranklist> {
        let fetched = match mode {
            RanklistMode::Fetch => self.ranklist_with_fetched_changes(contest_id, show_unofficial).await?,
            RanklistMode::Predict => None,
        };
        let mut ranklist = match fetched {
            Some(ranklist) => ranklist,
            None => self.ranklist_with_predicted_changes(contest_id, show_unofficial).await?,
        };

        if !show_unofficial && ranklist.contest.is_educational() {
            ranklist.remove_unofficial_contestants();
        }
        Ok(ranklist)
    }

    /// Ranklist for virtual participants, each rated against the official
    /// field using a rating of its own from `vc_ratings`.
    pub async fn generate_vc_ranklist(
        &self,
        contest_id: i32,
        vc_ratings: &HashMap<String, i32>,
    ) -> CacheResult<Ranklist> {
        let standings = self
            .api
            .contest_standings(&StandingsQuery::new(contest_id).show_unofficial(true))
            .await?;

        let mut rows: Vec<RanklistRow> = standings
            .rows
            .into_iter()
            .filter(|row| {
                row.party.participant_type == ParticipantType::Contestant
                    || row
                        .party
                        .first_handle()
                        .is_some_and(|handle| vc_ratings.contains_key(handle))
            })
            .collect();
        rows.sort_by_key(|row| row.rank);
        for (i, row) in rows.iter_mut().enumerate() {
            row.rank = i as i32 + 1;
        }

        let rating_changes = self.api.contest_rating_changes(contest_id).await?;
        let official_rating: HashMap<String, i32> = rating_changes
            .into_iter()
            .map(|change| (change.handle, change.old_rating))
            .collect();

        let virtual_handles: Vec<String> = rows
            .iter()
            .filter(|row| row.party.participant_type == ParticipantType::Virtual)
            .filter_map(|row| row.party.first_handle())
            .filter(|handle| vc_ratings.contains_key(*handle))
            .map(str::to_string)
            .collect();

        let mut ranklist = Ranklist::rated(
            standings.contest,
            standings.problems,
            rows,
            Utc::now(),
            None,
        )?;

        let mut deltas = HashMap::with_capacity(virtual_handles.len());
        for handle in virtual_handles {
            let mut mixed = official_rating.clone();
            if let Some(&rating) = vc_ratings.get(&handle) {
                mixed.insert(handle.clone(), rating);
            }
            ranklist.predict(&mixed)?;
            let delta = ranklist.deltas().get(&handle).copied().unwrap_or(0);
            deltas.insert(handle, delta);
        }
        ranklist.set_deltas(deltas, RanklistStatus::Predicted);
        Ok(ranklist)
    }

    /// Standings restricted to official participant kinds
    async fn contest_details(&self, contest_id: i32, show_unofficial: bool) -> CacheResult<Standings> {
        let mut standings = self
            .api
            .contest_standings(&StandingsQuery::new(contest_id).show_unofficial(show_unofficial))
            .await?;
        standings
            .rows
            .retain(|row| row.party.participant_type.is_official());
        Ok(standings)
    }

    async fn ranklist_with_fetched_changes(
        &self,
        contest_id: i32,
        show_unofficial: bool,
    ) -> CacheResult<Option<Ranklist>> {
        let standings = self.contest_details(contest_id, show_unofficial).await?;

        let changes = match self.api.contest_rating_changes(contest_id).await {
            Ok(changes) => changes,
            Err(ApiError::RatingChangesUnavailable { .. }) => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        if changes.is_empty() {
            return Ok(None);
        }

        let mut ranklist = Ranklist::rated(
            standings.contest,
            standings.problems,
            standings.rows,
            Utc::now(),
            None,
        )?;
        let deltas = changes
            .iter()
            .map(|change| (change.handle.clone(), change.delta()))
            .collect();
        ranklist.set_deltas(deltas, RanklistStatus::Final);
        Ok(Some(ranklist))
    }

    async fn ranklist_with_predicted_changes(
        &self,
        contest_id: i32,
        show_unofficial: bool,
    ) -> CacheResult<Ranklist> {
        let standings = self.contest_details(contest_id, show_unofficial).await?;
        let fetch_time = Utc::now();

        let official_rows = if show_unofficial {
            self.api
                .contest_standings(&StandingsQuery::new(contest_id))
                .await?
                .rows
        } else {
            standings.rows.clone()
        };

        let has_teams = official_rows.iter().any(|row| row.party.team_id.is_some());
        if standings.contest.is_nonstandard() || has_teams {
            return Ok(Ranklist::unrated(
                standings.contest,
                standings.problems,
                standings.rows,
                fetch_time,
            ));
        }

        let rated_list = self.users_effective_rating().await?;
        let educational = standings.contest.is_educational();
        let current_rating: HashMap<String, i32> = official_rows
            .iter()
            .filter_map(|row| row.party.first_handle())
            .map(|handle| (handle.to_string(), self.current_rating(&rated_list, handle)))
            .filter(|(_, rating)| !educational || *rating < self.config.educational_rating_limit)
            .collect();

        let mut ranklist = Ranklist::rated(
            standings.contest,
            standings.problems,
            standings.rows,
            fetch_time,
            None,
        )?;
        ranklist.predict(&current_rating)?;
        Ok(ranklist)
    }

    /// Rated list first, then stored rating changes, then the default
    fn current_rating(&self, rated_list: &HashMap<String, i32>, handle: &str) -> i32 {
        rated_list
            .get(handle)
            .copied()
            .or_else(|| self.rating_changes.get_current_rating(handle, false))
            .unwrap_or(self.config.default_rating)
    }

    // ========================================================================
    // Tasks
    // ========================================================================

    fn should_monitor(&self, contest: &Contest) -> CacheResult<bool> {
        if self.rating_changes.is_blacklisted(contest) {
            return Ok(false);
        }
        if contest.phase != Phase::Finished {
            return Ok(true);
        }
        self.rating_changes
            .is_newly_finished_without_rating_changes(contest)
    }

    async fn update_monitored(&self) -> CacheResult<()> {
        // Held across the monitor restart so two updates never interleave
        let _guard = self.update_lock.lock().await;
        let mut to_monitor = self.contests.get_running_contests();
        for contest in self.contests.get_contests_in_phase(Phase::Finished) {
            if !self.rating_changes.is_blacklisted(&contest)
                && self
                    .rating_changes
                    .is_newly_finished_without_rating_changes(&contest)?
            {
                to_monitor.push(contest);
            }
        }

        let current: HashSet<i32> = lock(&self.monitored).iter().map(|c| c.id).collect();
        let new: HashSet<i32> = to_monitor.iter().map(|c| c.id).collect();
        if current == new {
            return Ok(());
        }

        self.monitor_task.stop().await;
        metrics::set_monitored_contests(CACHE_NAME, to_monitor.len());
        tracing::info!(contests = ?new, "Monitoring ranklists");
        if to_monitor.is_empty() {
            self.clear_ranklists();
            lock(&self.monitored).clear();
        } else {
            *lock(&self.monitored) = to_monitor;
            self.monitor_task.start()?;
        }
        Ok(())
    }

    async fn poll_monitored(&self) -> CacheResult<()> {
        let mut monitored = Vec::new();
        for contest in self.monitored_contests() {
            if self.should_monitor(&contest)? {
                monitored.push(contest);
            }
        }
        *lock(&self.monitored) = monitored.clone();
        metrics::set_monitored_contests(CACHE_NAME, monitored.len());

        if monitored.is_empty() {
            self.clear_ranklists();
            tracing::info!("No more active contests for which to monitor ranklists");
            self.monitor_task.stop().await;
            return Ok(());
        }

        let _timer = metrics::start_refresh_timer(CACHE_NAME);
        let mut fetched = Vec::with_capacity(monitored.len());
        for contest in &monitored {
            match self
                .generate_ranklist(contest.id, RanklistMode::Predict, true)
                .await
            {
                Ok(ranklist) => {
                    tracing::info!(contest_id = contest.id, "Ranklist fetched");
                    fetched.push((contest.id, Arc::new(ranklist)));
                }
                Err(e) => {
                    tracing::warn!(contest_id = contest.id, error = %e, "Ranklist fetch failed");
                }
            }
        }
        metrics::record_cache_refresh(CACHE_NAME, fetched.len() == monitored.len());

        let mut ranklists = read_snapshot(&self.ranklists).as_ref().clone();
        ranklists.extend(fetched);
        swap_snapshot(&self.ranklists, ranklists);
        Ok(())
    }

    fn clear_ranklists(&self) {
        swap_snapshot(&self.ranklists, HashMap::new());
    }
}
