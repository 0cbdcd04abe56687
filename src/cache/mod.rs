//! Cascade of caches mirroring Codeforces data
//!
//! # Overview
//!
//! Each cache owns one slice of data and the [`Task`](crate::scheduler::Task)s
//! that keep it fresh:
//!
//! - [`ContestCache`]: the contest list, reloaded on an adaptive delay
//! - [`ProblemCache`]: the global problem set, reloaded every few hours
//! - [`ProblemsetCache`]: per-contest problem lists of recently finished contests
//! - [`RatingChangesCache`]: official rating changes, polled until published
//! - [`RanklistCache`]: live standings with final or predicted deltas
//!
//! The contest cache publishes [`EventKind::ContestListRefresh`] after every
//! reload; the other caches recompute their monitored contests from it. The
//! rating changes cache publishes [`EventKind::RatingChangesUpdate`] when a
//! contest's changes appear.
//!
//! Readers always see a complete snapshot: every refresh builds new indices and
//! swaps them in at once.
//!
//! [`EventKind::ContestListRefresh`]: crate::events::EventKind::ContestListRefresh
//! [`EventKind::RatingChangesUpdate`]: crate::events::EventKind::RatingChangesUpdate
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use cfmirror::api::CodeforcesClient;
//! use cfmirror::cache::CacheSystem;
//! use cfmirror::config::Config;
//! use cfmirror::events::EventSystem;
//! use cfmirror::storage::SqliteCacheStore;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let config = Config::default();
//! let api = Arc::new(CodeforcesClient::new(&config.api)?);
//! let store = Arc::new(SqliteCacheStore::new(&config.database.sqlite_path)?);
//! let caches = CacheSystem::new(api, store, Arc::new(EventSystem::new()), config.cache);
//! caches.run().await?;
//! # Ok(())
//! # }
//! ```

pub mod contest;
pub mod problem;
pub mod problemset;
pub mod ranklist;
pub mod rating_changes;
mod reload;
#[cfg(test)]
mod testing;

use std::sync::{Arc, RwLock};

use thiserror::Error;

use crate::api::{ApiError, CodeforcesApi};
use crate::config::CacheConfig;
use crate::events::EventSystem;
use crate::ranklist::RanklistError;
use crate::scheduler::SchedulerError;
use crate::storage::{CacheStore, StoreError};

pub use contest::{ContestCache, ContestSnapshot};
pub use problem::{ProblemCache, ProblemSnapshot};
pub use problemset::ProblemsetCache;
pub use ranklist::{RanklistCache, RanklistMode};
pub use rating_changes::RatingChangesCache;

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache errors
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Contest with id `{0}` not found")]
    ContestNotFound(i32),

    #[error("Problemset for contest with id {0} not cached")]
    ProblemsetNotCached(i32),

    #[error("The ranklist for `{0}` is not being monitored")]
    RanklistNotMonitored(String),

    #[error("Codeforces API error: {0}")]
    Api(#[from] ApiError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("Ranklist error: {0}")]
    Ranklist(#[from] RanklistError),

    /// Outcome of the last refresh, shared with every `reload_now` caller
    #[error("Cache refresh failed: {0}")]
    RefreshFailed(Arc<CacheError>),
}

impl CacheError {
    /// Whether retrying the same operation later may succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Api(e) => e.is_recoverable(),
            Self::Store(e) => e.is_recoverable(),
            Self::Ranklist(e) => e.is_recoverable(),
            Self::RefreshFailed(e) => e.is_recoverable(),
            Self::ContestNotFound(_)
            | Self::ProblemsetNotCached(_)
            | Self::RanklistNotMonitored(_)
            | Self::Scheduler(_) => false,
        }
    }

    /// The error behind any number of `RefreshFailed` wrappers
    pub fn root(&self) -> &CacheError {
        match self {
            Self::RefreshFailed(e) => e.root(),
            other => other,
        }
    }
}

/// Read a snapshot, recovering from a poisoned lock
pub(crate) fn read_snapshot<T>(lock: &RwLock<Arc<T>>) -> Arc<T> {
    lock.read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone()
}

/// Replace a snapshot, recovering from a poisoned lock
pub(crate) fn swap_snapshot<T>(lock: &RwLock<Arc<T>>, value: T) {
    *lock.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = Arc::new(value);
}

pub(crate) fn lock<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// Cache System
// ============================================================================

/// All caches wired together over one API client, store and event bus
pub struct CacheSystem {
    pub contest: Arc<ContestCache>,
    pub problem: Arc<ProblemCache>,
    pub problemset: Arc<ProblemsetCache>,
    pub rating_changes: Arc<RatingChangesCache>,
    pub ranklist: Arc<RanklistCache>,
    events: Arc<EventSystem>,
    store: Arc<dyn CacheStore>,
}

impl CacheSystem {
    pub fn new(
        api: Arc<dyn CodeforcesApi>,
        store: Arc<dyn CacheStore>,
        events: Arc<EventSystem>,
        config: CacheConfig,
    ) -> Self {
        let contest = ContestCache::new(api.clone(), store.clone(), events.clone(), config.clone());
        let problem = ProblemCache::new(api.clone(), store.clone(), contest.clone(), config.clone());
        let problemset = ProblemsetCache::new(
            api.clone(),
            store.clone(),
            events.clone(),
            contest.clone(),
            config.clone(),
        );
        let rating_changes = RatingChangesCache::new(
            api.clone(),
            store.clone(),
            events.clone(),
            contest.clone(),
            config.clone(),
        );
        let ranklist = RanklistCache::new(
            api,
            events.clone(),
            contest.clone(),
            rating_changes.clone(),
            config,
        );

        Self {
            contest,
            problem,
            problemset,
            rating_changes,
            ranklist,
            events,
            store,
        }
    }

    /// Start every cache.
    ///
    /// Event-driven caches start first so they see the contest cache's first
    /// refresh, whether it comes from disk or from the API.
    pub async fn run(&self) -> CacheResult<()> {
        tracing::info!("Starting cache system");
        self.rating_changes.run()?;
        self.ranklist.run()?;
        self.problemset.run()?;
        self.contest.run().await?;
        self.problem.run().await?;
        tracing::info!("Cache system started");
        Ok(())
    }

    /// Stop every background task
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down cache system");
        self.problem.stop().await;
        self.contest.stop().await;
        self.problemset.stop().await;
        self.ranklist.stop().await;
        self.rating_changes.stop().await;
    }

    pub fn events(&self) -> &Arc<EventSystem> {
        &self.events
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }
}
