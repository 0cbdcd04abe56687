//! Persistent store for cached Codeforces data
//!
//! The caches keep their working set in memory and use a [`CacheStore`] for
//! warm starts and as the record of rating changes between restarts.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │    ContestCache, ProblemCache, ... (cache)   │
//! └──────────────────────┬───────────────────────┘
//!                        │ Arc<dyn CacheStore>
//!                        ▼
//! ┌──────────────────────────────────────────────┐
//! │  SqliteCacheStore (file or in-memory, WAL)   │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Tables:
//! - `contest`: the contest list
//! - `problem`: the global problem set, keyed by problem name
//! - `problem2`: per-contest problem lists, keyed by (contest id, index)
//! - `rating_change`: one row per (contest, handle)

pub mod sqlite;

use std::collections::HashMap;

use thiserror::Error;

use crate::models::{Contest, Problem, RatingChange};

pub use sqlite::SqliteCacheStore;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Persistent store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored value could not be mapped back to a model
    #[error("Invalid stored data: {0}")]
    InvalidData(String),
}

impl StoreError {
    /// Busy or locked databases may succeed later
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Database(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

/// Storage operations used by the caches
pub trait CacheStore: Send + Sync {
    /// Insert or replace contests, returning the number of rows written
    fn cache_contests(&self, contests: &[Contest]) -> StoreResult<usize>;

    fn fetch_contests(&self) -> StoreResult<Vec<Contest>>;

    /// Insert or replace problems in the global problem table
    fn cache_problems(&self, problems: &[Problem]) -> StoreResult<usize>;

    fn fetch_problems(&self) -> StoreResult<Vec<Problem>>;

    fn save_rating_changes(&self, changes: &[RatingChange]) -> StoreResult<usize>;

    /// Delete rating changes of one contest, or of all contests
    fn clear_rating_changes(&self, contest_id: Option<i32>) -> StoreResult<()>;

    /// Handles with at least `n` rated contests whose latest change is at or
    /// after `time_cutoff`
    fn get_users_with_more_than_n_contests(&self, time_cutoff: i64, n: usize) -> StoreResult<Vec<String>>;

    /// Every stored change, oldest first, with contest names filled in
    fn get_all_rating_changes(&self) -> StoreResult<Vec<RatingChange>>;

    /// Rating after each handle's most recent change
    fn get_latest_rating_by_handle(&self) -> StoreResult<HashMap<String, i32>>;

    fn get_rating_changes_for_contest(&self, contest_id: i32) -> StoreResult<Vec<RatingChange>>;

    fn get_rating_changes_for_handle(&self, handle: &str) -> StoreResult<Vec<RatingChange>>;

    fn has_rating_changes_saved(&self, contest_id: i32) -> StoreResult<bool>;

    /// Insert or replace per-contest problems
    fn cache_problemset(&self, problems: &[Problem]) -> StoreResult<usize>;

    /// Every per-contest problem
    fn fetch_problems2(&self) -> StoreResult<Vec<Problem>>;

    /// Delete per-contest problems of one contest, or of all contests
    fn clear_problemset(&self, contest_id: Option<i32>) -> StoreResult<()>;

    fn fetch_problemset(&self, contest_id: i32) -> StoreResult<Vec<Problem>>;

    fn problemset_empty(&self) -> StoreResult<bool>;
}
