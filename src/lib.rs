//! cfmirror - Local mirror of Codeforces data
//!
//! Keeps contests, problems, per-contest problem lists, official rating
//! changes and live ranklists fresh in memory and in a local SQLite database,
//! and predicts rating changes for contests whose official changes are not
//! published yet.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`scheduler`] - Periodic and event-driven background tasks
//! - [`events`] - Typed in-process event bus
//! - [`api`] - Codeforces API gateway with rate limiting and retries
//! - [`storage`] - Persistent store (SQLite)
//! - [`cache`] - The cache cascade and its assembly
//! - [`ranklist`] - Ranklist model and rating calculator
//! - [`models`] - Codeforces data types
//! - [`config`] - Configuration management and settings
//! - [`server`] - Admin HTTP surface
//! - [`utils`] - Common utilities and helpers
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use cfmirror::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let api = Arc::new(CodeforcesClient::new(&config.api)?);
//!     let store = Arc::new(SqliteCacheStore::new(&config.database.sqlite_path)?);
//!     let caches = CacheSystem::new(api, store, Arc::new(EventSystem::new()), config.cache);
//!     caches.run().await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod metrics;
pub mod models;
pub mod ranklist;
pub mod scheduler;
pub mod server;
pub mod storage;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::api::{CodeforcesApi, CodeforcesClient};
    pub use crate::cache::{CacheSystem, RanklistMode};
    pub use crate::config::Config;
    pub use crate::error::{Error, ErrorCategory, Result};
    pub use crate::events::{Event, EventKind, EventSystem, Listener};
    pub use crate::models::{Contest, Phase, Problem, RanklistRow, RatingChange};
    pub use crate::ranklist::{Ranklist, RatingCalculator};
    pub use crate::scheduler::{Task, Waiter};
    pub use crate::storage::{CacheStore, SqliteCacheStore};
}

// Direct re-exports for convenience
pub use models::{Contest, Phase, Problem, RatingChange};
