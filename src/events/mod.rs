//! Typed publish/subscribe between caches
//!
//! # Overview
//!
//! Caches announce data changes through an [`EventSystem`]. Two kinds of
//! subscribers are supported:
//!
//! - **Listeners** registered for an [`EventKind`] run on every dispatch of that
//!   kind, each in its own tokio task. A listener created `with_lock` never
//!   overlaps with itself.
//! - **One-shot waiters** created by [`EventSystem::wait_for`] resolve on the
//!   next dispatch of a kind, or fail with [`EventError::Timeout`].
//!
//! # Example
//!
//! ```no_run
//! use cfmirror::events::{Event, EventKind, EventSystem, Listener};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let events = Arc::new(EventSystem::new());
//! events.add_listener(Listener::new("log-refresh", EventKind::ContestListRefresh, |event| async move {
//!     tracing::info!(kind = %event.kind(), "contest list refreshed");
//!     Ok(())
//! }));
//!
//! let next = events.wait_for(EventKind::RatingChangesUpdate, Some(Duration::from_secs(60)));
//! # let _ = next;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod listener;
pub mod system;

use std::fmt;
use std::sync::Arc;

use crate::models::{Contest, RatingChange};

pub use error::{EventError, EventResult};
pub use listener::Listener;
pub use system::{EventSystem, PendingEvent};

/// Discriminant used to register listeners and waiters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// The contest list was reloaded from the API or from disk
    ContestListRefresh,
    /// Official rating changes became available for a contest
    RatingChangesUpdate,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ContestListRefresh => "contest_list_refresh",
            Self::RatingChangesUpdate => "rating_changes_update",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Published events. Payloads are shared snapshots, cheap to clone per subscriber.
#[derive(Debug, Clone)]
pub enum Event {
    ContestListRefresh {
        contests: Arc<Vec<Contest>>,
    },
    RatingChangesUpdate {
        contest: Contest,
        rating_changes: Arc<Vec<RatingChange>>,
    },
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::ContestListRefresh { .. } => EventKind::ContestListRefresh,
            Self::RatingChangesUpdate { .. } => EventKind::RatingChangesUpdate,
        }
    }

    pub fn contest_list_refresh(contests: Vec<Contest>) -> Self {
        Self::ContestListRefresh {
            contests: Arc::new(contests),
        }
    }

    pub fn rating_changes_update(contest: Contest, rating_changes: Vec<RatingChange>) -> Self {
        Self::RatingChangesUpdate {
            contest,
            rating_changes: Arc::new(rating_changes),
        }
    }
}
