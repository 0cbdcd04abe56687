//! Background task scheduling
//!
//! Every cache refresh in the mirror is a [`Task`]: a named async body that is
//! run, then paused by a [`Waiter`], then run again until stopped.
//!
//! # Overview
//!
//! - [`Waiter::fixed_delay`] sleeps a constant time between runs
//! - [`Waiter::dynamic_delay`] reads the delay from a closure before each wait
//! - [`Waiter::for_event`] blocks until the next event of a kind is dispatched
//!
//! Whatever the wait produced is passed to the next run as
//! `Option<WaitOutcome>`, so an event-driven task sees the event that woke it.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use cfmirror::scheduler::{Task, Waiter};
//!
//! let task = Task::builder("ProblemCacheUpdate")
//!     .waiter(Waiter::fixed_delay(Duration::from_secs(6 * 3600)))
//!     .exception_handler(|e| async move { tracing::error!(error = %e, "refresh failed") })
//!     .build(|_| async { Ok(()) });
//!
//! task.start()?;
//! task.stop().await;
//! ```

pub mod error;
pub mod task;
pub mod waiter;

pub use error::{SchedulerError, SchedulerResult};
pub use task::{Task, TaskBuilder, TaskFuture};
pub use waiter::{WaitOutcome, Waiter};
