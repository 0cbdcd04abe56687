//! Error types for the scheduler module

use thiserror::Error;

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Scheduler-specific errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// `start()` called on a task without a waiter
    #[error("No waiter set for task '{task}'")]
    WaiterRequired { task: String },

    /// `start()` called on a task that is already running
    #[error("Attempt to start task '{task}' which is already running")]
    AlreadyRunning { task: String },
}

impl SchedulerError {
    /// Create a waiter required error
    pub fn waiter_required(task: impl Into<String>) -> Self {
        Self::WaiterRequired { task: task.into() }
    }

    /// Create an already running error
    pub fn already_running(task: impl Into<String>) -> Self {
        Self::AlreadyRunning { task: task.into() }
    }

    /// Name of the task the error refers to
    pub fn task(&self) -> &str {
        match self {
            Self::WaiterRequired { task } | Self::AlreadyRunning { task } => task,
        }
    }

    /// Contract violations are never worth retrying
    pub fn is_recoverable(&self) -> bool {
        false
    }
}
