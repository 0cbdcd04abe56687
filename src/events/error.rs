//! Error types for the event system

use std::time::Duration;
use thiserror::Error;

use super::EventKind;

/// Result type for event system operations
pub type EventResult<T> = Result<T, EventError>;

/// Event system errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    /// No event of the awaited kind arrived in time
    #[error("Timed out after {timeout:?} waiting for {kind} event")]
    Timeout { kind: EventKind, timeout: Duration },

    /// `remove_listener` called for a listener that was never added
    #[error("Listener '{name}' is not registered for {kind} events")]
    ListenerNotRegistered { name: String, kind: EventKind },

    /// The event system was dropped while a waiter was pending
    #[error("Event system closed while waiting for {kind} event")]
    Closed { kind: EventKind },
}

impl EventError {
    /// Check if waiting again could succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
