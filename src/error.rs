//! Unified error handling for the cfmirror crate
//!
//! Each layer has its own error enum. [`Error`] wraps all of them so callers
//! at the edges (the binary, the admin server) can classify failures with
//! [`ErrorCategory`] and decide whether a retry makes sense.
//!
//! # Usage
//!
//! ```rust,ignore
//! use cfmirror::error::{Error, ErrorCategory};
//!
//! fn report(err: Error) {
//!     if err.is_recoverable() {
//!         tracing::warn!(category = ?err.category(), "Retrying: {err}");
//!     } else {
//!         tracing::error!("Fatal error: {err}");
//!     }
//! }
//! ```

use std::io;
use thiserror::Error;

pub use crate::api::ApiError;
pub use crate::cache::CacheError;
pub use crate::events::EventError;
pub use crate::ranklist::RanklistError;
pub use crate::scheduler::SchedulerError;
pub use crate::storage::StoreError;

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Transport failures talking to Codeforces
    Network,
    /// Well-formed API replies reporting a failure
    Api,
    /// Local database and I/O
    Storage,
    /// Task and event contract violations
    Scheduler,
    /// Configuration and validation
    Config,
    /// Requested data is not available locally
    Data,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Api => "api",
            Self::Storage => "storage",
            Self::Scheduler => "scheduler",
            Self::Config => "config",
            Self::Data => "data",
            Self::Other => "other",
        }
    }
}

/// Unified error type for the cfmirror crate
#[derive(Error, Debug)]
pub enum Error {
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Ranklist error: {0}")]
    Ranklist(#[from] RanklistError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("Event error: {0}")]
    Event(#[from] EventError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other {
            context: context.into(),
            source: None,
        }
    }

    /// Check if this error is recoverable (can be retried)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Api(e) => e.is_recoverable(),
            Self::Store(e) => e.is_recoverable(),
            Self::Cache(e) => e.is_recoverable(),
            Self::Ranklist(e) => e.is_recoverable(),
            Self::Scheduler(e) => e.is_recoverable(),
            Self::Event(e) => e.is_recoverable(),
            Self::Io(_) => true,
            Self::Json(_) | Self::Config(_) | Self::Other { .. } => false,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Api(e) => api_category(e),
            Self::Store(_) | Self::Io(_) => ErrorCategory::Storage,
            Self::Cache(e) => cache_category(e.root()),
            Self::Ranklist(_) => ErrorCategory::Data,
            Self::Scheduler(_) | Self::Event(_) => ErrorCategory::Scheduler,
            Self::Json(_) => ErrorCategory::Data,
            Self::Config(_) => ErrorCategory::Config,
            Self::Other { .. } => ErrorCategory::Other,
        }
    }
}

fn api_category(err: &ApiError) -> ErrorCategory {
    if err.is_semantic() {
        ErrorCategory::Api
    } else {
        ErrorCategory::Network
    }
}

fn cache_category(err: &CacheError) -> ErrorCategory {
    match err {
        CacheError::Api(e) => api_category(e),
        CacheError::Store(_) => ErrorCategory::Storage,
        CacheError::Scheduler(_) => ErrorCategory::Scheduler,
        CacheError::ContestNotFound(_)
        | CacheError::ProblemsetNotCached(_)
        | CacheError::RanklistNotMonitored(_)
        | CacheError::Ranklist(_) => ErrorCategory::Data,
        CacheError::RefreshFailed(e) => cache_category(e),
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other {
            context: format!("{err:#}"),
            source: None,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
