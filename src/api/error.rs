//! Error types for the Codeforces API client

use thiserror::Error;

/// Result type for API calls
pub type ApiResult<T> = Result<T, ApiError>;

/// Codeforces API errors
#[derive(Error, Debug)]
pub enum ApiError {
    /// The request never produced a usable response
    #[error("Error connecting to Codeforces API: {0}")]
    Client(#[from] reqwest::Error),

    /// A non-JSON reply, usually an HTML error page
    #[error("Codeforces API responded with HTTP {status} and no JSON body")]
    Http { status: u16 },

    /// The API answered with `status: FAILED`
    #[error("Codeforces API error: {comment}")]
    TrueApi { comment: String },

    #[error("Codeforces API call limit exceeded: {comment}")]
    CallLimitExceeded { comment: String },

    #[error("Contest with ID `{contest_id}` not found on Codeforces")]
    ContestNotFound { contest_id: i32, comment: String },

    #[error("Rating changes unavailable for contest with ID `{contest_id}`")]
    RatingChangesUnavailable { contest_id: i32, comment: String },

    #[error("Handle `{handle}` not found on Codeforces")]
    HandleNotFound { handle: String, comment: String },

    #[error("`{handle}` is not a valid Codeforces handle")]
    HandleInvalid { handle: String, comment: String },

    #[error("Invalid Codeforces API URL: {0}")]
    Url(#[from] url::ParseError),

    /// The envelope or result did not have the expected shape
    #[error("Failed to decode Codeforces API response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ApiError {
    /// Classify a raw API comment, without endpoint specific context
    pub fn from_comment(comment: impl Into<String>) -> Self {
        let comment = comment.into();
        if comment.contains("limit exceeded") {
            Self::CallLimitExceeded { comment }
        } else {
            Self::TrueApi { comment }
        }
    }

    /// The comment the API returned, if any
    pub fn comment(&self) -> Option<&str> {
        match self {
            Self::TrueApi { comment }
            | Self::CallLimitExceeded { comment }
            | Self::ContestNotFound { comment, .. }
            | Self::RatingChangesUnavailable { comment, .. }
            | Self::HandleNotFound { comment, .. }
            | Self::HandleInvalid { comment, .. } => Some(comment),
            Self::Client(_) | Self::Http { .. } | Self::Url(_) | Self::Decode(_) => None,
        }
    }

    /// Errors that came from a well-formed API reply
    pub fn is_semantic(&self) -> bool {
        self.comment().is_some()
    }

    /// Errors a later identical call may not hit
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Client(_) | Self::Http { .. } | Self::CallLimitExceeded { .. }
        )
    }

    /// Errors the client retries on its own before giving up
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Client(_) | Self::CallLimitExceeded { .. })
    }

    /// Short label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Client(_) => "client",
            Self::Http { .. } => "http",
            Self::TrueApi { .. } => "api",
            Self::CallLimitExceeded { .. } => "call_limit",
            Self::ContestNotFound { .. } => "contest_not_found",
            Self::RatingChangesUnavailable { .. } => "rating_changes_unavailable",
            Self::HandleNotFound { .. } => "handle_not_found",
            Self::HandleInvalid { .. } => "handle_invalid",
            Self::Url(_) => "url",
            Self::Decode(_) => "decode",
        }
    }

    /// Narrow a generic failure from a contest endpoint
    pub(crate) fn for_contest(self, contest_id: i32) -> Self {
        match self {
            Self::TrueApi { comment } if comment.contains("not found") => {
                Self::ContestNotFound {
                    contest_id,
                    comment,
                }
            }
            Self::TrueApi { comment } if comment.contains("Rating changes are unavailable") => {
                Self::RatingChangesUnavailable {
                    contest_id,
                    comment,
                }
            }
            other => other,
        }
    }

    /// Narrow a generic failure from a user endpoint.
    ///
    /// The comment reads like `handles: User with handle xyz not found`.
    pub(crate) fn for_handles(self, handles: &[String]) -> Self {
        match self {
            Self::TrueApi { comment } if comment.contains("not found") => {
                let handle = comment
                    .split("not found")
                    .next()
                    .and_then(|head| head.split_whitespace().last())
                    .unwrap_or_default()
                    .to_string();
                Self::HandleNotFound { handle, comment }
            }
            Self::TrueApi { comment } if comment.contains("should contain") => {
                Self::HandleInvalid {
                    handle: handles.join(";"),
                    comment,
                }
            }
            other => other,
        }
    }
}
