//! Codeforces API gateway
//!
//! # Overview
//!
//! [`CodeforcesApi`] is the seam between the caches and the remote platform.
//! [`CodeforcesClient`] implements it over HTTP with rate limiting and
//! retries; tests substitute a scripted implementation.
//!
//! Endpoint failures are reported as [`ApiError`]. Contest endpoints narrow a
//! generic failure into `ContestNotFound` or `RatingChangesUnavailable`, user
//! endpoints into `HandleNotFound` or `HandleInvalid`.

pub mod client;
pub mod error;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::{Contest, Problem, ProblemStatistics, RanklistRow, RatingChange, User};

pub use client::CodeforcesClient;
pub use error::{ApiError, ApiResult};

/// `user.info` accepts at most this many handles per request
pub const USER_INFO_HANDLE_LIMIT: usize = 10_000;

/// `user.info` accepts at most this many bytes of handles per request
pub const USER_INFO_SIZE_LIMIT: usize = 1 << 16;

/// Remote API operations the caches depend on
#[async_trait]
pub trait CodeforcesApi: Send + Sync {
    /// `contest.list`
    async fn contest_list(&self, gym: Option<bool>) -> ApiResult<Vec<Contest>>;

    /// `contest.ratingChanges`
    async fn contest_rating_changes(&self, contest_id: i32) -> ApiResult<Vec<RatingChange>>;

    /// `contest.standings`
    async fn contest_standings(&self, query: &StandingsQuery) -> ApiResult<Standings>;

    /// `problemset.problems`
    async fn problemset_problems(&self, query: &ProblemsetQuery) -> ApiResult<ProblemsetResponse>;

    /// `user.info`, split into as many requests as the handle list needs
    async fn user_info(&self, handles: &[String]) -> ApiResult<Vec<User>>;

    /// `user.ratedList`
    async fn user_rated_list(&self, active_only: Option<bool>) -> ApiResult<Vec<User>>;
}

/// Parameters of `contest.standings`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StandingsQuery {
    pub contest_id: i32,
    pub from: Option<u32>,
    pub count: Option<u32>,
    pub handles: Option<Vec<String>>,
    pub room: Option<i32>,
    pub show_unofficial: Option<bool>,
}

impl StandingsQuery {
    pub fn new(contest_id: i32) -> Self {
        Self {
            contest_id,
            ..Default::default()
        }
    }

    pub fn from(mut self, from: u32) -> Self {
        self.from = Some(from);
        self
    }

    pub fn count(mut self, count: u32) -> Self {
        self.count = Some(count);
        self
    }

    pub fn handles(mut self, handles: Vec<String>) -> Self {
        self.handles = Some(handles);
        self
    }

    pub fn room(mut self, room: i32) -> Self {
        self.room = Some(room);
        self
    }

    pub fn show_unofficial(mut self, show_unofficial: bool) -> Self {
        self.show_unofficial = Some(show_unofficial);
        self
    }

    /// Form parameters in wire format
    pub fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("contestId", self.contest_id.to_string())];
        if let Some(from) = self.from {
            params.push(("from", from.to_string()));
        }
        if let Some(count) = self.count {
            params.push(("count", count.to_string()));
        }
        if let Some(handles) = &self.handles {
            params.push(("handles", handles.join(";")));
        }
        if let Some(room) = self.room {
            params.push(("room", room.to_string()));
        }
        if let Some(show_unofficial) = self.show_unofficial {
            params.push(("showUnofficial", show_unofficial.to_string()));
        }
        params
    }
}

/// Parameters of `problemset.problems`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProblemsetQuery {
    pub tags: Option<Vec<String>>,
    pub problemset_name: Option<String>,
}

impl ProblemsetQuery {
    pub fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(tags) = &self.tags {
            params.push(("tags", tags.join(";")));
        }
        if let Some(name) = &self.problemset_name {
            params.push(("problemsetName", name.clone()));
        }
        params
    }
}

/// Result of `contest.standings`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standings {
    pub contest: Contest,
    pub problems: Vec<Problem>,
    pub rows: Vec<RanklistRow>,
}

/// Result of `problemset.problems`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemsetResponse {
    pub problems: Vec<Problem>,
    #[serde(default)]
    pub problem_statistics: Vec<ProblemStatistics>,
}

/// Split handles into groups small enough for a single `user.info` request
pub fn user_info_chunks<S: AsRef<str>>(handles: &[S]) -> Vec<Vec<String>> {
    let mut chunks = Vec::new();
    let mut chunk: Vec<String> = Vec::new();
    let mut size = 0;

    for handle in handles {
        let handle = handle.as_ref();
        let full = size + handle.len() > USER_INFO_SIZE_LIMIT || chunk.len() == USER_INFO_HANDLE_LIMIT;
        if full && !chunk.is_empty() {
            chunks.push(std::mem::take(&mut chunk));
            size = 0;
        }
        chunk.push(handle.to_string());
        // separator
        size += handle.len() + 1;
    }
    if !chunk.is_empty() {
        chunks.push(chunk);
    }
    chunks
}
