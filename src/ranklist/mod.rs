//! Contest standings enriched with rating deltas
//!
//! A [`Ranklist`] is an immutable snapshot of one contest's standings plus a
//! delta for every rated handle. Deltas are either the platform's published
//! changes ([`RanklistStatus::Final`]) or the output of the
//! [`RatingCalculator`] ([`RanklistStatus::Predicted`]).

pub mod calculator;

use std::collections::HashMap;
use std::ops::Range;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::models::{Contest, ParticipantType, Problem, RanklistRow};

pub use calculator::{Contestant, RatingCalculator, StandingEntry};

/// Ratings outside this range are left out of predictions by default
pub const DEFAULT_RATED_RANGE: Range<i32> = -10_000..10_000;

/// Result type for ranklist operations
pub type RanklistResult<T> = Result<T, RanklistError>;

/// Ranklist errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RanklistError {
    #[error("`{contest}` is not rated")]
    ContestNotRated { contest: String },

    #[error("Handle `{handle}` not present in standings of `{contest}`")]
    HandleNotPresent { contest: String, handle: String },

    #[error("`{contest}` has team standings and cannot be rated")]
    TeamsInRatedContest { contest: String },

    #[error("Rated range for `{contest}` is empty")]
    EmptyRatedRange { contest: String },
}

impl RanklistError {
    /// Errors about a missing handle depend on the caller's input
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::HandleNotPresent { .. })
    }
}

/// Where the deltas of a ranklist came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RanklistStatus {
    Predicted,
    Final,
}

/// Standings snapshot of one contest
#[derive(Debug, Clone, Serialize)]
pub struct Ranklist {
    pub contest: Contest,
    pub problems: Vec<Problem>,
    pub standings: Vec<RanklistRow>,
    pub fetch_time: DateTime<Utc>,
    is_rated: bool,
    rated_range: Option<Range<i32>>,
    delta_by_handle: HashMap<String, i32>,
    #[serde(skip)]
    standing_by_id: HashMap<String, usize>,
    status: RanklistStatus,
}

impl Ranklist {
    /// Ranklist without deltas, for contests that are not rated
    pub fn unrated(
        contest: Contest,
        problems: Vec<Problem>,
        standings: Vec<RanklistRow>,
        fetch_time: DateTime<Utc>,
    ) -> Self {
        let mut ranklist = Self {
            contest,
            problems,
            standings,
            fetch_time,
            is_rated: false,
            rated_range: None,
            delta_by_handle: HashMap::new(),
            standing_by_id: HashMap::new(),
            status: RanklistStatus::Predicted,
        };
        ranklist.index_standings();
        ranklist
    }

    /// Ranklist that will carry deltas. Team standings cannot be rated.
    pub fn rated(
        contest: Contest,
        problems: Vec<Problem>,
        standings: Vec<RanklistRow>,
        fetch_time: DateTime<Utc>,
        rated_range: Option<Range<i32>>,
    ) -> RanklistResult<Self> {
        if standings.iter().any(|row| row.party.team_id.is_some()) {
            return Err(RanklistError::TeamsInRatedContest {
                contest: contest.name,
            });
        }
        let rated_range = rated_range.unwrap_or(DEFAULT_RATED_RANGE);
        if rated_range.is_empty() {
            return Err(RanklistError::EmptyRatedRange {
                contest: contest.name,
            });
        }

        let mut ranklist = Self::unrated(contest, problems, standings, fetch_time);
        ranklist.is_rated = true;
        ranklist.rated_range = Some(rated_range);
        Ok(ranklist)
    }

    pub fn is_rated(&self) -> bool {
        self.is_rated
    }

    pub fn status(&self) -> RanklistStatus {
        self.status
    }

    pub fn rated_range(&self) -> Option<&Range<i32>> {
        self.rated_range.as_ref()
    }

    pub fn deltas(&self) -> &HashMap<String, i32> {
        &self.delta_by_handle
    }

    /// Delta for `handle`, `None` if the handle took part but was not rated
    pub fn get_delta(&self, handle: &str) -> RanklistResult<Option<i32>> {
        if !self.is_rated {
            return Err(RanklistError::ContestNotRated {
                contest: self.contest.name.clone(),
            });
        }
        if !self.standing_by_id.contains_key(handle) {
            return Err(self.not_present(handle));
        }
        Ok(self.delta_by_handle.get(handle).copied())
    }

    /// Standings row by handle or team id
    pub fn get_standing_row(&self, id: &str) -> RanklistResult<&RanklistRow> {
        self.standing_by_id
            .get(id)
            .map(|&i| &self.standings[i])
            .ok_or_else(|| self.not_present(id))
    }

    /// Attach deltas computed elsewhere
    pub fn set_deltas(&mut self, deltas: HashMap<String, i32>, status: RanklistStatus) {
        self.delta_by_handle = deltas;
        self.status = status;
    }

    /// Predict deltas from pre-contest ratings.
    ///
    /// Rows whose handle is missing from `current_rating`, or whose rating
    /// falls outside the rated range, are left unrated.
    pub fn predict(&mut self, current_rating: &HashMap<String, i32>) -> RanklistResult<()> {
        let Some(range) = self.rated_range.clone().filter(|_| self.is_rated) else {
            return Err(RanklistError::ContestNotRated {
                contest: self.contest.name.clone(),
            });
        };

        let entries: Vec<StandingEntry> = self
            .standings
            .iter()
            .filter_map(|row| {
                let handle = row.party.first_handle()?;
                let rating = *current_rating.get(handle)?;
                range.contains(&rating).then(|| {
                    StandingEntry::new(handle, row.points, row.penalty, rating)
                })
            })
            .collect();

        self.delta_by_handle = if entries.is_empty() {
            HashMap::new()
        } else {
            RatingCalculator::new(entries).rating_changes()
        };
        self.status = RanklistStatus::Predicted;

        tracing::debug!(
            contest_id = self.contest.id,
            rated = self.delta_by_handle.len(),
            "Predicted rating changes"
        );
        Ok(())
    }

    /// Keep only official contestants that received a delta, and re-rank them.
    ///
    /// Rows that shared a rank before still share one afterwards.
    pub fn remove_unofficial_contestants(&mut self) {
        let deltas = &self.delta_by_handle;
        let mut kept: Vec<RanklistRow> = self
            .standings
            .drain(..)
            .filter(|row| {
                row.party.participant_type == ParticipantType::Contestant
                    && row
                        .party
                        .first_handle()
                        .is_some_and(|handle| deltas.contains_key(handle))
            })
            .collect();
        kept.sort_by_key(|row| row.rank);

        let mut previous_rank = None;
        let mut new_rank = 0;
        for (i, row) in kept.iter_mut().enumerate() {
            if previous_rank != Some(row.rank) {
                new_rank = i as i32 + 1;
                previous_rank = Some(row.rank);
            }
            row.rank = new_rank;
        }

        self.standings = kept;
        self.index_standings();
    }

    fn index_standings(&mut self) {
        self.standing_by_id = self
            .standings
            .iter()
            .enumerate()
            .map(|(i, row)| (row.party.id(), i))
            .collect();
    }

    fn not_present(&self, handle: &str) -> RanklistError {
        RanklistError::HandleNotPresent {
            contest: self.contest.name.clone(),
            handle: handle.to_string(),
        }
    }
}
