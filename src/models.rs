// Core data structures mirrored from the Codeforces API

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const CONTEST_BASE_URL: &str = "https://codeforces.com/contest/";
pub const GYM_BASE_URL: &str = "https://codeforces.com/gym/";

/// Contest ids at or above this value belong to the gym.
pub const GYM_ID_THRESHOLD: i32 = 100_000;

/// Rating assumed for users the platform reports as unrated.
pub const UNRATED_USER_RATING: i32 = 800;

/// Contest name markers for contests that are never rated normally.
pub const NONSTANDARD_CONTEST_MARKERS: &[&str] = &[
    "wild",
    "fools",
    "unrated",
    "surprise",
    "unknown",
    "friday",
    "q#",
    "testing",
    "marathon",
    "kotlin",
    "onsite",
    "experimental",
    "abbyy",
];

// ============================================================================
// Contest
// ============================================================================

/// Contest phase as reported by `contest.list`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Before,
    Coding,
    PendingSystemTest,
    SystemTest,
    Finished,
}

impl Phase {
    pub const ALL: [Phase; 5] = [
        Phase::Before,
        Phase::Coding,
        Phase::PendingSystemTest,
        Phase::SystemTest,
        Phase::Finished,
    ];

    /// Whether the contest is live (coding or being judged)
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            Self::Coding | Self::PendingSystemTest | Self::SystemTest
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Before => "BEFORE",
            Self::Coding => "CODING",
            Self::PendingSystemTest => "PENDING_SYSTEM_TEST",
            Self::SystemTest => "SYSTEM_TEST",
            Self::Finished => "FINISHED",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Phase::ALL
            .into_iter()
            .find(|phase| phase.as_str() == s)
            .ok_or_else(|| format!("unknown contest phase: {s}"))
    }
}

/// Codeforces contest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contest {
    pub id: i32,
    pub name: String,
    #[serde(rename = "startTimeSeconds", default)]
    pub start_time: Option<i64>,
    #[serde(rename = "durationSeconds", default)]
    pub duration: Option<i64>,
    #[serde(rename = "type")]
    pub kind: String,
    pub phase: Phase,
    #[serde(default)]
    pub prepared_by: Option<String>,
}

impl Contest {
    /// Contest end in unix seconds, if both start and duration are known
    pub fn end_time(&self) -> Option<i64> {
        Some(self.start_time? + self.duration?)
    }

    pub fn is_running(&self) -> bool {
        self.phase.is_running()
    }

    pub fn url(&self) -> String {
        if self.id < GYM_ID_THRESHOLD {
            format!("{CONTEST_BASE_URL}{}", self.id)
        } else {
            format!("{GYM_BASE_URL}{}", self.id)
        }
    }

    /// Contests whose names mark them as not rated the usual way
    pub fn is_nonstandard(&self) -> bool {
        let name = self.name.to_lowercase();
        NONSTANDARD_CONTEST_MARKERS
            .iter()
            .any(|marker| name.contains(marker))
    }

    pub fn is_educational(&self) -> bool {
        self.name.contains("Educational")
    }
}

// ============================================================================
// Problems
// ============================================================================

/// Codeforces problem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Problem {
    #[serde(default)]
    pub contest_id: Option<i32>,
    #[serde(default)]
    pub problemset_name: Option<String>,
    pub index: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub points: Option<f64>,
    #[serde(default)]
    pub rating: Option<i32>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Problem {
    /// A problem is usable for recommendations only with a contest and a rating
    pub fn has_metadata(&self) -> bool {
        self.contest_id.is_some() && self.rating.is_some()
    }

    /// Identifier like `1500A`
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Solve counts returned next to `problemset.problems`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemStatistics {
    #[serde(default)]
    pub contest_id: Option<i32>,
    pub index: String,
    pub solved_count: i64,
}

// ============================================================================
// Rating changes and users
// ============================================================================

/// One handle's official rating change for one contest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingChange {
    pub contest_id: i32,
    #[serde(default)]
    pub contest_name: String,
    pub handle: String,
    pub rank: i32,
    #[serde(rename = "ratingUpdateTimeSeconds")]
    pub rating_update_time: i64,
    pub old_rating: i32,
    pub new_rating: i32,
}

impl RatingChange {
    pub fn delta(&self) -> i32 {
        self.new_rating - self.old_rating
    }
}

/// Codeforces user, trimmed to the fields the caches use
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub handle: String,
    #[serde(default)]
    pub rating: Option<i32>,
    #[serde(default)]
    pub max_rating: Option<i32>,
    #[serde(default)]
    pub rank: Option<String>,
    #[serde(default)]
    pub contribution: i32,
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default)]
    pub last_online_time_seconds: i64,
    #[serde(default)]
    pub registration_time_seconds: i64,
}

impl User {
    pub fn effective_rating(&self) -> i32 {
        self.rating.unwrap_or(UNRATED_USER_RATING)
    }
}

// ============================================================================
// Standings
// ============================================================================

/// How a party took part in a contest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParticipantType {
    Contestant,
    Practice,
    Virtual,
    Manager,
    OutOfCompetition,
    #[serde(other)]
    Unknown,
}

impl ParticipantType {
    /// Participant kinds that appear in official ranklists
    pub fn is_official(&self) -> bool {
        matches!(
            self,
            Self::Contestant | Self::OutOfCompetition | Self::Virtual
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub handle: String,
}

/// A contestant or team in the standings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Party {
    #[serde(default)]
    pub contest_id: Option<i32>,
    pub members: Vec<Member>,
    pub participant_type: ParticipantType,
    #[serde(default)]
    pub team_id: Option<i32>,
    #[serde(default)]
    pub team_name: Option<String>,
    #[serde(default)]
    pub ghost: bool,
    #[serde(default)]
    pub room: Option<i32>,
    #[serde(rename = "startTimeSeconds", default)]
    pub start_time: Option<i64>,
}

impl Party {
    pub fn first_handle(&self) -> Option<&str> {
        self.members.first().map(|m| m.handle.as_str())
    }

    /// Standings key: the team id when present, otherwise the first handle
    pub fn id(&self) -> String {
        match self.team_id {
            Some(team_id) => team_id.to_string(),
            None => self.first_handle().unwrap_or_default().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemResult {
    pub points: f64,
    #[serde(default)]
    pub penalty: Option<i64>,
    #[serde(default)]
    pub rejected_attempt_count: i32,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "bestSubmissionTimeSeconds", default)]
    pub best_submission_time: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RanklistRow {
    pub party: Party,
    pub rank: i32,
    pub points: f64,
    pub penalty: i64,
    #[serde(default)]
    pub problem_results: Vec<ProblemResult>,
}
