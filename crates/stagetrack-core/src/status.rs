//! Stage status and its lifecycle.
//!
//! The modeled lifecycle is:
//!
//! - `NotStarted` → `InProgress`
//! - `InProgress` → `InReview` | `Delayed` | `Blocked`
//! - `InReview` → `Approved` | `Completed` | `Delayed` | `Blocked`
//! - `Delayed` | `Blocked` → `InProgress` (once the blocking condition clears)
//! - `Approved` and `Completed` are terminal

use crate::error::StageError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Status of a stage instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Seeded state; nothing has happened yet.
    #[default]
    NotStarted,

    /// Work is underway.
    InProgress,

    /// Work is done and awaiting review.
    #[serde(alias = "review")]
    InReview,

    /// Signed off by the approving party; terminal.
    Approved,

    /// Finished; terminal.
    Completed,

    /// Running late; must be moved back to `InProgress` explicitly.
    #[serde(alias = "on_hold")]
    Delayed,

    /// Cannot proceed; must be moved back to `InProgress` explicitly.
    Blocked,
}

impl StageStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [StageStatus; 7] = [
        StageStatus::NotStarted,
        StageStatus::InProgress,
        StageStatus::InReview,
        StageStatus::Approved,
        StageStatus::Completed,
        StageStatus::Delayed,
        StageStatus::Blocked,
    ];

    /// Returns the string representation used in records and on the CLI.
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::NotStarted => "not_started",
            StageStatus::InProgress => "in_progress",
            StageStatus::InReview => "in_review",
            StageStatus::Approved => "approved",
            StageStatus::Completed => "completed",
            StageStatus::Delayed => "delayed",
            StageStatus::Blocked => "blocked",
        }
    }

    /// Whether this status has no outgoing transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StageStatus::Approved | StageStatus::Completed)
    }

    /// Whether the stage is held up by an external condition.
    pub fn is_stalled(&self) -> bool {
        matches!(self, StageStatus::Delayed | StageStatus::Blocked)
    }

    /// Check if moving from this status to `new_status` follows the modeled
    /// lifecycle. Re-entering the same status is always allowed.
    pub fn can_transition_to(&self, new_status: &StageStatus) -> bool {
        if self == new_status {
            return true;
        }

        match self {
            StageStatus::NotStarted => matches!(new_status, StageStatus::InProgress),
            StageStatus::InProgress => matches!(
                new_status,
                StageStatus::InReview | StageStatus::Delayed | StageStatus::Blocked
            ),
            StageStatus::InReview => matches!(
                new_status,
                StageStatus::Approved
                    | StageStatus::Completed
                    | StageStatus::Delayed
                    | StageStatus::Blocked
            ),
            StageStatus::Delayed | StageStatus::Blocked => {
                matches!(new_status, StageStatus::InProgress)
            }
            StageStatus::Approved | StageStatus::Completed => false,
        }
    }

    /// Returns the statuses reachable from this one in the modeled lifecycle.
    pub fn valid_transitions(&self) -> Vec<StageStatus> {
        StageStatus::ALL
            .into_iter()
            .filter(|s| s != self && self.can_transition_to(s))
            .collect()
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for StageStatus {
    type Err = StageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "not_started" => Ok(StageStatus::NotStarted),
            "in_progress" => Ok(StageStatus::InProgress),
            "in_review" | "review" => Ok(StageStatus::InReview),
            "approved" => Ok(StageStatus::Approved),
            "completed" => Ok(StageStatus::Completed),
            "delayed" | "on_hold" => Ok(StageStatus::Delayed),
            "blocked" => Ok(StageStatus::Blocked),
            _ => Err(StageError::InvalidStatus(s.to_string())),
        }
    }
}
