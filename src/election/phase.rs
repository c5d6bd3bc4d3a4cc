use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ElectionError;

/// The four boundaries of an election, serialized as Unix milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Phases {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub commit_start: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub commit_end: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub reveal_start: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub reveal_end: DateTime<Utc>,
}

impl Phases {
    /// Only applied to new elections; stored elections are loaded as-is.
    pub fn validate(&self) -> Result<(), ElectionError> {
        let ordered = self.commit_start < self.commit_end
            && self.commit_end <= self.reveal_start
            && self.reveal_start < self.reveal_end;

        if ordered {
            Ok(())
        } else {
            Err(ElectionError::PhaseOrder)
        }
    }

    /// Whole days from the start of the commit phase to the end of the reveal phase, rounded up.
    pub fn duration_days(&self) -> i64 {
        let millis = (self.reveal_end - self.commit_start).num_milliseconds();
        if millis <= 0 {
            return 0;
        }
        let day = 24 * 60 * 60 * 1000;
        (millis + day - 1) / day
    }
}

/// Declaration order is chronological, so `Ord` follows the election lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Phase {
    #[serde(rename = "UPCOMING")]
    Upcoming,
    #[serde(rename = "ONGOING_COMMIT")]
    Commit,
    #[serde(rename = "ONGOING_REVEAL")]
    Reveal,
    #[serde(rename = "CLOSED")]
    Closed,
}

impl Default for Phase {
    fn default() -> Self {
        Phase::Upcoming
    }
}

impl Phase {
    pub fn is_active(&self) -> bool {
        matches!(self, Phase::Commit | Phase::Reveal)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Phase::Upcoming => "upcoming",
            Phase::Commit => "commit",
            Phase::Reveal => "reveal",
            Phase::Closed => "closed",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Derives the phase from the boundaries. The reveal start does not take part: once the commit
/// window ends the election counts as revealing until the reveal end.
pub fn compute_status(phases: &Phases, now: DateTime<Utc>) -> Phase {
    if now < phases.commit_start {
        Phase::Upcoming
    } else if now < phases.commit_end {
        Phase::Commit
    } else if now < phases.reveal_end {
        Phase::Reveal
    } else {
        Phase::Closed
    }
}
