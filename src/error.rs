use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::election::phase::Phase;

/// Reasons an election cannot be created or updated.
#[derive(Error, Debug)]
pub enum ElectionError {
    #[error("Election title must not be empty.")]
    EmptyTitle,

    #[error("Election description must not be empty.")]
    EmptyDescription,

    #[error("Phases must be ordered: commit start < commit end <= reveal start < reveal end.")]
    PhaseOrder,

    #[error("At least 2 candidates are required; got {0}.")]
    TooFewCandidates(usize),

    #[error("Candidate {0} is missing a name or manifesto.")]
    IncompleteCandidate(usize),

    #[error("Candidate name '{0}' is used more than once.")]
    DuplicateCandidate(String),

    #[error("No election with ID '{0}' exists.")]
    NotFound(String),

    #[error("Election '{election}' has no candidate '{candidate}'.")]
    UnknownCandidate { election: String, candidate: String },

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Reasons a commit, reveal, or voter-ID operation is refused.
#[derive(Error, Debug)]
pub enum VoteError {
    #[error("No election with ID '{0}' exists.")]
    ElectionNotFound(String),

    #[error("This action requires the {expected} phase; the election is currently {actual}.")]
    WrongPhase { expected: Phase, actual: Phase },

    #[error("The reveal window opens at {0}.")]
    RevealNotOpen(DateTime<Utc>),

    #[error("You are not registered as a voter; use /voter register first.")]
    UnknownVoter,

    #[error("You need a voter ID to vote; use /voter mint first.")]
    NoVoterId,

    #[error("You are not on the voter list for this election.")]
    NotEligible,

    #[error("Election has no candidate '{0}'.")]
    UnknownCandidate(String),

    #[error("You have not committed a vote in this election.")]
    NotCommitted,

    #[error("You have already revealed your vote in this election.")]
    AlreadyRevealed,

    #[error("The candidate and salt do not match your committed vote.")]
    CommitmentMismatch,

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl From<ElectionError> for VoteError {
    fn from(e: ElectionError) -> Self {
        match e {
            ElectionError::NotFound(id) => VoteError::ElectionNotFound(id),
            ElectionError::UnknownCandidate { candidate, .. } => VoteError::UnknownCandidate(candidate),
            ElectionError::Storage(e) => VoteError::Storage(e),
            other => VoteError::Storage(anyhow::Error::new(other)),
        }
    }
}
