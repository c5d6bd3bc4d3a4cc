use std::fmt;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rand::distributions::Alphanumeric;
use rand::Rng;
use sha2::{Digest, Sha256};

use crate::error::VoteError;

/// Domain separation tag for commitment digests.
pub const COMMIT_DOMAIN_V1: &[u8] = b"electnxt-commit-v1";

pub const SALT_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Commitment(pub [u8; 32]);

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Binds a candidate and salt to one election. Fields are length-prefixed so no two distinct
/// inputs share a preimage.
pub fn commitment_digest(election_id: &str, candidate_id: &str, salt: &str) -> Commitment {
    let mut hasher = Sha256::new();
    hasher.update(COMMIT_DOMAIN_V1);
    for field in [election_id, candidate_id, salt] {
        hasher.update((field.len() as u32).to_le_bytes());
        hasher.update(field.as_bytes());
    }
    Commitment(hasher.finalize().into())
}

pub fn generate_salt() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SALT_LEN)
        .map(char::from)
        .collect()
}

#[derive(Debug, Clone)]
pub struct VoteRecord {
    pub committed: bool,
    pub revealed: bool,
    /// Only known once the vote is revealed.
    pub candidate_id: Option<String>,
    pub commitment: Commitment,
    pub committed_at: DateTime<Utc>,
    pub revealed_at: Option<DateTime<Utc>>,
}

/// Per (voter, election) commit/reveal state. Lives in process memory only.
#[derive(Default)]
pub struct VoteLedger {
    records: DashMap<(String, String), VoteRecord>,
}

impl VoteLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(voter: &str, election_id: &str) -> (String, String) {
        (voter.to_owned(), election_id.to_owned())
    }

    /// Records a commitment. Committing again before revealing replaces the earlier commitment.
    pub fn record_commit(
        &self,
        voter: &str,
        election_id: &str,
        candidate_id: &str,
        salt: &str,
        now: DateTime<Utc>,
    ) -> Result<Commitment, VoteError> {
        let commitment = commitment_digest(election_id, candidate_id, salt);

        let mut entry = self.records.entry(Self::key(voter, election_id)).or_insert_with(|| VoteRecord {
            committed: false,
            revealed: false,
            candidate_id: None,
            commitment,
            committed_at: now,
            revealed_at: None,
        });

        if entry.revealed {
            return Err(VoteError::AlreadyRevealed);
        }

        entry.committed = true;
        entry.commitment = commitment;
        entry.committed_at = now;

        Ok(commitment)
    }

    /// Marks the vote revealed once the candidate and salt reproduce the stored commitment.
    pub fn record_reveal(
        &self,
        voter: &str,
        election_id: &str,
        candidate_id: &str,
        salt: &str,
        now: DateTime<Utc>,
    ) -> Result<(), VoteError> {
        let mut record = match self.records.get_mut(&Self::key(voter, election_id)) {
            None => return Err(VoteError::NotCommitted),
            Some(v) => v,
        };

        if !record.committed {
            return Err(VoteError::NotCommitted);
        }
        if record.revealed {
            return Err(VoteError::AlreadyRevealed);
        }
        if commitment_digest(election_id, candidate_id, salt) != record.commitment {
            return Err(VoteError::CommitmentMismatch);
        }

        record.revealed = true;
        record.candidate_id = Some(candidate_id.to_owned());
        record.revealed_at = Some(now);

        Ok(())
    }

    /// Returns a revealed vote to the committed state, keeping its commitment.
    pub fn revert_reveal(&self, voter: &str, election_id: &str) {
        if let Some(mut record) = self.records.get_mut(&Self::key(voter, election_id)) {
            record.revealed = false;
            record.candidate_id = None;
            record.revealed_at = None;
        }
    }

    pub fn has_committed(&self, voter: &str, election_id: &str) -> bool {
        self.records
            .get(&Self::key(voter, election_id))
            .map(|r| r.committed)
            .unwrap_or(false)
    }

    pub fn has_voted(&self, voter: &str, election_id: &str) -> bool {
        self.records
            .get(&Self::key(voter, election_id))
            .map(|r| r.revealed)
            .unwrap_or(false)
    }

    pub fn record(&self, voter: &str, election_id: &str) -> Option<VoteRecord> {
        self.records.get(&Self::key(voter, election_id)).map(|r| r.value().clone())
    }

    /// (committed, revealed) counts for one election.
    pub fn counts(&self, election_id: &str) -> (usize, usize) {
        let mut committed = 0;
        let mut revealed = 0;
        for entry in self.records.iter() {
            if entry.key().1 != election_id {
                continue;
            }
            if entry.committed {
                committed += 1;
            }
            if entry.revealed {
                revealed += 1;
            }
        }
        (committed, revealed)
    }
}
