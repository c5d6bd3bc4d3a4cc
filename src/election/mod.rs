use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::election::phase::{compute_status, Phase, Phases};
use crate::error::ElectionError;

pub mod ledger;
pub mod phase;
pub mod store;
pub mod tally;

pub const DEFAULT_CANDIDATE_PHOTO: &str = "https://images.pexels.com/photos/2379004/pexels-photo-2379004.jpeg?auto=compress&cs=tinysrgb&w=400";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub id: String,
    pub name: String,
    pub photo: String,
    pub manifesto: String,
    #[serde(rename = "manifestoCID")]
    pub manifesto_cid: String,
    #[serde(default)]
    pub vote_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Election {
    pub id: String,
    pub title: String,
    pub description: String,
    pub phases: Phases,
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub status: Phase,
    #[serde(default)]
    pub total_votes: u64,
    /// Percentage of the voter list that revealed a vote.
    #[serde(default)]
    pub turnout: u32,
    #[serde(default)]
    pub eligible_voters: Vec<String>,
    #[serde(default = "Utc::now", with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl Election {
    pub fn status_at(&self, now: DateTime<Utc>) -> Phase {
        compute_status(&self.phases, now)
    }

    /// Recomputes the stored status, returning whether it changed.
    pub fn refresh_status(&mut self, now: DateTime<Utc>) -> bool {
        let status = self.status_at(now);
        let changed = status != self.status;
        self.status = status;
        changed
    }

    pub fn candidate(&self, id: &str) -> Option<&Candidate> {
        self.candidates.iter().find(|c| c.id == id)
    }

    pub fn candidate_by_name(&self, name: &str) -> Option<&Candidate> {
        let name = name.trim();
        self.candidates.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// An empty voter list admits everyone.
    pub fn is_eligible(&self, voter: &str) -> bool {
        self.eligible_voters.is_empty() || self.eligible_voters.iter().any(|v| v == voter)
    }

    pub(crate) fn recompute_turnout(&mut self) {
        self.turnout = match self.eligible_voters.len() {
            0 => 0,
            n => ((self.total_votes as f64 / n as f64) * 100.0).round() as u32,
        };
    }
}

#[derive(Debug, Clone)]
pub struct CandidateDraft {
    pub name: String,
    pub photo: Option<String>,
    pub manifesto: String,
}

/// Admin input for a new election; IDs, counters, and status are assigned by the store.
#[derive(Debug, Clone)]
pub struct ElectionDraft {
    pub title: String,
    pub description: String,
    pub phases: Phases,
    pub candidates: Vec<CandidateDraft>,
    pub eligible_voters: Vec<String>,
}

impl ElectionDraft {
    pub fn validate(&self) -> Result<(), ElectionError> {
        if self.title.trim().is_empty() {
            return Err(ElectionError::EmptyTitle);
        }
        if self.description.trim().is_empty() {
            return Err(ElectionError::EmptyDescription);
        }
        self.phases.validate()?;

        if self.candidates.len() < 2 {
            return Err(ElectionError::TooFewCandidates(self.candidates.len()));
        }

        let mut seen = Vec::<String>::with_capacity(self.candidates.len());
        for (i, candidate) in self.candidates.iter().enumerate() {
            if candidate.name.trim().is_empty() || candidate.manifesto.trim().is_empty() {
                return Err(ElectionError::IncompleteCandidate(i + 1));
            }
            let key = candidate.name.trim().to_lowercase();
            if seen.contains(&key) {
                return Err(ElectionError::DuplicateCandidate(candidate.name.trim().to_owned()));
            }
            seen.push(key);
        }

        Ok(())
    }

    pub(crate) fn into_election(self, id: String, now: DateTime<Utc>) -> Election {
        let candidates = self.candidates.into_iter()
            .enumerate()
            .map(|(i, c)| Candidate {
                id: format!("candidate-{}", i + 1),
                name: c.name.trim().to_owned(),
                photo: c.photo
                    .map(|p| p.trim().to_owned())
                    .filter(|p| !p.is_empty())
                    .unwrap_or_else(|| DEFAULT_CANDIDATE_PHOTO.to_owned()),
                manifesto_cid: manifesto_cid(&c.manifesto),
                manifesto: c.manifesto.trim().to_owned(),
                vote_count: 0,
            })
            .collect();

        let mut eligible_voters = self.eligible_voters;
        eligible_voters.sort();
        eligible_voters.dedup();

        let mut election = Election {
            id,
            title: self.title.trim().to_owned(),
            description: self.description.trim().to_owned(),
            phases: self.phases,
            candidates,
            status: Phase::Upcoming,
            total_votes: 0,
            turnout: 0,
            eligible_voters,
            created_at: now,
        };
        election.refresh_status(now);
        election
    }
}

/// Content-address placeholder for a manifesto: the hex SHA-256 of its text.
pub fn manifesto_cid(manifesto: &str) -> String {
    let digest = Sha256::digest(manifesto.trim().as_bytes());
    format!("sha256-{}", hex::encode(digest))
}

#[cfg(test)]
pub(crate) mod tests {
    use chrono::Duration;

    use super::*;

    pub(crate) fn draft(now: DateTime<Utc>) -> ElectionDraft {
        ElectionDraft {
            title: "Student Council 2026".to_owned(),
            description: "Annual council election".to_owned(),
            phases: Phases {
                commit_start: now - Duration::hours(1),
                commit_end: now + Duration::hours(1),
                reveal_start: now + Duration::hours(1),
                reveal_end: now + Duration::hours(2),
            },
            candidates: vec![
                CandidateDraft { name: "Asha".to_owned(), photo: None, manifesto: "Longer library hours".to_owned() },
                CandidateDraft { name: "Bilal".to_owned(), photo: Some("https://example.org/b.png".to_owned()), manifesto: "Cheaper canteen".to_owned() },
            ],
            eligible_voters: Vec::new(),
        }
    }

    #[test]
    fn draft_requires_two_complete_candidates() {
        let now = Utc::now();

        let mut d = draft(now);
        d.candidates.pop();
        assert!(matches!(d.validate(), Err(ElectionError::TooFewCandidates(1))));

        let mut d = draft(now);
        d.candidates[1].manifesto = "  ".to_owned();
        assert!(matches!(d.validate(), Err(ElectionError::IncompleteCandidate(2))));

        let mut d = draft(now);
        d.candidates[1].name = "asha".to_owned();
        assert!(matches!(d.validate(), Err(ElectionError::DuplicateCandidate(_))));

        let mut d = draft(now);
        d.title = String::new();
        assert!(matches!(d.validate(), Err(ElectionError::EmptyTitle)));
    }

    #[test]
    fn new_election_starts_with_zero_totals() {
        let now = Utc::now();
        let e = draft(now).into_election("election-1".to_owned(), now);

        assert_eq!(e.total_votes, 0);
        assert_eq!(e.turnout, 0);
        assert_eq!(e.status, Phase::Commit);
        assert_eq!(e.candidates[0].id, "candidate-1");
        assert_eq!(e.candidates[0].photo, DEFAULT_CANDIDATE_PHOTO);
        assert_eq!(e.candidates[1].photo, "https://example.org/b.png");
        assert!(e.candidates.iter().all(|c| c.vote_count == 0));
        assert!(e.candidates[0].manifesto_cid.starts_with("sha256-"));
    }

    #[test]
    fn turnout_is_relative_to_voter_list() {
        let now = Utc::now();
        let mut d = draft(now);
        d.eligible_voters = vec!["1".to_owned(), "2".to_owned(), "3".to_owned(), "3".to_owned()];
        let mut e = d.into_election("election-1".to_owned(), now);
        assert_eq!(e.eligible_voters.len(), 3);

        e.total_votes = 2;
        e.recompute_turnout();
        assert_eq!(e.turnout, 67);

        assert!(e.is_eligible("2"));
        assert!(!e.is_eligible("4"));
    }

    #[test]
    fn election_uses_stored_json_shape() {
        let now = Utc::now();
        let e = draft(now).into_election("election-1".to_owned(), now);
        let json = serde_json::to_value(&e).unwrap();

        assert!(json["phases"]["commitStart"].is_i64());
        assert_eq!(json["status"], "ONGOING_COMMIT");
        assert_eq!(json["totalVotes"], 0);
        assert!(json["candidates"][0]["manifestoCID"].is_string());
        assert_eq!(json["candidates"][0]["voteCount"], 0);
    }

    #[test]
    fn stored_election_without_optional_fields_loads() {
        let raw = r#"{
            "id": "election-1700000000000",
            "title": "Club president",
            "description": "Chess club",
            "phases": {"commitStart": 0, "commitEnd": 1000, "revealStart": 1000, "revealEnd": 2000},
            "candidates": [
                {"id": "candidate-1", "name": "A", "photo": "", "manifesto": "m", "manifestoCID": "QmHash1", "voteCount": 3}
            ],
            "totalVotes": 3,
            "turnout": 0
        }"#;

        let e: Election = serde_json::from_str(raw).unwrap();
        assert_eq!(e.status, Phase::Upcoming);
        assert!(e.eligible_voters.is_empty());
        assert_eq!(e.candidates[0].vote_count, 3);
    }
}
