use chrono::{DateTime, Utc};
use evlog::meta;
use sqlx::SqlitePool;
use tokio::sync::RwLock;

use crate::db::model;
use crate::election::{Election, ElectionDraft};
use crate::error::ElectionError;
use crate::runtime::get_logger;

pub const ELECTIONS_KEY: &str = "elections";

/// Ordered election list, mirrored to the key-value store after every change.
pub struct ElectionStore {
    conn: SqlitePool,
    elections: RwLock<Vec<Election>>,
}

impl ElectionStore {
    pub async fn load(conn: SqlitePool, now: DateTime<Utc>) -> anyhow::Result<Self> {
        let mut elections = match model::get_json::<Vec<Election>>(&conn, ELECTIONS_KEY).await {
            Ok(v) => v.unwrap_or_default(),
            Err(e) => {
                get_logger().error("Failed to parse stored elections; starting empty.", meta! {
                    "Key" => ELECTIONS_KEY,
                    "Error" => e,
                });
                Vec::new()
            }
        };

        for election in elections.iter_mut() {
            election.refresh_status(now);
        }

        get_logger().info("Loaded elections.", meta! {
            "Count" => elections.len(),
        });

        Ok(Self {
            conn,
            elections: RwLock::new(elections),
        })
    }

    async fn persist(&self, elections: &[Election]) -> anyhow::Result<()> {
        model::put_json(&self.conn, ELECTIONS_KEY, elections).await
    }

    pub async fn create(&self, draft: ElectionDraft, now: DateTime<Utc>) -> Result<Election, ElectionError> {
        draft.validate()?;

        let mut elections = self.elections.write().await;

        let mut stamp = now.timestamp_millis();
        let id = loop {
            let id = format!("election-{}", stamp);
            if !elections.iter().any(|e| e.id == id) {
                break id;
            }
            stamp += 1;
        };

        let election = draft.into_election(id, now);
        elections.push(election.clone());

        if let Err(e) = self.persist(&elections).await {
            elections.pop();
            return Err(e.into());
        }

        get_logger().info("Election created.", meta! {
            "ElectionID" => election.id,
            "Title" => election.title,
            "Candidates" => election.candidates.len(),
            "Status" => election.status,
        });

        Ok(election)
    }

    /// Recomputes every status, persisting when any changed. Returns the number of changes.
    pub async fn refresh(&self, now: DateTime<Utc>) -> anyhow::Result<usize> {
        let mut elections = self.elections.write().await;

        let mut changed = 0;
        for election in elections.iter_mut() {
            let before = election.status;
            if election.refresh_status(now) {
                get_logger().info("Election phase changed.", meta! {
                    "ElectionID" => election.id,
                    "From" => before,
                    "To" => election.status,
                });
                changed += 1;
            }
        }

        if changed > 0 {
            self.persist(&elections).await?;
        }

        Ok(changed)
    }

    pub async fn get(&self, id: &str) -> Option<Election> {
        self.elections.read().await.iter().find(|e| e.id == id).cloned()
    }

    /// All elections in creation order.
    pub async fn list(&self) -> Vec<Election> {
        self.elections.read().await.clone()
    }

    /// Elections in their commit or reveal phase at `now`.
    pub async fn list_active(&self, now: DateTime<Utc>) -> Vec<Election> {
        self.elections.read().await
            .iter()
            .filter(|e| e.status_at(now).is_active())
            .cloned()
            .collect()
    }

    /// Counts one revealed vote for `candidate_id` and recomputes turnout. Nothing changes if
    /// the store cannot be written.
    pub async fn record_revealed_vote(&self, election_id: &str, candidate_id: &str) -> Result<Election, ElectionError> {
        let mut elections = self.elections.write().await;

        let ei = match elections.iter().position(|e| e.id == election_id) {
            None => return Err(ElectionError::NotFound(election_id.to_owned())),
            Some(v) => v,
        };

        let ci = match elections[ei].candidates.iter().position(|c| c.id == candidate_id) {
            None => {
                return Err(ElectionError::UnknownCandidate {
                    election: election_id.to_owned(),
                    candidate: candidate_id.to_owned(),
                });
            }
            Some(v) => v,
        };

        {
            let election = &mut elections[ei];
            election.candidates[ci].vote_count += 1;
            election.total_votes += 1;
            election.recompute_turnout();
        }
        let updated = elections[ei].clone();

        if let Err(e) = self.persist(&elections).await {
            let election = &mut elections[ei];
            election.candidates[ci].vote_count -= 1;
            election.total_votes -= 1;
            election.recompute_turnout();
            return Err(e.into());
        }

        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use crate::db::dbclient::DBClient;
    use crate::election::phase::Phase;
    use crate::election::tests::draft;

    use super::*;

    #[tokio::test]
    async fn create_assigns_unique_ids() {
        let db = DBClient::in_memory().await.unwrap();
        let store = ElectionStore::load(db.conn().clone(), Utc::now()).await.unwrap();
        let now = Utc::now();

        let a = store.create(draft(now), now).await.unwrap();
        let b = store.create(draft(now), now).await.unwrap();

        assert_ne!(a.id, b.id);
        assert_eq!(a.id, format!("election-{}", now.timestamp_millis()));
        assert_eq!(a.total_votes, 0);
        assert_eq!(a.turnout, 0);
        assert_eq!(store.list().await.iter().map(|e| e.id.clone()).collect::<Vec<_>>(), vec![a.id, b.id]);
    }

    #[tokio::test]
    async fn invalid_draft_is_not_stored() {
        let db = DBClient::in_memory().await.unwrap();
        let store = ElectionStore::load(db.conn().clone(), Utc::now()).await.unwrap();
        let now = Utc::now();

        let mut d = draft(now);
        d.candidates.clear();
        assert!(matches!(store.create(d, now).await, Err(ElectionError::TooFewCandidates(0))));
        assert!(store.list().await.is_empty());
    }

    #[tokio::test]
    async fn elections_survive_reload() {
        let db = DBClient::in_memory().await.unwrap();
        let now = Utc::now();

        let created = {
            let store = ElectionStore::load(db.conn().clone(), now).await.unwrap();
            let e = store.create(draft(now), now).await.unwrap();
            store.record_revealed_vote(&e.id, "candidate-2").await.unwrap()
        };

        let later = now + Duration::hours(3);
        let store = ElectionStore::load(db.conn().clone(), later).await.unwrap();
        let loaded = store.get(&created.id).await.unwrap();

        assert_eq!(loaded.total_votes, 1);
        assert_eq!(loaded.candidates[1].vote_count, 1);
        assert_eq!(loaded.status, Phase::Closed);
    }

    #[tokio::test]
    async fn malformed_storage_loads_empty() {
        let db = DBClient::in_memory().await.unwrap();
        model::put_value(db.conn(), ELECTIONS_KEY, "[{\"id\":").await.unwrap();

        let store = ElectionStore::load(db.conn().clone(), Utc::now()).await.unwrap();
        assert!(store.list().await.is_empty());
    }

    #[tokio::test]
    async fn refresh_reports_phase_changes() {
        let db = DBClient::in_memory().await.unwrap();
        let now = Utc::now();
        let store = ElectionStore::load(db.conn().clone(), now).await.unwrap();
        let e = store.create(draft(now), now).await.unwrap();

        assert_eq!(store.refresh(now).await.unwrap(), 0);
        assert_eq!(store.list_active(now).await.len(), 1);

        let reveal = now + Duration::minutes(90);
        assert_eq!(store.refresh(reveal).await.unwrap(), 1);
        assert_eq!(store.get(&e.id).await.unwrap().status, Phase::Reveal);

        let closed = now + Duration::hours(3);
        assert_eq!(store.refresh(closed).await.unwrap(), 1);
        assert!(store.list_active(closed).await.is_empty());
    }

    #[tokio::test]
    async fn failed_count_is_rolled_back() {
        let db = DBClient::in_memory().await.unwrap();
        let now = Utc::now();
        let store = ElectionStore::load(db.conn().clone(), now).await.unwrap();
        let e = store.create(draft(now), now).await.unwrap();

        sqlx::query("DROP TABLE kv").execute(db.conn()).await.unwrap();
        assert!(matches!(
            store.record_revealed_vote(&e.id, "candidate-1").await,
            Err(ElectionError::Storage(_))
        ));

        let unchanged = store.get(&e.id).await.unwrap();
        assert_eq!(unchanged.total_votes, 0);
        assert_eq!(unchanged.candidates[0].vote_count, 0);

        model::migrate(db.conn()).await.unwrap();
        let counted = store.record_revealed_vote(&e.id, "candidate-1").await.unwrap();
        assert_eq!(counted.total_votes, 1);
        assert_eq!(counted.candidates[0].vote_count, 1);
    }

    #[tokio::test]
    async fn counting_unknown_candidate_fails() {
        let db = DBClient::in_memory().await.unwrap();
        let now = Utc::now();
        let store = ElectionStore::load(db.conn().clone(), now).await.unwrap();
        let e = store.create(draft(now), now).await.unwrap();

        assert!(matches!(
            store.record_revealed_vote(&e.id, "candidate-9").await,
            Err(ElectionError::UnknownCandidate { .. })
        ));
        assert!(matches!(
            store.record_revealed_vote("election-0", "candidate-1").await,
            Err(ElectionError::NotFound(_))
        ));
    }
}
