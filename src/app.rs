use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use evlog::meta;
use sqlx::SqlitePool;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;

use crate::activity::{ActivityFeed, ActivityKind};
use crate::campusbot::CampusBot;
use crate::election::ledger::{generate_salt, Commitment, VoteLedger};
use crate::election::phase::Phase;
use crate::election::store::ElectionStore;
use crate::election::{Election, ElectionDraft};
use crate::error::{ElectionError, VoteError};
use crate::runtime::get_logger;
use crate::voter::{Voter, VoterRegistry};

/// What a voter must keep after committing: the salt is needed again to reveal.
#[derive(Debug, Clone)]
pub struct CommitReceipt {
    pub election_id: String,
    pub candidate_id: String,
    pub salt: String,
    pub commitment: Commitment,
}

pub struct App {
    pub store: ElectionStore,
    pub ledger: VoteLedger,
    pub voters: VoterRegistry,
    pub activity: ActivityFeed,
    pub campusbot: CampusBot,
    vote_delay: Duration,
}

impl App {
    pub async fn load(conn: SqlitePool, vote_delay: Duration, campusbot: CampusBot) -> anyhow::Result<Self> {
        Ok(Self {
            store: ElectionStore::load(conn.clone(), Utc::now()).await?,
            ledger: VoteLedger::new(),
            voters: VoterRegistry::load(conn).await?,
            activity: ActivityFeed::default(),
            campusbot,
            vote_delay,
        })
    }

    async fn simulate_latency(&self) {
        if !self.vote_delay.is_zero() {
            tokio::time::sleep(self.vote_delay).await;
        }
    }

    pub async fn create_election(&self, draft: ElectionDraft) -> Result<Election, ElectionError> {
        self.store.create(draft, Utc::now()).await
    }

    pub async fn register_voter(&self, id: &str, name: &str) -> anyhow::Result<(Voter, bool)> {
        self.voters.register(id, name, Utc::now()).await
    }

    pub async fn mint_voter_id(&self, voter_id: &str) -> Result<Voter, VoteError> {
        let voter = match self.voters.get(voter_id) {
            None => return Err(VoteError::UnknownVoter),
            Some(v) => v,
        };
        if voter.has_nft {
            return Ok(voter);
        }

        self.simulate_latency().await;
        let voter = self.voters.mint(voter_id).await?;

        self.activity.push(ActivityKind::Mint, None, &voter.short_wallet(), None, Utc::now()).await;
        get_logger().info("Voter ID minted.", meta! {
            "VoterID" => voter.id,
        });

        Ok(voter)
    }

    fn require_phase(election: &Election, expected: Phase, now: DateTime<Utc>) -> Result<(), VoteError> {
        let actual = election.status_at(now);
        if actual != expected {
            return Err(VoteError::WrongPhase { expected, actual });
        }
        Ok(())
    }

    async fn election(&self, election_id: &str) -> Result<Election, VoteError> {
        match self.store.get(election_id).await {
            None => Err(VoteError::ElectionNotFound(election_id.to_owned())),
            Some(v) => Ok(v),
        }
    }

    pub async fn commit_vote(&self, voter_id: &str, election_id: &str, candidate_id: &str) -> Result<CommitReceipt, VoteError> {
        self.commit_vote_at(voter_id, election_id, candidate_id, Utc::now()).await
    }

    pub async fn commit_vote_at(
        &self,
        voter_id: &str,
        election_id: &str,
        candidate_id: &str,
        now: DateTime<Utc>,
    ) -> Result<CommitReceipt, VoteError> {
        let election = self.election(election_id).await?;
        Self::require_phase(&election, Phase::Commit, now)?;

        let voter = match self.voters.get(voter_id) {
            None => return Err(VoteError::UnknownVoter),
            Some(v) => v,
        };
        if !voter.has_nft {
            return Err(VoteError::NoVoterId);
        }
        if !election.is_eligible(voter_id) {
            return Err(VoteError::NotEligible);
        }
        if election.candidate(candidate_id).is_none() {
            return Err(VoteError::UnknownCandidate(candidate_id.to_owned()));
        }
        if self.ledger.has_voted(voter_id, election_id) {
            return Err(VoteError::AlreadyRevealed);
        }

        self.simulate_latency().await;

        let salt = generate_salt();
        let commitment = self.ledger.record_commit(voter_id, election_id, candidate_id, &salt, now)?;

        self.activity.push(ActivityKind::Commit, Some(election_id), &voter.short_wallet(), None, now).await;
        get_logger().info("Vote committed.", meta! {
            "ElectionID" => election_id,
            "VoterID" => voter_id,
            "Commitment" => commitment,
        });

        Ok(CommitReceipt {
            election_id: election_id.to_owned(),
            candidate_id: candidate_id.to_owned(),
            salt,
            commitment,
        })
    }

    pub async fn reveal_vote(&self, voter_id: &str, election_id: &str, candidate_id: &str, salt: &str) -> Result<Election, VoteError> {
        self.reveal_vote_at(voter_id, election_id, candidate_id, salt, Utc::now()).await
    }

    pub async fn reveal_vote_at(
        &self,
        voter_id: &str,
        election_id: &str,
        candidate_id: &str,
        salt: &str,
        now: DateTime<Utc>,
    ) -> Result<Election, VoteError> {
        let election = self.election(election_id).await?;
        Self::require_phase(&election, Phase::Reveal, now)?;
        if now < election.phases.reveal_start {
            return Err(VoteError::RevealNotOpen(election.phases.reveal_start));
        }

        let candidate = match election.candidate(candidate_id) {
            None => return Err(VoteError::UnknownCandidate(candidate_id.to_owned())),
            Some(v) => v.name.clone(),
        };
        if !self.ledger.has_committed(voter_id, election_id) {
            return Err(VoteError::NotCommitted);
        }

        self.simulate_latency().await;

        self.ledger.record_reveal(voter_id, election_id, candidate_id, salt.trim(), now)?;
        let updated = match self.store.record_revealed_vote(election_id, candidate_id).await {
            Ok(v) => v,
            Err(e) => {
                self.ledger.revert_reveal(voter_id, election_id);
                return Err(e.into());
            }
        };

        let voter = self.voters.get(voter_id)
            .map(|v| v.short_wallet())
            .unwrap_or_else(|| voter_id.to_owned());
        self.activity.push(ActivityKind::Reveal, Some(election_id), &voter, Some(&candidate), now).await;
        get_logger().info("Vote revealed.", meta! {
            "ElectionID" => election_id,
            "VoterID" => voter_id,
            "TotalVotes" => updated.total_votes,
        });

        Ok(updated)
    }

    pub fn has_committed(&self, voter_id: &str, election_id: &str) -> bool {
        self.ledger.has_committed(voter_id, election_id)
    }

    pub fn has_voted(&self, voter_id: &str, election_id: &str) -> bool {
        self.ledger.has_voted(voter_id, election_id)
    }

    pub async fn refresh(&self) -> anyhow::Result<usize> {
        self.store.refresh(Utc::now()).await
    }

    /// Recomputes election phases every `period` until the runtime shuts down. `on_change`
    /// receives every election after any phase moves.
    pub fn spawn_refresh<F, Fut>(self: Arc<Self>, period: Duration, on_change: F) -> JoinHandle<()>
    where
        F: Fn(Vec<Election>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send,
    {
        tokio::spawn(async move {
            let mut ticks = IntervalStream::new(tokio::time::interval(period));
            while ticks.next().await.is_some() {
                match self.refresh().await {
                    Ok(0) => {}
                    Ok(changed) => {
                        get_logger().debug("Refreshed election phases.", meta! {
                            "Changed" => changed,
                        });
                        on_change(self.store.list().await).await;
                    }
                    Err(e) => {
                        get_logger().error("Failed to refresh election phases.", meta! {
                            "Error" => e,
                        });
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration as ChronoDuration;

    use crate::db::dbclient::DBClient;
    use crate::election::tests::draft;

    use super::*;

    async fn app() -> (DBClient, App) {
        let db = DBClient::in_memory().await.unwrap();
        let app = App::load(db.conn().clone(), Duration::ZERO, CampusBot::new(None, None)).await.unwrap();
        (db, app)
    }

    async fn voter_with_id(app: &App, id: &str) {
        app.register_voter(id, "Student User").await.unwrap();
        app.mint_voter_id(id).await.unwrap();
    }

    #[tokio::test]
    async fn full_commit_reveal_cycle() {
        let (_db, app) = app().await;
        let now = Utc::now();
        let e = app.create_election(draft(now)).await.unwrap();
        voter_with_id(&app, "100").await;

        assert!(!app.has_committed("100", &e.id));
        let receipt = app.commit_vote_at("100", &e.id, "candidate-2", now).await.unwrap();
        assert!(app.has_committed("100", &e.id));
        assert!(!app.has_voted("100", &e.id));

        let reveal_time = now + ChronoDuration::minutes(90);
        let updated = app.reveal_vote_at("100", &e.id, "candidate-2", &receipt.salt, reveal_time).await.unwrap();
        assert!(app.has_voted("100", &e.id));
        assert_eq!(updated.total_votes, 1);
        assert_eq!(updated.candidates[1].vote_count, 1);

        let counts = app.activity.counts(Some(&e.id)).await;
        assert_eq!((counts.commits, counts.reveals, counts.mints), (1, 1, 1));
    }

    #[tokio::test]
    async fn commit_outside_commit_phase_is_refused() {
        let (_db, app) = app().await;
        let now = Utc::now();
        let e = app.create_election(draft(now)).await.unwrap();
        voter_with_id(&app, "100").await;

        let early = now - ChronoDuration::hours(2);
        assert!(matches!(
            app.commit_vote_at("100", &e.id, "candidate-1", early).await,
            Err(VoteError::WrongPhase { expected: Phase::Commit, actual: Phase::Upcoming })
        ));

        let late = now + ChronoDuration::minutes(90);
        assert!(matches!(
            app.commit_vote_at("100", &e.id, "candidate-1", late).await,
            Err(VoteError::WrongPhase { expected: Phase::Commit, actual: Phase::Reveal })
        ));
        assert!(!app.has_committed("100", &e.id));
    }

    #[tokio::test]
    async fn reveal_requires_matching_commit_in_reveal_phase() {
        let (_db, app) = app().await;
        let now = Utc::now();
        let e = app.create_election(draft(now)).await.unwrap();
        voter_with_id(&app, "100").await;
        let reveal_time = now + ChronoDuration::minutes(90);

        assert!(matches!(
            app.reveal_vote_at("100", &e.id, "candidate-1", "salt", reveal_time).await,
            Err(VoteError::NotCommitted)
        ));

        let receipt = app.commit_vote_at("100", &e.id, "candidate-1", now).await.unwrap();

        assert!(matches!(
            app.reveal_vote_at("100", &e.id, "candidate-1", &receipt.salt, now).await,
            Err(VoteError::WrongPhase { expected: Phase::Reveal, actual: Phase::Commit })
        ));
        assert!(matches!(
            app.reveal_vote_at("100", &e.id, "candidate-2", &receipt.salt, reveal_time).await,
            Err(VoteError::CommitmentMismatch)
        ));

        let closed = now + ChronoDuration::hours(3);
        assert!(matches!(
            app.reveal_vote_at("100", &e.id, "candidate-1", &receipt.salt, closed).await,
            Err(VoteError::WrongPhase { expected: Phase::Reveal, actual: Phase::Closed })
        ));

        assert_eq!(app.store.get(&e.id).await.unwrap().total_votes, 0);
    }

    #[tokio::test]
    async fn reveal_waits_for_reveal_start() {
        let (_db, app) = app().await;
        let now = Utc::now();
        let mut d = draft(now);
        d.phases.reveal_start = now + ChronoDuration::hours(5);
        d.phases.reveal_end = now + ChronoDuration::hours(6);
        let e = app.create_election(d).await.unwrap();
        voter_with_id(&app, "100").await;

        let receipt = app.commit_vote_at("100", &e.id, "candidate-1", now).await.unwrap();

        let gap = now + ChronoDuration::hours(2);
        assert!(matches!(
            app.reveal_vote_at("100", &e.id, "candidate-1", &receipt.salt, gap).await,
            Err(VoteError::RevealNotOpen(opens)) if opens == e.phases.reveal_start
        ));
        assert!(!app.has_voted("100", &e.id));
        assert_eq!(app.store.get(&e.id).await.unwrap().total_votes, 0);

        let open = now + ChronoDuration::minutes(330);
        let updated = app.reveal_vote_at("100", &e.id, "candidate-1", &receipt.salt, open).await.unwrap();
        assert_eq!(updated.total_votes, 1);
    }

    #[tokio::test]
    async fn failed_reveal_can_be_retried() {
        let (db, app) = app().await;
        let now = Utc::now();
        let e = app.create_election(draft(now)).await.unwrap();
        voter_with_id(&app, "100").await;
        let receipt = app.commit_vote_at("100", &e.id, "candidate-2", now).await.unwrap();
        let reveal_time = now + ChronoDuration::minutes(90);

        sqlx::query("DROP TABLE kv").execute(db.conn()).await.unwrap();
        assert!(matches!(
            app.reveal_vote_at("100", &e.id, "candidate-2", &receipt.salt, reveal_time).await,
            Err(VoteError::Storage(_))
        ));
        assert!(app.has_committed("100", &e.id));
        assert!(!app.has_voted("100", &e.id));
        assert_eq!(app.store.get(&e.id).await.unwrap().total_votes, 0);
        assert_eq!(app.activity.counts(Some(&e.id)).await.reveals, 0);

        crate::db::model::migrate(db.conn()).await.unwrap();
        let updated = app.reveal_vote_at("100", &e.id, "candidate-2", &receipt.salt, reveal_time).await.unwrap();
        assert!(app.has_voted("100", &e.id));
        assert_eq!(updated.total_votes, 1);
        assert_eq!(updated.candidates[1].vote_count, 1);
    }

    #[tokio::test]
    async fn commit_requires_voter_id_and_eligibility() {
        let (_db, app) = app().await;
        let now = Utc::now();
        let mut d = draft(now);
        d.eligible_voters = vec!["100".to_owned()];
        let e = app.create_election(d).await.unwrap();

        assert!(matches!(app.commit_vote_at("100", &e.id, "candidate-1", now).await, Err(VoteError::UnknownVoter)));

        app.register_voter("100", "A").await.unwrap();
        assert!(matches!(app.commit_vote_at("100", &e.id, "candidate-1", now).await, Err(VoteError::NoVoterId)));

        voter_with_id(&app, "200").await;
        assert!(matches!(app.commit_vote_at("200", &e.id, "candidate-1", now).await, Err(VoteError::NotEligible)));

        app.mint_voter_id("100").await.unwrap();
        assert!(matches!(app.commit_vote_at("100", &e.id, "candidate-7", now).await, Err(VoteError::UnknownCandidate(_))));
        assert!(matches!(app.commit_vote_at("100", "election-0", "candidate-1", now).await, Err(VoteError::ElectionNotFound(_))));
        assert!(app.commit_vote_at("100", &e.id, "candidate-1", now).await.is_ok());
    }

    #[tokio::test]
    async fn refresh_task_reports_phase_changes() {
        let (_db, app) = app().await;
        let now = Utc::now();
        let created = now - ChronoDuration::hours(2);
        let e = app.store.create(draft(now), created).await.unwrap();
        assert_eq!(e.status, Phase::Upcoming);

        let app = Arc::new(app);
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let task = app.clone().spawn_refresh(Duration::from_millis(10), move |elections| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(elections);
            }
        });

        let elections = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        task.abort();

        assert_eq!(elections.len(), 1);
        assert_eq!(elections[0].status, Phase::Commit);
    }

    #[tokio::test]
    async fn turnout_tracks_voter_list() {
        let (_db, app) = app().await;
        let now = Utc::now();
        let mut d = draft(now);
        d.eligible_voters = vec!["1".to_owned(), "2".to_owned(), "3".to_owned(), "4".to_owned()];
        let e = app.create_election(d).await.unwrap();
        let reveal_time = now + ChronoDuration::minutes(90);

        for id in ["1", "2", "3"] {
            voter_with_id(&app, id).await;
            let receipt = app.commit_vote_at(id, &e.id, "candidate-1", now).await.unwrap();
            app.reveal_vote_at(id, &e.id, "candidate-1", &receipt.salt, reveal_time).await.unwrap();
        }

        let updated = app.store.get(&e.id).await.unwrap();
        assert_eq!(updated.total_votes, 3);
        assert_eq!(updated.turnout, 75);
    }
}
