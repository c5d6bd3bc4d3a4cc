use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

pub const DEFAULT_CAPACITY: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Commit,
    Reveal,
    Mint,
}

impl ActivityKind {
    pub fn describe(&self) -> &'static str {
        match self {
            ActivityKind::Commit => "Vote Committed",
            ActivityKind::Reveal => "Vote Revealed",
            ActivityKind::Mint => "Voter ID Minted",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEvent {
    pub id: u64,
    pub kind: ActivityKind,
    pub election_id: Option<String>,
    pub voter: String,
    /// Set for reveals only; commits never disclose the choice.
    pub candidate: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ActivityCounts {
    pub commits: usize,
    pub reveals: usize,
    pub mints: usize,
}

struct Inner {
    events: VecDeque<ActivityEvent>,
    next_id: u64,
}

/// Bounded log of recent voting activity, newest last. Oldest events are dropped when full.
pub struct ActivityFeed {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl Default for ActivityFeed {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ActivityFeed {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Inner {
                events: VecDeque::with_capacity(capacity.max(1)),
                next_id: 1,
            }),
        }
    }

    pub async fn push(
        &self,
        kind: ActivityKind,
        election_id: Option<&str>,
        voter: &str,
        candidate: Option<&str>,
        at: DateTime<Utc>,
    ) -> ActivityEvent {
        let mut inner = self.inner.lock().await;

        let event = ActivityEvent {
            id: inner.next_id,
            kind,
            election_id: election_id.map(str::to_owned),
            voter: voter.to_owned(),
            candidate: candidate.map(str::to_owned),
            at,
        };
        inner.next_id += 1;

        if inner.events.len() == self.capacity {
            inner.events.pop_front();
        }
        inner.events.push_back(event.clone());

        event
    }

    /// Up to `limit` events, newest first, optionally restricted to one election.
    pub async fn recent(&self, election_id: Option<&str>, limit: usize) -> Vec<ActivityEvent> {
        let inner = self.inner.lock().await;
        inner.events.iter()
            .rev()
            .filter(|e| election_id.map_or(true, |id| e.election_id.as_deref() == Some(id)))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Mints are never tied to an election and are always counted.
    pub async fn counts(&self, election_id: Option<&str>) -> ActivityCounts {
        let inner = self.inner.lock().await;
        let mut counts = ActivityCounts::default();
        for e in inner.events.iter() {
            let in_scope = match (election_id, e.kind) {
                (_, ActivityKind::Mint) | (None, _) => true,
                (Some(id), _) => e.election_id.as_deref() == Some(id),
            };
            if !in_scope {
                continue;
            }
            match e.kind {
                ActivityKind::Commit => counts.commits += 1,
                ActivityKind::Reveal => counts.reveals += 1,
                ActivityKind::Mint => counts.mints += 1,
            }
        }
        counts
    }
}
