use std::collections::HashMap;

use itertools::Itertools;
use serde::Serialize;
use tallystick::plurality::DefaultPluralityTally;

use crate::election::Election;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Standing {
    /// 1-based; tied candidates share a rank.
    pub rank: usize,
    pub candidate_id: String,
    pub name: String,
    pub votes: u64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectionResults {
    pub election_id: String,
    pub title: String,
    pub total_votes: u64,
    pub turnout: u32,
    pub standings: Vec<Standing>,
    /// Every candidate sharing the top count; empty until a vote is counted.
    pub winners: Vec<String>,
    /// Vote difference between the top two standings.
    pub margin: u64,
    pub duration_days: i64,
}

impl ElectionResults {
    pub fn leader(&self) -> Option<&Standing> {
        if self.winners.is_empty() {
            return None;
        }
        self.standings.first()
    }

    pub fn is_tied(&self) -> bool {
        self.winners.len() > 1
    }
}

pub fn percentage(votes: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    votes as f64 / total as f64 * 100.0
}

pub fn tally(election: &Election) -> ElectionResults {
    let mut plurality = DefaultPluralityTally::new(1);
    for candidate in &election.candidates {
        for _ in 0..candidate.vote_count {
            plurality.add_ref(&candidate.id);
        }
    }

    let totals = plurality.totals().into_iter().collect::<HashMap<String, u64>>();
    let winners = match election.total_votes {
        0 => Vec::new(),
        _ => plurality.winners().into_unranked(),
    };

    // Ties keep the order candidates were listed in.
    let ordered = election.candidates.iter()
        .enumerate()
        .map(|(i, c)| (i, c, totals.get(&c.id).copied().unwrap_or(0)))
        .sorted_by_key(|(i, _, votes)| (std::cmp::Reverse(*votes), *i))
        .collect::<Vec<_>>();

    let mut standings = Vec::with_capacity(ordered.len());
    let mut last = u64::MAX;
    let mut curr = 0;
    for (_, candidate, votes) in ordered {
        if votes < last {
            curr += 1;
            last = votes;
        }
        standings.push(Standing {
            rank: curr,
            candidate_id: candidate.id.clone(),
            name: candidate.name.clone(),
            votes,
            percentage: percentage(votes, election.total_votes),
        });
    }

    let margin = match (standings.get(0), standings.get(1)) {
        (Some(a), Some(b)) => a.votes - b.votes,
        (Some(a), None) => a.votes,
        _ => 0,
    };

    ElectionResults {
        election_id: election.id.clone(),
        title: election.title.clone(),
        total_votes: election.total_votes,
        turnout: election.turnout,
        winners: winners.into_iter()
            .sorted_by_key(|id| election.candidates.iter().position(|c| &c.id == id))
            .collect(),
        standings,
        margin,
        duration_days: election.phases.duration_days(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub elections: usize,
    pub active: usize,
    pub closed: usize,
    pub total_votes: u64,
    /// Mean turnout over elections with at least one vote.
    pub average_turnout: u32,
}

pub fn overview(elections: &[Election]) -> Overview {
    let with_votes = elections.iter().filter(|e| e.total_votes > 0).collect::<Vec<_>>();
    let average_turnout = match with_votes.len() {
        0 => 0,
        n => (with_votes.iter().map(|e| e.turnout as f64).sum::<f64>() / n as f64).round() as u32,
    };

    Overview {
        elections: elections.len(),
        active: elections.iter().filter(|e| e.status.is_active()).count(),
        closed: elections.iter().filter(|e| e.status == crate::election::phase::Phase::Closed).count(),
        total_votes: elections.iter().map(|e| e.total_votes).sum(),
        average_turnout,
    }
}

pub fn to_json(results: &ElectionResults) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(results)?)
}

fn csv_field(s: &str) -> String {
    if s.contains(|c| c == ',' || c == '"' || c == '\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_owned()
    }
}

pub fn to_csv(results: &ElectionResults) -> String {
    let mut out = String::from("rank,candidate_id,name,votes,percentage\n");
    for s in &results.standings {
        out.push_str(&format!(
            "{},{},{},{},{:.1}\n",
            s.rank,
            csv_field(&s.candidate_id),
            csv_field(&s.name),
            s.votes,
            s.percentage,
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::election::phase::Phase;
    use crate::election::tests::draft;

    use super::*;

    fn election_with_votes(votes: &[u64]) -> Election {
        let now = Utc::now();
        let mut d = draft(now);
        d.candidates.push(crate::election::CandidateDraft {
            name: "Chen, Li".to_owned(),
            photo: None,
            manifesto: "Bike racks".to_owned(),
        });
        let mut e = d.into_election("election-1".to_owned(), now);
        for (c, v) in e.candidates.iter_mut().zip(votes) {
            c.vote_count = *v;
        }
        e.total_votes = votes.iter().sum();
        e
    }

    #[test]
    fn standings_are_sorted_by_votes() {
        let r = tally(&election_with_votes(&[2, 5, 3]));

        assert_eq!(r.standings.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(), vec!["Bilal", "Chen, Li", "Asha"]);
        assert_eq!(r.standings.iter().map(|s| s.rank).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(r.winners, vec!["candidate-2".to_owned()]);
        assert_eq!(r.leader().unwrap().votes, 5);
        assert_eq!(r.margin, 2);
        assert!((r.standings[0].percentage - 50.0).abs() < 1e-9);
    }

    #[test]
    fn ties_share_rank() {
        let r = tally(&election_with_votes(&[4, 4, 1]));

        assert_eq!(r.standings[0].candidate_id, "candidate-1");
        assert_eq!(r.standings[1].rank, 1);
        assert_eq!(r.standings[2].rank, 2);
        assert!(r.is_tied());
        assert_eq!(r.winners, vec!["candidate-1".to_owned(), "candidate-2".to_owned()]);
        assert_eq!(r.margin, 0);
    }

    #[test]
    fn no_votes_means_no_winner() {
        let r = tally(&election_with_votes(&[0, 0, 0]));

        assert!(r.winners.is_empty());
        assert!(r.leader().is_none());
        assert!(r.standings.iter().all(|s| s.rank == 1 && s.percentage == 0.0));
    }

    #[test]
    fn overview_averages_turnout_of_voted_elections() {
        let mut a = election_with_votes(&[1, 1, 0]);
        a.turnout = 40;
        a.status = Phase::Closed;
        let mut b = election_with_votes(&[3, 0, 0]);
        b.turnout = 81;
        let c = election_with_votes(&[0, 0, 0]);

        let o = overview(&[a, b, c]);
        assert_eq!(o.elections, 3);
        assert_eq!(o.closed, 1);
        assert_eq!(o.active, 2);
        assert_eq!(o.total_votes, 5);
        assert_eq!(o.average_turnout, 61);
    }

    #[test]
    fn csv_quotes_awkward_names() {
        let csv = to_csv(&tally(&election_with_votes(&[1, 0, 3])));
        let lines = csv.lines().collect::<Vec<_>>();

        assert_eq!(lines[0], "rank,candidate_id,name,votes,percentage");
        assert_eq!(lines[1], "1,candidate-3,\"Chen, Li\",3,75.0");
        assert_eq!(lines[2], "2,candidate-1,Asha,1,25.0");
    }
}
