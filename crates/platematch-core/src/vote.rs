use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A participant's verdict on a single candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Like,
    Dislike,
}

/// Outcome of evaluating one candidate's votes against the roster.
///
/// `Matched` and `Exhausted` are terminal: once a candidate reaches either,
/// no later vote moves it anywhere else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Consensus {
    Pending,
    Matched,
    Exhausted,
}

impl Consensus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Consensus::Matched | Consensus::Exhausted)
    }
}

/// Evaluate consensus for a single candidate.
///
/// * `roster` — participant ids in join order. The roster at call time is the
///   source of truth: late joiners enlarge the requirement.
/// * `votes`  — latest decision per participant id for this candidate.
///
/// Rules:
/// * `Matched` iff every roster member has a recorded `Like`.
/// * `Exhausted` iff every roster member has voted but not all are `Like`.
/// * `Pending` otherwise. An empty roster is always `Pending`.
///
/// Votes from ids not on the roster are stored by the caller but never
/// counted here, so an unregistered participant cannot trigger a decision.
pub fn evaluate(roster: &[String], votes: &HashMap<String, Decision>) -> Consensus {
    if roster.is_empty() {
        return Consensus::Pending;
    }

    let all_like = roster
        .iter()
        .all(|p| votes.get(p) == Some(&Decision::Like));
    if all_like {
        return Consensus::Matched;
    }

    let roster_voters = roster.iter().filter(|p| votes.contains_key(*p)).count();
    if roster_voters == roster.len() {
        Consensus::Exhausted
    } else {
        Consensus::Pending
    }
}
