use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::vote::{evaluate, Consensus, Decision};

/// A restaurant under vote. Only `id` is interpreted; every other field of
/// the upstream payload is carried verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    #[serde(flatten)]
    pub payload: serde_json::Map<String, serde_json::Value>,
}

impl Candidate {
    pub fn bare(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            payload: serde_json::Map::new(),
        }
    }
}

/// One chat entry. Insertion order == delivery order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub participant_id: String,
    pub text: String,
    pub sent_at: DateTime<Utc>,
}

/// All state belonging to one decision session.
///
/// The session owns its vote table, chat log, and candidate list outright.
/// Participants are referenced by id only; connection lifecycles live at the
/// transport layer.
#[derive(Debug, Default)]
pub struct Session {
    /// Participant ids in join order, no duplicates.
    roster: Vec<String>,
    candidates: Vec<Candidate>,
    /// candidate id -> participant id -> latest decision.
    votes: HashMap<String, HashMap<String, Decision>>,
    /// Terminal outcomes only. A candidate present here never re-emits.
    outcomes: HashMap<String, Consensus>,
    chat: Vec<ChatMessage>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a participant to the roster, keeping join order. Joining twice is
    /// a no-op. Returns the roster after the join.
    pub fn join(&mut self, participant_id: &str) -> &[String] {
        if !self.roster.iter().any(|p| p == participant_id) {
            self.roster.push(participant_id.to_string());
        }
        &self.roster
    }

    pub fn roster(&self) -> &[String] {
        &self.roster
    }

    /// Replace the candidate list wholesale. No merge with a previous list.
    pub fn set_candidates(&mut self, candidates: Vec<Candidate>) {
        self.candidates = candidates;
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    /// Record a swipe and evaluate consensus for the candidate.
    ///
    /// The vote always lands in the table (last write wins per participant).
    /// Returns the consensus outcome only when this swipe moved the candidate
    /// into a terminal state for the first time; `None` while pending and for
    /// every swipe after the candidate was already decided.
    pub fn record_swipe(
        &mut self,
        participant_id: &str,
        candidate_id: &str,
        decision: Decision,
    ) -> Option<Consensus> {
        let candidate_votes = self.votes.entry(candidate_id.to_string()).or_default();
        candidate_votes.insert(participant_id.to_string(), decision);

        if self.outcomes.contains_key(candidate_id) {
            return None;
        }

        let result = evaluate(&self.roster, candidate_votes);
        if result.is_terminal() {
            self.outcomes.insert(candidate_id.to_string(), result);
            Some(result)
        } else {
            None
        }
    }

    /// Latest decisions for one candidate. Empty map if nobody voted yet.
    pub fn votes_for(&self, candidate_id: &str) -> HashMap<String, Decision> {
        self.votes.get(candidate_id).cloned().unwrap_or_default()
    }

    /// Terminal outcome for a candidate, if it has been decided.
    pub fn outcome(&self, candidate_id: &str) -> Option<Consensus> {
        self.outcomes.get(candidate_id).copied()
    }

    /// Append a chat message. No content validation here.
    pub fn append_message(&mut self, participant_id: &str, text: &str) -> &ChatMessage {
        self.chat.push(ChatMessage {
            participant_id: participant_id.to_string(),
            text: text.to_string(),
            sent_at: Utc::now(),
        });
        self.chat.last().expect("just pushed")
    }

    pub fn chat(&self) -> &[ChatMessage] {
        &self.chat
    }
}
