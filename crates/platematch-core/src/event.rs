use serde::{Deserialize, Serialize};

use crate::vote::Decision;

/// Inbound participant action, routed to exactly one session.
///
/// Closed set: the transport layer maps its wire protocol onto these
/// variants, so an unknown action can never reach the coordinator.
/// Transport disconnects are not commands; they only tear down delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Command {
    JoinSession {
        session_id: String,
        participant_id: String,
    },
    Swipe {
        session_id: String,
        participant_id: String,
        candidate_id: String,
        decision: Decision,
    },
    SendMessage {
        session_id: String,
        participant_id: String,
        text: String,
    },
}

impl Command {
    /// The session this command targets.
    pub fn session_id(&self) -> &str {
        match self {
            Command::JoinSession { session_id, .. }
            | Command::Swipe { session_id, .. }
            | Command::SendMessage { session_id, .. } => session_id,
        }
    }
}

/// Outbound event fanned out to every subscriber of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Roster changed; carries participant ids in join order.
    UpdateParticipants { participants: Vec<String> },
    MatchFound { candidate_id: String },
    NoMatch { candidate_id: String },
    NewMessage { participant_id: String, text: String },
}

impl SessionEvent {
    /// Wire method name for this event kind.
    pub fn method(&self) -> &'static str {
        match self {
            SessionEvent::UpdateParticipants { .. } => "update_participants",
            SessionEvent::MatchFound { .. } => "match_found",
            SessionEvent::NoMatch { .. } => "no_match",
            SessionEvent::NewMessage { .. } => "new_message",
        }
    }
}
