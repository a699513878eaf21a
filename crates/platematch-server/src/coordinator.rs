use std::sync::Arc;

use platematch_core::{Candidate, Command, Consensus, SessionEvent};

use crate::gateway::EventBus;
use crate::registry::SessionRegistry;

/// Routes inbound commands to session state and publishes the resulting
/// events.
///
/// Every mutation happens under the target session's lock, and the matching
/// publish goes out before the lock is released, so subscribers observe each
/// session's events in application order.
pub struct Coordinator {
    registry: Arc<SessionRegistry>,
    bus: EventBus,
}

impl Coordinator {
    pub fn new(registry: Arc<SessionRegistry>, bus: EventBus) -> Self {
        Self { registry, bus }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub async fn create_session(&self) -> String {
        self.registry.create().await
    }

    /// Install a freshly fetched candidate list. Returns false (and mutates
    /// nothing) when the session is unknown.
    pub async fn set_candidates(&self, session_id: &str, candidates: Vec<Candidate>) -> bool {
        let Some(handle) = self.registry.get(session_id).await else {
            tracing::debug!(session_id = %session_id, "set_candidates for unknown session, dropping");
            return false;
        };
        let mut session = handle.state.lock().await;
        tracing::info!(session_id = %session_id, count = candidates.len(), "candidate list replaced");
        session.set_candidates(candidates);
        true
    }

    /// Apply one participant action. Returns false when the session is
    /// unknown; the event is silently dropped and nothing is published.
    pub async fn apply(&self, cmd: Command) -> bool {
        let Some(handle) = self.registry.get(cmd.session_id()).await else {
            tracing::debug!(session_id = %cmd.session_id(), "event for unknown session, dropping");
            return false;
        };

        let mut session = handle.state.lock().await;
        match cmd {
            Command::JoinSession {
                session_id,
                participant_id,
            } => {
                let roster = session.join(&participant_id).to_vec();
                tracing::info!(
                    session_id = %session_id,
                    participant_id = %participant_id,
                    roster_size = roster.len(),
                    "participant joined"
                );
                self.bus.publish(
                    &session_id,
                    SessionEvent::UpdateParticipants {
                        participants: roster,
                    },
                );
            }

            Command::Swipe {
                session_id,
                participant_id,
                candidate_id,
                decision,
            } => {
                tracing::debug!(
                    session_id = %session_id,
                    participant_id = %participant_id,
                    candidate_id = %candidate_id,
                    decision = ?decision,
                    "swipe recorded"
                );
                match session.record_swipe(&participant_id, &candidate_id, decision) {
                    Some(Consensus::Matched) => {
                        tracing::info!(session_id = %session_id, candidate_id = %candidate_id, "match found");
                        self.bus
                            .publish(&session_id, SessionEvent::MatchFound { candidate_id });
                    }
                    Some(Consensus::Exhausted) => {
                        tracing::info!(session_id = %session_id, candidate_id = %candidate_id, "candidate exhausted");
                        self.bus
                            .publish(&session_id, SessionEvent::NoMatch { candidate_id });
                    }
                    // Pending results are never broadcast, and a candidate
                    // already decided stays silent.
                    Some(Consensus::Pending) | None => {}
                }
            }

            Command::SendMessage {
                session_id,
                participant_id,
                text,
            } => {
                session.append_message(&participant_id, &text);
                self.bus.publish(
                    &session_id,
                    SessionEvent::NewMessage {
                        participant_id,
                        text,
                    },
                );
            }
        }
        true
    }
}
