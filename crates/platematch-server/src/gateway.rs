use tokio::sync::broadcast;

use platematch_core::SessionEvent;

/// Default capacity of the fan-out channel. Slow subscribers that fall more
/// than this far behind see a lagged error and skip ahead.
const DEFAULT_EVENT_CAPACITY: usize = 256;

/// An event stamped with the session it belongs to.
///
/// The bus is process-wide; each connected client filters envelopes down to
/// the sessions it has joined.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub session_id: String,
    pub event: SessionEvent,
}

/// Broadcast gateway: publishes session mutations to every subscriber.
///
/// Delivery is best-effort per target. A send with no receivers, or a
/// receiver that lags, never affects session state or other subscribers.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Envelope>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.tx.subscribe()
    }

    pub fn publish(&self, session_id: &str, event: SessionEvent) {
        tracing::debug!(session_id = %session_id, method = event.method(), "publishing event");
        // Err means no live subscribers; the mutation stands regardless.
        let _ = self.tx.send(Envelope {
            session_id: session_id.to_string(),
            event,
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
