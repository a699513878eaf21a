//! Pure session-coordination model: sessions, votes, the consensus rule,
//! and the closed inbound/outbound event types.
//!
//! No I/O and no async here. The server crate owns locking, fan-out, and
//! the transport.

pub mod event;
pub mod session;
pub mod vote;

pub use event::{Command, SessionEvent};
pub use session::{Candidate, ChatMessage, Session};
pub use vote::{evaluate, Consensus, Decision};
