use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use platematch_core::Session;

/// Session ids mirror the upstream format: 9 base-36 characters.
const SESSION_ID_LEN: usize = 9;
const SESSION_ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// How often the idle sweeper wakes up when a TTL is configured.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// One registered session: its state behind a per-session lock.
///
/// Every mutation and the publication of its resulting events happen while
/// holding `state`, which is what gives the per-session ordering guarantee.
#[derive(Debug)]
pub struct SessionHandle {
    pub id: String,
    pub state: Mutex<Session>,
    last_activity: Mutex<Instant>,
}

impl SessionHandle {
    fn new(id: String) -> Self {
        Self {
            id,
            state: Mutex::new(Session::new()),
            last_activity: Mutex::new(Instant::now()),
        }
    }

    pub async fn touch(&self) {
        *self.last_activity.lock().await = Instant::now();
    }

    async fn idle_for(&self) -> Duration {
        self.last_activity.lock().await.elapsed()
    }
}

/// Owned, injectable session store. Not a global: created at startup and
/// handed to the coordinator and the sweeper.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<SessionHandle>>>,
    /// Idle eviction threshold. `None` disables the sweeper entirely.
    idle_ttl: Option<Duration>,
}

impl SessionRegistry {
    pub fn new(idle_ttl: Option<Duration>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            idle_ttl,
        }
    }

    /// Allocate an empty session under a fresh unpredictable id.
    pub async fn create(&self) -> String {
        let mut sessions = self.sessions.write().await;
        loop {
            let id = generate_session_id();
            if sessions.contains_key(&id) {
                continue;
            }
            sessions.insert(id.clone(), Arc::new(SessionHandle::new(id.clone())));
            tracing::info!(session_id = %id, total = sessions.len(), "session created");
            return id;
        }
    }

    /// Look up a session and mark it active. `None` for unknown ids; callers
    /// treat that as a no-op, never an error.
    pub async fn get(&self, id: &str) -> Option<Arc<SessionHandle>> {
        let handle = self.sessions.read().await.get(id).cloned()?;
        handle.touch().await;
        Some(handle)
    }

    pub async fn remove(&self, id: &str) -> bool {
        self.sessions.write().await.remove(id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Evict sessions idle longer than the configured TTL. Returns how many
    /// were removed. No-op when no TTL is set.
    pub async fn sweep_idle(&self) -> usize {
        let Some(ttl) = self.idle_ttl else {
            return 0;
        };

        let handles: Vec<Arc<SessionHandle>> =
            self.sessions.read().await.values().cloned().collect();

        let mut expired = Vec::new();
        for handle in handles {
            if handle.idle_for().await >= ttl {
                expired.push(handle.id.clone());
            }
        }

        if expired.is_empty() {
            return 0;
        }

        let mut sessions = self.sessions.write().await;
        let mut removed = 0;
        for id in expired {
            if sessions.remove(&id).is_some() {
                tracing::info!(session_id = %id, "evicted idle session");
                removed += 1;
            }
        }
        removed
    }

    /// Spawn the background eviction loop. Returns immediately; the task
    /// runs until the token fires. Does nothing when no TTL is configured.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        cancel: CancellationToken,
    ) -> Option<tokio::task::JoinHandle<()>> {
        self.idle_ttl?;
        let registry = Arc::clone(self);
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = registry.sweep_idle().await;
                        if removed > 0 {
                            tracing::debug!(removed, "idle sweep finished");
                        }
                    }
                    _ = cancel.cancelled() => {
                        tracing::debug!("session sweeper: cancellation requested");
                        break;
                    }
                }
            }
        }))
    }
}

fn generate_session_id() -> String {
    let mut rng = rand::thread_rng();
    (0..SESSION_ID_LEN)
        .map(|_| SESSION_ID_ALPHABET[rng.gen_range(0..SESSION_ID_ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn session_ids_are_base36_and_fixed_length() {
        for _ in 0..100 {
            let id = generate_session_id();
            assert_eq!(id.len(), SESSION_ID_LEN);
            assert!(id.bytes().all(|b| SESSION_ID_ALPHABET.contains(&b)));
        }
    }

    #[tokio::test]
    async fn create_yields_distinct_ids() {
        let registry = SessionRegistry::new(None);
        let mut seen = HashSet::new();
        for _ in 0..50 {
            assert!(seen.insert(registry.create().await));
        }
        assert_eq!(registry.len().await, 50);
    }

    #[tokio::test]
    async fn get_unknown_session_is_none() {
        let registry = SessionRegistry::new(None);
        assert!(registry.get("nope").await.is_none());
    }

    #[tokio::test]
    async fn created_session_starts_empty() {
        let registry = SessionRegistry::new(None);
        let id = registry.create().await;
        let handle = registry.get(&id).await.unwrap();
        let session = handle.state.lock().await;
        assert!(session.roster().is_empty());
        assert!(session.candidates().is_empty());
        assert!(session.chat().is_empty());
    }

    #[tokio::test]
    async fn sweep_without_ttl_removes_nothing() {
        let registry = SessionRegistry::new(None);
        registry.create().await;
        assert_eq!(registry.sweep_idle().await, 0);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn sweep_evicts_only_idle_sessions() {
        let registry = SessionRegistry::new(Some(Duration::from_millis(30)));
        let stale = registry.create().await;
        let fresh = registry.create().await;

        tokio::time::sleep(Duration::from_millis(40)).await;
        // Touch one of them via lookup; the other stays idle.
        registry.get(&fresh).await.unwrap();

        assert_eq!(registry.sweep_idle().await, 1);
        assert!(registry.get(&stale).await.is_none());
        assert!(registry.get(&fresh).await.is_some());
    }

    #[tokio::test]
    async fn remove_is_explicit_teardown() {
        let registry = SessionRegistry::new(None);
        let id = registry.create().await;
        assert!(registry.remove(&id).await);
        assert!(!registry.remove(&id).await);
        assert!(registry.get(&id).await.is_none());
    }
}
