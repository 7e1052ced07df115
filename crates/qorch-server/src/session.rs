//! Per-connection session bookkeeping.
//!
//! Conversation turns themselves are persisted through
//! `qorch_context::ConversationStore`; this module only tracks which
//! connections are live, their optional voice pipeline, and reclaims
//! capacity from connections that went idle without a clean close.

use qorch_voice::VoicePipeline;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

const DEFAULT_MAX_SESSIONS: usize = 10_000;
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

pub struct Session {
    pub id: Uuid,
    pub user_id: String,
    pub voice: Option<Arc<VoicePipeline>>,
    pub created_at: Instant,
    last_activity: parking_lot::Mutex<Instant>,
}

impl Session {
    pub fn new(id: Uuid, user_id: impl Into<String>, voice: Option<Arc<VoicePipeline>>) -> Self {
        let now = Instant::now();
        Self { id, user_id: user_id.into(), voice, created_at: now, last_activity: parking_lot::Mutex::new(now) }
    }

    pub fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }
}

/// Capacity-bounded, in-memory registry of live connections.
pub struct SessionManager {
    sessions: parking_lot::RwLock<HashMap<Uuid, Arc<Session>>>,
    max_sessions: usize,
    idle_timeout: Duration,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SESSIONS, DEFAULT_IDLE_TIMEOUT)
    }
}

impl SessionManager {
    pub fn new(max_sessions: usize, idle_timeout: Duration) -> Self {
        Self { sessions: parking_lot::RwLock::new(HashMap::new()), max_sessions, idle_timeout }
    }

    /// Registers a new connection, evicting expired sessions first if the
    /// registry is at capacity. Returns `Err` only if still at capacity
    /// after eviction.
    pub fn insert(&self, session: Arc<Session>) -> Result<(), ()> {
        let mut sessions = self.sessions.write();
        if sessions.len() >= self.max_sessions {
            sessions.retain(|_, s| s.idle_for() < self.idle_timeout);
        }
        if sessions.len() >= self.max_sessions {
            return Err(());
        }
        sessions.insert(session.id, session);
        Ok(())
    }

    pub fn get(&self, id: Uuid) -> Option<Arc<Session>> {
        self.sessions.read().get(&id).cloned()
    }

    pub fn remove(&self, id: Uuid) -> Option<Arc<Session>> {
        self.sessions.write().remove(&id)
    }

    pub fn count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Drops connections idle past the configured timeout. Intended to be
    /// called periodically from a background task started at startup.
    pub fn cleanup_expired(&self) -> usize {
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, s| s.idle_for() < self.idle_timeout);
        before - sessions.len()
    }

    /// Spawns the periodic cleanup task; returns its handle so callers may
    /// abort it on shutdown.
    pub fn start_cleanup_task(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let reaped = manager.cleanup_expired();
                if reaped > 0 {
                    tracing::info!(reaped, "reaped idle websocket sessions");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_get_round_trip() {
        let manager = SessionManager::new(10, Duration::from_secs(60));
        let session = Arc::new(Session::new(Uuid::new_v4(), "user-1", None));
        let id = session.id;
        manager.insert(session).unwrap();
        assert!(manager.get(id).is_some());
        assert_eq!(manager.count(), 1);
    }

    #[test]
    fn cleanup_evicts_only_idle_entries() {
        let manager = SessionManager::new(10, Duration::from_millis(10));
        let session = Arc::new(Session::new(Uuid::new_v4(), "user-1", None));
        manager.insert(session).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(manager.cleanup_expired(), 1);
        assert_eq!(manager.count(), 0);
    }
}
