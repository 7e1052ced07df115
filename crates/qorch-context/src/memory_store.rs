//! In-memory stand-ins for the persistent conversation store and cache,
//! in the shape of the teacher's `Simulated*Service` types: usable as
//! defaults in development, replaced by a real store/cache in production.

use async_trait::async_trait;
use dashmap::DashMap;
use qorch_core::{Cache, ConversationStore, Message, Result, Session};
use std::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryConversationStore {
    sessions: DashMap<Uuid, Session>,
    messages: DashMap<Uuid, Vec<Message>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn load_session(&self, session_id: Uuid) -> Result<Option<Session>> {
        Ok(self.sessions.get(&session_id).map(|s| s.clone()))
    }

    async fn save_session(&self, session: &Session) -> Result<()> {
        self.sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn load_recent_messages(&self, session_id: Uuid, limit: usize) -> Result<Vec<Message>> {
        let messages = self.messages.get(&session_id).map(|m| m.clone()).unwrap_or_default();
        let start = messages.len().saturating_sub(limit);
        Ok(messages[start..].to_vec())
    }

    async fn append_message(&self, session_id: Uuid, message: &Message) -> Result<()> {
        self.messages.entry(session_id).or_default().push(message.clone());
        Ok(())
    }
}

struct CacheEntry {
    value: Vec<u8>,
    expires_at: Instant,
}

#[derive(Default)]
pub struct InMemoryCache {
    entries: DashMap<String, CacheEntry>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.value.clone())),
            Some(_) => {
                self.entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        self.entries.insert(key.to_string(), CacheEntry { value, expires_at: Instant::now() + ttl });
        Ok(())
    }

    async fn invalidate(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qorch_core::TurnRole;

    #[tokio::test]
    async fn round_trips_session_and_messages() {
        let store = InMemoryConversationStore::new();
        let session = Session::new("user-1");
        store.save_session(&session).await.unwrap();
        let loaded = store.load_session(session.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, session.id);

        let message = Message::new(TurnRole::User, "hello");
        store.append_message(session.id, &message).await.unwrap();
        let recent = store.load_recent_messages(session.id, 10).await.unwrap();
        assert_eq!(recent.len(), 1);
    }

    #[tokio::test]
    async fn cache_entries_expire() {
        let cache = InMemoryCache::new();
        cache.set("k", b"v".to_vec(), Duration::from_millis(10)).await.unwrap();
        assert!(cache.get("k").await.unwrap().is_some());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(cache.get("k").await.unwrap().is_none());
    }
}
