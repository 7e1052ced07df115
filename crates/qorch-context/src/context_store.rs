//! Conversation Context Store (C10): write-through cache in front of the
//! persistent store, with single-flight loads so a cache miss under
//! concurrent requests for the same session triggers one store read.

use dashmap::DashMap;
use qorch_core::{Cache, ConversationContext, ConversationStore, Error, Result, Session};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

const DEFAULT_TTL: Duration = Duration::from_secs(30 * 60);

pub struct ContextStore {
    store: Arc<dyn ConversationStore>,
    cache: Arc<dyn Cache>,
    ttl: Duration,
    inflight: DashMap<Uuid, Arc<AsyncMutex<()>>>,
}

impl ContextStore {
    pub fn new(store: Arc<dyn ConversationStore>, cache: Arc<dyn Cache>) -> Self {
        Self { store, cache, ttl: DEFAULT_TTL, inflight: DashMap::new() }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    fn cache_key(session_id: Uuid) -> String {
        format!("context:{session_id}")
    }

    /// Loads a session's conversation context, serving from cache when
    /// present. On a miss, only one caller per `session_id` actually reads
    /// the store; concurrent callers wait on that read and share its result.
    pub async fn load(&self, session_id: Uuid, history_limit: usize) -> Result<ConversationContext> {
        let key = Self::cache_key(session_id);
        if let Some(bytes) = self.cache.get(&key).await? {
            if let Ok(context) = serde_json::from_slice::<ConversationContext>(&bytes) {
                return Ok(context);
            }
        }

        let lock = self
            .inflight
            .entry(session_id)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        // Someone else may have populated the cache while we waited for the lock.
        if let Some(bytes) = self.cache.get(&key).await? {
            if let Ok(context) = serde_json::from_slice::<ConversationContext>(&bytes) {
                self.inflight.remove(session_id);
                return Ok(context);
            }
        }

        let session = self.store.load_session(session_id).await?;
        let mut context = ConversationContext::new(session_id, history_limit);
        if let Some(session) = session {
            context.pinned_clinical_context = session.pinned_clinical_context;
            context.preferences = session.preferences;
            let messages = self.store.load_recent_messages(session_id, history_limit).await?;
            for message in messages {
                context.append(message);
            }
        }

        self.write_cache(session_id, &context).await?;
        self.inflight.remove(session_id);
        Ok(context)
    }

    async fn write_cache(&self, session_id: Uuid, context: &ConversationContext) -> Result<()> {
        let bytes = serde_json::to_vec(context).map_err(|e| Error::Internal(e.to_string()))?;
        self.cache.set(&Self::cache_key(session_id), bytes, self.ttl).await
    }

    /// Writes through: append to the durable store first, then refresh the
    /// cached context so subsequent loads see it immediately.
    pub async fn append_message(
        &self,
        session_id: Uuid,
        message: qorch_core::Message,
        mut context: ConversationContext,
    ) -> Result<ConversationContext> {
        self.store.append_message(session_id, &message).await?;
        context.append(message);
        self.write_cache(session_id, &context).await?;
        Ok(context)
    }

    pub async fn save_session(&self, session: &Session) -> Result<()> {
        self.store.save_session(session).await
    }

    pub async fn invalidate(&self, session_id: Uuid) -> Result<()> {
        self.cache.invalidate(&Self::cache_key(session_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::{InMemoryCache, InMemoryConversationStore};
    use qorch_core::{Message, TurnRole};

    #[tokio::test]
    async fn loads_empty_context_for_unknown_session() {
        let store = ContextStore::new(Arc::new(InMemoryConversationStore::new()), Arc::new(InMemoryCache::new()));
        let context = store.load(Uuid::new_v4(), 10).await.unwrap();
        assert!(context.history.is_empty());
    }

    #[tokio::test]
    async fn append_then_reload_sees_the_message_via_store() {
        let backing = Arc::new(InMemoryConversationStore::new());
        let cache = Arc::new(InMemoryCache::new());
        let store = ContextStore::new(backing.clone(), cache.clone());

        let session = Session::new("user-1");
        store.save_session(&session).await.unwrap();
        let context = store.load(session.id, 10).await.unwrap();

        let message = Message::new(TurnRole::User, "hello");
        let context = store.append_message(session.id, message, context).await.unwrap();
        assert_eq!(context.history.len(), 1);

        // A fresh store instance backed by the same durable store sees the
        // appended message after a cache miss.
        let fresh = ContextStore::new(backing, Arc::new(InMemoryCache::new()));
        let reloaded = fresh.load(session.id, 10).await.unwrap();
        assert_eq!(reloaded.history.len(), 1);
    }
}
