//! Conversation Context Store (C10) and Audit Logger (C13).

pub mod audit;
pub mod context_store;
pub mod memory_store;

pub use audit::AuditLogger;
pub use context_store::ContextStore;
pub use memory_store::{InMemoryCache, InMemoryConversationStore};
