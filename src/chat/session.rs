use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::chat::memory::ChatMemoryManager;
use crate::chat::store::ChatStore;
use crate::config::ChatStoreConfig;
use crate::error::StoreError;

/// Use `supplied` as the session id, or mint a new one if it is missing or empty.
pub fn resolve_identity(supplied: Option<&str>) -> String {
    match supplied {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => Uuid::new_v4().to_string(),
    }
}

/// One conversation: a stable id bound to its memory window.
///
/// Sessions compare and hash by id alone, so two handles on the same
/// conversation are equal whatever their memory holds.
#[derive(Debug)]
pub struct ChatSession {
    id: String,
    memory: ChatMemoryManager,
    created: DateTime<Utc>,
}

impl ChatSession {
    /// Open a session on the store selected by `config`.
    ///
    /// Passing the id of an earlier session rehydrates it; its history is
    /// still there when the store is durable.
    pub fn open(supplied_id: Option<&str>, config: &ChatStoreConfig) -> Result<Self, StoreError> {
        let id = resolve_identity(supplied_id);
        let memory = ChatMemoryManager::from_config(&id, config)?;
        Ok(Self::assemble(id, memory))
    }

    /// Open a session on a store the caller already holds.
    pub fn with_store(supplied_id: Option<&str>, store: Arc<dyn ChatStore>) -> Self {
        let id = resolve_identity(supplied_id);
        let memory = ChatMemoryManager::new(&id, store);
        Self::assemble(id, memory)
    }

    fn assemble(id: String, memory: ChatMemoryManager) -> Self {
        Self {
            id,
            memory,
            created: Utc::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn memory(&self) -> &ChatMemoryManager {
        &self.memory
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    /// Forget the conversation's turns. The session itself stays usable.
    pub fn clear_history(&self) -> Result<(), StoreError> {
        self.memory.reset()
    }
}

impl PartialEq for ChatSession {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ChatSession {}

impl Hash for ChatSession {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// The sessions alive in this process, one per id.
///
/// Retention is up to the owner: sessions stay until [`ChatSessions::remove`].
#[derive(Debug, Default)]
pub struct ChatSessions {
    config: ChatStoreConfig,
    sessions: HashMap<String, ChatSession>,
}

impl ChatSessions {
    pub fn new(config: ChatStoreConfig) -> Self {
        Self {
            config,
            sessions: HashMap::new(),
        }
    }

    /// The session for `supplied_id`, creating it on first reference.
    ///
    /// With no id a new session is always created.
    pub fn resolve(&mut self, supplied_id: Option<&str>) -> Result<&ChatSession, StoreError> {
        let id = resolve_identity(supplied_id);
        if !self.sessions.contains_key(&id) {
            let session = ChatSession::open(Some(&id), &self.config)?;
            tracing::debug!("Created chat session {}", id);
            self.sessions.insert(id.clone(), session);
        }
        Ok(&self.sessions[&id])
    }

    pub fn get(&self, id: &str) -> Option<&ChatSession> {
        self.sessions.get(id)
    }

    /// Stop tracking a session. Its stored history is left alone.
    pub fn remove(&mut self, id: &str) -> Option<ChatSession> {
        self.sessions.remove(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn resolve_identity_keeps_supplied_id() {
        assert_eq!(resolve_identity(Some("chat-42")), "chat-42");
    }

    #[test]
    fn resolve_identity_generates_for_missing_or_empty() {
        let a = resolve_identity(None);
        let b = resolve_identity(Some(""));
        assert!(!a.is_empty());
        assert!(!b.is_empty());
        assert_ne!(a, b);
    }

    #[test]
    fn sessions_hash_by_id() {
        let config = ChatStoreConfig::volatile();
        let a = ChatSession::open(Some("same"), &config).unwrap();
        let b = ChatSession::open(Some("same"), &config).unwrap();
        let mut set = HashSet::new();
        set.insert(a);
        set.insert(b);
        assert_eq!(set.len(), 1);
    }
}
