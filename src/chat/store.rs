//! Chat store backends.
//!
//! A store keeps ordered message lists under opaque string keys. Memory
//! managers share one store and keep their own keys apart by prefix.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use redis::Commands;

use crate::config::ChatStoreConfig;
use crate::error::StoreError;
use crate::models::ChatMessage;

/// Ordered message lists keyed by string.
///
/// Every call on a network-backed store may block on I/O. No timeout is
/// applied here.
pub trait ChatStore: Send + Sync {
    /// Append `message` to the end of the list under `key`.
    fn append(&self, key: &str, message: &ChatMessage) -> Result<(), StoreError>;

    /// All messages under `key`, oldest first. A missing key reads as empty.
    fn read(&self, key: &str) -> Result<Vec<ChatMessage>, StoreError>;

    /// Drop everything under `key`. Resetting a missing key succeeds.
    fn reset(&self, key: &str) -> Result<(), StoreError>;

    /// Drop the `count` oldest messages under `key`.
    fn trim_front(&self, key: &str, count: usize) -> Result<(), StoreError>;
}

/// Open the store selected by `config`.
///
/// Without a Redis host this is a fresh [`InMemoryChatStore`], so history is
/// private to the caller and lost on restart.
pub fn open_store(config: &ChatStoreConfig) -> Result<Arc<dyn ChatStore>, StoreError> {
    match config.redis_url() {
        Some(url) => {
            tracing::debug!("Using Redis chat store at {}", url);
            Ok(Arc::new(RedisChatStore::open(&url)?))
        }
        None => Ok(Arc::new(InMemoryChatStore::new())),
    }
}

// ============================================================
// In-process store
// ============================================================

/// Chat store held in process memory.
#[derive(Debug, Default, Clone)]
pub struct InMemoryChatStore {
    lists: Arc<Mutex<HashMap<String, Vec<ChatMessage>>>>,
}

impl InMemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys that currently hold at least one message.
    pub fn keys(&self) -> Vec<String> {
        let lists = self.lists.lock().expect("chat store lock poisoned");
        let mut keys: Vec<String> = lists
            .iter()
            .filter(|(_, messages)| !messages.is_empty())
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }
}

impl ChatStore for InMemoryChatStore {
    fn append(&self, key: &str, message: &ChatMessage) -> Result<(), StoreError> {
        let mut lists = self.lists.lock().expect("chat store lock poisoned");
        lists
            .entry(key.to_string())
            .or_default()
            .push(message.clone());
        Ok(())
    }

    fn read(&self, key: &str) -> Result<Vec<ChatMessage>, StoreError> {
        let lists = self.lists.lock().expect("chat store lock poisoned");
        Ok(lists.get(key).cloned().unwrap_or_default())
    }

    fn reset(&self, key: &str) -> Result<(), StoreError> {
        let mut lists = self.lists.lock().expect("chat store lock poisoned");
        lists.remove(key);
        Ok(())
    }

    fn trim_front(&self, key: &str, count: usize) -> Result<(), StoreError> {
        let mut lists = self.lists.lock().expect("chat store lock poisoned");
        if let Some(messages) = lists.get_mut(key) {
            let count = count.min(messages.len());
            messages.drain(..count);
        }
        Ok(())
    }
}

// ============================================================
// Redis store
// ============================================================

/// Chat store kept in Redis, one JSON-encoded list entry per message.
///
/// A connection is opened per call; failures surface as
/// [`StoreError::Unavailable`] and are not retried.
#[derive(Debug, Clone)]
pub struct RedisChatStore {
    client: redis::Client,
}

impl RedisChatStore {
    /// Create a store for `url` (e.g. `redis://localhost:6379/0`).
    ///
    /// Only the URL is validated here; the server is first contacted by the
    /// first store call.
    pub fn open(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(StoreError::InvalidUrl)?;
        Ok(Self { client })
    }

    fn connection(&self) -> Result<redis::Connection, StoreError> {
        self.client.get_connection().map_err(|e| {
            tracing::warn!("Redis chat store unreachable: {}", e);
            StoreError::Unavailable(e)
        })
    }
}

impl ChatStore for RedisChatStore {
    fn append(&self, key: &str, message: &ChatMessage) -> Result<(), StoreError> {
        let encoded = serde_json::to_string(message)?;
        let mut conn = self.connection()?;
        let _: i64 = conn.rpush(key, encoded)?;
        Ok(())
    }

    fn read(&self, key: &str) -> Result<Vec<ChatMessage>, StoreError> {
        let mut conn = self.connection()?;
        let raw: Vec<String> = conn.lrange(key, 0, -1)?;
        raw.iter()
            .map(|entry| serde_json::from_str(entry).map_err(StoreError::from))
            .collect()
    }

    fn reset(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.connection()?;
        let _: i64 = conn.del(key)?;
        Ok(())
    }

    fn trim_front(&self, key: &str, count: usize) -> Result<(), StoreError> {
        if count == 0 {
            return Ok(());
        }
        let mut conn = self.connection()?;
        let start = isize::try_from(count).unwrap_or(isize::MAX);
        let _: () = conn.ltrim(key, start, -1)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_store_keeps_keys_apart() {
        let store = InMemoryChatStore::new();
        store.append("memory_a", &ChatMessage::user("hi")).unwrap();
        store.append("memory_b", &ChatMessage::user("hello")).unwrap();

        assert_eq!(store.read("memory_a").unwrap().len(), 1);
        assert_eq!(store.read("memory_b").unwrap()[0].content, "hello");
        assert_eq!(store.keys(), vec!["memory_a", "memory_b"]);
    }

    #[test]
    fn in_memory_reset_is_idempotent() {
        let store = InMemoryChatStore::new();
        store.reset("memory_missing").unwrap();
        store.append("memory_a", &ChatMessage::user("hi")).unwrap();
        store.reset("memory_a").unwrap();
        store.reset("memory_a").unwrap();
        assert!(store.read("memory_a").unwrap().is_empty());
    }

    #[test]
    fn in_memory_trim_front_drops_oldest() {
        let store = InMemoryChatStore::new();
        for content in ["one", "two", "three"] {
            store.append("k", &ChatMessage::user(content)).unwrap();
        }
        store.trim_front("k", 2).unwrap();
        let remaining = store.read("k").unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].content, "three");

        store.trim_front("k", 10).unwrap();
        assert!(store.read("k").unwrap().is_empty());
    }

    #[test]
    fn open_store_without_host_is_in_memory() {
        let store = open_store(&ChatStoreConfig::volatile()).unwrap();
        store.append("k", &ChatMessage::user("hi")).unwrap();
        assert_eq!(store.read("k").unwrap().len(), 1);
    }

    #[test]
    fn unreachable_redis_surfaces_as_unavailable() {
        // Nothing listens on port 1.
        let store = open_store(&ChatStoreConfig::durable("127.0.0.1", 1)).unwrap();
        let err = store.read("memory_x").unwrap_err();
        assert!(err.is_unavailable());
    }

    #[test]
    fn invalid_redis_url_is_a_config_error() {
        let err = RedisChatStore::open("not a url").unwrap_err();
        assert!(matches!(err, StoreError::InvalidUrl(_)));
        assert!(!err.is_unavailable());
    }

    fn one_token_per_word(message: &ChatMessage) -> usize {
        message.content.split_whitespace().count()
    }

    /// Run with `REDIS_HOST=localhost cargo test -- --ignored`.
    #[test]
    #[ignore = "needs a Redis server named by REDIS_HOST"]
    fn redis_store_round_trips_and_evicts() {
        let config = crate::config::Settings::from_env().chat_store;
        if !config.is_durable() {
            return;
        }
        let store = open_store(&config).unwrap();
        let key = format!("memory_test_{}", uuid::Uuid::new_v4());

        for content in ["one", "two", "three"] {
            store.append(&key, &ChatMessage::user(content)).unwrap();
        }
        let stored = store.read(&key).unwrap();
        assert_eq!(stored.len(), 3);
        assert_eq!(stored[0].content, "one");

        store.trim_front(&key, 2).unwrap();
        let remaining = store.read(&key).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].content, "three");

        store.reset(&key).unwrap();
        store.reset(&key).unwrap();
        assert!(store.read(&key).unwrap().is_empty());

        let session_id = uuid::Uuid::new_v4().to_string();
        let memory = crate::chat::ChatMemoryManager::new(&session_id, store.clone())
            .with_token_limit(5)
            .with_token_counter(one_token_per_word);
        memory.append_turn(crate::models::MessageRole::User, "a b").unwrap();
        memory.append_turn(crate::models::MessageRole::Assistant, "c d").unwrap();
        memory.append_turn(crate::models::MessageRole::User, "e f g").unwrap();

        let window: Vec<_> = store
            .read(memory.store_key())
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(window, vec!["c d", "e f g"]);
        memory.reset().unwrap();
    }
}
