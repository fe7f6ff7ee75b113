use std::sync::Arc;

use crate::chat::store::{open_store, ChatStore};
use crate::config::ChatStoreConfig;
use crate::error::StoreError;
use crate::models::{ChatMessage, MessageRole};

/// Default token budget for retained history.
pub const DEFAULT_TOKEN_LIMIT: usize = 3900;

/// Prefix keeping memory keys apart from anything else in a shared store.
const STORE_KEY_PREFIX: &str = "memory_";

/// Estimates how many model tokens a message costs.
pub type TokenCounter = fn(&ChatMessage) -> usize;

/// Length heuristic of roughly four characters per token, role included.
pub fn approximate_tokens(message: &ChatMessage) -> usize {
    let chars = message.role.as_str().len() + message.content.chars().count();
    chars.div_ceil(4)
}

/// The store key used for a session's history.
pub fn store_key_for(session_id: &str) -> String {
    format!("{}{}", STORE_KEY_PREFIX, session_id)
}

/// A token-bounded window over one conversation.
///
/// After every append the stored history is trimmed from the oldest end
/// until it fits `token_limit`. The newest message is never trimmed, so a
/// single oversized turn is kept on its own rather than dropped.
///
/// The backend is fixed at construction. One writer per manager is assumed.
pub struct ChatMemoryManager {
    store: Arc<dyn ChatStore>,
    store_key: String,
    token_limit: usize,
    count_tokens: TokenCounter,
}

impl ChatMemoryManager {
    /// Bind a session's history to an existing store.
    pub fn new(session_id: &str, store: Arc<dyn ChatStore>) -> Self {
        Self {
            store,
            store_key: store_key_for(session_id),
            token_limit: DEFAULT_TOKEN_LIMIT,
            count_tokens: approximate_tokens,
        }
    }

    /// Bind a session's history to the store selected by `config`.
    pub fn from_config(session_id: &str, config: &ChatStoreConfig) -> Result<Self, StoreError> {
        let store = open_store(config)?;
        Ok(Self::new(session_id, store).with_token_limit(config.token_limit))
    }

    pub fn with_token_limit(mut self, token_limit: usize) -> Self {
        self.token_limit = token_limit;
        self
    }

    pub fn with_token_counter(mut self, count_tokens: TokenCounter) -> Self {
        self.count_tokens = count_tokens;
        self
    }

    pub fn store_key(&self) -> &str {
        &self.store_key
    }

    pub fn token_limit(&self) -> usize {
        self.token_limit
    }

    /// Record a turn and evict the oldest turns that no longer fit.
    pub fn append_turn(
        &self,
        role: MessageRole,
        content: impl Into<String>,
    ) -> Result<(), StoreError> {
        self.put(ChatMessage::new(role, content))
    }

    /// Record a prepared message and evict the oldest turns that no longer fit.
    pub fn put(&self, message: ChatMessage) -> Result<(), StoreError> {
        self.store.append(&self.store_key, &message)?;

        let messages = self.store.read(&self.store_key)?;
        let evict = self.window_start(&messages);
        if evict > 0 {
            tracing::debug!(
                "Evicting {} oldest message(s) from {} to stay within {} tokens",
                evict,
                self.store_key,
                self.token_limit
            );
            self.store.trim_front(&self.store_key, evict)?;
        }
        Ok(())
    }

    /// The retained messages, oldest first.
    ///
    /// History written past the budget by another process sharing the store
    /// is windowed here as well; the store itself is not touched.
    pub fn read_window(&self) -> Result<Vec<ChatMessage>, StoreError> {
        let mut messages = self.store.read(&self.store_key)?;
        let start = self.window_start(&messages);
        Ok(messages.split_off(start))
    }

    /// Estimated tokens in the current window.
    pub fn token_count(&self) -> Result<usize, StoreError> {
        Ok(self
            .read_window()?
            .iter()
            .map(|m| (self.count_tokens)(m))
            .sum())
    }

    /// Forget the whole conversation. Safe to call on an empty history.
    pub fn reset(&self) -> Result<(), StoreError> {
        self.store.reset(&self.store_key)
    }

    /// Index of the oldest message that fits, walking back from the newest.
    fn window_start(&self, messages: &[ChatMessage]) -> usize {
        let mut total: usize = messages.iter().map(|m| (self.count_tokens)(m)).sum();
        let mut start = 0;
        while total > self.token_limit && start + 1 < messages.len() {
            total -= (self.count_tokens)(&messages[start]);
            start += 1;
        }
        start
    }
}

impl std::fmt::Debug for ChatMemoryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatMemoryManager")
            .field("store_key", &self.store_key)
            .field("token_limit", &self.token_limit)
            .finish_non_exhaustive()
    }
}
