//! Conversation sessions and their token-bounded memory.
//!
//! A [`ChatSession`] binds an id to a [`ChatMemoryManager`], which keeps the
//! conversation under a token budget in a [`ChatStore`]. Which store backs a
//! manager is decided once, from [`ChatStoreConfig`](crate::config::ChatStoreConfig):
//! Redis when a host is configured, process memory otherwise.

mod memory;
mod session;
mod store;

pub use memory::{
    approximate_tokens, store_key_for, ChatMemoryManager, TokenCounter, DEFAULT_TOKEN_LIMIT,
};
pub use session::{resolve_identity, ChatSession, ChatSessions};
pub use store::{open_store, ChatStore, InMemoryChatStore, RedisChatStore};
