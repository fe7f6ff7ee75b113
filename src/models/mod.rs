//! Domain models for ragkeep.
//!
//! # Core Concepts
//!
//! ## Conversation State
//!
//! - [`ChatMessage`]: One conversation turn as kept in chat memory. Sessions
//!   and their memory windows live in [`crate::chat`].
//!
//! ## Configuration Records
//!
//! - [`ProjectConfig`]: The mutable settings of one RAG pipeline, including its
//!   [`RoutingEntrance`] list.
//! - [`LlmProfile`]: A named language-model profile projects refer to.
//!
//! Both records change only through partial updates ([`ProjectUpdate`],
//! [`LlmUpdate`]) applied by [`crate::update`].

mod llm;
mod message;
mod project;

pub use llm::*;
pub use message::*;
pub use project::*;
