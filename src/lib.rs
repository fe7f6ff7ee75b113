//! Session memory and project configuration management for a RAG chat service.
//!
//! - [`chat`]: conversation sessions bound to a token-bounded memory window,
//!   backed by an in-process or Redis chat store.
//! - [`update`]: partial, validated updates to project and LLM configuration records.
//! - [`db`]: the SQLite record store those updates are committed to.

pub mod chat;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod update;
