//! Runtime settings loaded from environment variables.
//!
//! - `REDIS_HOST` - When set, chat history is kept in Redis instead of process memory
//! - `REDIS_PORT` - Redis port (default: `6379`)
//! - `REDIS_DATABASE` - Redis logical database index (default: `0`)
//! - `RAGKEEP_DATABASE` - SQLite database file (default: platform data directory)
//! - `RAGKEEP_TOKEN_LIMIT` - Token budget for chat memory (default: `3900`)

use std::path::PathBuf;

use crate::chat::DEFAULT_TOKEN_LIMIT;

const DEFAULT_REDIS_PORT: u16 = 6379;

/// Where chat history is kept.
///
/// A configured host selects the durable Redis store; otherwise every memory
/// manager gets its own in-process store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatStoreConfig {
    pub redis_host: Option<String>,
    pub redis_port: u16,
    pub redis_database: i64,
    pub token_limit: usize,
}

impl ChatStoreConfig {
    /// Keep history in process memory only.
    pub fn volatile() -> Self {
        Self {
            redis_host: None,
            redis_port: DEFAULT_REDIS_PORT,
            redis_database: 0,
            token_limit: DEFAULT_TOKEN_LIMIT,
        }
    }

    /// Keep history in Redis at `host:port`.
    pub fn durable(host: impl Into<String>, port: u16) -> Self {
        Self {
            redis_host: Some(host.into()),
            ..Self::volatile()
        }
        .with_port(port)
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.redis_port = port;
        self
    }

    pub fn with_token_limit(mut self, token_limit: usize) -> Self {
        self.token_limit = token_limit;
        self
    }

    pub fn is_durable(&self) -> bool {
        self.redis_host.is_some()
    }

    /// Connection URL for the durable store, if one is configured.
    pub fn redis_url(&self) -> Option<String> {
        self.redis_host.as_ref().map(|host| {
            format!(
                "redis://{}:{}/{}",
                host, self.redis_port, self.redis_database
            )
        })
    }
}

impl Default for ChatStoreConfig {
    fn default() -> Self {
        Self::volatile()
    }
}

/// All settings needed by the CLI.
#[derive(Clone, Debug, Default)]
pub struct Settings {
    pub chat_store: ChatStoreConfig,
    /// Explicit database path; `None` uses the platform data directory.
    pub database_path: Option<PathBuf>,
}

impl Settings {
    /// Load settings from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings from an arbitrary variable source.
    ///
    /// Unparseable numeric values fall back to their defaults. An empty
    /// `REDIS_HOST` counts as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let redis_host = lookup("REDIS_HOST")
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty());

        let redis_port = lookup("REDIS_PORT")
            .and_then(|s| s.trim().parse::<u16>().ok())
            .unwrap_or(DEFAULT_REDIS_PORT);

        let redis_database = lookup("REDIS_DATABASE")
            .and_then(|s| s.trim().parse::<i64>().ok())
            .unwrap_or(0);

        let token_limit = lookup("RAGKEEP_TOKEN_LIMIT")
            .and_then(|s| s.trim().parse::<usize>().ok())
            .unwrap_or(DEFAULT_TOKEN_LIMIT);

        let database_path = lookup("RAGKEEP_DATABASE")
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);

        Self {
            chat_store: ChatStoreConfig {
                redis_host,
                redis_port,
                redis_database,
                token_limit,
            },
            database_path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn no_redis_host_selects_volatile_store() {
        let settings = Settings::from_lookup(lookup_from(&[]));
        assert!(!settings.chat_store.is_durable());
        assert_eq!(settings.chat_store.redis_url(), None);
        assert_eq!(settings.chat_store.token_limit, 3900);
        assert!(settings.database_path.is_none());
    }

    #[test]
    fn redis_host_selects_durable_store() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("REDIS_HOST", "cache.internal"),
            ("REDIS_PORT", "6380"),
        ]));
        assert!(settings.chat_store.is_durable());
        assert_eq!(
            settings.chat_store.redis_url(),
            Some("redis://cache.internal:6380/0".to_string())
        );
    }

    #[test]
    fn blank_host_and_bad_numbers_fall_back_to_defaults() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("REDIS_HOST", "  "),
            ("REDIS_PORT", "not-a-port"),
            ("RAGKEEP_TOKEN_LIMIT", "lots"),
        ]));
        assert!(!settings.chat_store.is_durable());
        assert_eq!(settings.chat_store.redis_port, 6379);
        assert_eq!(settings.chat_store.token_limit, 3900);
    }

    #[test]
    fn database_path_is_read_from_env() {
        let settings =
            Settings::from_lookup(lookup_from(&[("RAGKEEP_DATABASE", "/tmp/ragkeep.db")]));
        assert_eq!(settings.database_path, Some(PathBuf::from("/tmp/ragkeep.db")));
    }

    #[test]
    fn durable_constructor_accepts_custom_budget() {
        let config = ChatStoreConfig::durable("localhost", 6379).with_token_limit(100);
        assert!(config.is_durable());
        assert_eq!(config.token_limit, 100);
        assert_eq!(
            config.redis_url(),
            Some("redis://localhost:6379/0".to_string())
        );
    }
}
