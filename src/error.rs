use thiserror::Error;

/// Chat store errors.
///
/// Nothing here is retried internally; callers decide whether to retry a
/// failed call against the durable store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Chat store unavailable: {0}")]
    Unavailable(#[from] redis::RedisError),

    #[error("Invalid chat store URL: {0}")]
    InvalidUrl(#[source] redis::RedisError),

    #[error("Malformed chat message in store: {0}")]
    Codec(#[from] serde_json::Error),
}

impl StoreError {
    /// Whether the failure came from the network store rather than its contents.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}
