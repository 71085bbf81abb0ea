use async_trait::async_trait;
use thiserror::Error;

/// Errors raised by the backing key-value store
///
/// Every variant is an infrastructure fault. Absent keys are never errors;
/// they come back as `None` or empty collections.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Whether the caller may retry the same operation
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Redis(e) => {
                e.is_io_error() || e.is_timeout() || e.is_connection_dropped() || e.is_connection_refusal()
            }
            StoreError::Unavailable(_) => true,
            StoreError::Serialization(_) => false,
        }
    }
}

/// Key-value primitives the matching engine is built on
///
/// Modeled on the Redis command set: string keys with optional expiry, and
/// unordered string sets. Implementations must make `set_nx_ex` and
/// `compare_and_delete` single indivisible operations.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Fetch several keys in one round trip, preserving input order
    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>, StoreError>;

    /// Set the key with no expiry, clearing any previous one
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError>;

    /// Set the key with an expiry only if it does not exist yet
    ///
    /// Returns true when this call created the key.
    async fn set_nx_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool, StoreError>;

    /// Delete the key only if it currently holds exactly `expected`
    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, StoreError>;

    /// Delete keys, returning how many existed
    async fn delete(&self, keys: &[String]) -> Result<u64, StoreError>;

    /// Refresh the expiry of an existing key; false if the key is absent
    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<bool, StoreError>;

    async fn sadd(&self, key: &str, members: &[String]) -> Result<u64, StoreError>;

    async fn srem(&self, key: &str, members: &[String]) -> Result<u64, StoreError>;

    async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError>;

    async fn sismember(&self, key: &str, member: &str) -> Result<bool, StoreError>;

    async fn scard(&self, key: &str) -> Result<u64, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}
