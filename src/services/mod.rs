// Service exports
pub mod cache;
pub mod memory_store;
pub mod profiles;
pub mod publisher;
pub mod redis_store;
pub mod store;

pub use cache::{CacheError, CacheKey, CacheManager, CacheStats};
pub use memory_store::MemoryStore;
pub use profiles::ProfileCache;
pub use publisher::{publish_json, EventPublisher, PublishedMessage, RecordingPublisher, RedisPublisher};
pub use redis_store::RedisStore;
pub use store::{KeyValueStore, StoreError};
