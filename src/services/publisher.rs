//! Channel publishing for job offers and domain events.
//!
//! Delivery is best-effort: callers log and swallow publish failures so a
//! broken channel never blocks a matching decision.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use serde::Serialize;
use std::sync::RwLock;

use crate::services::store::StoreError;

/// A published message.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub channel: String,
    pub payload: String,
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, channel: &str, payload: String) -> Result<(), StoreError>;
}

/// Serialize `message` and publish it, logging instead of failing
pub async fn publish_json<T>(publisher: &dyn EventPublisher, channel: &str, message: &T) -> bool
where
    T: Serialize + ?Sized,
{
    let payload = match serde_json::to_string(message) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!("Failed to serialize message for {}: {}", channel, e);
            return false;
        }
    };

    match publisher.publish(channel, payload).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("Failed to publish to {}: {}", channel, e);
            false
        }
    }
}

/// Redis PUBLISH on the shared server
pub struct RedisPublisher {
    conn: ConnectionManager,
}

impl RedisPublisher {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl EventPublisher for RedisPublisher {
    async fn publish(&self, channel: &str, payload: String) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let receivers: i64 = redis::cmd("PUBLISH")
            .arg(channel)
            .arg(payload)
            .query_async(&mut conn)
            .await?;
        tracing::trace!("Published to {} ({} receivers)", channel, receivers);
        Ok(())
    }
}

/// In-process publisher that keeps every message
///
/// Backs the memory deployment mode and lets tests inspect what would have
/// been sent.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    published: RwLock<Vec<PublishedMessage>>,
    failing: std::sync::atomic::AtomicBool,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent publishes fail
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn messages(&self) -> Vec<PublishedMessage> {
        self.published.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn messages_on(&self, channel: &str) -> Vec<PublishedMessage> {
        self.messages()
            .into_iter()
            .filter(|m| m.channel == channel)
            .collect()
    }

    pub fn clear(&self) {
        self.published.write().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, channel: &str, payload: String) -> Result<(), StoreError> {
        if self.failing.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!("publish to {} rejected", channel)));
        }
        self.published
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(PublishedMessage {
                channel: channel.to_string(),
                payload,
            });
        Ok(())
    }
}
