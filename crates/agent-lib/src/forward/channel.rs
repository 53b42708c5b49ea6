//! Named-topic message channel
//!
//! `MessageChannel` is the seam to the external broker. `InMemoryChannel`
//! is a process-local topic bus used by the agent and by tests.

use crate::error::ChannelError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;
use tracing::debug;

/// A message published on a topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMessage {
    pub topic: String,
    pub key: Option<String>,
    pub payload: String,
}

/// Publish/subscribe facility keyed by topic name
#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Publish `payload` and wait for the channel to acknowledge it
    async fn publish(
        &self,
        topic: &str,
        key: Option<&str>,
        payload: String,
    ) -> Result<(), ChannelError>;

    /// Receive every message published on `topic` from now on
    fn subscribe(&self, topic: &str) -> Result<broadcast::Receiver<ChannelMessage>, ChannelError>;
}

/// In-process topic bus backed by broadcast channels
pub struct InMemoryChannel {
    topics: DashMap<String, broadcast::Sender<ChannelMessage>>,
    capacity: usize,
    closed: AtomicBool,
}

impl InMemoryChannel {
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: DashMap::new(),
            capacity: capacity.max(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Make the channel unavailable. Later publishes and subscribes fail.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn reopen(&self) {
        self.closed.store(false, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Topics that have been published to or subscribed to
    pub fn topics(&self) -> Vec<String> {
        self.topics.iter().map(|e| e.key().clone()).collect()
    }

    fn sender(&self, topic: &str) -> broadcast::Sender<ChannelMessage> {
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl Default for InMemoryChannel {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl MessageChannel for InMemoryChannel {
    async fn publish(
        &self,
        topic: &str,
        key: Option<&str>,
        payload: String,
    ) -> Result<(), ChannelError> {
        if self.is_closed() {
            return Err(ChannelError::Unavailable(topic.to_string()));
        }

        let message = ChannelMessage {
            topic: topic.to_string(),
            key: key.map(str::to_string),
            payload,
        };

        // A topic with no subscribers still accepts the message.
        if self.sender(topic).send(message).is_err() {
            debug!(topic = %topic, "Published to topic with no subscribers");
        }
        Ok(())
    }

    fn subscribe(&self, topic: &str) -> Result<broadcast::Receiver<ChannelMessage>, ChannelError> {
        if self.is_closed() {
            return Err(ChannelError::Unavailable(topic.to_string()));
        }
        Ok(self.sender(topic).subscribe())
    }
}
