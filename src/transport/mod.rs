//! Broadcast transport boundary.
//!
//! The core only assumes a named, fire-and-forget pub/sub primitive: every
//! frame posted on a topic fans out to every current subscriber of that
//! topic, structurally cloned, with whatever ordering the host gives.
//! Addressing, delivery guarantees, and membership all live above this
//! boundary.
//!
//! ```text
//! ┌───────────┐  post   ┌──────────────────┐  subscribe  ┌───────────┐
//! │ Channel A │────────▶│   TransportHub   │────────────▶│ Channel B │
//! └───────────┘         │  topic: "files"  │────────────▶│ Channel C │
//!                       └──────────────────┘             └───────────┘
//! ```

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::Result;

const DEFAULT_CAPACITY: usize = 256;

/// One subscriber handle on a named broadcast topic.
///
/// Frames are `serde_json::Value`, standing in for the host's structural
/// clone: whatever a channel posts is re-parsed on every receiver, so a
/// receiver can never observe sender-side mutations.
pub trait Transport: Send + Sync {
    fn topic(&self) -> &str;

    /// Fan the frame out to every current subscriber. Fire-and-forget: a
    /// topic with no subscribers swallows the frame without error.
    fn post(&self, frame: Value) -> Result<()>;

    fn subscribe(&self) -> broadcast::Receiver<Value>;
}

/// Process-wide registry of named broadcast topics.
///
/// Opening the same name twice yields transports sharing one fan-out
/// domain, which is what gives separate channel instances a common bus.
pub struct TransportHub {
    topics: DashMap<String, broadcast::Sender<Value>>,
    capacity: usize,
}

impl TransportHub {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Capacity applies per subscriber; the first open of a topic fixes it.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            topics: DashMap::new(),
            capacity,
        }
    }

    pub fn open(&self, name: impl Into<String>) -> BroadcastTransport {
        let capacity = self.capacity;
        self.open_with_capacity(name, capacity)
    }

    /// Open a topic with an explicit per-subscriber capacity. The first
    /// open of a name fixes the topic's capacity; later opens join the
    /// existing topic regardless of what they pass.
    pub fn open_with_capacity(
        &self,
        name: impl Into<String>,
        capacity: usize,
    ) -> BroadcastTransport {
        let name = name.into();
        let sender = self
            .topics
            .entry(name.clone())
            .or_insert_with(|| broadcast::channel(capacity).0)
            .clone();
        BroadcastTransport {
            topic: name,
            sender,
        }
    }

    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    /// Live subscribers on a topic; zero for unknown names.
    pub fn subscriber_count(&self, name: &str) -> usize {
        self.topics
            .get(name)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }
}

impl Default for TransportHub {
    fn default() -> Self {
        Self::new()
    }
}

/// In-process broadcast transport backed by `tokio::sync::broadcast`.
#[derive(Clone)]
pub struct BroadcastTransport {
    topic: String,
    sender: broadcast::Sender<Value>,
}

impl Transport for BroadcastTransport {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn post(&self, frame: Value) -> Result<()> {
        // A send error only means no receivers are currently subscribed,
        // which is not a failure for a fire-and-forget broadcast.
        let _ = self.sender.send(frame);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<Value> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_same_name_shares_topic() {
        let hub = TransportHub::new();
        let a = hub.open("files");
        let b = hub.open("files");
        assert_eq!(hub.topic_count(), 1);

        let mut rx = b.subscribe();
        a.post(json!({"n": 1})).unwrap();
        assert_eq!(rx.recv().await.unwrap(), json!({"n": 1}));
    }

    #[tokio::test]
    async fn test_distinct_names_are_isolated() {
        let hub = TransportHub::new();
        let files = hub.open("files");
        let compute = hub.open("compute");

        let mut rx = compute.subscribe();
        files.post(json!("only files")).unwrap();
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[test]
    fn test_post_without_subscribers_is_fine() {
        let hub = TransportHub::new();
        let transport = hub.open("idle");
        assert!(transport.post(json!(null)).is_ok());
        assert_eq!(hub.subscriber_count("idle"), 0);
    }

    #[tokio::test]
    async fn test_open_with_capacity_bounds_subscriber_buffer() {
        let hub = TransportHub::new();
        let transport = hub.open_with_capacity("narrow", 1);
        let mut rx = transport.subscribe();

        transport.post(json!(1)).unwrap();
        transport.post(json!(2)).unwrap();

        // Buffer of one: the older frame is gone, the newer survives.
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Lagged(1))
        ));
        assert_eq!(rx.try_recv().unwrap(), json!(2));
    }

    #[tokio::test]
    async fn test_first_open_fixes_topic_capacity() {
        let hub = TransportHub::new();
        let first = hub.open_with_capacity("fixed", 1);
        // A later open with a different capacity joins the existing topic.
        let second = hub.open_with_capacity("fixed", 64);
        let mut rx = second.subscribe();

        first.post(json!("a")).unwrap();
        first.post(json!("b")).unwrap();
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Lagged(1))
        ));
    }

    #[tokio::test]
    async fn test_fanout_reaches_all_subscribers() {
        let hub = TransportHub::new();
        let transport = hub.open("wide");
        let mut rx1 = transport.subscribe();
        let mut rx2 = transport.subscribe();
        assert_eq!(hub.subscriber_count("wide"), 2);

        transport.post(json!(7)).unwrap();
        assert_eq!(rx1.recv().await.unwrap(), json!(7));
        assert_eq!(rx2.recv().await.unwrap(), json!(7));
    }
}
