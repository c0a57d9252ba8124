//! Pub/sub relay collaborator.
//!
//! A relay carries two kinds of traffic on a named topic: presence (who is
//! subscribed, as a full `sync` snapshot plus `join`/`leave` deltas) and
//! fire-and-forget broadcasts keyed by an event name. [`MemoryRelay`] is an
//! in-process implementation on top of `tokio::sync::broadcast`.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use takjil_core::{PresenceEntry, PresenceMeta};
use tokio::sync::broadcast;

/// Default per-subscriber buffer of [`MemoryRelay`].
pub const DEFAULT_CAPACITY: usize = 256;

/// What a subscriber receives.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayMessage {
    /// Full presence snapshot, in tracking order.
    PresenceSync(Vec<PresenceEntry>),
    PresenceJoin {
        key: String,
        metas: Vec<PresenceMeta>,
    },
    PresenceLeave {
        key: String,
        metas: Vec<PresenceMeta>,
    },
    Broadcast {
        event: String,
        payload: Value,
    },
}

#[derive(thiserror::Error, Debug)]
pub enum RelayError {
    #[error("Relay refused subscription to {0}")]
    SubscribeFailed(String),

    #[error("Relay channel closed")]
    Closed,
}

pub trait Relay: Send + Sync {
    type Channel: RelayChannel;

    /// Join `topic`, presenting as `key` in presence.
    fn subscribe(
        &self,
        topic: &str,
        key: &str,
    ) -> impl Future<Output = Result<Self::Channel, RelayError>> + Send;
}

/// One subscription. Dropping it unsubscribes and untracks.
pub trait RelayChannel: Send {
    /// Publish (or replace) this subscriber's presence meta.
    fn track(&mut self, meta: PresenceMeta) -> impl Future<Output = Result<(), RelayError>> + Send;

    fn untrack(&mut self) -> impl Future<Output = Result<(), RelayError>> + Send;

    /// Send to every other subscriber. Never waits.
    fn broadcast(&self, event: &str, payload: Value) -> Result<(), RelayError>;

    /// Next message, waiting if none is buffered.
    fn recv(&mut self) -> impl Future<Output = Result<RelayMessage, RelayError>> + Send;

    /// Next buffered message, if any.
    fn try_recv(&mut self) -> Result<Option<RelayMessage>, RelayError>;
}

#[derive(Debug, Clone)]
struct Envelope {
    from: u64,
    message: RelayMessage,
}

struct Tracked {
    subscriber: u64,
    key: String,
    meta: PresenceMeta,
}

struct Topic {
    sender: broadcast::Sender<Envelope>,
    presence: Mutex<Vec<Tracked>>,
}

impl Topic {
    fn snapshot(tracked: &[Tracked]) -> Vec<PresenceEntry> {
        let mut entries: Vec<PresenceEntry> = Vec::new();
        for t in tracked {
            match entries.iter_mut().find(|e| e.key == t.key) {
                Some(entry) => entry.metas.push(t.meta.clone()),
                None => entries.push(PresenceEntry::new(t.key.clone(), vec![t.meta.clone()])),
            }
        }
        entries
    }

    /// Presence messages go to every subscriber, the sender included.
    fn publish_presence(&self, from: u64, delta: RelayMessage, snapshot: Vec<PresenceEntry>) {
        for message in [delta, RelayMessage::PresenceSync(snapshot)] {
            // No receivers is fine.
            let _ = self.sender.send(Envelope { from, message });
        }
    }

    fn track(&self, subscriber: u64, key: &str, meta: PresenceMeta) {
        let mut presence = self.presence.lock();
        match presence.iter_mut().find(|t| t.subscriber == subscriber) {
            Some(tracked) => tracked.meta = meta.clone(),
            None => presence.push(Tracked {
                subscriber,
                key: key.to_string(),
                meta: meta.clone(),
            }),
        }
        let snapshot = Self::snapshot(&presence);
        drop(presence);
        let delta = RelayMessage::PresenceJoin {
            key: key.to_string(),
            metas: vec![meta],
        };
        self.publish_presence(subscriber, delta, snapshot);
    }

    fn untrack(&self, subscriber: u64) {
        let mut presence = self.presence.lock();
        let Some(index) = presence.iter().position(|t| t.subscriber == subscriber) else {
            return;
        };
        let removed = presence.remove(index);
        let snapshot = Self::snapshot(&presence);
        drop(presence);
        let delta = RelayMessage::PresenceLeave {
            key: removed.key,
            metas: vec![removed.meta],
        };
        self.publish_presence(subscriber, delta, snapshot);
    }
}

/// In-process relay. Clones share the same topics.
#[derive(Clone)]
pub struct MemoryRelay {
    topics: Arc<RwLock<HashMap<String, Arc<Topic>>>>,
    next_subscriber: Arc<AtomicU64>,
    capacity: usize,
    offline: Arc<RwLock<bool>>,
}

impl Default for MemoryRelay {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl MemoryRelay {
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: Arc::new(RwLock::new(HashMap::new())),
            next_subscriber: Arc::new(AtomicU64::new(1)),
            capacity: capacity.max(1),
            offline: Arc::new(RwLock::new(false)),
        }
    }

    /// Refuse new subscriptions until cleared.
    pub fn set_offline(&self, offline: bool) {
        *self.offline.write() = offline;
    }

    pub fn topic_count(&self) -> usize {
        self.topics.read().len()
    }

    /// Keys currently tracked on `topic`, in tracking order.
    pub fn presence(&self, topic: &str) -> Vec<PresenceEntry> {
        self.topics
            .read()
            .get(topic)
            .map(|t| Topic::snapshot(&t.presence.lock()))
            .unwrap_or_default()
    }

    /// Get or create `name` and attach a receiver to it.
    ///
    /// The receiver is created under the map lock, so a dropping channel
    /// always sees it when deciding whether the topic is idle.
    fn attach(&self, name: &str) -> (Arc<Topic>, broadcast::Receiver<Envelope>) {
        let mut topics = self.topics.write();
        let topic = topics
            .entry(name.to_string())
            .or_insert_with(|| {
                let (sender, _) = broadcast::channel(self.capacity);
                Arc::new(Topic {
                    sender,
                    presence: Mutex::new(Vec::new()),
                })
            })
            .clone();
        let receiver = topic.sender.subscribe();
        (topic, receiver)
    }
}

impl Relay for MemoryRelay {
    type Channel = MemoryChannel;

    async fn subscribe(&self, topic: &str, key: &str) -> Result<MemoryChannel, RelayError> {
        if *self.offline.read() {
            return Err(RelayError::SubscribeFailed(topic.to_string()));
        }
        let (shared, receiver) = self.attach(topic);
        let id = self.next_subscriber.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(topic, key, subscriber = id, "Subscribed");
        Ok(MemoryChannel {
            id,
            key: key.to_string(),
            topic_name: topic.to_string(),
            topic: shared,
            receiver,
            relay: self.clone(),
        })
    }
}

pub struct MemoryChannel {
    id: u64,
    key: String,
    topic_name: String,
    topic: Arc<Topic>,
    receiver: broadcast::Receiver<Envelope>,
    relay: MemoryRelay,
}

impl MemoryChannel {
    fn accept(&self, envelope: Envelope) -> Option<RelayMessage> {
        match envelope.message {
            RelayMessage::Broadcast { .. } if envelope.from == self.id => None,
            message => Some(message),
        }
    }
}

impl RelayChannel for MemoryChannel {
    async fn track(&mut self, meta: PresenceMeta) -> Result<(), RelayError> {
        self.topic.track(self.id, &self.key, meta);
        Ok(())
    }

    async fn untrack(&mut self) -> Result<(), RelayError> {
        self.topic.untrack(self.id);
        Ok(())
    }

    fn broadcast(&self, event: &str, payload: Value) -> Result<(), RelayError> {
        let envelope = Envelope {
            from: self.id,
            message: RelayMessage::Broadcast {
                event: event.to_string(),
                payload,
            },
        };
        // Our own receiver keeps the channel open, so send only fails if
        // nobody is listening at all.
        let _ = self.topic.sender.send(envelope);
        Ok(())
    }

    async fn recv(&mut self) -> Result<RelayMessage, RelayError> {
        loop {
            match self.receiver.recv().await {
                Ok(envelope) => {
                    if let Some(message) = self.accept(envelope) {
                        return Ok(message);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(topic = %self.topic_name, key = %self.key, skipped, "Subscriber lagged, messages dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return Err(RelayError::Closed),
            }
        }
    }

    fn try_recv(&mut self) -> Result<Option<RelayMessage>, RelayError> {
        loop {
            match self.receiver.try_recv() {
                Ok(envelope) => {
                    if let Some(message) = self.accept(envelope) {
                        return Ok(Some(message));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(topic = %self.topic_name, key = %self.key, skipped, "Subscriber lagged, messages dropped");
                }
                Err(broadcast::error::TryRecvError::Closed) => return Err(RelayError::Closed),
            }
        }
    }
}

impl Drop for MemoryChannel {
    fn drop(&mut self) {
        self.topic.untrack(self.id);
        let mut topics = self.relay.topics.write();
        // Our receiver is still alive here, hence <= 1.
        let idle = self.topic.sender.receiver_count() <= 1 && self.topic.presence.lock().is_empty();
        let ours = topics
            .get(&self.topic_name)
            .is_some_and(|topic| Arc::ptr_eq(topic, &self.topic));
        if idle && ours {
            topics.remove(&self.topic_name);
        }
        drop(topics);
        tracing::debug!(topic = %self.topic_name, key = %self.key, "Unsubscribed");
    }
}
