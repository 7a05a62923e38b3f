//! Topic-based publish/subscribe message bus.
//!
//! [`MemoryBus`] uses a [`tokio::sync::broadcast`] channel under the hood so
//! that every subscriber receives every message without any single subscriber
//! blocking the others, plus a retained-message table: the last payload
//! published with `retain = true` on each topic is replayed to new
//! subscribers, so a client connecting late immediately sees the agent's
//! last known state.
//!
//! Topic filters support the single-level `+` wildcard, e.g.
//! `robot/+/state` matches `robot/servos/state` and `robot/motors/state`.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use simplebot_types::RobotError;
use tokio::sync::broadcast;
use tracing::warn;

/// Default channel capacity (number of buffered messages before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

/// One message delivered on a topic.
#[derive(Debug, Clone)]
pub struct BusMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Narrow transport capability both sides of the robot are built against.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publish `payload` on `topic`.  With `retain`, the payload also becomes
    /// the topic's retained message, replayed to future subscribers.
    ///
    /// Publishing with no active subscribers is a normal condition, not an
    /// error.
    async fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool)
    -> Result<(), RobotError>;

    /// Subscribe to every topic matching `filter` (`+` = one segment).
    ///
    /// Retained messages matching the filter are delivered first, then live
    /// traffic.
    fn subscribe(&self, filter: &str) -> BusSubscription;
}

// ─────────────────────────────────────────────────────────────────────────────
// Topic filter
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct TopicFilter {
    segments: Vec<String>,
}

impl TopicFilter {
    fn new(filter: &str) -> Self {
        Self {
            segments: filter.split('/').map(str::to_string).collect(),
        }
    }

    fn matches(&self, topic: &str) -> bool {
        let topic_segments: Vec<&str> = topic.split('/').collect();
        if topic_segments.len() != self.segments.len() {
            return false;
        }
        self.segments
            .iter()
            .zip(&topic_segments)
            .all(|(pattern, segment)| pattern == "+" || pattern == segment)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// MemoryBus
// ─────────────────────────────────────────────────────────────────────────────

/// In-process bus.  Clone-free: share it behind an `Arc<dyn MessageBus>`.
#[derive(Debug)]
pub struct MemoryBus {
    sender: broadcast::Sender<BusMessage>,
    retained: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBus {
    /// Create a new bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            retained: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[async_trait]
impl MessageBus for MemoryBus {
    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        retain: bool,
    ) -> Result<(), RobotError> {
        if retain {
            self.retained
                .lock()
                .map_err(|e| RobotError::Channel(format!("retained table poisoned: {e}")))?
                .insert(topic.to_string(), payload.clone());
        }
        // SendError here only means "no subscribers right now".
        let _ = self.sender.send(BusMessage {
            topic: topic.to_string(),
            payload,
        });
        Ok(())
    }

    fn subscribe(&self, filter: &str) -> BusSubscription {
        let filter = TopicFilter::new(filter);
        // Attach the live receiver before snapshotting the retained table, so
        // a concurrent publish is seen at least once (duplicates are fine
        // under replace semantics, gaps are not).
        let receiver = self.sender.subscribe();
        let backlog = match self.retained.lock() {
            Ok(retained) => retained
                .iter()
                .filter(|(topic, _)| filter.matches(topic))
                .map(|(topic, payload)| BusMessage {
                    topic: topic.clone(),
                    payload: payload.clone(),
                })
                .collect(),
            Err(e) => {
                warn!(error = %e, "retained table poisoned; skipping replay");
                VecDeque::new()
            }
        };
        BusSubscription {
            filter,
            backlog,
            receiver,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Subscription
// ─────────────────────────────────────────────────────────────────────────────

/// A receiver bound to one topic filter, obtained via
/// [`MessageBus::subscribe`].
pub struct BusSubscription {
    filter: TopicFilter,
    backlog: VecDeque<BusMessage>,
    receiver: broadcast::Receiver<BusMessage>,
}

impl BusSubscription {
    /// Wait for the next message matching this subscription's filter.
    ///
    /// Returns `None` when the bus has shut down.  A slow subscriber that
    /// falls behind loses the oldest messages and continues; the gap is
    /// logged, matching the bus's at-most-latest delivery model.
    pub async fn recv(&mut self) -> Option<BusMessage> {
        if let Some(message) = self.backlog.pop_front() {
            return Some(message);
        }
        loop {
            match self.receiver.recv().await {
                Ok(message) if self.filter.matches(&message.topic) => return Some(message),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(lagged_by = n, "bus subscription lagged; messages dropped");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
