//! Event bus implementation using tokio broadcast channels

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::types::{BuildEvent, EventEnvelope};

/// Capacity for the broadcast channel
const DEFAULT_CAPACITY: usize = 1000;

/// Number of builds whose history is kept by default
const DEFAULT_HISTORY_LIMIT: usize = 100;

/// Per-build event history, oldest build first
#[derive(Default)]
struct History {
    builds: HashMap<Uuid, Vec<EventEnvelope>>,
    order: VecDeque<Uuid>,
}

impl History {
    fn record(&mut self, envelope: EventEnvelope, limit: usize) {
        let build_id = envelope.build_id;
        if !self.builds.contains_key(&build_id) {
            self.order.push_back(build_id);
            while self.order.len() > limit {
                if let Some(oldest) = self.order.pop_front() {
                    self.builds.remove(&oldest);
                }
            }
        }
        self.builds.entry(build_id).or_default().push(envelope);
    }

    fn remove(&mut self, build_id: &Uuid) {
        if self.builds.remove(build_id).is_some() {
            self.order.retain(|id| id != build_id);
        }
    }
}

/// Event bus for publishing and subscribing to build events
///
/// Every published event is also appended to the history of its build, so
/// late subscribers can replay what they missed. Only the most recent
/// builds are kept (see [`EventBus::with_history_limit`]); callers that are
/// done with a build can drop it early with [`EventBus::forget`].
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventEnvelope>,
    history: Arc<RwLock<History>>,
    history_limit: usize,
    /// Number of events published (for monitoring)
    event_count: Arc<AtomicUsize>,
}

impl EventBus {
    /// Create a new event bus with default capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a new event bus with specified capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            history: Arc::new(RwLock::new(History::default())),
            history_limit: DEFAULT_HISTORY_LIMIT,
            event_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Keep the history of at most `builds` builds, evicting the oldest
    /// first. A limit of 0 is treated as 1.
    pub fn with_history_limit(mut self, builds: usize) -> Self {
        self.history_limit = builds.max(1);
        self
    }

    /// Publish an event to all subscribers
    ///
    /// Returns the number of subscribers that received the event.
    /// The event is kept in the build's history even without subscribers.
    pub fn publish(&self, envelope: EventEnvelope) -> usize {
        self.event_count.fetch_add(1, Ordering::Relaxed);
        self.history
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .record(envelope.clone(), self.history_limit);
        self.sender.send(envelope).unwrap_or(0)
    }

    /// Wrap `event` in an envelope for `build_id` and publish it
    pub fn emit(&self, build_id: Uuid, event: BuildEvent) -> usize {
        self.publish(EventEnvelope::new(build_id, event))
    }

    /// Subscribe to events
    ///
    /// Events published before subscribing are only available via
    /// [`EventBus::history`].
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    /// All events published so far for a build, in publish order
    pub fn history(&self, build_id: Uuid) -> Vec<EventEnvelope> {
        self.history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .builds
            .get(&build_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Drop the stored history of a build
    pub fn forget(&self, build_id: Uuid) {
        self.history
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&build_id);
    }

    /// Get the number of current subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Get the total number of events published
    pub fn event_count(&self) -> usize {
        self.event_count.load(Ordering::Relaxed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .field("event_count", &self.event_count())
            .finish()
    }
}
