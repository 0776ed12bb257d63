//! Event bus for value-change notifications
//!
//! The gateway fires an [`Event`] whenever a cached node value changes.
//! Subscribers listen on one of three keys:
//! - `<node>.<attr>` for every change of that attribute
//! - `<node>.<attr>.<value>` for changes to one particular value
//! - `*` for everything

use dashmap::DashMap;
use nom_core::{Event, EventType};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Default channel capacity for event subscriptions
const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Broadcast hub for value-change events
pub struct EventBus {
    /// Senders keyed by `<node>.<attr>` or `<node>.<attr>.<value>`
    listeners: DashMap<EventType, broadcast::Sender<Event>>,
    /// Sender for MATCH_ALL subscribers
    match_all_sender: broadcast::Sender<Event>,
    capacity: usize,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (match_all_sender, _) = broadcast::channel(capacity);
        Self {
            listeners: DashMap::new(),
            match_all_sender,
            capacity,
        }
    }

    /// Subscribe to an attribute key or a value key
    pub fn subscribe(&self, event_type: impl Into<EventType>) -> broadcast::Receiver<Event> {
        let event_type = event_type.into();
        trace!(event_type = %event_type, "Subscribing to event type");

        if event_type.is_match_all() {
            return self.match_all_sender.subscribe();
        }

        self.listeners
            .entry(event_type)
            .or_insert_with(|| {
                let (tx, _) = broadcast::channel(self.capacity);
                tx
            })
            .subscribe()
    }

    /// Subscribe to all events
    pub fn subscribe_all(&self) -> broadcast::Receiver<Event> {
        self.match_all_sender.subscribe()
    }

    /// Deliver an event to its attribute key, its value key and MATCH_ALL
    pub fn fire(&self, event: Event) {
        let value_key = EventType::new(event.value_key());
        debug!(event = %value_key, depth = event.context.depth, "Firing event");

        for key in [&event.event_type, &value_key] {
            if let Some(sender) = self.listeners.get(key) {
                // No active receivers is not an error
                let _ = sender.send(event.clone());
            }
        }

        let _ = self.match_all_sender.send(event);
    }

    /// Number of distinct keys anyone ever subscribed to
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedEventBus = Arc<EventBus>;
