//! Value-change events published on the event bus

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value::render;
use crate::{Context, Value};

/// Event type identifier
///
/// Value-change events use `<node>.<attr>`; subscribers that care about a
/// particular value match `<node>.<attr>.<value>` against [`Event::value_key`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventType(String);

impl EventType {
    /// Create a new event type
    pub fn new(event_type: impl Into<String>) -> Self {
        Self(event_type.into())
    }

    /// Event type for a node attribute
    pub fn for_attr(node: &str, attr: &str) -> Self {
        Self(format!("{}.{}", node, attr))
    }

    /// Get the event type as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Special event type that matches all events
    pub fn match_all() -> Self {
        Self("*".to_string())
    }

    /// Check if this is the MATCH_ALL event type
    pub fn is_match_all(&self) -> bool {
        self.0 == "*"
    }
}

impl From<&str> for EventType {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for EventType {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A cached node value changed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// `<node>.<attr>`
    pub event_type: EventType,

    /// Node whose value changed
    pub node: String,

    /// Attribute that changed
    pub attr: String,

    /// The new value
    pub value: Value,

    /// When the event was fired
    pub time_fired: DateTime<Utc>,

    /// Context of the execution that caused the change
    pub context: Context,
}

impl Event {
    /// Create a value-change event with current timestamp
    pub fn value_changed(
        node: impl Into<String>,
        attr: impl Into<String>,
        value: Value,
        context: Context,
    ) -> Self {
        let node = node.into();
        let attr = attr.into();
        Self {
            event_type: EventType::for_attr(&node, &attr),
            node,
            attr,
            value,
            time_fired: Utc::now(),
            context,
        }
    }

    /// `<node>.<attr>.<value>`
    pub fn value_key(&self) -> String {
        format!("{}.{}", self.event_type, render(&self.value))
    }
}
