//! Context type for tracking command origin and trigger causality

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Context for tracking the origin and causality of command executions
///
/// Every command execution and every value-change event carries a Context.
/// Executions started by an event inherit a child context, so the chain of
/// event → command → event can be followed and bounded by `depth`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    /// Unique identifier for this context (ULID)
    pub id: String,

    /// Parent context ID for tracking causality chains
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    /// Number of event hops between the original request and this one
    #[serde(default)]
    pub depth: u32,
}

impl Context {
    /// Create a new root context with a fresh ULID
    pub fn new() -> Self {
        Self {
            id: Ulid::new().to_string(),
            parent_id: None,
            depth: 0,
        }
    }

    /// Create a new context with a specific ID
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent_id: None,
            depth: 0,
        }
    }

    /// Create a child context one trigger hop further down
    pub fn child(&self) -> Self {
        Self {
            id: Ulid::new().to_string(),
            parent_id: Some(self.id.clone()),
            depth: self.depth + 1,
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
