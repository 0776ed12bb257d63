//! Capability gateway for nomctrl
//!
//! The command core never talks to drivers directly. It asks the gateway
//! whether a node can read or write an attribute, reads and writes through
//! it, and looks up the last value the gateway saw.
//!
//! [`NodeGateway`] is the implementation backed by the topology. Every node
//! has its own lock, so a `set` and a concurrent fader tick on one node do not
//! interleave their cache writes while unrelated nodes proceed independently.

mod error;
mod gateway;

pub use error::DeviceError;
pub use gateway::NodeGateway;

use async_trait::async_trait;
use nom_core::{Context, Setter, Value};

/// What the command core needs from the device layer
#[async_trait]
pub trait CapabilityGateway: Send + Sync {
    /// Whether the node can read `attr`
    fn has_get(&self, node: &str, attr: &str) -> bool;

    /// Whether the node has the setter capability (`on`, `off`, `flip`, `brightness`, ...)
    fn has_set(&self, node: &str, capability: &str) -> bool;

    /// Read an attribute from the device
    async fn get(&self, node: &str, attr: &str, ctx: &Context) -> Result<Value, DeviceError>;

    /// Apply a setter
    async fn set(&self, setter: &Setter, ctx: &Context) -> Result<(), DeviceError>;

    /// Last known value, without touching the device
    fn current_value(&self, node: &str, attr: &str) -> Option<Value>;
}
