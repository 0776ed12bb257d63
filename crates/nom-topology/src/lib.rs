//! Topology for nomctrl
//!
//! Devices, nodes and groups as loaded from configuration, plus the color and
//! action tables the command compiler looks names up in. The topology is
//! validated once at startup and immutable afterwards; per-node runtime state
//! lives in the gateway.

mod actions;
mod colors;
mod groups;
mod node;
mod topology;

pub use actions::ActionTable;
pub use colors::ColorTable;
pub use groups::flatten_groups;
pub use node::{Node, SharedNode};
pub use topology::Topology;
