//! Topology-backed gateway with per-node serialization

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use indexmap::IndexMap;
use nom_core::{attrs, Context, Event, Setter, Value};
use nom_event_bus::SharedEventBus;
use nom_topology::{SharedNode, Topology};
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use crate::error::DeviceError;
use crate::CapabilityGateway;

/// Runtime state of one node
#[derive(Default)]
struct NodeCell {
    /// Held across a device call and the cache write that follows it
    lock: Mutex<()>,
    values: DashMap<String, Value>,
}

/// Gateway over the configured topology
pub struct NodeGateway {
    topology: Arc<Topology>,
    bus: SharedEventBus,
    cells: IndexMap<String, NodeCell>,
}

impl NodeGateway {
    pub fn new(topology: Arc<Topology>, bus: SharedEventBus) -> Self {
        let cells = topology
            .nodes()
            .map(|node| (node.id().to_string(), NodeCell::default()))
            .collect();
        Self {
            topology,
            bus,
            cells,
        }
    }

    pub fn topology(&self) -> &Arc<Topology> {
        &self.topology
    }

    fn lookup(&self, node: &str) -> Result<(&SharedNode, &NodeCell), DeviceError> {
        let found = self.topology.node(node).zip(self.cells.get(node));
        found.ok_or_else(|| DeviceError::UnknownNode(node.to_string()))
    }

    /// Update the cache and fire an event if the value changed
    fn remember(&self, node: &str, cell: &NodeCell, attr: &str, value: Value, ctx: &Context) {
        let previous = cell.values.insert(attr.to_string(), value.clone());
        if previous.as_ref() != Some(&value) {
            self.bus
                .fire(Event::value_changed(node, attr, value, ctx.clone()));
        }
    }

    /// All cached values of a node
    pub fn snapshot(&self, node: &str) -> Option<serde_json::Map<String, Value>> {
        self.cells.get(node).map(|cell| {
            cell.values
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().clone()))
                .collect()
        })
    }
}

#[async_trait]
impl CapabilityGateway for NodeGateway {
    fn has_get(&self, node: &str, attr: &str) -> bool {
        self.topology
            .node(node)
            .is_some_and(|n| n.has_get(attr))
    }

    fn has_set(&self, node: &str, capability: &str) -> bool {
        self.topology
            .node(node)
            .is_some_and(|n| n.has_set(capability))
    }

    #[instrument(skip(self, ctx), fields(ctx = %ctx.id))]
    async fn get(&self, node: &str, attr: &str, ctx: &Context) -> Result<Value, DeviceError> {
        let (shared, cell) = self.lookup(node)?;
        let _guard = cell.lock.lock().await;

        debug!("get {} {}", node, attr);
        let value = shared
            .device()
            .get(shared.device_attr(attr))
            .await
            .map_err(|e| {
                warn!(node = %node, attr = %attr, error = %e, "Getter failed");
                DeviceError::driver(node, e)
            })?
            .unwrap_or(Value::Null);

        if !value.is_null() {
            self.remember(node, cell, attr, value.clone(), ctx);
        }
        Ok(value)
    }

    #[instrument(skip(self, ctx), fields(ctx = %ctx.id))]
    async fn set(&self, setter: &Setter, ctx: &Context) -> Result<(), DeviceError> {
        let node = setter.node.as_str();
        let (shared, cell) = self.lookup(node)?;
        let _guard = cell.lock.lock().await;

        debug!("set {}", setter);
        let capability = shared.device_attr(setter.capability());
        shared
            .device()
            .set(capability, setter.value.clone())
            .await
            .map_err(|e| {
                warn!(node = %node, capability = %capability, error = %e, "Setter failed");
                DeviceError::driver(node, e)
            })?;

        match (setter.attr.as_str(), &setter.value) {
            (attrs::FLIP, _) => {
                let flipped = cell
                    .values
                    .get(attrs::STATE)
                    .and_then(|v| v.as_bool())
                    .map(|on| !on);
                if let Some(on) = flipped {
                    self.remember(node, cell, attrs::STATE, Value::Bool(on), ctx);
                }
            }
            (attr, Some(value)) => self.remember(node, cell, attr, value.clone(), ctx),
            (_, None) => {}
        }
        Ok(())
    }

    fn current_value(&self, node: &str, attr: &str) -> Option<Value> {
        self.cells
            .get(node)?
            .values
            .get(attr)
            .map(|v| v.value().clone())
    }
}
