//! Logical control points

use std::sync::Arc;

use indexmap::IndexMap;
use nom_config::NodeConfig;
use nom_devices::SharedDevice;

/// A node wraps exactly one device
///
/// The node's attribute names are the device's, except where `map` renames
/// them: `map: { power: watts }` exposes the device attribute `watts` as the
/// node attribute `power`.
#[derive(Debug)]
pub struct Node {
    id: String,
    device: SharedDevice,
    class: Option<String>,
    threshold: Option<u8>,
    map: IndexMap<String, String>,
}

pub type SharedNode = Arc<Node>;

impl Node {
    pub fn new(config: &NodeConfig, device: SharedDevice) -> Self {
        Self {
            id: config.id.clone(),
            device,
            class: config.class.clone(),
            threshold: config.threshold,
            map: config.map.clone(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn device(&self) -> &SharedDevice {
        &self.device
    }

    pub fn class(&self) -> Option<&str> {
        self.class.as_deref()
    }

    pub fn threshold(&self) -> Option<u8> {
        self.threshold
    }

    /// Device attribute behind a node attribute
    pub fn device_attr<'a>(&'a self, attr: &'a str) -> &'a str {
        self.map.get(attr).map(String::as_str).unwrap_or(attr)
    }

    /// Node attribute name for a device attribute
    fn node_attr(&self, device_attr: &str) -> String {
        self.map
            .iter()
            .find(|(_, to)| to.as_str() == device_attr)
            .map(|(from, _)| from.clone())
            .unwrap_or_else(|| device_attr.to_string())
    }

    pub fn has_get(&self, attr: &str) -> bool {
        self.device.has_get(self.device_attr(attr))
    }

    pub fn has_set(&self, capability: &str) -> bool {
        self.device.has_set(self.device_attr(capability))
    }

    /// Readable attributes, in node names
    pub fn getters(&self) -> Vec<String> {
        self.device
            .getters()
            .iter()
            .map(|attr| self.node_attr(attr))
            .collect()
    }

    pub fn is_online(&self) -> bool {
        self.device.is_online()
    }
}
