//! The validated device/node/group graph

use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexMap;
use nom_config::{Config, ConfigError};
use nom_core::CommandOptions;
use nom_devices::{DriverRegistry, SharedDevice};
use tracing::{debug, error, info};

use crate::actions::ActionTable;
use crate::colors::ColorTable;
use crate::groups::flatten_groups;
use crate::node::{Node, SharedNode};

/// Devices, nodes and groups, plus the color and action tables
#[derive(Debug, Default)]
pub struct Topology {
    devices: IndexMap<String, SharedDevice>,
    nodes: IndexMap<String, SharedNode>,
    groups: IndexMap<String, Vec<String>>,
    /// Nodes owned by a strict timer
    strict_nodes: HashSet<String>,
    colors: ColorTable,
    actions: ActionTable,
}

impl Topology {
    /// Build the topology; any problem is fatal
    pub fn from_config(config: &Config, registry: &DriverRegistry) -> Result<Self, ConfigError> {
        info!("Loading devices...");
        let mut errors = Vec::new();
        let mut topology = Self::default();

        for device_config in &config.devices {
            match registry.create(device_config) {
                Ok(device) => {
                    topology
                        .devices
                        .insert(device_config.id.clone(), Arc::new(device));
                }
                Err(e) => errors.push(e),
            }
        }

        info!("Loading nodes...");
        for node_config in &config.nodes {
            match topology.devices.get(&node_config.device) {
                Some(device) => {
                    let node = Node::new(node_config, device.clone());
                    topology.nodes.insert(node_config.id.clone(), Arc::new(node));
                }
                None => errors.push(ConfigError::UnknownReference {
                    kind: "node",
                    id: node_config.id.clone(),
                    target_kind: "device",
                    target: node_config.device.clone(),
                }),
            }
        }

        info!("Loading groups...");
        let (groups, group_errors) = flatten_groups(&config.groups);
        errors.extend(group_errors);
        let configured: HashSet<&str> = config.nodes.iter().map(|n| n.id.as_str()).collect();
        for (id, members) in &groups {
            for member in members {
                if !configured.contains(member.as_str()) {
                    errors.push(ConfigError::UnknownReference {
                        kind: "group",
                        id: id.clone(),
                        target_kind: "node",
                        target: member.clone(),
                    });
                }
            }
        }
        topology.groups = groups;

        match config.timer_defs() {
            Ok(timers) => {
                topology.strict_nodes = timers
                    .into_iter()
                    .filter(|t| t.strict)
                    .filter_map(|t| t.node)
                    .collect();
            }
            Err(e) => errors.push(e),
        }

        match ColorTable::from_config(&config.colors) {
            Ok(colors) => topology.colors = colors,
            Err(e) => errors.push(e),
        }
        topology.actions = ActionTable::from_config(&config.actions);

        for e in &errors {
            error!("Config Error: {}", e);
        }
        ConfigError::from_list(errors)?;

        debug!(
            devices = topology.devices.len(),
            nodes = topology.nodes.len(),
            groups = topology.groups.len(),
            strict = topology.strict_nodes.len(),
            "Topology loaded"
        );
        Ok(topology)
    }

    pub fn node(&self, id: &str) -> Option<&SharedNode> {
        self.nodes.get(id)
    }

    /// All nodes in config order
    pub fn nodes(&self) -> impl Iterator<Item = &SharedNode> {
        self.nodes.values()
    }

    pub fn device(&self, id: &str) -> Option<&SharedDevice> {
        self.devices.get(id)
    }

    pub fn devices(&self) -> impl Iterator<Item = &SharedDevice> {
        self.devices.values()
    }

    /// Flattened member ids of a group
    pub fn group(&self, id: &str) -> Option<&[String]> {
        self.groups.get(id).map(Vec::as_slice)
    }

    /// Whether a strict timer owns the node
    pub fn is_timed(&self, node: &str) -> bool {
        self.strict_nodes.contains(node)
    }

    /// Resolve a node or group id
    ///
    /// A node id always resolves to that node. A group resolves to its
    /// members, minus nodes owned by a strict timer unless
    /// `options.include_timed` is set. An empty result means the token is
    /// not a target.
    pub fn resolve(&self, token: &str, options: CommandOptions) -> Vec<SharedNode> {
        if let Some(node) = self.nodes.get(token) {
            return vec![node.clone()];
        }
        let Some(members) = self.groups.get(token) else {
            return Vec::new();
        };
        members
            .iter()
            .filter(|id| options.include_timed || !self.is_timed(id))
            .filter_map(|id| self.nodes.get(id.as_str()).cloned())
            .collect()
    }

    /// Default target when a command names none
    pub fn all_nodes(&self, options: CommandOptions) -> Vec<SharedNode> {
        self.nodes
            .values()
            .filter(|node| options.include_timed || !self.is_timed(node.id()))
            .cloned()
            .collect()
    }

    pub fn colors(&self) -> &ColorTable {
        &self.colors
    }

    pub fn actions(&self) -> &ActionTable {
        &self.actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
devices:
  - id: d1
    type: virtual
    setters: [on, off, brightness]
  - id: d2
    type: virtual
    setters: [on, off]
  - id: d3
    type: virtual
    setters: [on, off, brightness]
nodes:
  - id: ceiling
    device: d1
  - id: corner
    device: d2
    thresh: 40
  - id: reading
    device: d3
groups:
  - id: living
    nodes: [ceiling, corner, reading]
  - id: all
    groups: [living]
timers:
  - id: reading-night
    node: reading
    strict: true
    on: "18:00"
    off: "23:00"
"#;

    fn topology() -> Topology {
        let config = Config::from_yaml_str(CONFIG).unwrap();
        Topology::from_config(&config, &DriverRegistry::with_builtin()).unwrap()
    }

    fn ids(nodes: &[SharedNode]) -> Vec<&str> {
        nodes.iter().map(|n| n.id()).collect()
    }

    #[test]
    fn test_resolve_node_and_group() {
        let topo = topology();

        assert_eq!(ids(&topo.resolve("corner", CommandOptions::default())), vec!["corner"]);
        assert_eq!(
            ids(&topo.resolve("all", CommandOptions::timed())),
            vec!["ceiling", "corner", "reading"]
        );
        assert!(topo.resolve("kitchen", CommandOptions::default()).is_empty());
        assert_eq!(topo.node("corner").and_then(|n| n.threshold()), Some(40));
    }

    #[test]
    fn test_strict_timer_nodes_excluded_from_groups() {
        let topo = topology();

        assert!(topo.is_timed("reading"));
        assert_eq!(
            ids(&topo.resolve("living", CommandOptions::default())),
            vec!["ceiling", "corner"]
        );
        // direct reference still works
        assert_eq!(
            ids(&topo.resolve("reading", CommandOptions::default())),
            vec!["reading"]
        );
        assert_eq!(topo.all_nodes(CommandOptions::default()).len(), 2);
        assert_eq!(topo.all_nodes(CommandOptions::timed()).len(), 3);
    }

    #[test]
    fn test_cyclic_groups_are_fatal() {
        let mut config = Config::from_yaml_str(CONFIG).unwrap();
        config.groups.push(nom_config::GroupConfig {
            id: "loop".into(),
            nodes: vec![],
            groups: vec!["loop".into()],
        });

        let err = Topology::from_config(&config, &DriverRegistry::with_builtin()).unwrap_err();
        assert!(matches!(err, ConfigError::CyclicGroup(ref g) if g == "loop"));
    }

    #[test]
    fn test_unknown_device_type_is_fatal() {
        let mut config = Config::from_yaml_str(CONFIG).unwrap();
        config.devices[0].device_type = "zwave".into();

        let err = Topology::from_config(&config, &DriverRegistry::with_builtin()).unwrap_err();
        // the device and the node built on it are both reported
        assert!(matches!(err, ConfigError::Multiple(ref e) if e.len() == 2));
    }
}
