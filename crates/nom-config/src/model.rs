//! Typed configuration
//!
//! Parses the whole `nomctrl.yaml` document and checks everything that can be
//! checked without the device drivers: unique ids, references between
//! sections, timer times and color definitions.

use std::collections::HashSet;
use std::path::Path;

use indexmap::IndexMap;
use nom_core::{Location, Rgb, TimeSpec};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, error};

use crate::error::{ConfigError, ConfigResult};
use crate::loader::YamlLoader;

fn default_port() -> u16 {
    1337
}

fn default_timer_interval() -> u64 {
    60
}

fn default_fader_interval() -> u64 {
    2
}

fn default_single_interval() -> u64 {
    1
}

fn default_max_trigger_depth() -> u32 {
    4
}

/// The `app:` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP port of the command surface
    #[serde(default = "default_port")]
    pub port: u16,

    /// Seconds between strict timer ticks
    #[serde(default = "default_timer_interval", alias = "timer_seconds")]
    pub timer_interval: u64,

    /// Seconds between fader ticks
    #[serde(default = "default_fader_interval")]
    pub fader_interval: u64,

    /// Seconds between single-shot timer ticks
    #[serde(default = "default_single_interval")]
    pub single_interval: u64,

    /// How many event → command hops a chain may take
    #[serde(default = "default_max_trigger_depth")]
    pub max_trigger_depth: u32,

    /// tracing filter directive, e.g. `info` or `nom_gateway=debug`
    #[serde(default)]
    pub log_level: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            timer_interval: default_timer_interval(),
            fader_interval: default_fader_interval(),
            single_interval: default_single_interval(),
            max_trigger_depth: default_max_trigger_depth(),
            log_level: None,
        }
    }
}

/// A device; everything besides `id` and `type` belongs to the driver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub id: String,
    #[serde(rename = "type")]
    pub device_type: String,
    #[serde(flatten)]
    pub options: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub id: String,
    pub device: String,
    #[serde(default)]
    pub class: Option<String>,
    /// Brightness percent at which on/off-only devices switch on
    #[serde(default, alias = "thresh")]
    pub threshold: Option<u8>,
    /// Node attribute name → device attribute name
    #[serde(default)]
    pub map: IndexMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupConfig {
    pub id: String,
    #[serde(default)]
    pub nodes: Vec<String>,
    #[serde(default)]
    pub groups: Vec<String>,
}

/// One `timers:` entry; several entries with the same id form one timer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimerConfig {
    pub id: String,
    #[serde(default)]
    pub node: Option<String>,
    #[serde(default)]
    pub strict: bool,
    #[serde(default, deserialize_with = "scalar")]
    pub on: Option<String>,
    #[serde(default, deserialize_with = "scalar")]
    pub off: Option<String>,
    #[serde(default, deserialize_with = "scalar")]
    pub flip: Option<String>,
    #[serde(default, deserialize_with = "scalar")]
    pub at: Option<String>,
    #[serde(default, deserialize_with = "scalar")]
    pub set: Option<String>,
    #[serde(default, rename = "do")]
    pub do_action: Option<String>,
    #[serde(default)]
    pub cmd: Option<String>,
}

/// A timer after merging its config entries
#[derive(Debug, Clone, PartialEq)]
pub struct TimerDef {
    pub id: String,
    pub node: Option<String>,
    pub strict: bool,
    /// `(time, command)` in config order
    pub events: Vec<(TimeSpec, String)>,
}

/// One command or a list of them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Commands {
    One(String),
    Many(Vec<String>),
}

impl Commands {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Commands::One(cmd) => vec![cmd.clone()],
            Commands::Many(cmds) => cmds.clone(),
        }
    }
}

/// A macro action, optionally triggered by an event or a time of day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionConfig {
    #[serde(default)]
    pub id: Option<String>,
    /// `<node>.<attr>`, `<node>.<attr>.<value>` or a time spec
    #[serde(default, deserialize_with = "scalar")]
    pub event: Option<String>,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
    #[serde(rename = "do")]
    pub commands: Commands,
}

/// A named color: `rgb`, `hex` or an alias of another color
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorConfig {
    pub id: String,
    #[serde(default)]
    pub rgb: Option<Rgb>,
    #[serde(default)]
    pub hex: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

/// The complete configuration document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub location: Option<Location>,
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,
    #[serde(default)]
    pub groups: Vec<GroupConfig>,
    #[serde(default)]
    pub timers: Vec<TimerConfig>,
    #[serde(default)]
    pub actions: Vec<ActionConfig>,
    #[serde(default)]
    pub colors: Vec<ColorConfig>,
}

impl Config {
    /// Load, parse and validate a configuration file
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let value = YamlLoader::new(dir).load_file(path)?;
        let config = Self::from_value(value, path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate configuration from a YAML string
    pub fn from_yaml_str(content: &str) -> ConfigResult<Self> {
        let source = Path::new("nomctrl.yaml");
        let value = YamlLoader::new(".").load_string(content, source)?;
        let config = Self::from_value(value, source)?;
        config.validate()?;
        Ok(config)
    }

    fn from_value(value: serde_yaml::Value, source: &Path) -> ConfigResult<Self> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_yaml::from_value(value).map_err(|e| ConfigError::ParseYaml {
            path: source.to_path_buf(),
            source: e,
        })
    }

    /// Check ids and cross references; collects every problem found
    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();

        let devices = unique_ids("device", self.devices.iter().map(|d| &d.id), &mut errors);
        let nodes = unique_ids("node", self.nodes.iter().map(|n| &n.id), &mut errors);
        let groups = unique_ids("group", self.groups.iter().map(|g| &g.id), &mut errors);
        let colors = unique_ids("color", self.colors.iter().map(|c| &c.id), &mut errors);
        unique_ids(
            "action",
            self.actions.iter().filter_map(|a| a.id.as_ref()),
            &mut errors,
        );

        for node in &self.nodes {
            if !devices.contains(node.device.as_str()) {
                errors.push(unknown("node", &node.id, "device", &node.device));
            }
            if node.threshold.is_some_and(|t| t > 100) {
                errors.push(ConfigError::InvalidValue {
                    key: format!("nodes.{}.threshold", node.id),
                    reason: "must be between 0 and 100".to_string(),
                });
            }
        }

        for group in &self.groups {
            for member in &group.nodes {
                if !nodes.contains(member.as_str()) {
                    errors.push(unknown("group", &group.id, "node", member));
                }
            }
            for member in &group.groups {
                if !groups.contains(member.as_str()) {
                    errors.push(unknown("group", &group.id, "group", member));
                }
            }
        }

        for color in &self.colors {
            let defined = [color.rgb.is_some(), color.hex.is_some(), color.color.is_some()];
            if defined.iter().filter(|d| **d).count() != 1 {
                errors.push(ConfigError::InvalidValue {
                    key: format!("colors.{}", color.id),
                    reason: "needs exactly one of rgb, hex or color".to_string(),
                });
            }
            if let Some(hex) = &color.hex {
                if Rgb::from_hex(hex).is_none() {
                    errors.push(ConfigError::InvalidValue {
                        key: format!("colors.{}.hex", color.id),
                        reason: format!("\"{}\" is not a hex color", hex),
                    });
                }
            }
            if let Some(alias) = &color.color {
                if !colors.contains(alias.as_str()) {
                    errors.push(unknown("color", &color.id, "color", alias));
                }
            }
        }

        for timer in &self.timers {
            if let Some(node) = &timer.node {
                if !nodes.contains(node.as_str()) {
                    errors.push(unknown("timer", &timer.id, "node", node));
                }
            }
        }
        if let Err(e) = self.timer_defs() {
            errors.push(e);
        }

        for error in &errors {
            error!("Config Error: {}", error);
        }
        debug!(
            devices = self.devices.len(),
            nodes = self.nodes.len(),
            groups = self.groups.len(),
            timers = self.timers.len(),
            actions = self.actions.len(),
            "Configuration checked"
        );
        ConfigError::from_list(errors)
    }

    /// Merge timer entries by id and parse their times
    pub fn timer_defs(&self) -> ConfigResult<Vec<TimerDef>> {
        let mut defs: IndexMap<String, TimerDef> = IndexMap::new();
        let mut errors = Vec::new();

        for entry in &self.timers {
            let def = defs.entry(entry.id.clone()).or_insert_with(|| TimerDef {
                id: entry.id.clone(),
                node: entry.node.clone(),
                strict: entry.strict,
                events: Vec::new(),
            });
            if def.node != entry.node {
                errors.push(ConfigError::IncompatibleTimer(entry.id.clone()));
                continue;
            }
            def.strict |= entry.strict;

            for (time, cmd) in timer_events(entry) {
                match time.parse::<TimeSpec>() {
                    Ok(spec) => def.events.push((spec, cmd)),
                    Err(e) => errors.push(ConfigError::InvalidValue {
                        key: format!("timers.{}", entry.id),
                        reason: e.to_string(),
                    }),
                }
            }
        }

        ConfigError::from_list(errors)?;
        Ok(defs.into_values().collect())
    }
}

/// The `(time, command)` pairs one timer entry describes
fn timer_events(entry: &TimerConfig) -> Vec<(String, String)> {
    let mut events = Vec::new();

    if let Some(node) = &entry.node {
        for (time, word) in [(&entry.on, "on"), (&entry.off, "off"), (&entry.flip, "flip")] {
            if let Some(time) = time {
                events.push((time.clone(), format!("set {} {}", node, word)));
            }
        }
    }

    if let Some(at) = &entry.at {
        if let (Some(node), Some(set)) = (&entry.node, &entry.set) {
            events.push((at.clone(), format!("set {} {}", node, set)));
        }
        if let Some(action) = &entry.do_action {
            events.push((at.clone(), format!("do {}", action)));
        }
        if let Some(cmd) = &entry.cmd {
            events.push((at.clone(), cmd.clone()));
        }
    }

    events
}

fn unique_ids<'a>(
    kind: &'static str,
    ids: impl Iterator<Item = &'a String>,
    errors: &mut Vec<ConfigError>,
) -> HashSet<&'a str> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id.as_str()) {
            errors.push(ConfigError::DuplicateId {
                kind,
                id: id.clone(),
            });
        }
    }
    seen
}

fn unknown(kind: &'static str, id: &str, target_kind: &'static str, target: &str) -> ConfigError {
    ConfigError::UnknownReference {
        kind,
        id: id.to_string(),
        target_kind,
        target: target.to_string(),
    }
}

/// Accept strings, numbers and booleans as text
fn scalar<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    match Option::<serde_yaml::Value>::deserialize(deserializer)? {
        None | Some(serde_yaml::Value::Null) => Ok(None),
        Some(serde_yaml::Value::String(s)) => Ok(Some(s)),
        Some(serde_yaml::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(serde_yaml::Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(other) => Err(D::Error::custom(format!(
            "expected a string or number, got {:?}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    const EXAMPLE: &str = r##"
app:
  port: 8080
  timer_seconds: 30
location:
  lat: 48.78
  lng: 9.18
devices:
  - id: dimmer-1
    type: virtual
    setters: [on, off, brightness]
  - id: plug-1
    type: virtual
    setters: [on, off]
nodes:
  - id: desk
    device: dimmer-1
  - id: fan
    device: plug-1
    class: power
    thresh: 40
groups:
  - id: office
    nodes: [desk, fan]
timers:
  - id: desk-night
    node: desk
    strict: true
    on: "18:00"
    off: "23:30"
  - id: desk-night
    node: desk
    at: sunrise+30m
    set: 20%
actions:
  - id: movie
    do: ["set desk 10%", "set fan off"]
  - event: fan.state.true
    do: set desk on
colors:
  - id: red
    rgb: [255, 0, 0]
  - id: warm
    hex: "#f6cb90"
  - id: alarm
    color: red
"##;

    #[test]
    fn test_parse_example() {
        let config = Config::from_yaml_str(EXAMPLE).unwrap();

        assert_eq!(config.app.port, 8080);
        assert_eq!(config.app.timer_interval, 30);
        assert_eq!(config.app.fader_interval, 2);
        assert_eq!(config.location, Some(Location::new(48.78, 9.18)));
        assert_eq!(config.devices[0].device_type, "virtual");
        assert!(config.devices[0].options.contains_key("setters"));
        assert_eq!(config.nodes[1].threshold, Some(40));
        assert_eq!(config.actions[0].commands.to_vec().len(), 2);
        assert_eq!(config.colors[0].rgb, Some(Rgb::new(255, 0, 0)));
    }

    #[test]
    fn test_timer_entries_merge() {
        let config = Config::from_yaml_str(EXAMPLE).unwrap();
        let defs = config.timer_defs().unwrap();

        assert_eq!(defs.len(), 1);
        let commands: Vec<&str> = defs[0].events.iter().map(|(_, c)| c.as_str()).collect();
        assert_eq!(commands, vec!["set desk on", "set desk off", "set desk 20%"]);
        assert!(defs[0].strict);
    }

    #[test]
    fn test_incompatible_timer_merge() {
        let config = Config {
            nodes: vec![],
            timers: vec![
                TimerConfig {
                    id: "t".into(),
                    node: Some("a".into()),
                    ..Default::default()
                },
                TimerConfig {
                    id: "t".into(),
                    node: Some("b".into()),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        assert!(matches!(
            config.timer_defs(),
            Err(ConfigError::IncompatibleTimer(_))
        ));
    }

    #[test]
    fn test_validation_collects_problems() {
        let yaml = r#"
devices:
  - id: d
    type: virtual
  - id: d
    type: virtual
nodes:
  - id: n
    device: missing
groups:
  - id: g
    nodes: [n, ghost]
timers:
  - id: t
    node: n
    on: "half past nine"
"#;
        let err = Config::from_yaml_str(yaml).unwrap_err();
        let errors = match err {
            ConfigError::Multiple(errors) => errors,
            other => panic!("expected several errors, got {other}"),
        };
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::DuplicateId { kind: "device", .. })));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::UnknownReference { target_kind: "device", .. })));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::UnknownReference { target_kind: "node", .. })));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_color_needs_one_definition() {
        let yaml = "colors:\n  - id: odd\n    hex: '#ff0000'\n    rgb: [1, 2, 3]\n";
        assert!(Config::from_yaml_str(yaml).is_err());
    }

    #[test]
    fn test_empty_document() {
        let config = Config::from_yaml_str("").unwrap();
        assert_eq!(config.app, AppConfig::default());
        assert!(config.nodes.is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let mut file = std::fs::File::create(dir.path().join("nomctrl.yaml")).unwrap();
        file.write_all(EXAMPLE.as_bytes()).unwrap();

        let config = Config::load(dir.path().join("nomctrl.yaml")).unwrap();
        assert_eq!(config.groups[0].nodes, vec!["desk", "fan"]);
    }
}
