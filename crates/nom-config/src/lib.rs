//! YAML configuration loading for nomctrl
//!
//! The configuration is one YAML document, optionally split over several
//! files with `!include path`. Values can be taken from the environment with
//! `!env_var NAME [default]`.
//!
//! # Example
//!
//! ```ignore
//! use nom_config::Config;
//!
//! let config = Config::load("/etc/nomctrl/nomctrl.yaml")?;
//! println!("listening on {}", config.app.port);
//! ```

mod error;
mod loader;
mod model;

pub use error::{ConfigError, ConfigResult};
pub use loader::YamlLoader;
pub use model::{
    ActionConfig, AppConfig, ColorConfig, Commands, Config, DeviceConfig, GroupConfig,
    NodeConfig, TimerConfig, TimerDef,
};

pub use serde_yaml::Value;
