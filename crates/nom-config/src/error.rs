//! Error types for configuration loading and validation

use std::path::PathBuf;
use thiserror::Error;

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors that make a configuration unusable
///
/// Anything in here is fatal at startup: the controller refuses to run
/// with an invalid topology.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse YAML in {path}: {source}")]
    ParseYaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid include path '{path}': {reason}")]
    InvalidIncludePath { path: String, reason: String },

    #[error("circular include detected: {path}")]
    CircularInclude { path: PathBuf },

    #[error("environment variable '{var}' not set")]
    EnvVarNotFound { var: String },

    #[error("invalid configuration value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("duplicate {kind} id \"{id}\"")]
    DuplicateId { kind: &'static str, id: String },

    #[error("{kind} \"{id}\" references unknown {target_kind} \"{target}\"")]
    UnknownReference {
        kind: &'static str,
        id: String,
        target_kind: &'static str,
        target: String,
    },

    #[error("device \"{id}\" has unknown type \"{device_type}\"")]
    UnknownDeviceType { id: String, device_type: String },

    #[error("circular reference with group \"{0}\"")]
    CyclicGroup(String),

    #[error("circular color alias \"{0}\"")]
    CyclicColor(String),

    #[error("incompatible timer configuration on timer \"{0}\"")]
    IncompatibleTimer(String),

    #[error("trigger depth {depth} exceeds maximum {max} for event \"{event}\"")]
    TriggerDepthExceeded { event: String, depth: u32, max: u32 },

    #[error("configuration validation failed: {message}")]
    ValidationFailed { message: String },

    /// Several problems found in one pass
    #[error("{} configuration errors: {}", .0.len(), join(.0))]
    Multiple(Vec<ConfigError>),
}

impl ConfigError {
    /// Collapse a list of problems into one error, `Ok` if there are none
    pub fn from_list(mut errors: Vec<ConfigError>) -> ConfigResult<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::Multiple(errors)),
        }
    }
}

fn join(errors: &[ConfigError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
