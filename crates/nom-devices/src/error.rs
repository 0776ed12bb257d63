use thiserror::Error;

/// Result of one driver call; setters usually return `None`
pub type DriverResult = Result<Option<nom_core::Value>, DriverError>;

/// Errors raised by drivers
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DriverError {
    #[error("device {device} has no {kind} \"{attr}\"")]
    NotSupported {
        device: String,
        kind: &'static str,
        attr: String,
    },

    #[error("invalid value for \"{attr}\": {reason}")]
    InvalidValue { attr: String, reason: String },

    #[error("invalid config for device {device}: {reason}")]
    InvalidConfig { device: String, reason: String },

    #[error("device {device} failed: {reason}")]
    Transport { device: String, reason: String },
}
