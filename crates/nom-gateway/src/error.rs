use nom_devices::DriverError;
use thiserror::Error;

/// A device call failed
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeviceError {
    #[error("Node \"{0}\" not found")]
    UnknownNode(String),

    #[error("Node \"{node}\": {source}")]
    Driver {
        node: String,
        #[source]
        source: DriverError,
    },
}

impl DeviceError {
    pub fn driver(node: &str, source: DriverError) -> Self {
        Self::Driver {
            node: node.to_string(),
            source,
        }
    }
}
