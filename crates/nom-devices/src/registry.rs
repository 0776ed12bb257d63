//! Device type → driver registry

use std::sync::Arc;

use dashmap::DashMap;
use nom_config::{ConfigError, DeviceConfig};
use tracing::{debug, instrument};

use crate::device::Device;
use crate::error::DriverError;
use crate::table::DriverTable;
use crate::virtual_driver::VirtualDriver;

/// A device backend
///
/// Implementations read the driver-specific part of a device config entry
/// and return the handler table for that device.
pub trait DeviceDriver: Send + Sync {
    fn build(&self, config: &DeviceConfig) -> Result<DriverTable, DriverError>;
}

/// Known device types
pub struct DriverRegistry {
    drivers: DashMap<String, Arc<dyn DeviceDriver>>,
}

impl DriverRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self {
            drivers: DashMap::new(),
        }
    }

    /// A registry with the built-in `virtual` driver
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        registry.register("virtual", VirtualDriver);
        registry
    }

    #[instrument(skip(self, driver))]
    pub fn register(&self, device_type: &str, driver: impl DeviceDriver + 'static) {
        debug!(device_type = %device_type, "Registering driver");
        self.drivers.insert(device_type.to_string(), Arc::new(driver));
    }

    pub fn has_type(&self, device_type: &str) -> bool {
        self.drivers.contains_key(device_type)
    }

    /// Create a device from its config entry
    ///
    /// Optional `getters`/`setters` lists in the entry declare capabilities the
    /// device must have; a driver that cannot serve one of them is rejected here.
    #[instrument(skip(self, config), fields(device = %config.id))]
    pub fn create(&self, config: &DeviceConfig) -> Result<Device, ConfigError> {
        let driver = self
            .drivers
            .get(&config.device_type)
            .map(|d| d.value().clone())
            .ok_or_else(|| ConfigError::UnknownDeviceType {
                id: config.id.clone(),
                device_type: config.device_type.clone(),
            })?;

        let invalid = |e: DriverError| ConfigError::InvalidValue {
            key: format!("devices.{}", config.id),
            reason: e.to_string(),
        };

        let table = driver.build(config).map_err(invalid)?;
        table
            .validate(
                &config.id,
                declared(config, "getters"),
                declared(config, "setters"),
            )
            .map_err(invalid)?;

        debug!(device_type = %config.device_type, table = ?table, "Device created");
        Ok(Device::new(&config.id, &config.device_type, table))
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

/// String entries of a list option
pub(crate) fn declared<'a>(config: &'a DeviceConfig, key: &str) -> impl Iterator<Item = &'a str> {
    config
        .options
        .get(key)
        .and_then(|v| v.as_array())
        .into_iter()
        .flatten()
        .filter_map(|v| v.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct MeterDriver;

    impl DeviceDriver for MeterDriver {
        fn build(&self, _config: &DeviceConfig) -> Result<DriverTable, DriverError> {
            Ok(DriverTable::new().getter("power", || async { Ok(Some(json!(100))) }))
        }
    }

    fn device(id: &str, device_type: &str, options: serde_json::Value) -> DeviceConfig {
        DeviceConfig {
            id: id.to_string(),
            device_type: device_type.to_string(),
            options: options.as_object().cloned().unwrap_or_default(),
        }
    }

    #[tokio::test]
    async fn test_create_with_registered_driver() {
        let registry = DriverRegistry::new();
        registry.register("meter", MeterDriver);

        let meter = registry.create(&device("m", "meter", json!({}))).unwrap();
        assert_eq!(meter.device_type(), "meter");
        assert_eq!(meter.get("power").await, Ok(Some(json!(100))));
    }

    #[test]
    fn test_unknown_type() {
        let registry = DriverRegistry::with_builtin();
        assert!(registry.has_type("virtual"));
        let err = registry.create(&device("x", "zigbee", json!({}))).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownDeviceType { .. }));
    }

    #[test]
    fn test_declared_capability_missing() {
        let registry = DriverRegistry::new();
        registry.register("meter", MeterDriver);

        let err = registry
            .create(&device("m", "meter", json!({"setters": ["on"]})))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
