//! In-memory devices for dry runs and tests
//!
//! ```yaml
//! devices:
//!   - id: desk-lamp
//!     type: virtual
//!     getters: [state, brightness]
//!     setters: [on, off, flip, brightness]
//!     values: { state: false, brightness: 0 }
//! ```
//!
//! `offline: true` makes every call fail, which is handy for exercising
//! error paths.

use std::sync::Arc;

use dashmap::DashMap;
use nom_config::DeviceConfig;
use nom_core::{attrs, Rgb, Value};
use tracing::trace;

use crate::error::{DriverError, DriverResult};
use crate::registry::{declared, DeviceDriver};
use crate::table::DriverTable;

/// Driver for the `virtual` device type
#[derive(Debug, Clone, Copy, Default)]
pub struct VirtualDriver;

type Store = Arc<DashMap<String, Value>>;

impl DeviceDriver for VirtualDriver {
    fn build(&self, config: &DeviceConfig) -> Result<DriverTable, DriverError> {
        let store: Store = Arc::new(DashMap::new());
        if let Some(values) = config.options.get("values") {
            let values = values.as_object().ok_or_else(|| DriverError::InvalidConfig {
                device: config.id.clone(),
                reason: "values must be a mapping".to_string(),
            })?;
            for (attr, value) in values {
                store.insert(attr.clone(), value.clone());
            }
        }

        let offline = config
            .options
            .get("offline")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let mut table = DriverTable::new();
        for attr in declared(config, "getters") {
            let store = store.clone();
            let device = config.id.clone();
            let attr = attr.to_string();
            let handler_attr = attr.clone();
            table = table.getter(attr, move || {
                let result = if offline {
                    Err(unreachable(&device))
                } else {
                    Ok(Some(read(&store, &handler_attr)))
                };
                async move { result }
            });
        }

        for capability in declared(config, "setters") {
            let store = store.clone();
            let device = config.id.clone();
            let capability = capability.to_string();
            let handler_capability = capability.clone();
            table = table.setter(capability, move |value| {
                let result = if offline {
                    Err(unreachable(&device))
                } else {
                    write(&store, &handler_capability, value)
                };
                async move { result }
            });
        }

        Ok(table)
    }
}

fn unreachable(device: &str) -> DriverError {
    DriverError::Transport {
        device: device.to_string(),
        reason: "virtual device is offline".to_string(),
    }
}

fn read(store: &Store, attr: &str) -> Value {
    if attr == attrs::STATUS && !store.contains_key(attr) {
        let status: serde_json::Map<String, Value> = store
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        return Value::Object(status);
    }
    store.get(attr).map(|v| v.value().clone()).unwrap_or(Value::Null)
}

fn write(store: &Store, capability: &str, value: Option<Value>) -> DriverResult {
    trace!(capability = %capability, value = ?value, "virtual write");
    match capability {
        attrs::ON => {
            store.insert(attrs::STATE.to_string(), Value::Bool(true));
        }
        attrs::OFF => {
            store.insert(attrs::STATE.to_string(), Value::Bool(false));
        }
        attrs::FLIP => {
            let on = store
                .get(attrs::STATE)
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            store.insert(attrs::STATE.to_string(), Value::Bool(!on));
        }
        attrs::BRIGHTNESS => {
            let percent = value
                .as_ref()
                .and_then(Value::as_u64)
                .filter(|p| *p <= 100)
                .ok_or_else(|| DriverError::InvalidValue {
                    attr: capability.to_string(),
                    reason: "expected a percentage between 0 and 100".to_string(),
                })?;
            store.insert(capability.to_string(), Value::from(percent));
        }
        attrs::COLOR => {
            let rgb = value
                .as_ref()
                .and_then(Rgb::from_value)
                .ok_or_else(|| DriverError::InvalidValue {
                    attr: capability.to_string(),
                    reason: "expected [r, g, b]".to_string(),
                })?;
            store.insert(capability.to_string(), rgb.to_value());
        }
        other => {
            store.insert(other.to_string(), value.unwrap_or(Value::Null));
        }
    }
    Ok(None)
}
