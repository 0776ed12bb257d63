//! A configured device with its handler table and liveness flag

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nom_core::{attrs, Value};
use tracing::{debug, info, warn};

use crate::error::DriverResult;
use crate::table::DriverTable;

/// One device: id, type, capabilities and whether it is reachable
#[derive(Debug)]
pub struct Device {
    id: String,
    device_type: String,
    table: DriverTable,
    online: AtomicBool,
}

pub type SharedDevice = Arc<Device>;

impl Device {
    pub fn new(id: impl Into<String>, device_type: impl Into<String>, table: DriverTable) -> Self {
        Self {
            id: id.into(),
            device_type: device_type.into(),
            table,
            online: AtomicBool::new(true),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn device_type(&self) -> &str {
        &self.device_type
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// `online` is always readable
    pub fn has_get(&self, attr: &str) -> bool {
        attr == attrs::ONLINE || self.table.has_get(attr)
    }

    pub fn has_set(&self, capability: &str) -> bool {
        self.table.has_set(capability)
    }

    /// Getter names, `online` last
    pub fn getters(&self) -> Vec<String> {
        let mut names: Vec<String> = self.table.getter_names().map(String::from).collect();
        if !self.table.has_get(attrs::ONLINE) {
            names.push(attrs::ONLINE.to_string());
        }
        names
    }

    pub async fn get(&self, attr: &str) -> DriverResult {
        if attr == attrs::ONLINE && !self.table.has_get(attr) {
            return Ok(Some(Value::Bool(self.is_online())));
        }
        let handler = self.table.get_handler(&self.id, attr)?;
        debug!(device = %self.id, attr = %attr, "get");
        let result = handler().await;
        self.track(&result);
        result
    }

    pub async fn set(&self, capability: &str, value: Option<Value>) -> DriverResult {
        let handler = self.table.set_handler(&self.id, capability)?;
        debug!(device = %self.id, capability = %capability, value = ?value, "set");
        let result = handler(value).await;
        self.track(&result);
        result
    }

    /// Follow call outcomes: failures take the device offline, successes bring it back
    fn track(&self, result: &DriverResult) {
        let online = result.is_ok();
        let was_online = self.online.swap(online, Ordering::SeqCst);
        match (was_online, online) {
            (true, false) => warn!(device = %self.id, "Device went offline"),
            (false, true) => info!(device = %self.id, "Device is back online"),
            _ => {}
        }
    }
}
