//! Capability lookup tables

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use indexmap::IndexMap;
use nom_core::Value;

use crate::error::{DriverError, DriverResult};

/// Future returned by driver handlers
pub type DriverFuture = Pin<Box<dyn Future<Output = DriverResult> + Send>>;

/// Reads one attribute
pub type GetHandler = Arc<dyn Fn() -> DriverFuture + Send + Sync>;

/// Writes one capability; triggers receive `None`
pub type SetHandler = Arc<dyn Fn(Option<Value>) -> DriverFuture + Send + Sync>;

/// Capability name → handler, for getters and setters
#[derive(Clone, Default)]
pub struct DriverTable {
    getters: IndexMap<String, GetHandler>,
    setters: IndexMap<String, SetHandler>,
}

impl DriverTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a getter
    pub fn getter<F, Fut>(mut self, attr: impl Into<String>, handler: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = DriverResult> + Send + 'static,
    {
        let handler: GetHandler = Arc::new(move || Box::pin(handler()) as DriverFuture);
        self.getters.insert(attr.into(), handler);
        self
    }

    /// Add a setter
    pub fn setter<F, Fut>(mut self, attr: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = DriverResult> + Send + 'static,
    {
        let handler: SetHandler = Arc::new(move |value| Box::pin(handler(value)) as DriverFuture);
        self.setters.insert(attr.into(), handler);
        self
    }

    pub fn has_get(&self, attr: &str) -> bool {
        self.getters.contains_key(attr)
    }

    pub fn has_set(&self, attr: &str) -> bool {
        self.setters.contains_key(attr)
    }

    /// Getter names in registration order
    pub fn getter_names(&self) -> impl Iterator<Item = &str> {
        self.getters.keys().map(String::as_str)
    }

    pub(crate) fn get_handler(&self, device: &str, attr: &str) -> Result<GetHandler, DriverError> {
        self.getters
            .get(attr)
            .cloned()
            .ok_or_else(|| DriverError::NotSupported {
                device: device.to_string(),
                kind: "getter",
                attr: attr.to_string(),
            })
    }

    pub(crate) fn set_handler(&self, device: &str, attr: &str) -> Result<SetHandler, DriverError> {
        self.setters
            .get(attr)
            .cloned()
            .ok_or_else(|| DriverError::NotSupported {
                device: device.to_string(),
                kind: "setter",
                attr: attr.to_string(),
            })
    }

    /// Check that every declared capability has a handler
    pub fn validate<'a>(
        &self,
        device: &str,
        getters: impl IntoIterator<Item = &'a str>,
        setters: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), DriverError> {
        for attr in getters {
            self.get_handler(device, attr)?;
        }
        for attr in setters {
            self.set_handler(device, attr)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for DriverTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverTable")
            .field("getters", &self.getters.keys().collect::<Vec<_>>())
            .field("setters", &self.setters.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_lookup_and_call() {
        let table = DriverTable::new()
            .getter("power", || async { Ok(Some(json!(12.5))) })
            .setter("brightness", |value| async move { Ok(value) });

        assert!(table.has_get("power"));
        assert!(!table.has_get("brightness"));
        assert!(table.has_set("brightness"));

        let get = table.get_handler("d", "power").unwrap();
        assert_eq!(get().await, Ok(Some(json!(12.5))));

        let set = table.set_handler("d", "brightness").unwrap();
        assert_eq!(set(Some(json!(40))).await, Ok(Some(json!(40))));
    }

    #[test]
    fn test_validate_declared_capabilities() {
        let table = DriverTable::new().setter("on", |_| async { Ok(None) });

        let none: [&str; 0] = [];
        assert!(table.validate("d", none, ["on"]).is_ok());
        assert_eq!(
            table.validate("d", ["power"], none),
            Err(DriverError::NotSupported {
                device: "d".into(),
                kind: "getter",
                attr: "power".into()
            })
        );
    }
}
