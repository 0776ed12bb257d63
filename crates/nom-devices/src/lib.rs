//! Device drivers for nomctrl
//!
//! A driver turns a device config entry into a [`DriverTable`]: an explicit
//! map from capability name to async handler. Capabilities are fixed when the
//! device is registered, so an unsupported attribute fails on lookup instead
//! of somewhere inside a driver.

mod device;
mod error;
mod registry;
mod table;
mod virtual_driver;

pub use device::{Device, SharedDevice};
pub use error::{DriverError, DriverResult};
pub use registry::{DeviceDriver, DriverRegistry};
pub use table::{DriverFuture, DriverTable, GetHandler, SetHandler};
pub use virtual_driver::VirtualDriver;
