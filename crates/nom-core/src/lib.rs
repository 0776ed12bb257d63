//! Core types for nomctrl
//!
//! This crate provides the fundamental types shared by the controller crates:
//! Context, Event, the compiled command Plan, attribute values and the time
//! model (time specs, durations, clocks and solar events).

mod context;
mod event;
pub mod plan;
mod response;
pub mod sun;
pub mod time;
pub mod value;

pub use context::Context;
pub use event::{Event, EventType};
pub use plan::{Calc, CommandOptions, FadeValues, FaderSpec, Getter, Plan, Setter, TimedSetter};
pub use response::{Response, Status};
pub use sun::{Location, SolarEvent};
pub use time::{Clock, ManualClock, SystemClock, TimeError, TimeResolver, TimeSpec};
pub use value::{attrs, Rgb};

/// Attribute values are plain JSON, as the device layer reports them
pub type Value = serde_json::Value;
