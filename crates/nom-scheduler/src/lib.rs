//! Scheduler for nomctrl
//!
//! Three timer families, each on its own tick:
//!
//! - **Daily timers** (every `timer_interval`): strict timers re-assert the
//!   command of the most recently crossed boundary on every tick; non-strict
//!   timers fire a command once when its time of day is crossed.
//! - **Faders** (every `fader_interval` while any is active): linear
//!   interpolation of `brightness` or `color`, applied through the gateway.
//! - **Single-shot timers** (every `single_interval` while any exist): one
//!   setter at an absolute time, then gone.
//!
//! Faders and single-shots are keyed by `(node, attr)`; registering a new
//! entry replaces the old one.

mod daily;
mod fader;
mod scheduler;
mod single;

pub use daily::{select_current, DailyTimer};
pub use fader::ActiveFader;
pub use scheduler::{Intervals, Scheduler, SharedScheduler};
pub use single::SingleShot;

use async_trait::async_trait;
use nom_core::{attrs, CommandOptions, Context, Plan, Response};
use thiserror::Error;

/// Re-entry point into the command core
///
/// Timers hand their commands back to whoever owns the compiler and executor.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Compile and execute a command batch
    async fn run_command(&self, command: &str, options: CommandOptions, ctx: Context) -> Response;

    /// Execute an already compiled plan
    async fn run_plan(&self, plan: Plan, ctx: Context) -> Response;
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("scheduler already running")]
    AlreadyRunning,
}

/// `(node, attr)` key of faders and single-shot timers
///
/// `state` and `flip` share one key: they act on the same switch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScheduleKey {
    pub node: String,
    pub attr: String,
}

impl ScheduleKey {
    pub fn new(node: impl Into<String>, attr: &str) -> Self {
        let attr = if attrs::is_trigger(attr) {
            attrs::STATE
        } else {
            attr
        };
        Self {
            node: node.into(),
            attr: attr.to_string(),
        }
    }
}

impl std::fmt::Display for ScheduleKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.node, self.attr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_attrs_share_a_key() {
        assert_eq!(ScheduleKey::new("lamp", "flip"), ScheduleKey::new("lamp", "state"));
        assert_ne!(
            ScheduleKey::new("lamp", "brightness"),
            ScheduleKey::new("lamp", "color")
        );
        assert_eq!(ScheduleKey::new("lamp", "color").to_string(), "lamp.color");
    }
}
