use nom_core::{Setter, TimedSetter};
use serde::Serialize;

/// One setter to apply once at an absolute time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SingleShot {
    pub setter: Setter,
    /// Epoch milliseconds
    pub at_ms: i64,
    #[serde(skip)]
    pub(crate) generation: u64,
}

impl SingleShot {
    pub fn is_due(&self, now_ms: i64) -> bool {
        self.at_ms <= now_ms
    }
}

impl From<TimedSetter> for SingleShot {
    fn from(timed: TimedSetter) -> Self {
        Self {
            setter: timed.setter,
            at_ms: timed.at_ms,
            generation: 0,
        }
    }
}
