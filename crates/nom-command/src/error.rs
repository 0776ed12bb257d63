//! Compile errors
//!
//! These never abort a batch. The compiler renders them into the plan's error
//! list and carries on with the remaining tokens and sub-commands.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("Empty command")]
    Empty,

    #[error("Nothing to do")]
    NothingToDo,

    #[error("Unknown command \"{0}\"")]
    UnknownVerb(String),

    #[error("Action \"{0}\" not found.")]
    UnknownAction(String),

    #[error("Action \"{0}\" calls itself")]
    ActionCycle(String),

    #[error("\"{0}\" is not a node or status command")]
    NotAStatusTarget(String),

    #[error("Node \"{node}\" does not have a getter \"{attr}\"")]
    NoGetter { node: String, attr: String },

    #[error("No nodes found.")]
    NoNodes,

    #[error("Device {device} type {device_type} of node {node} has no setter {arg}.")]
    NoSetter {
        device: String,
        device_type: String,
        node: String,
        arg: String,
    },

    #[error("Device {device} type {device_type} of node {node} does not support color.")]
    NoColor {
        device: String,
        device_type: String,
        node: String,
    },

    #[error("Device {device} of node {node} does not support brightness control.")]
    NoBrightness { device: String, node: String },

    #[error("Brightness must be a value between 0 and 100.")]
    BrightnessRange,

    #[error("Unknown argument \"{0}\"")]
    UnknownArgument(String),

    #[error("Did not parse all arguments. Remaining: {0}")]
    Remaining(String),

    #[error("Missing duration")]
    MissingDuration,

    #[error("Invalid duration \"{0}\"")]
    InvalidDuration(String),

    #[error("Missing time after \"{0}\"")]
    MissingTime(String),

    #[error("Invalid time \"{token}\": {reason}")]
    InvalidTime { token: String, reason: String },

    #[error("Fade needs a pair of colors or of brightness values")]
    NoFadeValues,

    #[error("No value to restore for \"{attr}\" of node \"{node}\"")]
    NoRestoreValue { node: String, attr: String },
}

impl From<CompileError> for String {
    fn from(e: CompileError) -> Self {
        e.to_string()
    }
}
