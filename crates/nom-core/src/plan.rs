//! Compiled form of a command batch
//!
//! A [`Plan`] is what the command compiler produces and the executor consumes:
//! getters, setters, faders and timed setters in command order, an optional
//! aggregate function and the errors collected while compiling.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::value::{attrs, lerp_u8};
use crate::{Rgb, Value};

/// Options that change how targets resolve
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandOptions {
    /// Include nodes owned by a strict timer in group targeting
    pub include_timed: bool,
}

impl CommandOptions {
    pub fn timed() -> Self {
        Self {
            include_timed: true,
        }
    }
}

/// Read one attribute of one node
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Getter {
    pub node: String,
    pub attr: String,
}

impl Getter {
    pub fn new(node: impl Into<String>, attr: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            attr: attr.into(),
        }
    }
}

/// Write one attribute of one node; triggers like `flip` carry no value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Setter {
    pub node: String,
    pub attr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl Setter {
    pub fn new(node: impl Into<String>, attr: impl Into<String>, value: Option<Value>) -> Self {
        Self {
            node: node.into(),
            attr: attr.into(),
            value,
        }
    }

    pub fn state(node: impl Into<String>, on: bool) -> Self {
        Self::new(node, attrs::STATE, Some(Value::Bool(on)))
    }

    pub fn flip(node: impl Into<String>) -> Self {
        Self::new(node, attrs::FLIP, None)
    }

    pub fn brightness(node: impl Into<String>, percent: u8) -> Self {
        Self::new(node, attrs::BRIGHTNESS, Some(Value::from(percent)))
    }

    pub fn color(node: impl Into<String>, rgb: Rgb) -> Self {
        Self::new(node, attrs::COLOR, Some(rgb.to_value()))
    }

    /// Name of the device capability that carries out this setter
    ///
    /// `state` setters map to the `on` and `off` capabilities, everything
    /// else uses its attribute name.
    pub fn capability(&self) -> &str {
        match (self.attr.as_str(), &self.value) {
            (attrs::STATE, Some(Value::Bool(true))) => attrs::ON,
            (attrs::STATE, Some(Value::Bool(false))) => attrs::OFF,
            (attr, _) => attr,
        }
    }
}

impl std::fmt::Display for Setter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{} {} {}", self.node, self.attr, value),
            None => write!(f, "{} {}", self.node, self.attr),
        }
    }
}

/// Endpoints of a fade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "attr", rename_all = "snake_case")]
pub enum FadeValues {
    Color { from: Rgb, to: Rgb },
    Brightness { from: u8, to: u8 },
}

impl FadeValues {
    pub fn attr(&self) -> &'static str {
        match self {
            FadeValues::Color { .. } => attrs::COLOR,
            FadeValues::Brightness { .. } => attrs::BRIGHTNESS,
        }
    }

    /// Interpolated value at `progress` (clamped to 0..=1)
    pub fn at(&self, progress: f64) -> Value {
        match *self {
            FadeValues::Color { from, to } => from.lerp(to, progress).to_value(),
            FadeValues::Brightness { from, to } => Value::from(lerp_u8(from, to, progress)),
        }
    }

    pub fn end(&self) -> Value {
        match *self {
            FadeValues::Color { to, .. } => to.to_value(),
            FadeValues::Brightness { to, .. } => Value::from(to),
        }
    }
}

/// A linear fade of one attribute of one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaderSpec {
    pub node: String,
    pub values: FadeValues,
    pub duration: Duration,
}

impl FaderSpec {
    pub fn attr(&self) -> &'static str {
        self.values.attr()
    }
}

/// A setter applied once at an absolute time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedSetter {
    pub setter: Setter,
    /// Epoch milliseconds
    pub at_ms: i64,
}

/// Aggregate function over getter results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Calc {
    Sum,
    Avg,
    Min,
    Max,
}

impl Calc {
    /// Parse a calc keyword, including its synonyms
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "sum" | "total" => Some(Calc::Sum),
            "avg" | "average" | "mean" => Some(Calc::Avg),
            "min" | "minimum" => Some(Calc::Min),
            "max" | "maximum" => Some(Calc::Max),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Calc::Sum => "sum",
            Calc::Avg => "avg",
            Calc::Min => "min",
            Calc::Max => "max",
        }
    }

    /// Apply to the numeric contributors; `None` when there are none
    pub fn apply(&self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        let result = match self {
            Calc::Sum => values.iter().sum(),
            Calc::Avg => values.iter().sum::<f64>() / values.len() as f64,
            Calc::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            Calc::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        };
        Some(result)
    }
}

impl std::fmt::Display for Calc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compiled command batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub getters: Vec<Getter>,
    pub setters: Vec<Setter>,
    pub faders: Vec<FaderSpec>,
    pub timed_setters: Vec<TimedSetter>,
    pub calc: Option<Calc>,
    pub errors: Vec<String>,
}

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    /// A plan holding only an error
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            errors: vec![message.into()],
            ..Self::default()
        }
    }

    /// A plan holding only setters
    pub fn from_setters(setters: Vec<Setter>) -> Self {
        Self {
            setters,
            ..Self::default()
        }
    }

    pub fn push_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    /// Append another plan; lists are concatenated, never replaced
    pub fn merge(&mut self, other: Plan) {
        self.getters.extend(other.getters);
        self.setters.extend(other.setters);
        self.faders.extend(other.faders);
        self.timed_setters.extend(other.timed_setters);
        self.errors.extend(other.errors);

        match (self.calc, other.calc) {
            (None, calc) => self.calc = calc,
            (Some(a), Some(b)) if a != b => self
                .errors
                .push(format!("Conflicting aggregate functions \"{}\" and \"{}\"", a, b)),
            _ => {}
        }
    }

    /// True when there is no work to do
    pub fn has_no_actions(&self) -> bool {
        self.getters.is_empty()
            && self.setters.is_empty()
            && self.faders.is_empty()
            && self.timed_setters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_concatenates_lists() {
        let mut a = Plan::from_setters(vec![Setter::state("lamp", true)]);
        a.getters.push(Getter::new("lamp", "power"));

        let mut b = Plan::from_setters(vec![Setter::flip("lamp")]);
        b.getters.push(Getter::new("lamp", "power"));
        b.push_error("oops");

        a.merge(b);
        assert_eq!(a.setters.len(), 2);
        assert_eq!(a.getters.len(), 2);
        assert_eq!(a.errors, vec!["oops".to_string()]);
    }

    #[test]
    fn test_merge_calc() {
        let mut a = Plan::new();
        let b = Plan {
            calc: Some(Calc::Sum),
            ..Plan::new()
        };
        a.merge(b.clone());
        assert_eq!(a.calc, Some(Calc::Sum));

        a.merge(Plan {
            calc: Some(Calc::Max),
            ..Plan::new()
        });
        assert_eq!(a.calc, Some(Calc::Sum));
        assert_eq!(a.errors.len(), 1);
    }

    #[test]
    fn test_calc_synonyms_and_apply() {
        assert_eq!(Calc::from_token("minimum"), Some(Calc::Min));
        assert_eq!(Calc::from_token("average"), Some(Calc::Avg));
        assert_eq!(Calc::from_token("power"), None);

        assert_eq!(Calc::Avg.apply(&[10.0, 20.0]), Some(15.0));
        assert_eq!(Calc::Sum.apply(&[10.0, 20.0]), Some(30.0));
        assert_eq!(Calc::Min.apply(&[10.0, -2.0]), Some(-2.0));
        assert_eq!(Calc::Max.apply(&[]), None);
    }

    #[test]
    fn test_fade_values() {
        let fade = FadeValues::Brightness { from: 0, to: 100 };
        assert_eq!(fade.attr(), "brightness");
        assert_eq!(fade.at(0.25), json!(25));
        assert_eq!(fade.end(), json!(100));

        let fade = FadeValues::Color {
            from: Rgb::new(0, 0, 0),
            to: Rgb::new(10, 20, 30),
        };
        assert_eq!(fade.at(0.5), json!([5, 10, 15]));
    }

    #[test]
    fn test_setter_capability() {
        assert_eq!(Setter::state("lamp", true).capability(), "on");
        assert_eq!(Setter::state("lamp", false).capability(), "off");
        assert_eq!(Setter::flip("lamp").capability(), "flip");
        assert_eq!(Setter::brightness("lamp", 50).capability(), "brightness");
    }

    #[test]
    fn test_no_actions() {
        assert!(Plan::error("bad").has_no_actions());
        assert!(!Plan::from_setters(vec![Setter::flip("x")]).has_no_actions());
    }
}
