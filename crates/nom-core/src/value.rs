//! Attribute names and value helpers

use serde::{Deserialize, Serialize};

use crate::Value;

/// Well-known attribute names
pub mod attrs {
    /// Boolean power state; `true` is on
    pub const STATE: &str = "state";
    /// Setter capability that switches `state` on
    pub const ON: &str = "on";
    /// Setter capability that switches `state` off
    pub const OFF: &str = "off";
    /// Toggle trigger, takes no value
    pub const FLIP: &str = "flip";
    /// Brightness percent, 0-100
    pub const BRIGHTNESS: &str = "brightness";
    /// RGB color as `[r, g, b]`
    pub const COLOR: &str = "color";
    /// Aggregated device status
    pub const STATUS: &str = "status";
    /// Device liveness, every device has it
    pub const ONLINE: &str = "online";

    /// Setters that exclude each other on the same node: on, off and flip.
    pub fn is_trigger(attr: &str) -> bool {
        attr == STATE || attr == FLIP
    }
}

/// An 8-bit RGB color, serialized as `[r, g, b]`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[u8; 3]", into = "[u8; 3]")]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb { r: 0, g: 0, b: 0 };

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#rrggbb` or `rrggbb`
    pub fn from_hex(s: &str) -> Option<Self> {
        let hex = s.strip_prefix('#').unwrap_or(s);
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        Some(Self::new(channel(0)?, channel(2)?, channel(4)?))
    }

    /// Parse an `(r,g,b)` literal
    pub fn from_literal(s: &str) -> Option<Self> {
        let inner = s.strip_prefix('(')?.strip_suffix(')')?;
        let mut parts = inner.split(',').map(|p| p.trim().parse::<u8>());
        let rgb = Self::new(parts.next()?.ok()?, parts.next()?.ok()?, parts.next()?.ok()?);
        if parts.next().is_some() {
            return None;
        }
        Some(rgb)
    }

    /// Read a color back from an attribute value
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Array(items) if items.len() == 3 => {
                let channel = |v: &Value| v.as_u64().and_then(|n| u8::try_from(n).ok());
                Some(Self::new(
                    channel(&items[0])?,
                    channel(&items[1])?,
                    channel(&items[2])?,
                ))
            }
            Value::String(s) => Self::from_hex(s),
            _ => None,
        }
    }

    /// Per-channel linear interpolation, floored
    pub fn lerp(self, to: Rgb, progress: f64) -> Self {
        Self::new(
            lerp_u8(self.r, to.r, progress),
            lerp_u8(self.g, to.g, progress),
            lerp_u8(self.b, to.b, progress),
        )
    }

    pub fn to_value(self) -> Value {
        Value::from(vec![self.r, self.g, self.b])
    }
}

impl From<[u8; 3]> for Rgb {
    fn from([r, g, b]: [u8; 3]) -> Self {
        Self::new(r, g, b)
    }
}

impl From<Rgb> for [u8; 3] {
    fn from(rgb: Rgb) -> Self {
        [rgb.r, rgb.g, rgb.b]
    }
}

impl std::fmt::Display for Rgb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Linear interpolation between two bytes, floored
pub fn lerp_u8(from: u8, to: u8, progress: f64) -> u8 {
    let progress = progress.clamp(0.0, 1.0);
    let value = f64::from(from) + (f64::from(to) - f64::from(from)) * progress;
    value.floor().clamp(0.0, 255.0) as u8
}

/// Render a value the way event keys spell it
pub fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// Value an attribute falls back to when nothing was ever cached
pub fn default_off(attr: &str) -> Option<Value> {
    match attr {
        attrs::STATE => Some(Value::Bool(false)),
        attrs::BRIGHTNESS => Some(Value::from(0)),
        attrs::COLOR => Some(Rgb::BLACK.to_value()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hex_parsing() {
        assert_eq!(Rgb::from_hex("#656ef2"), Some(Rgb::new(0x65, 0x6e, 0xf2)));
        assert_eq!(Rgb::from_hex("F6CB90"), Some(Rgb::new(0xf6, 0xcb, 0x90)));
        assert_eq!(Rgb::from_hex("#12345"), None);
        assert_eq!(Rgb::from_hex("sunset"), None);
    }

    #[test]
    fn test_literal_parsing() {
        assert_eq!(Rgb::from_literal("(255,0,10)"), Some(Rgb::new(255, 0, 10)));
        assert_eq!(Rgb::from_literal("(256,0,10)"), None);
        assert_eq!(Rgb::from_literal("(1,2,3,4)"), None);
        assert_eq!(Rgb::from_literal("1,2,3"), None);
    }

    #[test]
    fn test_serde_as_array() {
        let rgb = Rgb::new(1, 2, 3);
        assert_eq!(serde_json::to_value(rgb).unwrap(), json!([1, 2, 3]));
        assert_eq!(Rgb::from_value(&json!([1, 2, 3])), Some(rgb));
        assert_eq!(Rgb::from_value(&json!([1, 2, 300])), None);
    }

    #[test]
    fn test_lerp_floors_and_reaches_end() {
        assert_eq!(lerp_u8(0, 100, 0.555), 55);
        assert_eq!(lerp_u8(100, 0, 0.5), 50);
        assert_eq!(lerp_u8(0, 100, 1.0), 100);
        assert_eq!(lerp_u8(0, 100, 7.0), 100);
        assert_eq!(
            Rgb::new(255, 0, 0).lerp(Rgb::new(0, 0, 255), 0.5),
            Rgb::new(127, 0, 127)
        );
    }

    #[test]
    fn test_default_off() {
        assert_eq!(default_off("state"), Some(json!(false)));
        assert_eq!(default_off("brightness"), Some(json!(0)));
        assert_eq!(default_off("color"), Some(json!([0, 0, 0])));
        assert_eq!(default_off("effect"), None);
    }
}
