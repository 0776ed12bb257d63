use nom_core::{FaderSpec, Value};
use serde::Serialize;

/// A registered fade and how far it got
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveFader {
    pub spec: FaderSpec,
    /// Epoch milliseconds
    pub start_ms: i64,
    pub last_applied: Option<Value>,
    #[serde(skip)]
    pub(crate) generation: u64,
}

impl ActiveFader {
    pub fn new(spec: FaderSpec, start_ms: i64) -> Self {
        Self {
            spec,
            start_ms,
            last_applied: None,
            generation: 0,
        }
    }

    fn duration_ms(&self) -> i64 {
        i64::try_from(self.spec.duration.as_millis()).unwrap_or(i64::MAX)
    }

    pub fn end_ms(&self) -> i64 {
        self.start_ms.saturating_add(self.duration_ms())
    }

    /// Elapsed share of the duration, clamped to `0..=1`
    pub fn progress(&self, now_ms: i64) -> f64 {
        let duration = self.duration_ms();
        if duration <= 0 {
            return 1.0;
        }
        (now_ms.saturating_sub(self.start_ms) as f64 / duration as f64).clamp(0.0, 1.0)
    }

    pub fn is_finished(&self, now_ms: i64) -> bool {
        now_ms >= self.end_ms()
    }

    /// Value to apply at `now_ms`, or `None` if it equals the last one applied
    ///
    /// Once the duration has elapsed this is always the exact end value.
    pub fn step(&self, now_ms: i64) -> Option<Value> {
        let value = if self.is_finished(now_ms) {
            self.spec.values.end()
        } else {
            self.spec.values.at(self.progress(now_ms))
        };
        (self.last_applied.as_ref() != Some(&value)).then_some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nom_core::{FadeValues, Rgb};
    use serde_json::json;
    use std::time::Duration;

    fn brightness(from: u8, to: u8, secs: u64) -> ActiveFader {
        ActiveFader::new(
            FaderSpec {
                node: "bed".into(),
                values: FadeValues::Brightness { from, to },
                duration: Duration::from_secs(secs),
            },
            1_000_000,
        )
    }

    #[test]
    fn test_progress_and_steps() {
        let mut fader = brightness(0, 100, 10);

        assert_eq!(fader.step(1_000_000), Some(json!(0)));
        fader.last_applied = Some(json!(0));
        assert_eq!(fader.step(1_000_050), None);
        assert_eq!(fader.step(1_000_500), Some(json!(5)));
        assert_eq!(fader.step(1_003_330), Some(json!(33)));
        assert!(!fader.is_finished(1_009_999));
        assert_eq!(fader.step(1_010_000), Some(json!(100)));
        assert!(fader.is_finished(1_010_000));
    }

    #[test]
    fn test_late_tick_lands_on_exact_end() {
        let fader = brightness(100, 7, 4);
        assert_eq!(fader.step(1_000_000 + 60_000), Some(json!(7)));
        assert_eq!(fader.progress(999_000), 0.0);
    }

    #[test]
    fn test_color_fade() {
        let fader = ActiveFader::new(
            FaderSpec {
                node: "bed".into(),
                values: FadeValues::Color {
                    from: Rgb::new(255, 0, 0),
                    to: Rgb::new(0, 0, 255),
                },
                duration: Duration::from_secs(10),
            },
            0,
        );
        assert_eq!(fader.step(5_000), Some(json!([127, 0, 127])));
        assert_eq!(fader.step(10_000), Some(json!([0, 0, 255])));
    }

    #[test]
    fn test_zero_duration_applies_end() {
        let fader = brightness(0, 80, 0);
        assert_eq!(fader.progress(0), 1.0);
        assert_eq!(fader.step(1_000_000), Some(json!(80)));
    }
}
