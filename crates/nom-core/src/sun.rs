//! Solar events for a location
//!
//! Times are computed with the usual low-precision solar position formulas
//! (mean anomaly, ecliptic longitude, declination, hour angle). Accuracy is a
//! minute or two, which is plenty for switching lights.

use std::f64::consts::PI;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

const RAD: f64 = PI / 180.0;
const DAY_MS: f64 = 86_400_000.0;
const J1970: f64 = 2_440_588.0;
const J2000: f64 = 2_451_545.0;
const J0: f64 = 0.0009;
const OBLIQUITY: f64 = RAD * 23.4397;

/// Named sun event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SolarEvent {
    Sunrise,
    Sunset,
    SunriseEnd,
    SunsetStart,
    Dawn,
    Dusk,
    NauticalDawn,
    NauticalDusk,
    NightEnd,
    Night,
    GoldenHourEnd,
    GoldenHour,
    SolarNoon,
    Nadir,
}

/// Sun altitude in degrees and whether the event happens in the morning
enum EventKind {
    Altitude(f64, bool),
    Noon,
    Nadir,
}

impl SolarEvent {
    const ALL: [SolarEvent; 14] = [
        SolarEvent::Sunrise,
        SolarEvent::Sunset,
        SolarEvent::SunriseEnd,
        SolarEvent::SunsetStart,
        SolarEvent::Dawn,
        SolarEvent::Dusk,
        SolarEvent::NauticalDawn,
        SolarEvent::NauticalDusk,
        SolarEvent::NightEnd,
        SolarEvent::Night,
        SolarEvent::GoldenHourEnd,
        SolarEvent::GoldenHour,
        SolarEvent::SolarNoon,
        SolarEvent::Nadir,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SolarEvent::Sunrise => "sunrise",
            SolarEvent::Sunset => "sunset",
            SolarEvent::SunriseEnd => "sunriseEnd",
            SolarEvent::SunsetStart => "sunsetStart",
            SolarEvent::Dawn => "dawn",
            SolarEvent::Dusk => "dusk",
            SolarEvent::NauticalDawn => "nauticalDawn",
            SolarEvent::NauticalDusk => "nauticalDusk",
            SolarEvent::NightEnd => "nightEnd",
            SolarEvent::Night => "night",
            SolarEvent::GoldenHourEnd => "goldenHourEnd",
            SolarEvent::GoldenHour => "goldenHour",
            SolarEvent::SolarNoon => "solarNoon",
            SolarEvent::Nadir => "nadir",
        }
    }

    fn kind(&self) -> EventKind {
        match self {
            SolarEvent::Sunrise => EventKind::Altitude(-0.833, true),
            SolarEvent::Sunset => EventKind::Altitude(-0.833, false),
            SolarEvent::SunriseEnd => EventKind::Altitude(-0.3, true),
            SolarEvent::SunsetStart => EventKind::Altitude(-0.3, false),
            SolarEvent::Dawn => EventKind::Altitude(-6.0, true),
            SolarEvent::Dusk => EventKind::Altitude(-6.0, false),
            SolarEvent::NauticalDawn => EventKind::Altitude(-12.0, true),
            SolarEvent::NauticalDusk => EventKind::Altitude(-12.0, false),
            SolarEvent::NightEnd => EventKind::Altitude(-18.0, true),
            SolarEvent::Night => EventKind::Altitude(-18.0, false),
            SolarEvent::GoldenHourEnd => EventKind::Altitude(6.0, true),
            SolarEvent::GoldenHour => EventKind::Altitude(6.0, false),
            SolarEvent::SolarNoon => EventKind::Noon,
            SolarEvent::Nadir => EventKind::Nadir,
        }
    }
}

impl FromStr for SolarEvent {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SolarEvent::ALL
            .iter()
            .find(|event| event.as_str().eq_ignore_ascii_case(s))
            .copied()
            .ok_or(())
    }
}

impl std::fmt::Display for SolarEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Geographic position used for sun events
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    #[serde(alias = "lng", alias = "lon")]
    pub long: f64,
}

impl Location {
    pub fn new(lat: f64, long: f64) -> Self {
        Self { lat, long }
    }

    /// When `event` happens on `date`; `None` if the sun never reaches
    /// that altitude there (polar day or night)
    pub fn event_time(&self, event: SolarEvent, date: NaiveDate) -> Option<DateTime<Utc>> {
        // Approximate local solar noon of that date anchors the Julian cycle.
        let noon_utc = date.and_hms_opt(12, 0, 0)?.and_utc()
            - chrono::Duration::seconds((self.long / 15.0 * 3600.0) as i64);

        let lw = RAD * -self.long;
        let phi = RAD * self.lat;

        let d = noon_utc.timestamp_millis() as f64 / DAY_MS - 0.5 + J1970 - J2000;
        let n = (d - J0 - lw / (2.0 * PI)).round();
        let ds = J0 + lw / (2.0 * PI) + n;

        let m = RAD * (357.5291 + 0.985_600_28 * ds);
        let c = RAD * (1.9148 * m.sin() + 0.02 * (2.0 * m).sin() + 0.0003 * (3.0 * m).sin());
        let l = m + c + RAD * 102.9372 + PI;
        let dec = (l.sin() * OBLIQUITY.sin()).asin();

        let transit = |approx: f64| J2000 + approx + 0.0053 * m.sin() - 0.0069 * (2.0 * l).sin();
        let j_noon = transit(ds);

        let julian = match event.kind() {
            EventKind::Noon => j_noon,
            EventKind::Nadir => j_noon - 0.5,
            EventKind::Altitude(degrees, rising) => {
                let h = degrees * RAD;
                let cos_w = (h.sin() - phi.sin() * dec.sin()) / (phi.cos() * dec.cos());
                if !(-1.0..=1.0).contains(&cos_w) {
                    return None;
                }
                let w = cos_w.acos();
                let j_set = transit(J0 + (w + lw) / (2.0 * PI) + n);
                if rising {
                    j_noon - (j_set - j_noon)
                } else {
                    j_set
                }
            }
        };

        let millis = (julian + 0.5 - J1970) * DAY_MS;
        DateTime::from_timestamp_millis(millis.round() as i64)
    }
}
