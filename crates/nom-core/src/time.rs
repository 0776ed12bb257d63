//! Time specifications, durations and clocks
//!
//! A [`TimeSpec`] is what configuration and commands write down: a clock time
//! (`22:00`), a sun event with an optional offset (`sunriseEnd+1h`) or an
//! absolute timestamp. A [`TimeResolver`] turns it into a concrete instant for
//! a calendar day.

use std::str::FromStr;
use std::sync::RwLock;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use thiserror::Error;

use crate::sun::{Location, SolarEvent};

/// Errors resolving or parsing times
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TimeError {
    #[error("invalid time \"{0}\"")]
    Invalid(String),

    #[error("no location configured for sun event \"{0}\"")]
    NoLocation(SolarEvent),

    #[error("sun event \"{event}\" does not occur on {date}")]
    SolarUnavailable { event: SolarEvent, date: NaiveDate },

    #[error("local time {0} does not exist")]
    Nonexistent(NaiveDateTime),
}

/// A point in time as written in config or commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeSpec {
    /// Time of day
    Clock(NaiveTime),
    /// Sun event of the day, shifted by `offset`
    Solar {
        event: SolarEvent,
        offset: chrono::Duration,
    },
    /// Fixed instant
    Absolute(DateTime<Utc>),
}

impl TimeSpec {
    /// Daily specs recur, absolute ones do not
    pub fn is_daily(&self) -> bool {
        !matches!(self, TimeSpec::Absolute(_))
    }
}

impl FromStr for TimeSpec {
    type Err = TimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || TimeError::Invalid(s.to_string());

        // Epoch timestamps: ten digits are seconds, more are milliseconds
        if s.len() >= 10 && s.chars().all(|c| c.is_ascii_digit()) {
            let n: i64 = s.parse().map_err(|_| invalid())?;
            let ms = if s.len() <= 10 { n * 1000 } else { n };
            return DateTime::from_timestamp_millis(ms)
                .map(TimeSpec::Absolute)
                .ok_or_else(invalid);
        }

        if let Ok(at) = DateTime::parse_from_rfc3339(s) {
            return Ok(TimeSpec::Absolute(at.with_timezone(&Utc)));
        }

        for format in ["%H:%M:%S", "%H:%M"] {
            if let Ok(time) = NaiveTime::parse_from_str(s, format) {
                return Ok(TimeSpec::Clock(time));
            }
        }

        let (name, offset) = match s.find(['+', '-']) {
            Some(idx) => {
                let magnitude = parse_duration(&s[idx + 1..]).ok_or_else(invalid)?;
                let magnitude = chrono::Duration::from_std(magnitude)
                    .ok()
                    .filter(|m| *m <= chrono::Duration::days(1))
                    .ok_or_else(invalid)?;
                let offset = if s[idx..].starts_with('-') {
                    -magnitude
                } else {
                    magnitude
                };
                (&s[..idx], offset)
            }
            None => (s, chrono::Duration::zero()),
        };

        let event = name.parse::<SolarEvent>().map_err(|_| invalid())?;
        Ok(TimeSpec::Solar { event, offset })
    }
}

impl std::fmt::Display for TimeSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeSpec::Clock(time) => write!(f, "{}", time.format("%H:%M:%S")),
            TimeSpec::Solar { event, offset } if offset.is_zero() => write!(f, "{}", event),
            TimeSpec::Solar { event, offset } => {
                let sign = if *offset < chrono::Duration::zero() { '-' } else { '+' };
                write!(f, "{}{}{}s", event, sign, offset.num_seconds().abs())
            }
            TimeSpec::Absolute(at) => write!(f, "{}", at.to_rfc3339()),
        }
    }
}

/// Parse a duration
///
/// Accepts plain seconds (`90`), `M:SS`, `H:MM:SS` and unit sequences such as
/// `10s`, `5min`, `1h30m` or `500ms`.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(secs) = s.parse::<f64>() {
        return Duration::try_from_secs_f64(secs).ok();
    }

    if s.contains(':') {
        let parts: Vec<u64> = s
            .split(':')
            .map(|p| p.parse().ok())
            .collect::<Option<_>>()?;
        return match parts.as_slice() {
            [mins, secs] => mins.checked_mul(60)?.checked_add(*secs).map(Duration::from_secs),
            [hours, mins, secs] => hours
                .checked_mul(3600)?
                .checked_add(mins.checked_mul(60)?)?
                .checked_add(*secs)
                .map(Duration::from_secs),
            _ => None,
        };
    }

    let mut total = 0.0;
    let mut rest = s;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_len == 0 {
            return None;
        }
        let number: f64 = rest[..number_len].parse().ok()?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(rest.len());
        let scale = match &rest[..unit_len] {
            "ms" => 0.001,
            "s" | "sec" | "secs" | "second" | "seconds" => 1.0,
            "m" | "min" | "mins" | "minute" | "minutes" => 60.0,
            "h" | "hr" | "hrs" | "hour" | "hours" => 3600.0,
            "d" | "day" | "days" => 86_400.0,
            _ => return None,
        };
        rest = &rest[unit_len..];
        total += number * scale;
    }

    Duration::try_from_secs_f64(total).ok()
}

/// Source of "now"
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;

    fn now_ms(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// A controllable clock for tests and dry runs
#[derive(Debug)]
pub struct ManualClock {
    current: RwLock<DateTime<Local>>,
}

impl ManualClock {
    pub fn new(at: DateTime<Local>) -> Self {
        Self {
            current: RwLock::new(at),
        }
    }

    /// Start at a local date and time
    pub fn at_local(date: NaiveDate, time: NaiveTime) -> Option<Self> {
        Local
            .from_local_datetime(&date.and_time(time))
            .earliest()
            .map(Self::new)
    }

    pub fn set(&self, at: DateTime<Local>) {
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = at;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        *current += by;
    }

    pub fn advance_secs(&self, secs: i64) {
        self.advance(chrono::Duration::seconds(secs));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Local> {
        *self.current.read().unwrap_or_else(|e| e.into_inner())
    }
}

/// Turns time specs into instants
pub trait TimeResolver: Send + Sync {
    /// The instant `spec` denotes on calendar day `day`
    fn resolve_on(&self, spec: &TimeSpec, day: NaiveDate) -> Result<DateTime<Local>, TimeError>;

    /// The first instant after `now` that `spec` denotes
    fn next_occurrence(
        &self,
        spec: &TimeSpec,
        now: DateTime<Local>,
    ) -> Result<DateTime<Local>, TimeError> {
        if let TimeSpec::Absolute(at) = spec {
            return Ok(at.with_timezone(&Local));
        }
        let today = self.resolve_on(spec, now.date_naive())?;
        if today > now {
            return Ok(today);
        }
        let tomorrow = now
            .date_naive()
            .succ_opt()
            .ok_or_else(|| TimeError::Invalid(spec.to_string()))?;
        self.resolve_on(spec, tomorrow)
    }
}

/// Resolver for clock times, absolute instants and sun events at a location
#[derive(Debug, Clone, Copy, Default)]
pub struct SolarResolver {
    location: Option<Location>,
}

impl SolarResolver {
    pub fn new(location: Option<Location>) -> Self {
        Self { location }
    }
}

impl TimeResolver for SolarResolver {
    fn resolve_on(&self, spec: &TimeSpec, day: NaiveDate) -> Result<DateTime<Local>, TimeError> {
        match spec {
            TimeSpec::Absolute(at) => Ok(at.with_timezone(&Local)),
            TimeSpec::Clock(time) => {
                let naive = day.and_time(*time);
                Local
                    .from_local_datetime(&naive)
                    .earliest()
                    .ok_or(TimeError::Nonexistent(naive))
            }
            TimeSpec::Solar { event, offset } => {
                let location = self.location.ok_or(TimeError::NoLocation(*event))?;
                let at = location
                    .event_time(*event, day)
                    .ok_or(TimeError::SolarUnavailable {
                        event: *event,
                        date: day,
                    })?;
                at.with_timezone(&Local)
                    .checked_add_signed(*offset)
                    .ok_or_else(|| TimeError::Invalid(spec.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn local(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn test_parse_clock_times() {
        assert_eq!(
            "22:00".parse::<TimeSpec>(),
            Ok(TimeSpec::Clock(NaiveTime::from_hms_opt(22, 0, 0).unwrap()))
        );
        assert_eq!(
            "8:05:30".parse::<TimeSpec>(),
            Ok(TimeSpec::Clock(NaiveTime::from_hms_opt(8, 5, 30).unwrap()))
        );
        assert!("25:00".parse::<TimeSpec>().is_err());
    }

    #[test]
    fn test_parse_solar_with_offsets() {
        assert_eq!(
            "sunriseEnd+1h".parse::<TimeSpec>(),
            Ok(TimeSpec::Solar {
                event: SolarEvent::SunriseEnd,
                offset: chrono::Duration::hours(1)
            })
        );
        assert_eq!(
            "sunset-30m".parse::<TimeSpec>(),
            Ok(TimeSpec::Solar {
                event: SolarEvent::Sunset,
                offset: chrono::Duration::minutes(-30)
            })
        );
        assert!("sunset+soon".parse::<TimeSpec>().is_err());
        assert!("sunset+1000000000d".parse::<TimeSpec>().is_err());
        assert!("sunrise-25h".parse::<TimeSpec>().is_err());
        assert!("sunrise+1d".parse::<TimeSpec>().is_ok());
        assert!("teatime".parse::<TimeSpec>().is_err());
    }

    #[test]
    fn test_parse_absolute() {
        let spec: TimeSpec = "1700000000000".parse().unwrap();
        assert_eq!(
            spec,
            TimeSpec::Absolute(DateTime::from_timestamp_millis(1_700_000_000_000).unwrap())
        );
        let spec: TimeSpec = "1700000000".parse().unwrap();
        assert!(!spec.is_daily());
        assert!("2024-06-21T10:00:00Z".parse::<TimeSpec>().is_ok());
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("60"), Some(Duration::from_secs(60)));
        assert_eq!(parse_duration("10s"), Some(Duration::from_secs(10)));
        assert_eq!(parse_duration("10m"), Some(Duration::from_secs(600)));
        assert_eq!(parse_duration("1h30m"), Some(Duration::from_secs(5400)));
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("5:30"), Some(Duration::from_secs(330)));
        assert_eq!(parse_duration("1:30:00"), Some(Duration::from_secs(5400)));
        assert_eq!(parse_duration("later"), None);
        assert_eq!(parse_duration("10 parsecs"), None);
        assert_eq!(parse_duration(""), None);
    }

    #[test]
    fn test_parse_duration_out_of_range() {
        assert_eq!(parse_duration("1e20"), None);
        assert_eq!(parse_duration("-5"), None);
        assert_eq!(parse_duration("NaN"), None);
        assert_eq!(parse_duration("99999999999999999999d"), None);
        assert_eq!(parse_duration("18446744073709551615:59"), None);
        assert_eq!(parse_duration("5124095576030432:0:0"), None);
    }

    #[test]
    fn test_next_occurrence_rolls_over_midnight() {
        let resolver = SolarResolver::default();
        let spec: TimeSpec = "22:00".parse().unwrap();

        let next = resolver
            .next_occurrence(&spec, local(2024, 6, 15, 21, 0))
            .unwrap();
        assert_eq!(next, local(2024, 6, 15, 22, 0));

        let next = resolver
            .next_occurrence(&spec, local(2024, 6, 15, 23, 0))
            .unwrap();
        assert_eq!(next, local(2024, 6, 16, 22, 0));
    }

    #[test]
    fn test_solar_needs_location() {
        let spec: TimeSpec = "sunset".parse().unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();

        let err = SolarResolver::default().resolve_on(&spec, day).unwrap_err();
        assert_eq!(err, TimeError::NoLocation(SolarEvent::Sunset));

        let resolver = SolarResolver::new(Some(Location::new(48.78, 9.18)));
        let at = resolver.resolve_on(&spec, day).unwrap();
        assert!(at.with_timezone(&Utc).hour() >= 18);
    }

    #[test]
    fn test_solar_offset_overflow_is_an_error() {
        let spec = TimeSpec::Solar {
            event: SolarEvent::Sunset,
            offset: chrono::Duration::days(1_000_000_000),
        };
        let day = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        let resolver = SolarResolver::new(Some(Location::new(48.78, 9.18)));

        assert!(matches!(
            resolver.resolve_on(&spec, day),
            Err(TimeError::Invalid(_))
        ));
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(local(2024, 6, 15, 21, 0));
        clock.advance_secs(90);
        assert_eq!(clock.now(), local(2024, 6, 15, 21, 1) + chrono::Duration::seconds(30));
        assert_eq!(clock.now_ms(), clock.now().timestamp_millis());
    }
}
