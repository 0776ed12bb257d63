//! Daily timers
//!
//! A strict timer answers "what should the node be doing right now": it takes
//! every event time of today and of yesterday and picks the command of the
//! latest one that is not in the future. Looking at yesterday makes the hours
//! after midnight, before today's first event, come out right.

use chrono::{DateTime, Local, NaiveDate};
use nom_config::TimerDef;
use nom_core::{TimeResolver, TimeSpec};
use tracing::warn;

/// A timer with `(time, command)` events recurring every day
#[derive(Debug, Clone, PartialEq)]
pub struct DailyTimer {
    pub id: String,
    pub node: Option<String>,
    pub strict: bool,
    pub events: Vec<(TimeSpec, String)>,
}

impl From<TimerDef> for DailyTimer {
    fn from(def: TimerDef) -> Self {
        Self {
            id: def.id,
            node: def.node,
            strict: def.strict,
            events: def.events,
        }
    }
}

impl DailyTimer {
    /// Command of the most recently crossed boundary
    pub fn current_command(
        &self,
        resolver: &dyn TimeResolver,
        now: DateTime<Local>,
    ) -> Option<&str> {
        select_current(&self.events, resolver, now)
    }

    /// Commands whose time lies in `(last, now]`, in time order
    pub fn crossed(
        &self,
        resolver: &dyn TimeResolver,
        last: DateTime<Local>,
        now: DateTime<Local>,
    ) -> Vec<&str> {
        let today = now.date_naive();
        let first = last.date_naive().max(today.pred_opt().unwrap_or(today));
        let days: Vec<NaiveDate> = first.iter_days().take_while(|d| *d <= today).collect();

        let mut fired: Vec<(DateTime<Local>, &str)> = Vec::new();
        for (spec, cmd) in &self.events {
            let days = if spec.is_daily() { &days[..] } else { &days[..1] };
            for day in days {
                match resolver.resolve_on(spec, *day) {
                    Ok(at) if last < at && at <= now => fired.push((at, cmd.as_str())),
                    Ok(_) => {}
                    Err(e) => warn!(timer = %self.id, error = %e, "Cannot resolve timer event"),
                }
            }
        }
        fired.sort_by_key(|(at, _)| *at);
        fired.into_iter().map(|(_, cmd)| cmd).collect()
    }
}

/// Pick the command whose time is the greatest one `<= now`
///
/// Candidates are each event's time today and yesterday. Events that cannot
/// be resolved (a sun event that does not happen, no location) are skipped.
pub fn select_current<'a>(
    events: &'a [(TimeSpec, String)],
    resolver: &dyn TimeResolver,
    now: DateTime<Local>,
) -> Option<&'a str> {
    let today = now.date_naive();
    let yesterday = today.pred_opt()?;

    [yesterday, today]
        .into_iter()
        .flat_map(|day| {
            events.iter().filter_map(move |(spec, cmd)| {
                match resolver.resolve_on(spec, day) {
                    Ok(at) => Some((at, cmd.as_str())),
                    Err(e) => {
                        warn!(event = %spec, error = %e, "Cannot resolve timer event");
                        None
                    }
                }
            })
        })
        .filter(|(at, _)| *at <= now)
        .max_by_key(|(at, _)| *at)
        .map(|(_, cmd)| cmd)
}
