//! The scheduler and its three tick loops

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use dashmap::DashMap;
use futures::future::join_all;
use nom_config::AppConfig;
use nom_core::{Clock, CommandOptions, Context, FaderSpec, Plan, Setter, TimeResolver, TimedSetter};
use nom_gateway::CapabilityGateway;
use serde_json::json;
use tokio::sync::{broadcast, Mutex, Notify};
use tracing::{debug, info, warn};

use crate::daily::DailyTimer;
use crate::fader::ActiveFader;
use crate::single::SingleShot;
use crate::{Dispatcher, ScheduleKey, SchedulerError};

/// Tick periods of the three loops
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Intervals {
    pub timers: Duration,
    pub faders: Duration,
    pub singles: Duration,
}

impl Default for Intervals {
    fn default() -> Self {
        Self::from_app(&AppConfig::default())
    }
}

impl Intervals {
    pub fn from_app(app: &AppConfig) -> Self {
        Self {
            timers: Duration::from_secs(app.timer_interval.max(1)),
            faders: Duration::from_secs(app.fader_interval.max(1)),
            singles: Duration::from_secs(app.single_interval.max(1)),
        }
    }
}

/// Owner of daily timers, faders and single-shot timers
pub struct Scheduler {
    clock: Arc<dyn Clock>,
    resolver: Arc<dyn TimeResolver>,
    gateway: Arc<dyn CapabilityGateway>,
    timers: Vec<DailyTimer>,
    faders: DashMap<ScheduleKey, ActiveFader>,
    singles: DashMap<ScheduleKey, SingleShot>,
    fader_wake: Notify,
    single_wake: Notify,
    /// Time of the previous daily-timer tick, for edge-triggered timers
    last_timer_tick: Mutex<Option<DateTime<Local>>>,
    generation: AtomicU64,
    intervals: Intervals,
    running: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
}

pub type SharedScheduler = Arc<Scheduler>;

impl Scheduler {
    pub fn new(
        timers: Vec<DailyTimer>,
        clock: Arc<dyn Clock>,
        resolver: Arc<dyn TimeResolver>,
        gateway: Arc<dyn CapabilityGateway>,
        intervals: Intervals,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            clock,
            resolver,
            gateway,
            timers,
            faders: DashMap::new(),
            singles: DashMap::new(),
            fader_wake: Notify::new(),
            single_wake: Notify::new(),
            last_timer_tick: Mutex::new(None),
            generation: AtomicU64::new(1),
            intervals,
            running: AtomicBool::new(false),
            shutdown_tx,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn resolver(&self) -> &Arc<dyn TimeResolver> {
        &self.resolver
    }

    pub fn timers(&self) -> &[DailyTimer] {
        &self.timers
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst)
    }

    /// Start a fade now, replacing any fade on the same `(node, attr)`
    pub fn register_fader(&self, spec: FaderSpec) {
        let key = ScheduleKey::new(&spec.node, spec.attr());
        let mut fader = ActiveFader::new(spec, self.clock.now_ms());
        fader.generation = self.next_generation();

        debug!(key = %key, duration = ?fader.spec.duration, "Registering fader");
        if self.faders.insert(key.clone(), fader).is_some() {
            debug!(key = %key, "Replaced running fader");
        }
        self.fader_wake.notify_one();
    }

    /// Schedule a setter, replacing any single-shot on the same `(node, attr)`
    pub fn register_single(&self, timed: TimedSetter) {
        let key = ScheduleKey::new(&timed.setter.node, &timed.setter.attr);
        let mut shot = SingleShot::from(timed);
        shot.generation = self.next_generation();

        debug!(key = %key, at_ms = shot.at_ms, setter = %shot.setter, "Registering single-shot timer");
        self.singles.insert(key, shot);
        self.single_wake.notify_one();
    }

    /// Drop scheduled work on `(node, attr)`; true if anything was removed
    pub fn cancel(&self, node: &str, attr: &str) -> bool {
        let key = ScheduleKey::new(node, attr);
        let fader = self.faders.remove(&key).is_some();
        let single = self.singles.remove(&key).is_some();
        if fader || single {
            debug!(key = %key, fader, single, "Canceled scheduled work");
        }
        fader || single
    }

    pub fn faders(&self) -> Vec<ActiveFader> {
        self.faders.iter().map(|e| e.value().clone()).collect()
    }

    pub fn singles(&self) -> Vec<SingleShot> {
        self.singles.iter().map(|e| e.value().clone()).collect()
    }

    /// Scheduled work as JSON, for status output
    pub fn status(&self) -> serde_json::Value {
        let timers: Vec<_> = self
            .timers
            .iter()
            .map(|t| {
                json!({
                    "id": t.id,
                    "node": t.node,
                    "strict": t.strict,
                    "events": t.events.iter().map(|(at, cmd)| json!([at.to_string(), cmd])).collect::<Vec<_>>(),
                })
            })
            .collect();
        json!({
            "timers": timers,
            "faders": self.faders(),
            "singles": self.singles(),
        })
    }

    /// Run strict timers and fire crossed non-strict ones
    pub async fn tick_timers(&self, dispatcher: &dyn Dispatcher) {
        let now = self.clock.now();
        let last = self.last_timer_tick.lock().await.replace(now);

        let mut commands: Vec<(&str, &str, CommandOptions)> = Vec::new();
        for timer in &self.timers {
            if timer.strict {
                if let Some(cmd) = timer.current_command(self.resolver.as_ref(), now) {
                    debug!("Timer {}: \"{}\"", timer.id, cmd);
                    commands.push((timer.id.as_str(), cmd, CommandOptions::timed()));
                }
            } else if let Some(last) = last {
                for cmd in timer.crossed(self.resolver.as_ref(), last, now) {
                    info!("Timer {}: \"{}\"", timer.id, cmd);
                    commands.push((timer.id.as_str(), cmd, CommandOptions::default()));
                }
            }
        }

        let runs = commands.into_iter().map(|(id, cmd, options)| async move {
            let response = dispatcher.run_command(cmd, options, Context::new()).await;
            if !response.is_success() {
                warn!(timer = %id, errors = ?response.errors, "Timer command failed");
            }
        });
        join_all(runs).await;
    }

    /// Advance every fader by one step
    pub async fn tick_faders(&self) {
        let now_ms = self.clock.now_ms();
        let snapshot: Vec<(ScheduleKey, ActiveFader)> = self
            .faders
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();

        let steps = snapshot.into_iter().map(|(key, fader)| async move {
            let finished = fader.is_finished(now_ms);
            if let Some(value) = fader.step(now_ms) {
                let setter = Setter::new(&key.node, fader.spec.attr(), Some(value.clone()));
                match self.gateway.set(&setter, &Context::new()).await {
                    Ok(()) => {
                        if let Some(mut entry) = self.faders.get_mut(&key) {
                            if entry.generation == fader.generation {
                                entry.last_applied = Some(value);
                            }
                        }
                    }
                    Err(e) => warn!(key = %key, error = %e, "Fader step failed"),
                }
            }
            if finished {
                let removed = self
                    .faders
                    .remove_if(&key, |_, f| f.generation == fader.generation);
                if removed.is_some() {
                    debug!(key = %key, "Fader finished");
                }
            }
        });
        join_all(steps).await;
    }

    /// Fire and remove due single-shot timers
    pub async fn tick_singles(&self, dispatcher: &dyn Dispatcher) {
        let now_ms = self.clock.now_ms();
        let due: Vec<ScheduleKey> = self
            .singles
            .iter()
            .filter(|e| e.value().is_due(now_ms))
            .map(|e| e.key().clone())
            .collect();

        let fired = due
            .into_iter()
            .filter_map(|key| self.singles.remove_if(&key, |_, s| s.is_due(now_ms)))
            .map(|(key, shot)| async move {
                info!(key = %key, setter = %shot.setter, "Single-shot timer fired");
                let plan = Plan::from_setters(vec![shot.setter]);
                let response = dispatcher.run_plan(plan, Context::new()).await;
                if !response.is_success() {
                    warn!(key = %key, errors = ?response.errors, "Single-shot timer failed");
                }
            });
        join_all(fired).await;
    }

    /// Spawn the three tick loops
    pub fn start(self: &Arc<Self>, dispatcher: Arc<dyn Dispatcher>) -> Result<(), SchedulerError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyRunning);
        }
        info!(
            timers = self.timers.len(),
            timer_interval = ?self.intervals.timers,
            "Starting scheduler"
        );

        let scheduler = self.clone();
        let timers_dispatcher = dispatcher.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(scheduler.intervals.timers);
            loop {
                tokio::select! {
                    _ = interval.tick() => scheduler.tick_timers(timers_dispatcher.as_ref()).await,
                    _ = shutdown_rx.recv() => break,
                }
            }
            debug!("Timer loop stopped");
        });

        let scheduler = self.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            loop {
                if scheduler.faders.is_empty() {
                    tokio::select! {
                        _ = scheduler.fader_wake.notified() => continue,
                        _ = shutdown_rx.recv() => break,
                    }
                }
                scheduler.tick_faders().await;
                tokio::select! {
                    _ = tokio::time::sleep(scheduler.intervals.faders) => {}
                    _ = shutdown_rx.recv() => break,
                }
            }
            debug!("Fader loop stopped");
        });

        let scheduler = self.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            loop {
                if scheduler.singles.is_empty() {
                    tokio::select! {
                        _ = scheduler.single_wake.notified() => continue,
                        _ = shutdown_rx.recv() => break,
                    }
                }
                scheduler.tick_singles(dispatcher.as_ref()).await;
                tokio::select! {
                    _ = tokio::time::sleep(scheduler.intervals.singles) => {}
                    _ = shutdown_rx.recv() => break,
                }
            }
            debug!("Single-shot loop stopped");
        });

        Ok(())
    }

    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("Stopping scheduler");
        let _ = self.shutdown_tx.send(());
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use nom_core::time::SolarResolver;
    use nom_core::{FadeValues, ManualClock, Response, Value};
    use nom_gateway::DeviceError;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct Recorder {
        sets: StdMutex<Vec<Setter>>,
        commands: StdMutex<Vec<(String, CommandOptions)>>,
        plans: StdMutex<Vec<Plan>>,
    }

    #[async_trait]
    impl CapabilityGateway for Recorder {
        fn has_get(&self, _node: &str, _attr: &str) -> bool {
            true
        }
        fn has_set(&self, _node: &str, _capability: &str) -> bool {
            true
        }
        async fn get(&self, _node: &str, _attr: &str, _ctx: &Context) -> Result<Value, DeviceError> {
            Ok(Value::Null)
        }
        async fn set(&self, setter: &Setter, _ctx: &Context) -> Result<(), DeviceError> {
            self.sets.lock().unwrap().push(setter.clone());
            Ok(())
        }
        fn current_value(&self, _node: &str, _attr: &str) -> Option<Value> {
            None
        }
    }

    #[async_trait]
    impl Dispatcher for Recorder {
        async fn run_command(&self, command: &str, options: CommandOptions, _ctx: Context) -> Response {
            self.commands
                .lock()
                .unwrap()
                .push((command.to_string(), options));
            Response::new(None, vec![])
        }
        async fn run_plan(&self, plan: Plan, _ctx: Context) -> Response {
            self.plans.lock().unwrap().push(plan);
            Response::new(None, vec![])
        }
    }

    fn setup(timers: Vec<DailyTimer>) -> (Scheduler, Arc<ManualClock>, Arc<Recorder>) {
        let start = Local.with_ymd_and_hms(2024, 6, 15, 21, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let recorder = Arc::new(Recorder::default());
        let scheduler = Scheduler::new(
            timers,
            clock.clone(),
            Arc::new(SolarResolver::default()),
            recorder.clone(),
            Intervals::default(),
        );
        (scheduler, clock, recorder)
    }

    fn brightness_fade(secs: u64) -> FaderSpec {
        FaderSpec {
            node: "bed".into(),
            values: FadeValues::Brightness { from: 0, to: 100 },
            duration: Duration::from_secs(secs),
        }
    }

    #[tokio::test]
    async fn test_fader_replaced_not_stacked() {
        let (scheduler, _clock, _rec) = setup(vec![]);
        scheduler.register_fader(brightness_fade(10));
        scheduler.register_fader(brightness_fade(20));

        let faders = scheduler.faders();
        assert_eq!(faders.len(), 1);
        assert_eq!(faders[0].spec.duration, Duration::from_secs(20));
    }

    #[tokio::test]
    async fn test_fader_runs_to_exact_end_and_is_removed() {
        let (scheduler, clock, rec) = setup(vec![]);
        scheduler.register_fader(brightness_fade(10));

        for _ in 0..4 {
            scheduler.tick_faders().await;
            clock.advance_secs(3);
        }
        scheduler.tick_faders().await;

        let applied: Vec<Value> = rec
            .sets
            .lock()
            .unwrap()
            .iter()
            .filter_map(|s| s.value.clone())
            .collect();
        let numbers: Vec<u64> = applied.iter().filter_map(|v| v.as_u64()).collect();
        assert!(numbers.windows(2).all(|w| w[0] <= w[1]), "{:?}", numbers);
        assert_eq!(numbers.last(), Some(&100));
        assert!(scheduler.faders().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_drops_fader_and_single() {
        let (scheduler, clock, _rec) = setup(vec![]);
        scheduler.register_fader(brightness_fade(10));
        scheduler.register_single(TimedSetter {
            setter: Setter::state("bed", false),
            at_ms: clock.now_ms() + 1000,
        });

        assert!(scheduler.cancel("bed", "brightness"));
        assert!(scheduler.faders().is_empty());
        assert_eq!(scheduler.singles().len(), 1);

        // flip and state share a key
        assert!(scheduler.cancel("bed", "flip"));
        assert!(scheduler.singles().is_empty());
        assert!(!scheduler.cancel("bed", "state"));
    }

    #[tokio::test]
    async fn test_single_fires_once() {
        let (scheduler, clock, rec) = setup(vec![]);
        scheduler.register_single(TimedSetter {
            setter: Setter::state("lamp", false),
            at_ms: clock.now_ms() + 60 * 60 * 1000,
        });

        scheduler.tick_singles(rec.as_ref()).await;
        assert!(rec.plans.lock().unwrap().is_empty());

        clock.advance_secs(60 * 60);
        scheduler.tick_singles(rec.as_ref()).await;
        scheduler.tick_singles(rec.as_ref()).await;

        let plans = rec.plans.lock().unwrap();
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].setters, vec![Setter::state("lamp", false)]);
        assert!(scheduler.singles().is_empty());
    }

    #[tokio::test]
    async fn test_strict_timer_reasserts_every_tick() {
        let timer = DailyTimer {
            id: "night".into(),
            node: Some("lamp".into()),
            strict: true,
            events: vec![
                ("18:00".parse().unwrap(), "set lamp on".into()),
                ("23:00".parse().unwrap(), "set lamp off".into()),
            ],
        };
        let (scheduler, _clock, rec) = setup(vec![timer]);

        scheduler.tick_timers(rec.as_ref()).await;
        scheduler.tick_timers(rec.as_ref()).await;

        let commands = rec.commands.lock().unwrap();
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0], ("set lamp on".to_string(), CommandOptions::timed()));
        assert_eq!(commands[0], commands[1]);
    }

    #[tokio::test]
    async fn test_edge_timer_fires_on_crossing_only() {
        let timer = DailyTimer {
            id: "news".into(),
            node: None,
            strict: false,
            events: vec![("21:01".parse().unwrap(), "do radio".into())],
        };
        let (scheduler, clock, rec) = setup(vec![timer]);

        // first tick only records the time
        scheduler.tick_timers(rec.as_ref()).await;
        clock.advance_secs(60);
        scheduler.tick_timers(rec.as_ref()).await;
        clock.advance_secs(60);
        scheduler.tick_timers(rec.as_ref()).await;

        let commands = rec.commands.lock().unwrap();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].0, "do radio");
        assert!(!commands[0].1.include_timed);
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let (scheduler, _clock, rec) = setup(vec![]);
        let scheduler = Arc::new(scheduler);

        scheduler.start(rec.clone()).unwrap();
        assert!(scheduler.is_running());
        assert!(matches!(
            scheduler.start(rec.clone()),
            Err(SchedulerError::AlreadyRunning)
        ));
        scheduler.stop();
        assert!(!scheduler.is_running());
    }
}
