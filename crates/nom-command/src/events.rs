//! Actions triggered by value changes and by the time of day
//!
//! An action's `event` is either a value-change key (`button.action`,
//! optionally with `value`, or `button.action.single`) or a time spec
//! (`"07:30"`, `"sunset-15m"`). Value-change actions are routed here; time
//! actions become non-strict daily timers in the scheduler.
//!
//! Commands run with a child [`Context`], one hop deeper than the change
//! that triggered them. A chain deeper than `max_trigger_depth` is cut off
//! and logged as a configuration error.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use nom_config::{ActionConfig, ConfigError};
use nom_core::value::render;
use nom_core::{CommandOptions, Event, TimeSpec, Value};
use nom_event_bus::EventBus;
use nom_scheduler::{DailyTimer, Dispatcher};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

/// An action bound to a value change
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub event: String,
    pub value: Option<Value>,
    pub commands: Vec<String>,
}

impl Binding {
    pub fn matches(&self, event: &Event) -> bool {
        if self.event == event.event_type.as_str() {
            return self
                .value
                .as_ref()
                .map_or(true, |v| render(v) == render(&event.value));
        }
        self.value.is_none() && self.event == event.value_key()
    }
}

fn is_time_event(event: &str) -> bool {
    event.parse::<TimeSpec>().is_ok()
}

/// Daily timers for actions whose event is a time of day
pub fn time_actions(actions: &[ActionConfig]) -> Vec<DailyTimer> {
    actions
        .iter()
        .enumerate()
        .filter_map(|(i, action)| {
            let spec: TimeSpec = action.event.as_deref()?.parse().ok()?;
            Some(DailyTimer {
                id: action
                    .id
                    .clone()
                    .unwrap_or_else(|| format!("action-{}", i + 1)),
                node: None,
                strict: false,
                events: action
                    .commands
                    .to_vec()
                    .into_iter()
                    .map(|cmd| (spec.clone(), cmd))
                    .collect(),
            })
        })
        .collect()
}

/// Routes value-change events to action commands
pub struct EventRouter {
    bindings: Vec<Binding>,
    max_depth: u32,
    running: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
}

impl EventRouter {
    pub fn from_actions(actions: &[ActionConfig], max_depth: u32) -> Self {
        let bindings = actions
            .iter()
            .filter_map(|action| {
                let event = action.event.as_deref()?;
                (!is_time_event(event)).then(|| Binding {
                    event: event.to_string(),
                    value: action.value.clone(),
                    commands: action.commands.to_vec(),
                })
            })
            .collect();
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            bindings,
            max_depth,
            running: AtomicBool::new(false),
            shutdown_tx,
        }
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    /// Run the commands of every binding the event matches
    ///
    /// Returns how many commands were dispatched.
    pub async fn trigger(&self, event: &Event, dispatcher: &dyn Dispatcher) -> usize {
        let ctx = event.context.child();
        let mut commands = Vec::new();
        for binding in self.bindings.iter().filter(|b| b.matches(event)) {
            if ctx.depth > self.max_depth {
                let e = ConfigError::TriggerDepthExceeded {
                    event: binding.event.clone(),
                    depth: ctx.depth,
                    max: self.max_depth,
                };
                error!("Config Error: {}", e);
                continue;
            }
            info!("Event: {} {}", event.event_type, render(&event.value));
            commands.extend(binding.commands.iter());
        }

        let count = commands.len();
        let runs = commands.into_iter().map(|cmd| {
            let ctx = ctx.clone();
            async move {
                let response = dispatcher
                    .run_command(cmd, CommandOptions::default(), ctx)
                    .await;
                if !response.is_success() {
                    warn!(command = %cmd, errors = ?response.errors, "Triggered command failed");
                }
            }
        });
        join_all(runs).await;
        count
    }

    /// Listen on the bus until stopped
    pub fn start(self: &Arc<Self>, bus: &EventBus, dispatcher: Arc<dyn Dispatcher>) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Event router already running");
            return;
        }
        if self.bindings.is_empty() {
            debug!("No event bindings, router idle");
        }

        let router = self.clone();
        let mut events = bus.subscribe_all();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    received = events.recv() => match received {
                        Ok(event) => {
                            let router = router.clone();
                            let dispatcher = dispatcher.clone();
                            tokio::spawn(async move {
                                router.trigger(&event, dispatcher.as_ref()).await;
                            });
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Event router lagging behind");
                        }
                        Err(RecvError::Closed) => break,
                    },
                    _ = shutdown_rx.recv() => break,
                }
            }
            debug!("Event router stopped");
        });
    }

    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            let _ = self.shutdown_tx.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use nom_config::Commands;
    use nom_core::{Context, Plan, Response};
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        commands: Mutex<Vec<(String, u32)>>,
    }

    #[async_trait]
    impl Dispatcher for Recorder {
        async fn run_command(&self, command: &str, _options: CommandOptions, ctx: Context) -> Response {
            self.commands
                .lock()
                .unwrap()
                .push((command.to_string(), ctx.depth));
            Response::new(None, vec![])
        }
        async fn run_plan(&self, _plan: Plan, _ctx: Context) -> Response {
            Response::new(None, vec![])
        }
    }

    fn action(id: Option<&str>, event: &str, value: Option<Value>, cmd: &str) -> ActionConfig {
        ActionConfig {
            id: id.map(String::from),
            event: Some(event.to_string()),
            value,
            commands: Commands::One(cmd.to_string()),
        }
    }

    fn actions() -> Vec<ActionConfig> {
        vec![
            action(None, "button.action.single", None, "set hall flip"),
            action(None, "door.state", Some(json!(true)), "set hall on"),
            action(None, "door.state", None, "get hall"),
            action(Some("wake"), "07:30", None, "set bedroom 100"),
        ]
    }

    #[test]
    fn test_time_events_split_off() {
        let router = EventRouter::from_actions(&actions(), 4);
        assert_eq!(router.bindings().len(), 3);

        let timers = time_actions(&actions());
        assert_eq!(timers.len(), 1);
        assert_eq!(timers[0].id, "wake");
        assert!(!timers[0].strict);
        assert_eq!(timers[0].events[0].1, "set bedroom 100");
    }

    #[tokio::test]
    async fn test_matching_by_key_and_value() {
        let router = EventRouter::from_actions(&actions(), 4);
        let recorder = Recorder::default();

        let press = Event::value_changed("button", "action", json!("single"), Context::new());
        assert_eq!(router.trigger(&press, &recorder).await, 1);

        let opened = Event::value_changed("door", "state", json!(true), Context::new());
        assert_eq!(router.trigger(&opened, &recorder).await, 2);

        let closed = Event::value_changed("door", "state", json!(false), Context::new());
        assert_eq!(router.trigger(&closed, &recorder).await, 1);

        let commands = recorder.commands.lock().unwrap();
        assert_eq!(commands[0], ("set hall flip".to_string(), 1));
    }

    #[tokio::test]
    async fn test_depth_limit() {
        let router = EventRouter::from_actions(&actions(), 2);
        let recorder = Recorder::default();

        let mut ctx = Context::new();
        ctx.depth = 1;
        let event = Event::value_changed("door", "state", json!(false), ctx.clone());
        assert_eq!(router.trigger(&event, &recorder).await, 1);

        ctx.depth = 2;
        let event = Event::value_changed("door", "state", json!(false), ctx);
        assert_eq!(router.trigger(&event, &recorder).await, 0);
    }
}
