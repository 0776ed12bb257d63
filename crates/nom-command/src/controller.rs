//! The constructed controller: topology, gateway, scheduler and event routing

use std::sync::Arc;

use async_trait::async_trait;
use nom_config::{Config, ConfigError};
use nom_core::time::SolarResolver;
use nom_core::{Clock, CommandOptions, Context, Plan, Response, SystemClock, TimeResolver, Value};
use nom_devices::DriverRegistry;
use nom_event_bus::{EventBus, SharedEventBus};
use nom_gateway::NodeGateway;
use nom_scheduler::{DailyTimer, Dispatcher, Intervals, Scheduler, SchedulerError, SharedScheduler};
use nom_topology::Topology;
use serde_json::{json, Map};
use tracing::{debug, info};

use crate::compiler::Compiler;
use crate::events::{time_actions, EventRouter};
use crate::executor::Executor;

/// Everything a command needs, built once from the configuration
pub struct Controller {
    topology: Arc<Topology>,
    gateway: Arc<NodeGateway>,
    bus: SharedEventBus,
    scheduler: SharedScheduler,
    router: Arc<EventRouter>,
    clock: Arc<dyn Clock>,
    resolver: Arc<dyn TimeResolver>,
}

impl Controller {
    /// Build against the wall clock
    pub fn from_config(config: &Config, registry: &DriverRegistry) -> Result<Self, ConfigError> {
        Self::with_clock(config, registry, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: &Config,
        registry: &DriverRegistry,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        let topology = Arc::new(Topology::from_config(config, registry)?);
        let bus: SharedEventBus = Arc::new(EventBus::new());
        let gateway = Arc::new(NodeGateway::new(topology.clone(), bus.clone()));
        let resolver: Arc<dyn TimeResolver> = Arc::new(SolarResolver::new(config.location));

        info!("Loading timers...");
        let mut timers: Vec<DailyTimer> = config
            .timer_defs()?
            .into_iter()
            .map(DailyTimer::from)
            .collect();
        timers.extend(time_actions(&config.actions));

        let scheduler = Arc::new(Scheduler::new(
            timers,
            clock.clone(),
            resolver.clone(),
            gateway.clone(),
            Intervals::from_app(&config.app),
        ));
        let router = Arc::new(EventRouter::from_actions(
            &config.actions,
            config.app.max_trigger_depth,
        ));

        Ok(Self {
            topology,
            gateway,
            bus,
            scheduler,
            router,
            clock,
            resolver,
        })
    }

    pub fn topology(&self) -> &Arc<Topology> {
        &self.topology
    }

    pub fn gateway(&self) -> &Arc<NodeGateway> {
        &self.gateway
    }

    pub fn bus(&self) -> &SharedEventBus {
        &self.bus
    }

    pub fn scheduler(&self) -> &SharedScheduler {
        &self.scheduler
    }

    pub fn compile(&self, command: &str, options: CommandOptions) -> Plan {
        Compiler::new(
            &self.topology,
            self.gateway.as_ref(),
            self.clock.as_ref(),
            self.resolver.as_ref(),
        )
        .compile(command, options)
    }

    /// Compile and execute a command batch
    pub async fn execute(&self, command: &str, options: CommandOptions, ctx: Context) -> Response {
        info!(ctx = %ctx.id, depth = ctx.depth, "Command: {}", command);
        let plan = self.compile(command, options);
        debug!(
            getters = plan.getters.len(),
            setters = plan.setters.len(),
            faders = plan.faders.len(),
            timed = plan.timed_setters.len(),
            errors = plan.errors.len(),
            "Compiled"
        );
        self.execute_plan(plan, &ctx).await
    }

    pub async fn execute_plan(&self, plan: Plan, ctx: &Context) -> Response {
        Executor::new(self.gateway.as_ref(), &self.scheduler)
            .execute(plan, ctx)
            .await
    }

    /// Run configured actions by id
    pub async fn run_actions(&self, ids: &[&str], ctx: Context) -> Response {
        if ids.is_empty() {
            return Response::error("Nothing to do");
        }
        let command = format!("do {}", ids.join(" "));
        self.execute(&command, CommandOptions::default(), ctx).await
    }

    /// Cached node values and scheduled work
    pub fn status(&self) -> Value {
        let nodes: Map<String, Value> = self
            .topology
            .nodes()
            .map(|node| {
                let values = self.gateway.snapshot(node.id()).unwrap_or_default();
                (
                    node.id().to_string(),
                    json!({
                        "device": node.device().id(),
                        "online": node.is_online(),
                        "timed": self.topology.is_timed(node.id()),
                        "values": values,
                    }),
                )
            })
            .collect();
        json!({
            "nodes": nodes,
            "scheduler": self.scheduler.status(),
        })
    }

    /// Start the scheduler loops and event routing
    pub fn start(self: &Arc<Self>) -> Result<(), SchedulerError> {
        let dispatcher: Arc<dyn Dispatcher> = self.clone();
        self.scheduler.start(dispatcher.clone())?;
        self.router.start(&self.bus, dispatcher);
        info!("Controller started");
        Ok(())
    }

    pub fn stop(&self) {
        self.router.stop();
        self.scheduler.stop();
        info!("Controller stopped");
    }
}

#[async_trait]
impl Dispatcher for Controller {
    async fn run_command(&self, command: &str, options: CommandOptions, ctx: Context) -> Response {
        self.execute(command, options, ctx).await
    }

    async fn run_plan(&self, plan: Plan, ctx: Context) -> Response {
        self.execute_plan(plan, &ctx).await
    }
}
