//! Command compiler
//!
//! Turns command text into a [`Plan`]. A batch is split on `;` and every
//! sub-command is compiled on its own, then the plans are merged. The first
//! token picks the verb:
//!
//! ```text
//! status [target...]
//! do <action>...
//! get [sum|avg|min|max] [target...] [attr...]
//! set <target...> [on|off|flip] [color] [brightness|on|off] [at|in|until|for|over <time>]
//! fade <target...> [brightness|color] [from] <value> [to] <value> [for|over] <duration>
//! ```
//!
//! Targets are read greedily: tokens are taken as node or group ids until one
//! resolves to nothing, and that token becomes the next grammar element.
//! Errors never stop a batch; they are collected in the plan.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::OnceLock;
use std::time::Duration;

use nom_core::time::parse_duration;
use nom_core::value::default_off;
use nom_core::{
    attrs, Calc, Clock, CommandOptions, FadeValues, FaderSpec, Getter, Plan, Rgb, Setter,
    TimeError, TimeResolver, TimeSpec, TimedSetter,
};
use nom_gateway::CapabilityGateway;
use nom_topology::{SharedNode, Topology};
use regex::Regex;
use tracing::trace;

use crate::error::CompileError;

/// Node class that never gets the brightness threshold fallback
const CLASS_POWER: &str = "power";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Token {
    On,
    Off,
    Flip,
    Percent,
    Number,
}

impl Token {
    const ALL: [Token; 5] = [Token::On, Token::Off, Token::Flip, Token::Percent, Token::Number];

    fn pattern(self) -> &'static str {
        match self {
            Token::On => r"^(on|true|yes|bright|full|max.*|ein|an)$",
            Token::Off => r"^(off|false|no|none|aus|min.*)$",
            Token::Flip => r"^(flip|toggle)$",
            Token::Percent => r"^(\d|\d{2}|100|0+)%?$",
            Token::Number => r"^\d+%?$",
        }
    }

    fn matches(self, arg: &str) -> bool {
        static PATTERNS: OnceLock<HashMap<Token, Regex>> = OnceLock::new();
        PATTERNS
            .get_or_init(|| {
                Token::ALL
                    .iter()
                    .filter_map(|t| Regex::new(t.pattern()).ok().map(|re| (*t, re)))
                    .collect()
            })
            .get(&self)
            .is_some_and(|re| re.is_match(arg))
    }
}

fn percent(arg: &str) -> Option<u8> {
    arg.trim_end_matches('%').parse::<u8>().ok().map(|p| p.min(100))
}

fn is_time_keyword(arg: &str) -> bool {
    matches!(arg, "at" | "in" | "until" | "for" | "over")
}

fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

/// Tokens of one sub-command, consumed from the front
struct Args<'t> {
    tokens: VecDeque<&'t str>,
}

impl<'t> Args<'t> {
    fn new(command: &'t str) -> Self {
        Self {
            tokens: command.split_whitespace().collect(),
        }
    }

    fn peek(&self) -> Option<&'t str> {
        self.tokens.front().copied()
    }

    fn next(&mut self) -> Option<&'t str> {
        self.tokens.pop_front()
    }

    fn next_if(&mut self, pred: impl FnOnce(&str) -> bool) -> Option<&'t str> {
        match self.peek() {
            Some(arg) if pred(arg) => self.next(),
            _ => None,
        }
    }

    fn clear(&mut self) {
        self.tokens.clear();
    }

    /// Error for whatever was not consumed
    fn leftover(&self) -> Option<CompileError> {
        (!self.tokens.is_empty()).then(|| {
            CompileError::Remaining(self.tokens.iter().copied().collect::<Vec<_>>().join(" "))
        })
    }
}

/// One end of a fade
#[derive(Debug, Clone, Copy, PartialEq)]
enum FadeEnd {
    Color(Rgb),
    Brightness(u8),
}

/// Compiles command text against a topology
pub struct Compiler<'a> {
    topology: &'a Topology,
    gateway: &'a dyn CapabilityGateway,
    clock: &'a dyn Clock,
    resolver: &'a dyn TimeResolver,
}

impl<'a> Compiler<'a> {
    pub fn new(
        topology: &'a Topology,
        gateway: &'a dyn CapabilityGateway,
        clock: &'a dyn Clock,
        resolver: &'a dyn TimeResolver,
    ) -> Self {
        Self {
            topology,
            gateway,
            clock,
            resolver,
        }
    }

    /// Compile a batch; an empty merged plan is a "Nothing to do" error
    pub fn compile(&self, text: &str, options: CommandOptions) -> Plan {
        let mut stack = Vec::new();
        let mut plan = self.batch(text, options, &mut stack);
        if plan.has_no_actions() && plan.errors.is_empty() {
            plan.push_error(CompileError::NothingToDo);
        }
        plan
    }

    fn batch(&self, text: &str, options: CommandOptions, stack: &mut Vec<String>) -> Plan {
        let commands: Vec<&str> = text
            .split(';')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .collect();
        if commands.is_empty() {
            return Plan::error(CompileError::Empty);
        }

        let mut plan = Plan::new();
        for command in commands {
            plan.merge(self.command(command, options, stack));
        }
        plan
    }

    fn command(&self, command: &str, options: CommandOptions, stack: &mut Vec<String>) -> Plan {
        trace!(command = %command, "Compiling");
        let mut args = Args::new(command);
        match args.next() {
            None => Plan::error(CompileError::Empty),
            Some("status") => self.status(args),
            Some("do") => self.actions(args, options, stack),
            Some("get") => self.get(args),
            Some("set") => self.set(args, options),
            Some("fade") => self.fade(args, options),
            Some(verb) => Plan::error(CompileError::UnknownVerb(verb.to_string())),
        }
    }

    /// Greedily read node and group ids, without duplicates
    fn targets(&self, args: &mut Args<'_>, options: CommandOptions) -> Vec<SharedNode> {
        let mut seen = HashSet::new();
        let mut nodes = Vec::new();
        while let Some(token) = args.peek() {
            let resolved = self.topology.resolve(token, options);
            if resolved.is_empty() {
                break;
            }
            args.next();
            for node in resolved {
                if seen.insert(node.id().to_string()) {
                    nodes.push(node);
                }
            }
        }
        nodes
    }

    fn status(&self, mut args: Args<'_>) -> Plan {
        let options = CommandOptions::timed();
        let mut plan = Plan::new();

        if args.peek().is_none() {
            plan.getters = self
                .topology
                .all_nodes(options)
                .iter()
                .filter(|node| node.has_get(attrs::STATUS))
                .map(|node| Getter::new(node.id(), attrs::STATUS))
                .collect();
            return plan;
        }

        while let Some(token) = args.next() {
            let nodes: Vec<SharedNode> = self
                .topology
                .resolve(token, options)
                .into_iter()
                .filter(|node| node.has_get(attrs::STATUS))
                .collect();
            if nodes.is_empty() {
                plan.push_error(CompileError::NotAStatusTarget(token.to_string()));
            }
            plan.getters.extend(
                nodes
                    .iter()
                    .map(|node| Getter::new(node.id(), attrs::STATUS)),
            );
        }
        plan
    }

    fn actions(&self, mut args: Args<'_>, options: CommandOptions, stack: &mut Vec<String>) -> Plan {
        let mut plan = Plan::new();
        while let Some(id) = args.next() {
            if stack.iter().any(|entry| entry == id) {
                plan.push_error(CompileError::ActionCycle(id.to_string()));
                continue;
            }
            let Some(commands) = self.topology.actions().get(id) else {
                plan.push_error(CompileError::UnknownAction(id.to_string()));
                continue;
            };

            stack.push(id.to_string());
            for command in commands {
                plan.merge(self.batch(command, options, stack));
            }
            stack.pop();
        }
        plan
    }

    fn get(&self, mut args: Args<'_>) -> Plan {
        let options = CommandOptions::timed();
        let mut plan = Plan::new();

        if let Some(calc) = args.peek().and_then(Calc::from_token) {
            args.next();
            plan.calc = Some(calc);
        }

        let mut nodes = self.targets(&mut args, options);
        if nodes.is_empty() {
            nodes = self.topology.all_nodes(options);
        }

        if args.peek().is_none() {
            for node in &nodes {
                for attr in node.getters() {
                    plan.getters.push(Getter::new(node.id(), attr));
                }
            }
            return plan;
        }

        let single = nodes.len() == 1;
        while let Some(attr) = args.next() {
            for node in &nodes {
                if node.has_get(attr) {
                    plan.getters.push(Getter::new(node.id(), attr));
                } else if single {
                    plan.push_error(CompileError::NoGetter {
                        node: node.id().to_string(),
                        attr: attr.to_string(),
                    });
                }
            }
        }
        plan
    }

    fn set(&self, mut args: Args<'_>, options: CommandOptions) -> Plan {
        let nodes = self.targets(&mut args, options);
        if nodes.is_empty() {
            return Plan::error(CompileError::NoNodes);
        }
        let single = nodes.len() == 1;
        let mut plan = Plan::new();
        let mut setters = Vec::new();

        // on / off / flip
        if let Some(arg) = args.peek() {
            let capability = if Token::On.matches(arg) {
                Some(attrs::ON)
            } else if Token::Off.matches(arg) {
                Some(attrs::OFF)
            } else if Token::Flip.matches(arg) {
                Some(attrs::FLIP)
            } else {
                None
            };

            if let Some(capability) = capability {
                args.next();
                for node in &nodes {
                    if node.has_set(capability) {
                        setters.push(switch(node.id(), capability));
                    } else if single {
                        plan.push_error(CompileError::NoSetter {
                            device: node.device().id().to_string(),
                            device_type: node.device().device_type().to_string(),
                            node: node.id().to_string(),
                            arg: arg.to_string(),
                        });
                    }
                }
            }
        }

        // color, switching on when nothing but a time modifier follows
        if let Some(rgb) = args.peek().and_then(|arg| self.topology.colors().lookup(arg)) {
            args.next();
            let last = args.peek().map_or(true, is_time_keyword);
            for node in &nodes {
                if node.has_set(attrs::COLOR) {
                    setters.push(Setter::color(node.id(), rgb));
                    if last && node.has_set(attrs::ON) {
                        setters.push(Setter::state(node.id(), true));
                    }
                } else if single {
                    plan.push_error(CompileError::NoColor {
                        device: node.device().id().to_string(),
                        device_type: node.device().device_type().to_string(),
                        node: node.id().to_string(),
                    });
                }
            }
        }

        // brightness
        if let Some(arg) = args.peek().filter(|arg| !is_time_keyword(arg)) {
            let brightness = if Token::Percent.matches(arg) {
                percent(arg)
            } else if Token::Number.matches(arg) {
                plan.push_error(CompileError::BrightnessRange);
                None
            } else if Token::On.matches(arg) {
                Some(100)
            } else if Token::Off.matches(arg) {
                Some(0)
            } else {
                plan.push_error(CompileError::UnknownArgument(arg.to_string()));
                args.clear();
                plan.setters = setters;
                return plan;
            };
            args.next();

            if let Some(brightness) = brightness {
                self.brightness(&nodes, brightness, &mut setters, &mut plan);
            }
        }

        match args.next_if(is_time_keyword) {
            Some(keyword) => match args.next() {
                Some(token) => self.modify(keyword, token, setters, &mut plan),
                None => {
                    let error = match keyword {
                        "at" | "until" => CompileError::MissingTime(keyword.to_string()),
                        _ => CompileError::MissingDuration,
                    };
                    plan.push_error(error);
                }
            },
            None => plan.setters.extend(setters),
        }

        if let Some(e) = args.leftover() {
            plan.push_error(e);
        }
        plan
    }

    /// Brightness setters, with the on/off threshold fallback
    fn brightness(
        &self,
        nodes: &[SharedNode],
        brightness: u8,
        setters: &mut Vec<Setter>,
        plan: &mut Plan,
    ) {
        let single = nodes.len() == 1;
        for node in nodes {
            if node.has_set(attrs::BRIGHTNESS) {
                setters.push(Setter::brightness(node.id(), brightness));
                if brightness == 100 && node.has_set(attrs::ON) {
                    setters.push(Setter::state(node.id(), true));
                }
                if brightness == 0 && node.has_set(attrs::OFF) {
                    setters.push(Setter::state(node.id(), false));
                }
                continue;
            }

            let threshold = node
                .threshold()
                .filter(|_| node.class() != Some(CLASS_POWER));
            match threshold {
                Some(t) if brightness >= t && node.has_set(attrs::ON) => {
                    setters.push(Setter::state(node.id(), true));
                }
                Some(t) if brightness < t && node.has_set(attrs::OFF) => {
                    setters.push(Setter::state(node.id(), false));
                }
                _ if single => plan.push_error(CompileError::NoBrightness {
                    device: node.device().id().to_string(),
                    node: node.id().to_string(),
                }),
                _ => {}
            }
        }
    }

    /// Apply a trailing time modifier to the setters of one `set`
    fn modify(&self, keyword: &str, token: &str, setters: Vec<Setter>, plan: &mut Plan) {
        let result = match keyword {
            "at" => self.time_at(token).map(|at_ms| schedule(setters, at_ms, plan)),
            "in" => self.time_in(token).map(|at_ms| schedule(setters, at_ms, plan)),
            "until" => self.time_at(token).map(|at_ms| self.restore(setters, at_ms, plan)),
            "for" => self.time_in(token).map(|at_ms| self.restore(setters, at_ms, plan)),
            _ => self.duration(token).map(|d| self.transition(setters, d, plan)),
        };
        if let Err(e) = result {
            plan.push_error(e);
        }
    }

    /// Epoch ms of the next occurrence of a time spec
    fn time_at(&self, token: &str) -> Result<i64, CompileError> {
        let invalid = |e: TimeError| CompileError::InvalidTime {
            token: token.to_string(),
            reason: e.to_string(),
        };
        let spec: TimeSpec = token.parse().map_err(invalid)?;
        let at = self
            .resolver
            .next_occurrence(&spec, self.clock.now())
            .map_err(invalid)?;
        Ok(at.timestamp_millis())
    }

    fn time_in(&self, token: &str) -> Result<i64, CompileError> {
        let duration = self.duration(token)?;
        Ok(self.clock.now_ms().saturating_add(millis(duration)))
    }

    fn duration(&self, token: &str) -> Result<Duration, CompileError> {
        parse_duration(token).ok_or_else(|| CompileError::InvalidDuration(token.to_string()))
    }

    /// Apply now, and schedule putting back what was there before
    fn restore(&self, setters: Vec<Setter>, at_ms: i64, plan: &mut Plan) {
        for setter in &setters {
            match self.previous(setter) {
                Ok(previous) => plan.timed_setters.push(TimedSetter {
                    setter: previous,
                    at_ms,
                }),
                Err(e) => plan.push_error(e),
            }
        }
        plan.setters.extend(setters);
    }

    /// Setter that undoes `setter`, from the cached value or the off default
    fn previous(&self, setter: &Setter) -> Result<Setter, CompileError> {
        if setter.attr == attrs::FLIP {
            return Ok(Setter::flip(&setter.node));
        }
        let value = self
            .gateway
            .current_value(&setter.node, &setter.attr)
            .filter(|v| !v.is_null())
            .or_else(|| default_off(&setter.attr))
            .ok_or_else(|| CompileError::NoRestoreValue {
                node: setter.node.clone(),
                attr: setter.attr.clone(),
            })?;
        Ok(Setter::new(&setter.node, &setter.attr, Some(value)))
    }

    /// Turn brightness and color setters into fades from the cached value
    fn transition(&self, setters: Vec<Setter>, duration: Duration, plan: &mut Plan) {
        for setter in setters {
            let current = self.gateway.current_value(&setter.node, &setter.attr);
            let values = match (setter.attr.as_str(), &setter.value, &current) {
                (attrs::BRIGHTNESS, Some(to), Some(from)) => to
                    .as_u64()
                    .zip(from.as_u64())
                    .map(|(to, from)| FadeValues::Brightness {
                        from: from.min(100) as u8,
                        to: to.min(100) as u8,
                    }),
                (attrs::COLOR, Some(to), Some(from)) => Rgb::from_value(to)
                    .zip(Rgb::from_value(from))
                    .map(|(to, from)| FadeValues::Color { from, to }),
                _ => None,
            };

            match values {
                Some(values) if !duration.is_zero() => plan.faders.push(FaderSpec {
                    node: setter.node,
                    values,
                    duration,
                }),
                _ => plan.setters.push(setter),
            }
        }
    }

    fn fade(&self, mut args: Args<'_>, options: CommandOptions) -> Plan {
        let nodes = self.targets(&mut args, options);
        if nodes.is_empty() {
            return Plan::error(CompileError::NoNodes);
        }
        let single = nodes.len() == 1;
        let mut plan = Plan::new();

        let attr = args.next_if(|a| a == attrs::BRIGHTNESS || a == attrs::COLOR);
        args.next_if(|a| a == "from");
        let from = self.fade_end(&mut args, attr);
        args.next_if(|a| a == "to");
        let to = self.fade_end(&mut args, attr);
        args.next_if(|a| a == "for" || a == "over");

        let duration = match args.next() {
            None => Err(CompileError::MissingDuration),
            Some(token) => match self.duration(token) {
                Ok(d) if d.is_zero() => Err(CompileError::MissingDuration),
                other => other,
            },
        };

        let values = match (from, to) {
            (Some(FadeEnd::Color(from)), Some(FadeEnd::Color(to))) => {
                Some(FadeValues::Color { from, to })
            }
            (Some(FadeEnd::Brightness(from)), Some(FadeEnd::Brightness(to))) => {
                Some(FadeValues::Brightness { from, to })
            }
            _ => None,
        };

        match (values, duration) {
            (None, duration) => {
                plan.push_error(CompileError::NoFadeValues);
                if let Err(e) = duration {
                    plan.push_error(e);
                }
            }
            (Some(_), Err(e)) => plan.push_error(e),
            (Some(values), Ok(duration)) => {
                for node in &nodes {
                    if node.has_set(values.attr()) {
                        plan.faders.push(FaderSpec {
                            node: node.id().to_string(),
                            values,
                            duration,
                        });
                    } else if single {
                        plan.push_error(unsupported(node, values.attr()));
                    }
                }
            }
        }

        if let Some(e) = args.leftover() {
            plan.push_error(e);
        }
        plan
    }

    fn fade_end(&self, args: &mut Args<'_>, attr: Option<&str>) -> Option<FadeEnd> {
        let arg = args.peek()?;
        let color = (attr != Some(attrs::BRIGHTNESS))
            .then(|| self.topology.colors().lookup(arg))
            .flatten()
            .map(FadeEnd::Color);
        let end = color.or_else(|| {
            (attr != Some(attrs::COLOR) && Token::Percent.matches(arg))
                .then(|| percent(arg))
                .flatten()
                .map(FadeEnd::Brightness)
        })?;
        args.next();
        Some(end)
    }
}

fn switch(node: &str, capability: &str) -> Setter {
    match capability {
        attrs::ON => Setter::state(node, true),
        attrs::OFF => Setter::state(node, false),
        _ => Setter::flip(node),
    }
}

fn schedule(setters: Vec<Setter>, at_ms: i64, plan: &mut Plan) {
    plan.timed_setters
        .extend(setters.into_iter().map(|setter| TimedSetter { setter, at_ms }));
}

fn unsupported(node: &SharedNode, attr: &str) -> CompileError {
    let device = node.device();
    if attr == attrs::COLOR {
        CompileError::NoColor {
            device: device.id().to_string(),
            device_type: device.device_type().to_string(),
            node: node.id().to_string(),
        }
    } else {
        CompileError::NoBrightness {
            device: device.id().to_string(),
            node: node.id().to_string(),
        }
    }
}
