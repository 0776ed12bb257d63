//! Plan execution: getter de-duplication, aggregates, setter conflicts

use futures::future::join_all;
use indexmap::{IndexMap, IndexSet};
use nom_core::{attrs, Calc, Context, Getter, Plan, Response, Setter, Value};
use nom_gateway::CapabilityGateway;
use nom_scheduler::Scheduler;
use serde_json::Map;
use tracing::{debug, warn};

/// Getter results, `node -> attr -> value`
pub type Readings = IndexMap<String, Map<String, Value>>;

/// Runs plans against the gateway and hands scheduled work to the scheduler
pub struct Executor<'a> {
    gateway: &'a dyn CapabilityGateway,
    scheduler: &'a Scheduler,
}

impl<'a> Executor<'a> {
    pub fn new(gateway: &'a dyn CapabilityGateway, scheduler: &'a Scheduler) -> Self {
        Self { gateway, scheduler }
    }

    /// Execute a plan; always produces a response
    pub async fn execute(&self, plan: Plan, ctx: &Context) -> Response {
        let Plan {
            getters,
            setters,
            faders,
            timed_setters,
            calc,
            mut errors,
        } = plan;

        let results = if getters.is_empty() {
            None
        } else {
            let readings = self.read(getters, ctx, &mut errors).await;
            Some(match calc {
                Some(calc) => Value::Object(aggregate(calc, &readings, &mut errors)),
                None => Value::Object(
                    readings
                        .into_iter()
                        .map(|(node, values)| (node, Value::Object(values)))
                        .collect(),
                ),
            })
        };

        self.write(resolve_conflicts(setters), ctx, &mut errors).await;

        for fader in faders {
            self.scheduler.register_fader(fader);
        }
        for timed in timed_setters {
            self.scheduler.register_single(timed);
        }

        Response::new(results, errors)
    }

    /// Run each distinct `(node, attr)` getter once, all at the same time
    async fn read(&self, getters: Vec<Getter>, ctx: &Context, errors: &mut Vec<String>) -> Readings {
        let getters: IndexSet<Getter> = getters.into_iter().collect();
        let calls = getters.iter().map(|getter| async move {
            let value = self.gateway.get(&getter.node, &getter.attr, ctx).await;
            (getter, value)
        });

        let mut readings = Readings::new();
        for (getter, value) in join_all(calls).await {
            match value {
                Ok(value) => {
                    readings
                        .entry(getter.node.clone())
                        .or_default()
                        .insert(getter.attr.clone(), value);
                }
                Err(e) => errors.push(e.to_string()),
            }
        }
        readings
    }

    /// Apply setters at the same time; each success cancels scheduled work on its key
    async fn write(&self, setters: Vec<Setter>, ctx: &Context, errors: &mut Vec<String>) {
        let calls = setters.iter().map(|setter| async move {
            let result = self.gateway.set(setter, ctx).await;
            if result.is_ok() {
                self.scheduler.cancel(&setter.node, &setter.attr);
            }
            result
        });

        for result in join_all(calls).await {
            if let Err(e) = result {
                warn!(error = %e, "Setter failed");
                errors.push(e.to_string());
            }
        }
    }
}

/// Whether setter `later` makes setter `earlier` on the same node obsolete
fn overrides(later: &Setter, earlier: &Setter) -> bool {
    later.attr == earlier.attr || (attrs::is_trigger(&later.attr) && attrs::is_trigger(&earlier.attr))
}

/// Drop every setter that a later setter on the same node overrides
pub fn resolve_conflicts(setters: Vec<Setter>) -> Vec<Setter> {
    let keep: Vec<bool> = setters
        .iter()
        .enumerate()
        .map(|(i, earlier)| {
            !setters[i + 1..]
                .iter()
                .any(|later| later.node == earlier.node && overrides(later, earlier))
        })
        .collect();

    setters
        .into_iter()
        .zip(keep)
        .filter_map(|(setter, keep)| {
            if !keep {
                debug!(setter = %setter, "Overridden by a later setter");
            }
            keep.then_some(setter)
        })
        .collect()
}

/// `<attr>_<calc>` over every node that reported `attr`
///
/// Null readings are skipped. Other non-numeric readings are skipped and
/// reported. An attribute without numeric readings yields `null` and an error.
pub fn aggregate(calc: Calc, readings: &Readings, errors: &mut Vec<String>) -> Map<String, Value> {
    let mut by_attr: IndexMap<&str, Vec<f64>> = IndexMap::new();
    for (node, values) in readings {
        for (attr, value) in values {
            let numbers = by_attr.entry(attr.as_str()).or_default();
            match value {
                Value::Null => {}
                Value::Number(n) => numbers.extend(n.as_f64()),
                other => errors.push(format!(
                    "Value {} of \"{}.{}\" is not a number",
                    other, node, attr
                )),
            }
        }
    }

    by_attr
        .into_iter()
        .map(|(attr, numbers)| {
            let result = calc.apply(&numbers).and_then(number);
            if result.is_none() {
                errors.push(format!("No numeric values for \"{}\"", attr));
            }
            (format!("{}_{}", attr, calc), result.unwrap_or(Value::Null))
        })
        .collect()
}

/// Integral results as integers, others as floats
fn number(n: f64) -> Option<Value> {
    const EXACT: f64 = 9_007_199_254_740_992.0;
    if n.fract() == 0.0 && n.abs() <= EXACT {
        Some(Value::from(n as i64))
    } else {
        serde_json::Number::from_f64(n).map(Value::Number)
    }
}
