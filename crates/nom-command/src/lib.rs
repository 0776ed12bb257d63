//! Command core for nomctrl
//!
//! - [`Compiler`] turns command text into a [`nom_core::Plan`]
//! - [`Executor`] runs a plan: de-duplicated getters, aggregates, setter
//!   conflict resolution, scheduler registration
//! - [`Controller`] owns the topology, gateway, scheduler and event router and
//!   is the [`nom_scheduler::Dispatcher`] that timers re-enter through
//! - [`EventRouter`] turns value changes into action commands

mod compiler;
mod controller;
mod error;
mod events;
mod executor;

pub use compiler::Compiler;
pub use controller::Controller;
pub use error::CompileError;
pub use events::{time_actions, Binding, EventRouter};
pub use executor::{aggregate, resolve_conflicts, Executor, Readings};
