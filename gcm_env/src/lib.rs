//! GCM Environment Layer
//!
//! Types shared by every layer of the GCM simulation stack:
//! - Identity tokens for plugins, data managers, actors, plans and scenarios
//! - The kernel error taxonomy
//! - Simulation time validation
//! - Deterministic seed derivation for replications
//! - The output sink abstraction through which a running simulation hands
//!   values to whoever is collecting them
//!
//! Nothing in this crate holds mutable process-wide state. Every registry that
//! uses these tokens is owned by a single simulation instance.

mod error;
mod output;
mod seed;
mod time;
mod types;

pub use error::{ErrorKind, ModelError, NucleusError};
pub use output::{NullSink, OutputItem, OutputSink, VecSink};
pub use seed::SeedSource;
pub use time::{validate_time, SimulationTime};
pub use types::{
    ActorId, DataManagerId, LabelerId, PlanId, PlanKindId, Planner, PluginId, ScenarioId,
    SubscriptionId,
};
