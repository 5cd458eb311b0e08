//! GCM Nucleus - discrete-event simulation kernel
//!
//! The nucleus orders and dispatches work for a single simulation:
//! - **Plans**: callbacks scheduled for a simulation time, dequeued in
//!   `(time, tie-break, arrival)` order
//! - **Events**: typed values released by data managers and dispatched
//!   synchronously, depth-first, to subscribers in subscription order
//! - **Data managers**: sole owners and mutators of domain state
//! - **Mutation events**: requests from any component, handled by the data
//!   manager that owns the state
//! - **Actors**: behaviors that schedule plans and react to events
//! - **Plugins**: units of configuration plus an initializer, resolved in
//!   dependency order
//! - **Run continuity**: checkpoint and resume of symbolic plans
//!
//! Everything runs on one thread inside one [`SimulationContext`]. Parallel
//! replications are the experiment layer's business.
//!
//! # Example
//!
//! ```ignore
//! use gcm_nucleus::{Plugin, Simulation};
//! use gcm_env::PluginId;
//!
//! let plugin = Plugin::builder(PluginId::new("clock"))
//!     .initializer(|pc| {
//!         pc.add_actor("alarm", |ctx| {
//!             ctx.add_plan(8.0, |ctx| {
//!                 ctx.halt();
//!                 Ok(())
//!             })?;
//!             Ok(())
//!         })?;
//!         Ok(())
//!     })
//!     .build();
//!
//! let outcome = Simulation::builder().add_plugin(plugin).seed(42).build()?.run()?;
//! assert_eq!(outcome.final_time, 8.0);
//! ```

pub mod actor;
pub mod context;
pub mod continuity;
pub mod data_manager;
pub mod engine;
pub mod event;
pub mod mutation;
pub mod plan;
pub mod plugin;
pub mod time;

pub use actor::ActorInit;
pub use context::{CloseCallback, PlanConverter, SimulationContext};
pub use continuity::{ContinuityRecord, PlanRecord};
pub use data_manager::{DataManager, DataManagerHandle};
pub use engine::{
    Simulation, SimulationBuilder, SimulationConfig, SimulationOutcome, SimulationState,
};
pub use event::EventLabeler;
pub use plan::{Plan, PlanAction, PlanCallback, PlanQueue, ScheduledPlan};
pub use plugin::{resolve_plugins, Plugin, PluginBuilder, PluginContext, PluginData, PluginInitializer};
pub use time::SimulationClock;

pub use gcm_env::{
    ActorId, DataManagerId, ErrorKind, ModelError, NucleusError, PlanId, PlanKindId, Planner,
    PluginId, SimulationTime, SubscriptionId,
};
