//! The context handed to every plan, subscriber and initializer.
//!
//! A simulation owns exactly one `SimulationContext`. Everything the kernel
//! tracks lives here: the plan queue and its clock, the event bus and mutation
//! handlers, the data-manager and actor registries, plan converters for run
//! continuity, the replication's random number generator and the output sink.
//! Callbacks receive `&mut SimulationContext` and nothing else, so there is no
//! shared state between simulations and no locking inside a run.
//!
//! Event, mutation, data-manager and actor operations are implemented next to
//! their registries in `event.rs`, `mutation.rs`, `data_manager.rs` and
//! `actor.rs`.

use crate::actor::ActorRegistry;
use crate::data_manager::DataManagerRegistry;
use crate::engine::{SimulationConfig, SimulationState};
use crate::event::EventBus;
use crate::mutation::MutationRegistry;
use crate::plan::{Plan, PlanAction, PlanCallback, PlanQueue};
use gcm_env::{NucleusError, OutputSink, PlanId, PlanKindId, Planner, SimulationTime};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::any::Any;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use tracing::{debug, info};

/// Rebuilds a plan callback from a recorded symbolic payload.
pub type PlanConverter = Rc<dyn Fn(&serde_json::Value) -> Result<PlanCallback, NucleusError>>;

/// Callback run once while the simulation closes.
pub type CloseCallback = Box<dyn FnOnce(&mut SimulationContext) -> Result<(), NucleusError>>;

/// Mutable state of one simulation instance.
pub struct SimulationContext {
    /// Pending plans; owns the clock
    pub(crate) plans: PlanQueue<PlanAction>,

    pub(crate) events: EventBus,

    pub(crate) mutations: MutationRegistry,

    pub(crate) data_managers: DataManagerRegistry,

    pub(crate) actors: ActorRegistry,

    /// Symbolic plan kind -> callback factory
    pub(crate) converters: HashMap<PlanKindId, PlanConverter>,

    pub(crate) close_subscribers: Vec<(Planner, CloseCallback)>,

    /// Owner of the code currently running; empty means the nucleus
    focus: Vec<Planner>,

    state: SimulationState,

    seed: u64,

    rng: ChaCha8Rng,

    output: Arc<dyn OutputSink>,

    halt_requested: bool,

    /// Plans executed by this instance
    pub(crate) plans_executed: u64,

    /// Plans executed by the run this one resumed
    pub(crate) completed_before_resume: u64,

    resumed: bool,
}

impl SimulationContext {
    pub(crate) fn new(
        config: &SimulationConfig,
        output: Arc<dyn OutputSink>,
    ) -> Result<Self, NucleusError> {
        Ok(Self {
            plans: PlanQueue::new(config.start_time)?,
            events: EventBus::default(),
            mutations: MutationRegistry::default(),
            data_managers: DataManagerRegistry::default(),
            actors: ActorRegistry::default(),
            converters: HashMap::new(),
            close_subscribers: Vec::new(),
            focus: Vec::new(),
            state: SimulationState::Uninitialized,
            seed: config.seed,
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            output,
            halt_requested: false,
            plans_executed: 0,
            completed_before_resume: 0,
            resumed: false,
        })
    }

    /// Current simulation time.
    pub fn now(&self) -> SimulationTime {
        self.plans.now()
    }

    pub fn state(&self) -> SimulationState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: SimulationState) {
        debug!("Simulation state {:?} -> {:?}", self.state, state);
        self.state = state;
    }

    /// Seed this simulation's random number generator started from.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// The simulation's deterministic random number generator.
    pub fn random(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }

    /// True when this run continues from a continuity record.
    pub fn is_resumed(&self) -> bool {
        self.resumed
    }

    pub(crate) fn mark_resumed(&mut self, completed_plans: u64) {
        self.resumed = true;
        self.completed_before_resume = completed_plans;
    }

    /// Plans executed so far, including those executed before a resume.
    pub fn completed_plans(&self) -> u64 {
        self.completed_before_resume + self.plans_executed
    }

    /// The component on whose behalf the current code runs.
    pub fn focus(&self) -> Planner {
        self.focus.last().copied().unwrap_or(Planner::Nucleus)
    }

    /// Runs `f` with `planner` in focus.
    pub(crate) fn with_focus<R>(&mut self, planner: Planner, f: impl FnOnce(&mut Self) -> R) -> R {
        self.focus.push(planner);
        let result = f(self);
        self.focus.pop();
        result
    }

    pub(crate) fn require_state(
        &self,
        operation: &'static str,
        allowed: &[SimulationState],
    ) -> Result<(), NucleusError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(NucleusError::InvalidState {
                operation,
                state: self.state.name(),
            })
        }
    }

    // ---- plans ----

    /// Schedules a plan owned by the current focus.
    pub fn schedule(&mut self, plan: Plan) -> Result<PlanId, NucleusError> {
        self.require_state(
            "schedule",
            &[SimulationState::Initializing, SimulationState::Running],
        )?;
        let planner = self.focus();
        self.plans
            .schedule(plan.time, planner, plan.tie_break, plan.passive, plan.action)
    }

    /// Shorthand for scheduling an inline plan.
    pub fn add_plan<F>(&mut self, time: SimulationTime, callback: F) -> Result<PlanId, NucleusError>
    where
        F: FnOnce(&mut SimulationContext) -> Result<(), NucleusError> + 'static,
    {
        self.schedule(Plan::new(time, callback))
    }

    /// Cancels a pending plan. Returns false if it is not pending.
    ///
    /// Only the plan's owner, or the nucleus, may cancel it.
    pub fn cancel_plan(&mut self, id: PlanId) -> Result<bool, NucleusError> {
        let Some(owner) = self.plans.owner(id) else {
            return Ok(false);
        };
        let focus = self.focus();
        if focus != owner && focus != Planner::Nucleus {
            return Err(NucleusError::IllegalPlanCancellation {
                plan: id,
                owner,
                focus,
            });
        }
        Ok(self.plans.cancel(id))
    }

    /// True if the plan is still pending.
    pub fn has_plan(&self, id: PlanId) -> bool {
        self.plans.contains(id)
    }

    /// Pending plans, passive ones included.
    pub fn pending_plan_count(&self) -> usize {
        self.plans.len()
    }

    /// Registers the callback factory for a symbolic plan kind.
    pub fn register_plan_converter<F>(&mut self, kind: PlanKindId, converter: F) -> Result<(), NucleusError>
    where
        F: Fn(&serde_json::Value) -> Result<PlanCallback, NucleusError> + 'static,
    {
        if self.converters.contains_key(&kind) {
            return Err(NucleusError::DuplicatePlanKind(kind));
        }
        self.converters.insert(kind, Rc::new(converter));
        Ok(())
    }

    pub(crate) fn resolve_plan(&self, action: PlanAction) -> Result<PlanCallback, NucleusError> {
        match action {
            PlanAction::Inline(callback) => Ok(callback),
            PlanAction::Symbolic { kind, payload } => {
                let converter = self
                    .converters
                    .get(&kind)
                    .cloned()
                    .ok_or(NucleusError::UnknownPlanKind(kind))?;
                converter(&payload)
            }
        }
    }

    // ---- lifecycle ----

    /// Requests the run to close after the current plan finishes.
    pub fn halt(&mut self) {
        if !self.halt_requested {
            info!("Halt requested at t={}", self.now());
        }
        self.halt_requested = true;
    }

    pub fn halt_requested(&self) -> bool {
        self.halt_requested
    }

    /// Registers a callback to run while the simulation closes.
    ///
    /// Close subscribers run in registration order with their registrant in
    /// focus.
    pub fn subscribe_to_close<F>(&mut self, callback: F) -> Result<(), NucleusError>
    where
        F: FnOnce(&mut SimulationContext) -> Result<(), NucleusError> + 'static,
    {
        self.require_state(
            "subscribe_to_close",
            &[SimulationState::Initializing, SimulationState::Running],
        )?;
        let owner = self.focus();
        self.close_subscribers.push((owner, Box::new(callback)));
        Ok(())
    }

    /// Hands a value to the simulation's output sink.
    pub fn release_output<T: Any + Send>(&mut self, item: T) {
        self.output.release(Box::new(item));
    }
}
