//! The simulation engine.
//!
//! A [`Simulation`] moves through a fixed sequence of states:
//!
//! ```text
//! Uninitialized -> Initializing -> Running -> Closing -> Terminated
//! ```
//!
//! - **Initializing**: plugin initializers run in dependency order, then data
//!   managers initialize in registration order, then actors start.
//! - **Running**: the earliest plan is dequeued, the clock advances to its
//!   time and its callback runs. Events released by the callback are fully
//!   dispatched before the next plan.
//! - **Closing**: entered when no active plan remains, a halt was requested
//!   or the next plan lies beyond the configured halt time. Close subscribers
//!   run, then a continuity checkpoint is captured if configured.
//!
//! Any error aborts the run and is returned from [`Simulation::run`].

use crate::context::SimulationContext;
use crate::continuity::{self, ContinuityRecord};
use crate::plugin::{resolve_plugins, Plugin, PluginContext};
use gcm_env::{validate_time, NucleusError, NullSink, OutputSink, Planner, SimulationTime};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Lifecycle state of a simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimulationState {
    Uninitialized,
    Initializing,
    Running,
    Closing,
    Terminated,
}

impl SimulationState {
    pub fn name(&self) -> &'static str {
        match self {
            SimulationState::Uninitialized => "uninitialized",
            SimulationState::Initializing => "initializing",
            SimulationState::Running => "running",
            SimulationState::Closing => "closing",
            SimulationState::Terminated => "terminated",
        }
    }
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Seed for the simulation's random number generator
    pub seed: u64,

    /// Clock value when the run starts
    pub start_time: SimulationTime,

    /// Stop before any plan scheduled after this time
    pub halt_time: Option<SimulationTime>,

    /// Capture a continuity record while closing
    pub record_continuity: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            start_time: 0.0,
            halt_time: None,
            record_continuity: false,
        }
    }
}

/// Result of a completed run.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationOutcome {
    /// Clock value when the run closed
    pub final_time: SimulationTime,

    /// Plans executed by this run (excluding any resumed segment)
    pub plans_executed: u64,

    /// True if the run stopped on a halt request or the halt time
    pub halted: bool,

    pub continuity: Option<ContinuityRecord>,
}

/// Collects plugins and configuration for a [`Simulation`].
pub struct SimulationBuilder {
    plugins: Vec<Plugin>,
    config: SimulationConfig,
    output: Arc<dyn OutputSink>,
    resume: Option<ContinuityRecord>,
}

impl SimulationBuilder {
    pub fn add_plugin(mut self, plugin: Plugin) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn add_plugins(mut self, plugins: impl IntoIterator<Item = Plugin>) -> Self {
        self.plugins.extend(plugins);
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    pub fn halt_time(mut self, time: SimulationTime) -> Self {
        self.config.halt_time = Some(time);
        self
    }

    pub fn record_continuity(mut self, enabled: bool) -> Self {
        self.config.record_continuity = enabled;
        self
    }

    pub fn config(mut self, config: SimulationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn output_sink(mut self, output: Arc<dyn OutputSink>) -> Self {
        self.output = output;
        self
    }

    /// Continues from a checkpoint. The clock starts at the checkpoint time.
    pub fn resume_from(mut self, record: ContinuityRecord) -> Self {
        self.resume = Some(record);
        self
    }

    /// Resolves plugin dependencies and creates the simulation.
    ///
    /// Configuration errors surface here, before any initializer runs.
    pub fn build(mut self) -> Result<Simulation, NucleusError> {
        if let Some(record) = &self.resume {
            self.config.start_time = record.time;
        }
        validate_time(self.config.start_time)?;
        if let Some(halt_time) = self.config.halt_time {
            validate_time(halt_time)?;
        }

        let order = resolve_plugins(&self.plugins)?;
        let mut slots: Vec<Option<Plugin>> = self.plugins.into_iter().map(Some).collect();
        let plugins: Vec<Plugin> = order.into_iter().filter_map(|i| slots[i].take()).collect();

        let context = SimulationContext::new(&self.config, self.output)?;
        Ok(Simulation {
            context,
            plugins,
            config: self.config,
            resume: self.resume,
        })
    }
}

/// One simulation instance.
pub struct Simulation {
    context: SimulationContext,
    /// In initialization order
    plugins: Vec<Plugin>,
    config: SimulationConfig,
    resume: Option<ContinuityRecord>,
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("state", &self.state())
            .field("plugins", &self.plugin_order())
            .field("config", &self.config)
            .field("resuming", &self.resume.is_some())
            .finish()
    }
}

impl Simulation {
    pub fn builder() -> SimulationBuilder {
        SimulationBuilder {
            plugins: Vec::new(),
            config: SimulationConfig::default(),
            output: Arc::new(NullSink),
            resume: None,
        }
    }

    pub fn state(&self) -> SimulationState {
        self.context.state()
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Plugin ids in the order their initializers will run.
    pub fn plugin_order(&self) -> Vec<&'static str> {
        self.plugins.iter().map(|p| p.id().name()).collect()
    }

    /// Runs the simulation to completion.
    pub fn run(mut self) -> Result<SimulationOutcome, NucleusError> {
        self.initialize()?;

        let ctx = &mut self.context;
        ctx.set_state(SimulationState::Running);
        info!(
            "Simulation running (seed={}, t={}, pending plans={})",
            ctx.seed(),
            ctx.now(),
            ctx.pending_plan_count()
        );

        let halted = execute_plans(ctx, self.config.halt_time)?;

        ctx.set_state(SimulationState::Closing);
        let close_subscribers = std::mem::take(&mut ctx.close_subscribers);
        for (owner, callback) in close_subscribers {
            ctx.with_focus(owner, callback)?;
        }

        let continuity = if self.config.record_continuity {
            Some(continuity::capture(ctx))
        } else {
            None
        };

        ctx.set_state(SimulationState::Terminated);
        info!(
            "Simulation terminated at t={} after {} plans{}",
            ctx.now(),
            ctx.plans_executed,
            if halted { " (halted)" } else { "" }
        );

        Ok(SimulationOutcome {
            final_time: ctx.now(),
            plans_executed: ctx.plans_executed,
            halted,
            continuity,
        })
    }

    fn initialize(&mut self) -> Result<(), NucleusError> {
        let ctx = &mut self.context;
        ctx.set_state(SimulationState::Initializing);

        if let Some(record) = &self.resume {
            continuity::restore(ctx, record)?;
        }

        for plugin in &self.plugins {
            debug!("Initializing plugin {}", plugin.id());
            if let Some(initializer) = plugin.initializer() {
                let mut plugin_ctx = PluginContext::new(plugin, ctx);
                initializer(&mut plugin_ctx)?;
            }
        }

        for (id, name, init) in ctx.data_managers.initializers() {
            debug!("Initializing data manager {}", name);
            ctx.with_focus(Planner::DataManager(id), |ctx| init(ctx, id))?;
        }

        // Actors may add further actors while starting
        while let Some((id, init)) = ctx.actors.take_pending() {
            ctx.start_actor(id, init)?;
        }

        if let Some(record) = &self.resume {
            continuity::verify_kinds(ctx, record)?;
        }

        info!(
            "Initialized {} plugins, {} data managers, {} actors",
            self.plugins.len(),
            ctx.data_manager_count(),
            ctx.actor_count()
        );
        Ok(())
    }
}

/// Drains the plan queue. Returns true if the run stopped early.
fn execute_plans(
    ctx: &mut SimulationContext,
    halt_time: Option<SimulationTime>,
) -> Result<bool, NucleusError> {
    loop {
        if ctx.halt_requested() {
            return Ok(true);
        }
        let Some(next_time) = ctx.plans.next_time() else {
            return Ok(false);
        };
        if let Some(halt_time) = halt_time {
            if next_time > halt_time {
                if halt_time > ctx.now() {
                    ctx.plans.advance_to(halt_time)?;
                }
                info!("Reached halt time {}", halt_time);
                return Ok(true);
            }
        }
        let Some(plan) = ctx.plans.pop_next()? else {
            return Ok(false);
        };

        let callback = ctx.resolve_plan(plan.payload)?;
        ctx.with_focus(plan.planner, callback)?;
        ctx.plans_executed += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_manager::{DataManager, DataManagerHandle};
    use crate::plan::{Plan, PlanCallback};
    use approx::assert_relative_eq;
    use gcm_env::{ActorId, PlanKindId, PluginId, VecSink};
    use std::cell::Cell;
    use std::rc::Rc;
    use std::sync::Mutex;

    const CORE: PluginId = PluginId::new("core");
    const OBSERVER: PluginId = PluginId::new("observer");

    #[derive(Debug, Default)]
    struct Ledger {
        entries: Vec<String>,
    }

    struct Record(String);

    impl DataManager for Ledger {
        fn init(ctx: &mut SimulationContext, _: DataManagerHandle<Self>) -> Result<(), NucleusError> {
            ctx.data_manager_mut::<Ledger>()?.entries.push("init".into());
            ctx.handle_mutation_event(|ctx, Record(entry): Record| {
                ctx.data_manager_mut::<Ledger>()?.entries.push(entry.clone());
                ctx.release_event(Entry(entry))
            })
        }
    }

    #[derive(Debug, Clone)]
    struct Entry(String);

    fn record(ctx: &mut SimulationContext, entry: &str) -> Result<(), NucleusError> {
        ctx.release_mutation_event(Record(entry.to_string()))
    }

    fn core_plugin() -> Plugin {
        Plugin::builder(CORE)
            .initializer(|pc| {
                pc.add_data_manager(Ledger::default())?;
                Ok(())
            })
            .build()
    }

    #[test]
    fn test_empty_simulation_terminates_immediately() {
        let outcome = Simulation::builder().build().unwrap().run().unwrap();
        assert_eq!(outcome.plans_executed, 0);
        assert_eq!(outcome.final_time, 0.0);
        assert!(!outcome.halted);
        assert!(outcome.continuity.is_none());
    }

    #[test]
    fn test_initialization_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let o1 = order.clone();
        let o2 = order.clone();
        let observer = Plugin::builder(OBSERVER)
            .add_dependency(CORE)
            .initializer(move |pc| {
                o1.lock().unwrap().push("observer plugin");
                // Dependency's data manager is already registered
                assert!(pc.context().has_data_manager::<Ledger>());
                let o = o1.clone();
                pc.add_actor("watcher", move |ctx| {
                    o.lock().unwrap().push("watcher actor");
                    assert_eq!(ctx.data_manager::<Ledger>()?.entries, vec!["init"]);
                    Ok(())
                })?;
                Ok(())
            })
            .build();
        let core = Plugin::builder(CORE)
            .initializer(move |pc| {
                o2.lock().unwrap().push("core plugin");
                pc.add_data_manager(Ledger::default())?;
                Ok(())
            })
            .build();

        let sim = Simulation::builder()
            .add_plugin(observer)
            .add_plugin(core)
            .build()
            .unwrap();
        assert_eq!(sim.plugin_order(), vec!["core", "observer"]);
        sim.run().unwrap();

        assert_eq!(
            *order.lock().unwrap(),
            vec!["core plugin", "observer plugin", "watcher actor"]
        );
    }

    #[test]
    fn test_cycle_fails_before_any_initializer() {
        let ran = Arc::new(Mutex::new(false));
        let r = ran.clone();
        let a = Plugin::builder(CORE)
            .add_dependency(OBSERVER)
            .initializer(move |_| {
                *r.lock().unwrap() = true;
                Ok(())
            })
            .build();
        let b = Plugin::builder(OBSERVER).add_dependency(CORE).build();

        let err = Simulation::builder()
            .add_plugin(a)
            .add_plugin(b)
            .build()
            .err()
            .unwrap();
        assert!(err.is_configuration());
        assert!(!*ran.lock().unwrap());
    }

    #[test]
    fn test_missing_plugin_data_is_configuration_error() {
        #[derive(Debug, Clone)]
        struct Settings;

        let plugin = Plugin::builder(CORE)
            .initializer(|pc| {
                pc.plugin_data::<Settings>()?;
                Ok(())
            })
            .build();
        let err = Simulation::builder()
            .add_plugin(plugin)
            .build()
            .unwrap()
            .run()
            .unwrap_err();
        assert!(matches!(err, NucleusError::MissingPluginData { .. }));
    }

    #[test]
    fn test_plans_run_in_time_order_and_advance_clock() {
        let plugin = Plugin::builder(CORE)
            .initializer(|pc| {
                pc.add_data_manager(Ledger::default())?;
                pc.add_actor("scheduler", |ctx| {
                    for (time, label) in [(3.0, "seq1"), (1.0, "seq2"), (1.0, "seq3"), (2.0, "seq4")] {
                        ctx.add_plan(time, move |ctx| {
                            let entry = format!("{}@{}", label, ctx.now());
                            record(ctx, &entry)
                        })?;
                    }
                    ctx.subscribe_to_close(|ctx| {
                        let entries = ctx.data_manager::<Ledger>()?.entries.clone();
                        ctx.release_output(entries);
                        Ok(())
                    })
                })?;
                Ok(())
            })
            .build();

        let sink = Arc::new(VecSink::new());
        let outcome = Simulation::builder()
            .add_plugin(plugin)
            .output_sink(sink.clone())
            .build()
            .unwrap()
            .run()
            .unwrap();

        assert_eq!(outcome.plans_executed, 4);
        assert_relative_eq!(outcome.final_time, 3.0);
        let entries = sink.take_of::<Vec<String>>().remove(0);
        assert_eq!(entries, vec!["init", "seq2@1", "seq3@1", "seq4@2", "seq1@3"]);
    }

    #[test]
    fn test_plan_owner_has_focus() {
        let sink = Arc::new(VecSink::new());
        let plugin = Plugin::builder(CORE)
            .initializer(|pc| {
                pc.add_actor("a", |ctx| {
                    ctx.add_plan(1.0, |ctx| {
                        ctx.release_output(ctx.focus());
                        Ok(())
                    })?;
                    Ok(())
                })?;
                Ok(())
            })
            .build();
        Simulation::builder()
            .add_plugin(plugin)
            .output_sink(sink.clone())
            .build()
            .unwrap()
            .run()
            .unwrap();
        let owners = sink.take_of::<Planner>();
        assert!(matches!(owners.as_slice(), [Planner::Actor(_)]));
    }

    #[test]
    fn test_halt_stops_after_current_plan() {
        let plugin = Plugin::builder(CORE)
            .initializer(|pc| {
                pc.add_actor("stopper", |ctx| {
                    ctx.add_plan(1.0, |ctx| {
                        ctx.halt();
                        Ok(())
                    })?;
                    ctx.add_plan(2.0, |_| Ok(()))?;
                    Ok(())
                })?;
                Ok(())
            })
            .build();
        let outcome = Simulation::builder()
            .add_plugin(plugin)
            .build()
            .unwrap()
            .run()
            .unwrap();
        assert!(outcome.halted);
        assert_eq!(outcome.plans_executed, 1);
        assert_relative_eq!(outcome.final_time, 1.0);
    }

    #[test]
    fn test_halt_time_leaves_clock_at_halt() {
        let plugin = Plugin::builder(CORE)
            .initializer(|pc| {
                pc.add_actor("ticker", |ctx| {
                    for t in 1..=10 {
                        ctx.add_plan(t as f64, |_| Ok(()))?;
                    }
                    Ok(())
                })?;
                Ok(())
            })
            .build();
        let outcome = Simulation::builder()
            .add_plugin(plugin)
            .halt_time(4.5)
            .build()
            .unwrap()
            .run()
            .unwrap();
        assert!(outcome.halted);
        assert_eq!(outcome.plans_executed, 4);
        assert_relative_eq!(outcome.final_time, 4.5);
    }

    #[test]
    fn test_passive_plans_do_not_keep_run_alive() {
        let plugin = Plugin::builder(CORE)
            .initializer(|pc| {
                pc.add_data_manager(Ledger::default())?;
                pc.add_actor("reporter", |ctx| {
                    ctx.schedule(Plan::new(1.0, |ctx| record(ctx, "passive 1")).passive())?;
                    ctx.add_plan(2.0, |ctx| record(ctx, "active 2"))?;
                    ctx.schedule(Plan::new(3.0, |ctx| record(ctx, "passive 3")).passive())?;
                    ctx.subscribe_to_close(|ctx| {
                        let entries = ctx.data_manager::<Ledger>()?.entries.clone();
                        ctx.release_output(entries);
                        Ok(())
                    })
                })?;
                Ok(())
            })
            .build();
        let sink = Arc::new(VecSink::new());
        let outcome = Simulation::builder()
            .add_plugin(plugin)
            .output_sink(sink.clone())
            .build()
            .unwrap()
            .run()
            .unwrap();
        assert_eq!(outcome.plans_executed, 2);
        let entries = sink.take_of::<Vec<String>>().remove(0);
        assert_eq!(entries, vec!["init", "passive 1", "active 2"]);
    }

    #[test]
    fn test_model_error_aborts_run() {
        let plugin = Plugin::builder(CORE)
            .initializer(|pc| {
                pc.add_actor("faulty", |ctx| {
                    ctx.add_plan(1.0, |_| Err(NucleusError::model("unknown_person_id", "person 9")))?;
                    Ok(())
                })?;
                Ok(())
            })
            .build();
        let err = Simulation::builder()
            .add_plugin(plugin)
            .build()
            .unwrap()
            .run()
            .unwrap_err();
        assert!(matches!(err, NucleusError::Model(ref e) if e.kind == "unknown_person_id"));
    }

    #[test]
    fn test_scheduling_in_the_past_aborts_run() {
        let plugin = Plugin::builder(CORE)
            .initializer(|pc| {
                pc.add_actor("confused", |ctx| {
                    ctx.add_plan(5.0, |ctx| {
                        ctx.add_plan(4.0, |_| Ok(()))?;
                        Ok(())
                    })?;
                    Ok(())
                })?;
                Ok(())
            })
            .build();
        let err = Simulation::builder()
            .add_plugin(plugin)
            .build()
            .unwrap()
            .run()
            .unwrap_err();
        assert!(matches!(err, NucleusError::InvalidPlanTime { .. }));
    }

    #[test]
    fn test_actor_cannot_release_events() {
        let plugin = Plugin::builder(CORE)
            .initializer(|pc| {
                pc.add_actor("rogue", |ctx| {
                    ctx.add_plan(1.0, |ctx| ctx.release_event(Entry("rogue".into())))?;
                    Ok(())
                })?;
                Ok(())
            })
            .build();
        let err = Simulation::builder()
            .add_plugin(plugin)
            .build()
            .unwrap()
            .run()
            .unwrap_err();
        assert!(matches!(err, NucleusError::IllegalEventRelease(Planner::Actor(_))));
    }

    /// Actor "owner" schedules a plan at 5; actor "other" tries to cancel it at
    /// 1, or the owner cancels it itself.
    fn cancellation_plugin(owner_cancels: bool) -> Plugin {
        Plugin::builder(CORE)
            .initializer(move |pc| {
                let target = Rc::new(Cell::new(None));
                let t = target.clone();
                pc.add_actor("owner", move |ctx| {
                    let id = ctx.add_plan(5.0, |_| Ok(()))?;
                    t.set(Some(id));
                    if owner_cancels {
                        ctx.add_plan(1.0, move |ctx| {
                            assert!(ctx.cancel_plan(id)?);
                            Ok(())
                        })?;
                    }
                    Ok(())
                })?;
                if !owner_cancels {
                    pc.add_actor("other", move |ctx| {
                        ctx.add_plan(1.0, move |ctx| {
                            if let Some(id) = target.get() {
                                ctx.cancel_plan(id)?;
                            }
                            Ok(())
                        })?;
                        Ok(())
                    })?;
                }
                Ok(())
            })
            .build()
    }

    #[test]
    fn test_actor_cannot_cancel_another_actors_plan() {
        let err = Simulation::builder()
            .add_plugin(cancellation_plugin(false))
            .build()
            .unwrap()
            .run()
            .unwrap_err();
        match err {
            NucleusError::IllegalPlanCancellation { owner, focus, .. } => {
                assert_eq!(owner, Planner::Actor(ActorId::from_index(0)));
                assert_eq!(focus, Planner::Actor(ActorId::from_index(1)));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_owner_cancels_its_own_plan() {
        let outcome = Simulation::builder()
            .add_plugin(cancellation_plugin(true))
            .build()
            .unwrap()
            .run()
            .unwrap();
        assert_eq!(outcome.plans_executed, 1);
        assert_relative_eq!(outcome.final_time, 1.0);
    }

    const TICK: PlanKindId = PlanKindId(1);

    /// Symbolic ticks every time unit, counting them in the payload.
    fn ticking_plugin() -> Plugin {
        Plugin::builder(CORE)
            .initializer(|pc| {
                pc.add_data_manager(Ledger::default())?;
                pc.context().register_plan_converter(TICK, |payload| {
                    let n = payload.as_u64().unwrap_or(0);
                    let callback: PlanCallback = Box::new(move |ctx: &mut SimulationContext| {
                        record(ctx, &format!("tick {} @{}", n, ctx.now()))?;
                        ctx.schedule(Plan::symbolic(ctx.now() + 1.0, TICK, (n + 1).into()))?;
                        Ok(())
                    });
                    Ok(callback)
                })?;
                pc.add_actor("ticker", |ctx| {
                    if !ctx.is_resumed() {
                        ctx.schedule(Plan::symbolic(1.0, TICK, serde_json::json!(0)))?;
                    }
                    ctx.subscribe_to_close(|ctx| {
                        let entries = ctx.data_manager::<Ledger>()?.entries.clone();
                        ctx.release_output(entries);
                        Ok(())
                    })
                })?;
                Ok(())
            })
            .build()
    }

    fn run_ticks(
        halt_time: SimulationTime,
        resume: Option<ContinuityRecord>,
    ) -> (SimulationOutcome, Vec<String>) {
        let sink = Arc::new(VecSink::new());
        let mut builder = Simulation::builder()
            .add_plugin(ticking_plugin())
            .halt_time(halt_time)
            .record_continuity(true)
            .output_sink(sink.clone());
        if let Some(record) = resume {
            builder = builder.resume_from(record);
        }
        let outcome = builder.build().unwrap().run().unwrap();
        let entries = sink.take_of::<Vec<String>>().remove(0);
        (outcome, entries)
    }

    #[test]
    fn test_checkpoint_and_resume_matches_uninterrupted_run() {
        let (full, full_entries) = run_ticks(6.5, None);

        let (first, first_entries) = run_ticks(3.5, None);
        let record = first.continuity.clone().unwrap();
        assert_relative_eq!(record.time, 3.5);
        assert_eq!(record.completed_plans, 3);
        assert_eq!(record.plans.len(), 1);
        assert_eq!(record.skipped_inline_plans, 0);

        let json = record.to_json().unwrap();
        let (second, second_entries) =
            run_ticks(6.5, Some(ContinuityRecord::from_json(&json).unwrap()));

        assert_eq!(first.plans_executed + second.plans_executed, full.plans_executed);
        assert_eq!(
            second.continuity.as_ref().unwrap().completed_plans,
            full.continuity.as_ref().unwrap().completed_plans
        );
        assert_eq!(second.continuity, full.continuity);

        let mut stitched = first_entries;
        stitched.extend(second_entries.into_iter().skip(1)); // second "init"
        assert_eq!(stitched, full_entries);
    }

    #[test]
    fn test_resume_with_unknown_kind_fails() {
        let record = ContinuityRecord {
            time: 2.0,
            completed_plans: 5,
            plans: vec![continuity::PlanRecord {
                time: 3.0,
                planner: Planner::Nucleus,
                tie_break: false,
                passive: false,
                kind: PlanKindId(99),
                payload: serde_json::Value::Null,
            }],
            skipped_inline_plans: 0,
        };
        let err = Simulation::builder()
            .add_plugin(core_plugin())
            .resume_from(record)
            .build()
            .unwrap()
            .run()
            .unwrap_err();
        assert!(matches!(err, NucleusError::UnknownPlanKind(PlanKindId(99))));
    }

    #[test]
    fn test_inline_plans_are_counted_not_recorded() {
        let plugin = Plugin::builder(CORE)
            .initializer(|pc| {
                pc.add_actor("mixed", |ctx| {
                    ctx.add_plan(10.0, |_| Ok(()))?;
                    Ok(())
                })?;
                Ok(())
            })
            .build();
        let outcome = Simulation::builder()
            .add_plugin(plugin)
            .halt_time(1.0)
            .record_continuity(true)
            .build()
            .unwrap()
            .run()
            .unwrap();
        let record = outcome.continuity.unwrap();
        assert!(record.is_empty());
        assert_eq!(record.skipped_inline_plans, 1);
    }

    #[test]
    fn test_same_seed_same_run() {
        fn draws(seed: u64) -> Vec<u32> {
            use rand::Rng;

            let sink = Arc::new(VecSink::new());
            let plugin = Plugin::builder(CORE)
                .initializer(|pc| {
                    pc.add_actor("sampler", |ctx| {
                        for t in 0..5 {
                            ctx.add_plan(t as f64, |ctx| {
                                let x: u32 = ctx.random().gen_range(0..1000);
                                ctx.release_output(x);
                                Ok(())
                            })?;
                        }
                        Ok(())
                    })?;
                    Ok(())
                })
                .build();
            Simulation::builder()
                .add_plugin(plugin)
                .seed(seed)
                .output_sink(sink.clone())
                .build()
                .unwrap()
                .run()
                .unwrap();
            sink.take_of::<u32>()
        }

        assert_eq!(draws(7), draws(7));
        assert_ne!(draws(7), draws(8));
    }
}
