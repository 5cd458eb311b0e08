//! Demonstration population model.
//!
//! People arrive at a fixed interval and, with some probability, a random
//! resident leaves at each arrival. A census counts the traffic through event
//! subscriptions and reports at close. Arrivals are symbolic plans, so runs
//! can be checkpointed and resumed.

use crate::dimension::Dimension;
use gcm_env::{validate_time, NucleusError, PlanKindId, PluginId, SimulationTime};
use gcm_nucleus::{DataManager, DataManagerHandle, Plan, PlanCallback, Plugin, SimulationContext};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use tracing::debug;

pub const POPULATION: PluginId = PluginId::new("population");
pub const CENSUS: PluginId = PluginId::new("census");

/// Symbolic plan kind for arrivals. Payload: `{"arrival": n}`.
pub const ARRIVAL: PlanKindId = PlanKindId(1);

/// Population model parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationPluginData {
    pub initial_population: u64,

    /// Time between arrivals
    pub arrival_interval: SimulationTime,

    /// Chance that a resident leaves at each arrival
    pub departure_probability: f64,

    /// No arrivals after this time
    pub horizon: SimulationTime,
}

impl Default for PopulationPluginData {
    fn default() -> Self {
        Self {
            initial_population: 100,
            arrival_interval: 1.0,
            departure_probability: 0.3,
            horizon: 50.0,
        }
    }
}

impl PopulationPluginData {
    fn validate(&self) -> Result<(), NucleusError> {
        let invalid = |detail: String| Err(NucleusError::model("invalid_population_data", detail));
        if !(self.arrival_interval.is_finite() && self.arrival_interval > 0.0) {
            return invalid(format!("arrival_interval {}", self.arrival_interval));
        }
        if !(0.0..=1.0).contains(&self.departure_probability) {
            return invalid(format!("departure_probability {}", self.departure_probability));
        }
        validate_time(self.horizon)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PersonId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersonAdditionEvent {
    pub person_id: PersonId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersonRemovalEvent {
    pub person_id: PersonId,
}

/// Owns the set of people currently in the population.
#[derive(Debug, Default)]
pub struct PeopleDataManager {
    people: BTreeSet<PersonId>,
    next_id: u64,
}

/// Mutation: admit the next person.
struct PersonAdditionMutation;

/// Mutation: remove a person.
struct PersonRemovalMutation(PersonId);

impl DataManager for PeopleDataManager {
    fn init(ctx: &mut SimulationContext, _: DataManagerHandle<Self>) -> Result<(), NucleusError> {
        ctx.handle_mutation_event(|ctx, _: PersonAdditionMutation| {
            let people = ctx.data_manager_mut::<PeopleDataManager>()?;
            let person_id = PersonId(people.next_id);
            people.next_id += 1;
            people.people.insert(person_id);
            ctx.release_event(PersonAdditionEvent { person_id })
        })?;
        ctx.handle_mutation_event(|ctx, PersonRemovalMutation(person_id): PersonRemovalMutation| {
            if !ctx.data_manager_mut::<PeopleDataManager>()?.people.remove(&person_id) {
                return Err(NucleusError::model("unknown_person_id", person_id.0.to_string()));
            }
            ctx.release_event(PersonRemovalEvent { person_id })
        })
    }
}

impl PeopleDataManager {
    /// Starts with people `0..initial`.
    pub fn new(initial: u64) -> Self {
        Self {
            people: (0..initial).map(PersonId).collect(),
            next_id: initial,
        }
    }

    pub fn population(&self) -> usize {
        self.people.len()
    }

    pub fn contains(&self, person_id: PersonId) -> bool {
        self.people.contains(&person_id)
    }

    /// The `index`-th person in id order.
    pub fn nth(&self, index: usize) -> Option<PersonId> {
        self.people.iter().nth(index).copied()
    }

    /// Id the next added person will get.
    pub fn next_person_id(&self) -> PersonId {
        PersonId(self.next_id)
    }
}

/// Adds a new person; the people manager releases a [`PersonAdditionEvent`].
pub fn add_person(ctx: &mut SimulationContext) -> Result<PersonId, NucleusError> {
    let person_id = ctx.data_manager::<PeopleDataManager>()?.next_person_id();
    ctx.release_mutation_event(PersonAdditionMutation)?;
    Ok(person_id)
}

/// Removes a person; the people manager releases a [`PersonRemovalEvent`].
pub fn remove_person(ctx: &mut SimulationContext, person_id: PersonId) -> Result<(), NucleusError> {
    ctx.release_mutation_event(PersonRemovalMutation(person_id))
}

fn arrival(
    ctx: &mut SimulationContext,
    data: &PopulationPluginData,
    arrival: u64,
) -> Result<(), NucleusError> {
    let person_id = add_person(ctx)?;
    debug!("Arrival {} at t={}: {:?}", arrival, ctx.now(), person_id);

    if ctx.random().gen_bool(data.departure_probability) {
        let population = ctx.data_manager::<PeopleDataManager>()?.population();
        let index = ctx.random().gen_range(0..population);
        if let Some(leaving) = ctx.data_manager::<PeopleDataManager>()?.nth(index) {
            remove_person(ctx, leaving)?;
        }
    }

    let next = ctx.now() + data.arrival_interval;
    if next <= data.horizon {
        ctx.schedule(Plan::symbolic(next, ARRIVAL, json!({ "arrival": arrival + 1 })))?;
    }
    Ok(())
}

fn arrival_converter(data: PopulationPluginData) -> impl Fn(&Value) -> Result<PlanCallback, NucleusError> {
    move |payload: &Value| {
        let n = payload
            .get("arrival")
            .and_then(Value::as_u64)
            .ok_or_else(|| NucleusError::model("invalid_arrival_payload", payload.to_string()))?;
        let data = data.clone();
        let callback: PlanCallback = Box::new(move |ctx: &mut SimulationContext| arrival(ctx, &data, n));
        Ok(callback)
    }
}

/// People, arrivals and departures.
pub fn population_plugin(data: PopulationPluginData) -> Plugin {
    Plugin::builder(POPULATION)
        .add_plugin_data(data)
        .initializer(|pc| {
            let data = pc.plugin_data::<PopulationPluginData>()?.clone();
            data.validate()?;

            pc.add_data_manager(PeopleDataManager::new(data.initial_population))?;
            pc.context()
                .register_plan_converter(ARRIVAL, arrival_converter(data.clone()))?;
            pc.add_actor("arrivals", move |ctx| {
                // A resumed run already holds the pending arrival
                if !ctx.is_resumed() && data.arrival_interval <= data.horizon {
                    ctx.schedule(Plan::symbolic(
                        data.arrival_interval,
                        ARRIVAL,
                        json!({ "arrival": 1 }),
                    ))?;
                }
                Ok(())
            })?;
            Ok(())
        })
        .build()
}

/// Census totals, released once at close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CensusReport {
    pub time: SimulationTime,
    pub initial_population: usize,
    pub final_population: usize,
    pub additions: u64,
    pub removals: u64,

    /// Removals of people present when the census started
    pub founder_removals: u64,
}

/// Counts population traffic.
#[derive(Debug, Default)]
pub struct CensusDataManager {
    initial_population: usize,
    additions: u64,
    removals: u64,
    founder_removals: u64,
}

impl DataManager for CensusDataManager {
    fn init(ctx: &mut SimulationContext, _: DataManagerHandle<Self>) -> Result<(), NucleusError> {
        let people = ctx.data_manager::<PeopleDataManager>()?;
        let initial = people.population();
        let first_newcomer = people.next_person_id().0;
        ctx.data_manager_mut::<CensusDataManager>()?.initial_population = initial;

        ctx.subscribe(|ctx, _: &PersonAdditionEvent| {
            ctx.data_manager_mut::<CensusDataManager>()?.additions += 1;
            Ok(())
        })?;
        ctx.subscribe(|ctx, _: &PersonRemovalEvent| {
            ctx.data_manager_mut::<CensusDataManager>()?.removals += 1;
            Ok(())
        })?;

        let founder = ctx.add_event_labeler(move |e: &PersonRemovalEvent| e.person_id.0 < first_newcomer);
        ctx.subscribe_labeled(founder, true, |ctx, _| {
            ctx.data_manager_mut::<CensusDataManager>()?.founder_removals += 1;
            Ok(())
        })?;

        ctx.subscribe_to_close(|ctx| {
            let census = ctx.data_manager::<CensusDataManager>()?;
            let report = CensusReport {
                time: ctx.now(),
                initial_population: census.initial_population,
                final_population: ctx.data_manager::<PeopleDataManager>()?.population(),
                additions: census.additions,
                removals: census.removals,
                founder_removals: census.founder_removals,
            };
            ctx.release_output(report);
            Ok(())
        })
    }
}

/// Counts additions and removals; requires the population plugin.
pub fn census_plugin() -> Plugin {
    Plugin::builder(CENSUS)
        .add_dependency(POPULATION)
        .initializer(|pc| {
            pc.add_data_manager(CensusDataManager::default())?;
            Ok(())
        })
        .build()
}

/// One level per arrival interval.
pub fn arrival_interval_dimension(intervals: &[f64]) -> Dimension {
    intervals
        .iter()
        .fold(
            Dimension::builder("arrival_interval").add_metadata_column("arrival_interval"),
            |builder, &interval| {
                builder.add_level(move |ctx| {
                    ctx.plugin_data_mut::<PopulationPluginData>()?.arrival_interval = interval;
                    Ok(vec![interval.to_string()])
                })
            },
        )
        .build()
}
