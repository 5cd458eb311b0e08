//! Actors and their registry.
//!
//! An actor is a behavior: it schedules plans and subscribes to events, and
//! it reads domain state through data managers. It owns no state the kernel
//! knows about, so the registry only tracks names, liveness and the actors
//! still waiting to initialize.

use crate::context::SimulationContext;
use crate::engine::SimulationState;
use gcm_env::{ActorId, NucleusError, Planner};
use std::collections::VecDeque;
use tracing::debug;

/// Runs once, with the new actor in focus.
pub type ActorInit = Box<dyn FnOnce(&mut SimulationContext) -> Result<(), NucleusError>>;

struct ActorRecord {
    name: String,
    alive: bool,
}

#[derive(Default)]
pub(crate) struct ActorRegistry {
    actors: Vec<ActorRecord>,
    /// Actors added during initialization, started after the data managers
    pending: VecDeque<(ActorId, ActorInit)>,
}

impl ActorRegistry {
    fn allocate(&mut self, name: String) -> ActorId {
        let id = ActorId::from_index(self.actors.len());
        self.actors.push(ActorRecord { name, alive: true });
        id
    }

    fn is_alive(&self, id: ActorId) -> bool {
        self.actors
            .get(id.index())
            .map(|record| record.alive)
            .unwrap_or(false)
    }

    pub(crate) fn take_pending(&mut self) -> Option<(ActorId, ActorInit)> {
        self.pending.pop_front()
    }
}

impl SimulationContext {
    /// Adds an actor and returns its id.
    ///
    /// During initialization the actor starts after every data manager has
    /// initialized; while running it starts immediately.
    pub fn add_actor<F>(&mut self, name: impl Into<String>, init: F) -> Result<ActorId, NucleusError>
    where
        F: FnOnce(&mut SimulationContext) -> Result<(), NucleusError> + 'static,
    {
        let state = self.state();
        self.require_state(
            "add_actor",
            &[SimulationState::Initializing, SimulationState::Running],
        )?;
        let id = self.actors.allocate(name.into());
        debug!("Added actor {} ({})", id, self.actor_name(id).unwrap_or_default());

        if state == SimulationState::Initializing {
            self.actors.pending.push_back((id, Box::new(init)));
        } else {
            self.start_actor(id, Box::new(init))?;
        }
        Ok(id)
    }

    pub(crate) fn start_actor(&mut self, id: ActorId, init: ActorInit) -> Result<(), NucleusError> {
        if !self.actors.is_alive(id) {
            return Ok(());
        }
        self.with_focus(Planner::Actor(id), init)
    }

    /// Removes an actor, cancelling its pending plans and subscriptions.
    pub fn remove_actor(&mut self, id: ActorId) -> Result<(), NucleusError> {
        match self.actors.actors.get_mut(id.index()) {
            Some(record) if record.alive => record.alive = false,
            _ => return Err(NucleusError::UnknownActor(id)),
        }
        let planner = Planner::Actor(id);
        let plans = self.plans.cancel_owned_by(planner);
        let subscriptions = self.events.remove_owned_by(planner);
        self.close_subscribers.retain(|(owner, _)| *owner != planner);
        debug!(
            "Removed actor {}: cancelled {} plans, {} subscriptions",
            id, plans, subscriptions
        );
        Ok(())
    }

    pub fn actor_exists(&self, id: ActorId) -> bool {
        self.actors.is_alive(id)
    }

    pub fn actor_name(&self, id: ActorId) -> Option<String> {
        self.actors
            .actors
            .get(id.index())
            .map(|record| record.name.clone())
    }

    /// Number of actors that have not been removed.
    pub fn actor_count(&self) -> usize {
        self.actors.actors.iter().filter(|record| record.alive).count()
    }
}
