//! Mutation events.
//!
//! A mutation event is a request to change state owned by a data manager.
//! Any component may release one; exactly one handler, registered by the
//! owning data manager, receives it. The handler runs with its data manager in
//! focus, so it may mutate that manager's state and release ordinary events.
//!
//! Unlike ordinary events there are no subscribers or validators: a mutation
//! event is consumed by value and handled synchronously before
//! [`SimulationContext::release_mutation_event`] returns.

use crate::context::SimulationContext;
use crate::engine::SimulationState;
use gcm_env::{DataManagerId, NucleusError, Planner};
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::rc::Rc;
use tracing::trace;

type HandlerFn<E> = Rc<dyn Fn(&mut SimulationContext, E) -> Result<(), NucleusError>>;

struct Handler {
    owner: DataManagerId,
    /// A `HandlerFn<E>` for the keyed event type
    callback: Box<dyn Any>,
}

/// One handler per mutation event type.
#[derive(Default)]
pub(crate) struct MutationRegistry {
    handlers: HashMap<TypeId, Handler>,
}

impl MutationRegistry {
    fn handler<E: 'static>(&self) -> Option<(DataManagerId, HandlerFn<E>)> {
        let handler = self.handlers.get(&TypeId::of::<E>())?;
        handler
            .callback
            .downcast_ref::<HandlerFn<E>>()
            .map(|callback| (handler.owner, Rc::clone(callback)))
    }

    pub(crate) fn len(&self) -> usize {
        self.handlers.len()
    }
}

const MUTATION_STATES: &[SimulationState] =
    &[SimulationState::Initializing, SimulationState::Running];

impl SimulationContext {
    /// Registers the handler for mutation events of type `E`.
    ///
    /// Only a data manager in focus may register, and each type gets one
    /// handler for the life of the simulation.
    pub fn handle_mutation_event<E, F>(&mut self, handler: F) -> Result<(), NucleusError>
    where
        E: 'static,
        F: Fn(&mut SimulationContext, E) -> Result<(), NucleusError> + 'static,
    {
        self.require_state("handle_mutation_event", MUTATION_STATES)?;
        let focus = self.focus();
        let Planner::DataManager(owner) = focus else {
            return Err(NucleusError::IllegalMutationHandler(focus));
        };
        let type_id = TypeId::of::<E>();
        if self.mutations.handlers.contains_key(&type_id) {
            return Err(NucleusError::DuplicateMutationHandler(type_name::<E>()));
        }
        let callback: HandlerFn<E> = Rc::new(handler);
        self.mutations.handlers.insert(
            type_id,
            Handler {
                owner,
                callback: Box::new(callback),
            },
        );
        Ok(())
    }

    /// Hands a mutation event to its owning data manager's handler.
    ///
    /// Open to every component. The handler runs with its data manager in
    /// focus; its result is returned to the caller.
    pub fn release_mutation_event<E: 'static>(&mut self, event: E) -> Result<(), NucleusError> {
        self.require_state("release_mutation_event", MUTATION_STATES)?;
        let (owner, callback) = self
            .mutations
            .handler::<E>()
            .ok_or(NucleusError::UnknownMutationEvent(type_name::<E>()))?;
        trace!("Mutation {} from {} to {:?}", type_name::<E>(), self.focus(), owner);
        self.with_focus(Planner::DataManager(owner), |ctx| callback(ctx, event))
    }

    /// Number of registered mutation handlers.
    pub fn mutation_handler_count(&self) -> usize {
        self.mutations.len()
    }
}
