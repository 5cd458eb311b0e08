//! Data managers and their registry.
//!
//! A data manager owns one slice of domain state. It is the only component
//! allowed to mutate that state and the only kind of component allowed to
//! release events. Other components ask for changes by releasing mutation
//! events, which run the owning manager's handler with that manager in focus:
//!
//! ```ignore
//! impl DataManager for People {
//!     fn init(ctx: &mut SimulationContext, _: DataManagerHandle<Self>) -> Result<(), NucleusError> {
//!         ctx.handle_mutation_event(|ctx, AddPerson(person)| {
//!             ctx.data_manager_mut::<People>()?.insert(person);
//!             ctx.release_event(PersonAdded { person })
//!         })
//!     }
//! }
//!
//! pub fn add_person(ctx: &mut SimulationContext, person: PersonId) -> Result<(), NucleusError> {
//!     ctx.release_mutation_event(AddPerson(person))
//! }
//! ```
//!
//! Code holding the manager's [`DataManagerHandle`] may also enter its focus
//! directly with [`SimulationContext::as_data_manager`]. Handles are minted
//! only by the kernel, at registration and in [`DataManager::init`]:
//!
//! ```compile_fail
//! use gcm_nucleus::{DataManager, DataManagerHandle, DataManagerId};
//!
//! struct People;
//! impl DataManager for People {}
//!
//! let forged: DataManagerHandle<People> = DataManagerHandle {
//!     id: DataManagerId::from_index(0),
//!     _marker: std::marker::PhantomData,
//! };
//! ```

use crate::context::SimulationContext;
use crate::engine::SimulationState;
use gcm_env::{DataManagerId, NucleusError, Planner};
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;
use tracing::debug;

/// A component owning mutable domain state.
pub trait DataManager: Any {
    /// Called once, after every plugin initializer has run, with this data
    /// manager in focus. Data managers initialize in registration order.
    fn init(ctx: &mut SimulationContext, handle: DataManagerHandle<Self>) -> Result<(), NucleusError>
    where
        Self: Sized,
    {
        let _ = (ctx, handle);
        Ok(())
    }
}

/// Capability to enter the focus of data manager `T`.
pub struct DataManagerHandle<T> {
    id: DataManagerId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> DataManagerHandle<T> {
    pub(crate) fn new(id: DataManagerId) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    pub fn id(&self) -> DataManagerId {
        self.id
    }
}

impl<T> Clone for DataManagerHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for DataManagerHandle<T> {}

impl<T> std::fmt::Debug for DataManagerHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("DataManagerHandle").field(&self.id).finish()
    }
}

type InitFn = fn(&mut SimulationContext, DataManagerId) -> Result<(), NucleusError>;

fn run_init<T: DataManager>(ctx: &mut SimulationContext, id: DataManagerId) -> Result<(), NucleusError> {
    T::init(ctx, DataManagerHandle::new(id))
}

struct Registered {
    name: &'static str,
    instance: Box<dyn Any>,
    init: InitFn,
}

/// Holds one instance per data-manager type.
#[derive(Default)]
pub(crate) struct DataManagerRegistry {
    by_type: HashMap<TypeId, DataManagerId>,
    managers: Vec<Registered>,
}

impl DataManagerRegistry {
    pub(crate) fn add<T: DataManager>(&mut self, manager: T) -> Result<DataManagerId, NucleusError> {
        let type_id = TypeId::of::<T>();
        if self.by_type.contains_key(&type_id) {
            return Err(NucleusError::DuplicateDataManager(type_name::<T>()));
        }
        let id = DataManagerId::from_index(self.managers.len());
        self.managers.push(Registered {
            name: type_name::<T>(),
            instance: Box::new(manager),
            init: run_init::<T>,
        });
        self.by_type.insert(type_id, id);
        debug!("Registered data manager {} as {:?}", type_name::<T>(), id);
        Ok(id)
    }

    pub(crate) fn id_of<T: DataManager>(&self) -> Result<DataManagerId, NucleusError> {
        self.by_type
            .get(&TypeId::of::<T>())
            .copied()
            .ok_or(NucleusError::UnknownDataManager(type_name::<T>()))
    }

    fn get<T: DataManager>(&self) -> Result<&T, NucleusError> {
        let id = self.id_of::<T>()?;
        self.managers[id.index()]
            .instance
            .downcast_ref::<T>()
            .ok_or(NucleusError::UnknownDataManager(type_name::<T>()))
    }

    fn get_mut<T: DataManager>(&mut self) -> Result<&mut T, NucleusError> {
        let id = self.id_of::<T>()?;
        self.managers[id.index()]
            .instance
            .downcast_mut::<T>()
            .ok_or(NucleusError::UnknownDataManager(type_name::<T>()))
    }

    pub(crate) fn len(&self) -> usize {
        self.managers.len()
    }

    /// Initializers in registration order.
    pub(crate) fn initializers(&self) -> Vec<(DataManagerId, &'static str, InitFn)> {
        self.managers
            .iter()
            .enumerate()
            .map(|(index, m)| (DataManagerId::from_index(index), m.name, m.init))
            .collect()
    }
}

impl SimulationContext {
    /// Shared access to a data manager. Open to every component.
    pub fn data_manager<T: DataManager>(&self) -> Result<&T, NucleusError> {
        self.data_managers.get::<T>()
    }

    /// Mutable access to a data manager. Only that data manager may ask.
    pub fn data_manager_mut<T: DataManager>(&mut self) -> Result<&mut T, NucleusError> {
        let id = self.data_managers.id_of::<T>()?;
        let focus = self.focus();
        if focus != Planner::DataManager(id) {
            return Err(NucleusError::IllegalDataManagerAccess {
                requested: type_name::<T>(),
                focus,
            });
        }
        self.data_managers.get_mut::<T>()
    }

    /// Runs `f` with data manager `T` in focus.
    ///
    /// Fails if `handle` was minted by another simulation.
    pub fn as_data_manager<T, R>(
        &mut self,
        handle: DataManagerHandle<T>,
        f: impl FnOnce(&mut SimulationContext) -> Result<R, NucleusError>,
    ) -> Result<R, NucleusError>
    where
        T: DataManager,
    {
        let id = self.data_managers.id_of::<T>()?;
        if id != handle.id {
            return Err(NucleusError::IllegalDataManagerAccess {
                requested: type_name::<T>(),
                focus: self.focus(),
            });
        }
        self.with_focus(Planner::DataManager(id), f)
    }

    pub fn data_manager_id<T: DataManager>(&self) -> Result<DataManagerId, NucleusError> {
        self.data_managers.id_of::<T>()
    }

    pub fn has_data_manager<T: DataManager>(&self) -> bool {
        self.data_managers.id_of::<T>().is_ok()
    }

    /// Registers a data manager. Only allowed while plugins initialize.
    pub(crate) fn register_data_manager<T: DataManager>(
        &mut self,
        manager: T,
    ) -> Result<DataManagerHandle<T>, NucleusError> {
        self.require_state("add_data_manager", &[SimulationState::Initializing])?;
        self.data_managers.add(manager).map(DataManagerHandle::new)
    }

    pub(crate) fn data_manager_count(&self) -> usize {
        self.data_managers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::running_context;
    use gcm_env::ActorId;

    #[derive(Debug, Default)]
    struct Counter {
        value: u32,
    }

    impl DataManager for Counter {}

    #[derive(Debug, Clone, PartialEq)]
    struct Incremented(u32);

    #[derive(Debug, Default)]
    struct Gauge;

    impl DataManager for Gauge {}

    fn increment(ctx: &mut SimulationContext, handle: DataManagerHandle<Counter>) -> Result<(), NucleusError> {
        ctx.as_data_manager(handle, |ctx| {
            let counter = ctx.data_manager_mut::<Counter>()?;
            counter.value += 1;
            let value = counter.value;
            ctx.release_event(Incremented(value))
        })
    }

    fn context_with_counter() -> (SimulationContext, DataManagerHandle<Counter>) {
        let mut ctx = running_context();
        ctx.set_state(SimulationState::Initializing);
        let handle = ctx.register_data_manager(Counter::default()).unwrap();
        ctx.set_state(SimulationState::Running);
        (ctx, handle)
    }

    #[test]
    fn test_unknown_data_manager() {
        let ctx = running_context();
        assert!(matches!(
            ctx.data_manager::<Counter>(),
            Err(NucleusError::UnknownDataManager(_))
        ));
    }

    #[test]
    fn test_duplicate_data_manager() {
        let mut ctx = running_context();
        ctx.set_state(SimulationState::Initializing);
        ctx.register_data_manager(Counter::default()).unwrap();
        assert!(matches!(
            ctx.register_data_manager(Counter::default()),
            Err(NucleusError::DuplicateDataManager(_))
        ));
    }

    #[test]
    fn test_registration_closed_after_initialization() {
        let mut ctx = running_context();
        assert!(matches!(
            ctx.register_data_manager(Counter::default()),
            Err(NucleusError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_mutation_goes_through_manager_focus() {
        let (mut ctx, handle) = context_with_counter();
        let seen = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let s = seen.clone();
        ctx.subscribe::<Incremented, _>(move |ctx, e| {
            // Observers see the new state together with the notification
            assert_eq!(ctx.data_manager::<Counter>()?.value, e.0);
            s.borrow_mut().push(e.0);
            Ok(())
        })
        .unwrap();

        increment(&mut ctx, handle).unwrap();
        increment(&mut ctx, handle).unwrap();
        assert_eq!(ctx.data_manager::<Counter>().unwrap().value, 2);
        assert_eq!(*seen.borrow(), vec![1, 2]);
    }

    #[test]
    fn test_mutable_access_requires_focus() {
        let (mut ctx, _) = context_with_counter();
        let err = ctx.data_manager_mut::<Counter>().unwrap_err();
        assert!(matches!(
            err,
            NucleusError::IllegalDataManagerAccess {
                focus: Planner::Nucleus,
                ..
            }
        ));

        let actor = Planner::Actor(ActorId::from_index(0));
        let err = ctx
            .with_focus(actor, |ctx| ctx.data_manager_mut::<Counter>().map(|_| ()))
            .unwrap_err();
        assert!(matches!(err, NucleusError::IllegalDataManagerAccess { focus, .. } if focus == actor));
    }

    #[test]
    fn test_handle_from_another_simulation_is_rejected() {
        let (mut ctx, _) = context_with_counter();
        let mut other = running_context();
        other.set_state(SimulationState::Initializing);
        other.register_data_manager(Gauge).unwrap();
        let foreign = other.register_data_manager(Counter::default()).unwrap();
        assert_ne!(foreign.id(), ctx.data_manager_id::<Counter>().unwrap());

        let err = increment(&mut ctx, foreign).unwrap_err();
        assert!(matches!(
            err,
            NucleusError::IllegalDataManagerAccess {
                focus: Planner::Nucleus,
                ..
            }
        ));
        assert_eq!(ctx.data_manager::<Counter>().unwrap().value, 0);
    }

    #[test]
    fn test_handle_enters_its_manager_focus() {
        let (mut ctx, handle) = context_with_counter();
        let id = ctx.data_manager_id::<Counter>().unwrap();
        assert_eq!(handle.id(), id);
        let focus = ctx.as_data_manager(handle, |ctx| Ok(ctx.focus())).unwrap();
        assert_eq!(focus, Planner::DataManager(id));
        assert_eq!(ctx.focus(), Planner::Nucleus);
    }
}
