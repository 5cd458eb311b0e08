//! Error types for the GCM simulation kernel.

use crate::types::{ActorId, LabelerId, PlanId, PlanKindId, Planner, PluginId};
use thiserror::Error;

/// A contract violation raised by domain code (a data manager), not the kernel.
///
/// The kernel never inspects these. They travel up through plan and event
/// dispatch unchanged and abort the replication.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct ModelError {
    /// Domain error kind, e.g. `unknown_person_id`
    pub kind: &'static str,

    /// Human readable detail
    pub message: String,
}

impl ModelError {
    /// Creates a model error of the given kind.
    pub fn new(kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Broad category of a kernel error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Plugin graph or plugin data problems, raised while initializing
    Configuration,
    /// A time earlier than the clock, or not a valid time at all
    InvalidTime,
    /// Lookup of something that was never registered
    UnknownComponent,
    /// The same plugin, data manager or plan kind registered twice
    DuplicateRegistration,
    /// A component stepped outside its role (actor releasing events, etc.)
    ContractViolation,
    /// Raised by a data manager
    Model,
}

/// Errors raised by the simulation kernel.
///
/// The kernel is fail-fast: none of these are retried or swallowed internally.
#[derive(Debug, Error)]
pub enum NucleusError {
    /// A plugin names a dependency that is not part of the simulation
    #[error("Plugin {plugin} depends on unknown plugin {dependency}")]
    UnknownPluginDependency {
        plugin: PluginId,
        dependency: PluginId,
    },

    /// The plugin dependency graph has a cycle through these plugins
    #[error("Cyclic plugin dependency among: {}", format_plugins(.0))]
    CyclicPluginDependency(Vec<PluginId>),

    /// A plugin initializer asked for plugin data the plugin does not carry
    #[error("Plugin {plugin} has no plugin data of type {data}")]
    MissingPluginData {
        plugin: PluginId,
        data: &'static str,
    },

    /// Two plugins share an id
    #[error("Duplicate plugin: {0}")]
    DuplicatePlugin(PluginId),

    /// A second data manager of an already registered type
    #[error("Duplicate data manager: {0}")]
    DuplicateDataManager(&'static str),

    /// A plan scheduled before the current simulation time
    #[error("Plan time {requested} is before current time {current}")]
    InvalidPlanTime { requested: f64, current: f64 },

    /// A time that is NaN or infinite
    #[error("Invalid simulation time: {0}")]
    InvalidTime(f64),

    /// Lookup of a data manager type that was never registered
    #[error("Unknown data manager: {0}")]
    UnknownDataManager(&'static str),

    /// Lookup of an actor id that does not exist or was removed
    #[error("Unknown actor: {0}")]
    UnknownActor(ActorId),

    /// A symbolic plan whose kind has no registered converter
    #[error("Unknown plan kind: {0}")]
    UnknownPlanKind(PlanKindId),

    /// A second converter for an already registered plan kind
    #[error("Duplicate plan kind: {0}")]
    DuplicatePlanKind(PlanKindId),

    /// A labeled subscription through a labeler this bus never issued
    #[error("Unknown event labeler: {0:?}")]
    UnknownEventLabeler(LabelerId),

    /// An event released by something other than a data manager
    #[error("Only data managers may release events (focus: {0})")]
    IllegalEventRelease(Planner),

    /// Mutable access or focus entry without the data manager's capability
    #[error("Mutable access to {requested} requires its focus (focus: {focus})")]
    IllegalDataManagerAccess {
        requested: &'static str,
        focus: Planner,
    },

    /// A mutation handler registered by something other than a data manager
    #[error("Only data managers may handle mutation events (focus: {0})")]
    IllegalMutationHandler(Planner),

    /// A second handler for an already handled mutation event type
    #[error("Duplicate mutation handler: {0}")]
    DuplicateMutationHandler(&'static str),

    /// A mutation event with no registered handler
    #[error("No handler for mutation event {0}")]
    UnknownMutationEvent(&'static str),

    /// A plan cancelled by a component that does not own it
    #[error("Plan {plan:?} is owned by {owner} (focus: {focus})")]
    IllegalPlanCancellation {
        plan: PlanId,
        owner: Planner,
        focus: Planner,
    },

    /// An operation attempted in a lifecycle state that does not allow it
    #[error("Operation {operation} is not allowed while {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    /// A model error raised by domain code
    #[error("Model error: {0}")]
    Model(#[from] ModelError),
}

impl NucleusError {
    /// Maps the error onto its category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            NucleusError::UnknownPluginDependency { .. }
            | NucleusError::CyclicPluginDependency(_)
            | NucleusError::MissingPluginData { .. } => ErrorKind::Configuration,
            NucleusError::InvalidPlanTime { .. } | NucleusError::InvalidTime(_) => {
                ErrorKind::InvalidTime
            }
            NucleusError::UnknownDataManager(_)
            | NucleusError::UnknownActor(_)
            | NucleusError::UnknownPlanKind(_)
            | NucleusError::UnknownEventLabeler(_)
            | NucleusError::UnknownMutationEvent(_) => ErrorKind::UnknownComponent,
            NucleusError::DuplicatePlugin(_)
            | NucleusError::DuplicateDataManager(_)
            | NucleusError::DuplicatePlanKind(_)
            | NucleusError::DuplicateMutationHandler(_) => ErrorKind::DuplicateRegistration,
            NucleusError::IllegalEventRelease(_)
            | NucleusError::IllegalDataManagerAccess { .. }
            | NucleusError::IllegalMutationHandler(_)
            | NucleusError::IllegalPlanCancellation { .. }
            | NucleusError::InvalidState { .. } => ErrorKind::ContractViolation,
            NucleusError::Model(_) => ErrorKind::Model,
        }
    }

    /// Creates a model error.
    pub fn model(kind: &'static str, message: impl Into<String>) -> Self {
        Self::Model(ModelError::new(kind, message))
    }

    /// True for errors that can only occur while plugins initialize.
    pub fn is_configuration(&self) -> bool {
        self.kind() == ErrorKind::Configuration
    }
}

fn format_plugins(plugins: &[PluginId]) -> String {
    plugins
        .iter()
        .map(|p| p.name())
        .collect::<Vec<_>>()
        .join(" -> ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let cyclic = NucleusError::CyclicPluginDependency(vec![
            PluginId::new("a"),
            PluginId::new("b"),
        ]);
        assert_eq!(cyclic.kind(), ErrorKind::Configuration);
        assert!(cyclic.is_configuration());
        assert_eq!(cyclic.to_string(), "Cyclic plugin dependency among: a -> b");

        let time = NucleusError::InvalidPlanTime {
            requested: 1.0,
            current: 2.0,
        };
        assert_eq!(time.kind(), ErrorKind::InvalidTime);
        assert_eq!(
            NucleusError::DuplicateDataManager("People").kind(),
            ErrorKind::DuplicateRegistration
        );
    }

    #[test]
    fn test_mutation_and_cancellation_errors_are_contract_violations() {
        let actor = Planner::Actor(ActorId::from_index(1));
        assert_eq!(
            NucleusError::IllegalMutationHandler(actor).kind(),
            ErrorKind::ContractViolation
        );
        let cancel = NucleusError::IllegalPlanCancellation {
            plan: PlanId::from_sequence(4),
            owner: Planner::Nucleus,
            focus: actor,
        };
        assert_eq!(cancel.kind(), ErrorKind::ContractViolation);
        assert_eq!(
            NucleusError::DuplicateMutationHandler("AddPerson").kind(),
            ErrorKind::DuplicateRegistration
        );
        assert_eq!(
            NucleusError::UnknownMutationEvent("AddPerson").kind(),
            ErrorKind::UnknownComponent
        );
    }

    #[test]
    fn test_model_error_passes_through_from() {
        fn fails() -> Result<(), NucleusError> {
            Err(ModelError::new("unknown_person_id", "person 7"))?;
            Ok(())
        }

        match fails() {
            Err(NucleusError::Model(e)) => {
                assert_eq!(e.kind, "unknown_person_id");
                assert_eq!(e.message, "person 7");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
