//! Identity tokens for the simulation kernel.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a plugin.
///
/// Plugin ids are compared by equality only. Resolution order comes from the
/// dependency graph, never from the ids themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PluginId(&'static str);

impl PluginId {
    /// Creates a plugin id from a static name.
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    /// Returns the plugin name.
    pub fn name(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index of a scenario within an experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ScenarioId(pub usize);

impl fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scenario-{}", self.0)
    }
}

/// Identifier of a registered data manager.
///
/// Assigned in registration order, so two simulations built from the same
/// plugins assign the same ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataManagerId(usize);

impl DataManagerId {
    pub const fn from_index(index: usize) -> Self {
        Self(index)
    }

    pub fn index(&self) -> usize {
        self.0
    }
}

/// Identifier of an actor. Never reused within a simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorId(usize);

impl ActorId {
    pub const fn from_index(index: usize) -> Self {
        Self(index)
    }

    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "actor-{}", self.0)
    }
}

/// Handle to a scheduled plan.
///
/// The inner value is the plan's arrival sequence number, which is strictly
/// increasing over the lifetime of a plan queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlanId(u64);

impl PlanId {
    pub fn from_sequence(sequence: u64) -> Self {
        Self(sequence)
    }

    pub fn sequence(&self) -> u64 {
        self.0
    }
}

/// Stable integer naming a kind of symbolic plan for run continuity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlanKindId(pub u64);

impl fmt::Display for PlanKindId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "plan-kind-{}", self.0)
    }
}

/// Handle to an event subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub fn from_sequence(sequence: u64) -> Self {
        Self(sequence)
    }

    pub fn sequence(&self) -> u64 {
        self.0
    }
}

/// Handle to a registered event labeler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LabelerId(usize);

impl LabelerId {
    pub const fn from_index(index: usize) -> Self {
        Self(index)
    }

    pub fn index(&self) -> usize {
        self.0
    }
}

/// The component on whose behalf a plan, subscription or mutation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Planner {
    /// The kernel itself (resumed plans with no recorded owner, internal work)
    Nucleus,
    DataManager(DataManagerId),
    Actor(ActorId),
}

impl Planner {
    /// Secondary ordering key used when a plan requests planner tie-breaking.
    pub fn rank(&self) -> u64 {
        match self {
            Planner::Nucleus => 0,
            Planner::DataManager(id) => 1 + id.index() as u64,
            Planner::Actor(id) => (1u64 << 32) + id.index() as u64,
        }
    }

    pub fn is_data_manager(&self) -> bool {
        matches!(self, Planner::DataManager(_))
    }
}

impl fmt::Display for Planner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Planner::Nucleus => write!(f, "nucleus"),
            Planner::DataManager(id) => write!(f, "data-manager-{}", id.index()),
            Planner::Actor(id) => write!(f, "{}", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plugin_id_equality() {
        const PEOPLE: PluginId = PluginId::new("people");
        assert_eq!(PEOPLE, PluginId::new("people"));
        assert_ne!(PEOPLE, PluginId::new("regions"));
        assert_eq!(PEOPLE.to_string(), "people");
    }

    #[test]
    fn test_planner_rank_orders_data_managers_before_actors() {
        let dm = Planner::DataManager(DataManagerId::from_index(7));
        let actor = Planner::Actor(ActorId::from_index(0));
        assert!(Planner::Nucleus.rank() < dm.rank());
        assert!(dm.rank() < actor.rank());
    }

    #[test]
    fn test_planner_serde_roundtrip() {
        let planner = Planner::Actor(ActorId::from_index(3));
        let json = serde_json::to_string(&planner).unwrap();
        let back: Planner = serde_json::from_str(&json).unwrap();
        assert_eq!(planner, back);
    }
}
