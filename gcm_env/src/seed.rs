//! Deterministic seed derivation for replications.

use crate::types::ScenarioId;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Derives per-replication seeds from a single base seed.
///
/// Seeds are a pure function of `(base_seed, scenario_id)`, so a scenario
/// reproduces exactly no matter which worker thread runs it or in what order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedSource {
    base_seed: u64,
}

impl SeedSource {
    /// Creates a seed source from the experiment's base seed.
    pub fn new(base_seed: u64) -> Self {
        Self { base_seed }
    }

    /// Returns the base seed.
    pub fn base_seed(&self) -> u64 {
        self.base_seed
    }

    /// Derives the seed for a scenario.
    pub fn replication_seed(&self, scenario: ScenarioId) -> u64 {
        self.base_seed
            .wrapping_mul(0x9e3779b97f4a7c15) // Golden ratio prime
            .wrapping_add((scenario.0 as u64).wrapping_mul(0x517cc1b727220a95))
    }

    /// Builds the random generator for a scenario.
    pub fn replication_rng(&self, scenario: ScenarioId) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(self.replication_seed(scenario))
    }
}
