//! Error types for experiments.

use gcm_env::{NucleusError, ScenarioId};
use thiserror::Error;

/// Why a single replication failed.
#[derive(Debug, Error)]
pub enum ReplicationError {
    #[error(transparent)]
    Simulation(#[from] NucleusError),

    #[error("No plugin carries data of type {0}")]
    MissingPluginData(&'static str),

    #[error("Replication panicked: {0}")]
    Panicked(String),
}

/// Errors raised while configuring or executing an experiment.
#[derive(Debug, Error)]
pub enum ExperimentError {
    #[error("Invalid experiment configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Scenario {scenario_id} failed (levels: {}): {source}", .metadata.join(", "))]
    ReplicationFailed {
        scenario_id: ScenarioId,
        metadata: Vec<String>,
        #[source]
        source: ReplicationError,
    },

    #[error("Experiment worker panicked")]
    WorkerPanicked,

    #[error(transparent)]
    Nucleus(#[from] NucleusError),
}
