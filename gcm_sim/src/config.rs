//! Experiment configuration.

use crate::error::ExperimentError;
use gcm_env::{validate_time, SimulationTime};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for an experiment run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Base seed; each scenario derives its own seed from it
    pub base_seed: u64,

    /// Worker threads running replications
    pub thread_count: usize,

    /// Abort the experiment on the first failed replication
    pub halt_on_exception: bool,

    /// Simulation halt time applied to every replication
    pub halt_time: Option<SimulationTime>,

    /// Capture a continuity record for every replication
    pub record_continuity: bool,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            base_seed: 42,
            thread_count: 1,
            halt_on_exception: false,
            halt_time: None,
            record_continuity: false,
        }
    }
}

impl ExperimentConfig {
    /// Loads a configuration from a JSON file. Missing fields take defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ExperimentError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ExperimentError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ExperimentError> {
        if self.thread_count == 0 {
            return Err(ExperimentError::InvalidConfig(
                "thread_count must be at least 1".to_string(),
            ));
        }
        if let Some(halt_time) = self.halt_time {
            validate_time(halt_time).map_err(|e| ExperimentError::InvalidConfig(e.to_string()))?;
        }
        Ok(())
    }
}
