//! Experiment reports.
//!
//! One record per replication, serializable to JSON for downstream tooling.

use gcm_env::{ScenarioId, SimulationTime};
use gcm_nucleus::ContinuityRecord;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// How a replication ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReplicationStatus {
    Succeeded {
        final_time: SimulationTime,
        plans_executed: u64,
        halted: bool,
    },
    Failed {
        reason: String,
    },
}

/// Result of one scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicationReport {
    pub scenario_id: ScenarioId,

    /// Seed the replication's engine ran with
    pub seed: u64,

    /// Metadata values returned by the scenario's levels, in dimension order
    pub metadata: Vec<String>,

    #[serde(flatten)]
    pub status: ReplicationStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub continuity: Option<ContinuityRecord>,
}

impl ReplicationReport {
    pub fn succeeded(&self) -> bool {
        matches!(self.status, ReplicationStatus::Succeeded { .. })
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match &self.status {
            ReplicationStatus::Failed { reason } => Some(reason),
            ReplicationStatus::Succeeded { .. } => None,
        }
    }
}

/// Results of a whole experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentReport {
    pub base_seed: u64,

    /// Scenarios in the experiment, including any never started
    pub scenario_count: usize,

    /// Metadata column names, in dimension order
    pub metadata_columns: Vec<String>,

    /// Sorted by scenario id
    pub replications: Vec<ReplicationReport>,
}

impl ExperimentReport {
    pub fn succeeded_count(&self) -> usize {
        self.replications.iter().filter(|r| r.succeeded()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.replications.len() - self.succeeded_count()
    }

    pub fn all_succeeded(&self) -> bool {
        self.replications.len() == self.scenario_count && self.failed_count() == 0
    }

    pub fn replication(&self, scenario_id: ScenarioId) -> Option<&ReplicationReport> {
        self.replications
            .binary_search_by_key(&scenario_id, |r| r.scenario_id)
            .ok()
            .map(|index| &self.replications[index])
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
