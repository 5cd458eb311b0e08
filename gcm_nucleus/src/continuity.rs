//! Run continuity: checkpointing pending plans and resuming from them.
//!
//! Only symbolic plans can be recorded. A symbolic plan names a
//! [`PlanKindId`] and carries a JSON payload; resuming looks up the converter
//! registered for the kind and rebuilds the callback from the payload.

use crate::context::SimulationContext;
use crate::plan::PlanAction;
use gcm_env::{NucleusError, PlanKindId, Planner, SimulationTime};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// One pending plan in a checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanRecord {
    pub time: SimulationTime,
    pub planner: Planner,
    pub tie_break: bool,
    pub passive: bool,
    pub kind: PlanKindId,
    pub payload: serde_json::Value,
}

/// Pending plans of a closed simulation, in dequeue order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContinuityRecord {
    /// Simulation time at checkpoint
    pub time: SimulationTime,

    /// Plans executed before the checkpoint, across all resumed segments
    pub completed_plans: u64,

    pub plans: Vec<PlanRecord>,

    /// Pending inline plans that could not be recorded
    pub skipped_inline_plans: usize,
}

impl ContinuityRecord {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }
}

/// Records every pending plan of `ctx`.
pub(crate) fn capture(ctx: &SimulationContext) -> ContinuityRecord {
    let mut plans = Vec::new();
    let mut skipped_inline_plans = 0;
    for pending in ctx.plans.pending_in_order() {
        match pending.payload {
            PlanAction::Symbolic { kind, payload } => plans.push(PlanRecord {
                time: pending.time,
                planner: pending.planner,
                tie_break: pending.tie_break,
                passive: pending.passive,
                kind: *kind,
                payload: payload.clone(),
            }),
            PlanAction::Inline(_) => skipped_inline_plans += 1,
        }
    }

    if skipped_inline_plans > 0 {
        warn!(
            "Checkpoint skipped {} inline plans; only symbolic plans can be resumed",
            skipped_inline_plans
        );
    }
    info!(
        "Captured checkpoint at t={} with {} plans",
        ctx.now(),
        plans.len()
    );

    ContinuityRecord {
        time: ctx.now(),
        completed_plans: ctx.completed_plans(),
        plans,
        skipped_inline_plans,
    }
}

/// Re-inserts recorded plans, keeping their original owners and order.
///
/// Runs before plugin initializers, so recorded plans precede plans scheduled
/// at the same time during initialization.
pub(crate) fn restore(ctx: &mut SimulationContext, record: &ContinuityRecord) -> Result<(), NucleusError> {
    ctx.mark_resumed(record.completed_plans);
    for plan in &record.plans {
        ctx.plans.schedule(
            plan.time,
            plan.planner,
            plan.tie_break,
            plan.passive,
            PlanAction::Symbolic {
                kind: plan.kind,
                payload: plan.payload.clone(),
            },
        )?;
    }
    info!(
        "Resumed {} plans at t={} ({} completed before)",
        record.plans.len(),
        record.time,
        record.completed_plans
    );
    Ok(())
}

/// Fails if any recorded plan names a kind with no registered converter.
pub(crate) fn verify_kinds(ctx: &SimulationContext, record: &ContinuityRecord) -> Result<(), NucleusError> {
    match record
        .plans
        .iter()
        .find(|plan| !ctx.converters.contains_key(&plan.kind))
    {
        Some(plan) => Err(NucleusError::UnknownPlanKind(plan.kind)),
        None => Ok(()),
    }
}
