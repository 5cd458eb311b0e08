//! Plans and the plan queue.
//!
//! A plan is a callback scheduled for a simulation time. The queue orders plans
//! by `(time, tie-break, arrival sequence)`:
//!
//! - time ascending
//! - plans that did not request a planner tie-break come first, in arrival
//!   order (FIFO)
//! - plans that did request one follow, ordered by their planner's rank and
//!   then by arrival
//!
//! Every key component is total and the arrival sequence is unique, so a fixed
//! sequence of `schedule` calls always drains in the same order.
//!
//! Cancellation is a soft delete: the plan's slot is marked inactive and its
//! payload dropped, and the heap entry is discarded when it reaches the front.

use crate::context::SimulationContext;
use crate::time::SimulationClock;
use gcm_env::{NucleusError, PlanId, PlanKindId, Planner, SimulationTime};
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};

/// Callback executed when an inline plan comes due.
pub type PlanCallback = Box<dyn FnOnce(&mut SimulationContext) -> Result<(), NucleusError>>;

/// What a plan does when it comes due.
pub enum PlanAction {
    /// A closure. Cannot be recorded by a continuity checkpoint.
    Inline(PlanCallback),

    /// A `(kind, payload)` pair resolved through the registered plan
    /// converter for `kind` at execution time.
    Symbolic {
        kind: PlanKindId,
        payload: serde_json::Value,
    },
}

impl std::fmt::Debug for PlanAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanAction::Inline(_) => write!(f, "Inline(..)"),
            PlanAction::Symbolic { kind, payload } => f
                .debug_struct("Symbolic")
                .field("kind", kind)
                .field("payload", payload)
                .finish(),
        }
    }
}

/// A plan ready to be handed to the context.
///
/// # Example
///
/// ```ignore
/// let id = ctx.schedule(Plan::new(3.0, |ctx| {
///     ctx.halt();
///     Ok(())
/// }).passive())?;
/// ```
#[derive(Debug)]
pub struct Plan {
    pub(crate) time: SimulationTime,
    pub(crate) passive: bool,
    pub(crate) tie_break: bool,
    pub(crate) action: PlanAction,
}

impl Plan {
    /// Creates an inline plan.
    pub fn new<F>(time: SimulationTime, callback: F) -> Self
    where
        F: FnOnce(&mut SimulationContext) -> Result<(), NucleusError> + 'static,
    {
        Self {
            time,
            passive: false,
            tie_break: false,
            action: PlanAction::Inline(Box::new(callback)),
        }
    }

    /// Creates a symbolic plan that a continuity checkpoint can record.
    pub fn symbolic(time: SimulationTime, kind: PlanKindId, payload: serde_json::Value) -> Self {
        Self {
            time,
            passive: false,
            tie_break: false,
            action: PlanAction::Symbolic { kind, payload },
        }
    }

    /// Marks the plan passive: it runs only while an active plan is queued.
    pub fn passive(mut self) -> Self {
        self.passive = true;
        self
    }

    /// Orders the plan among same-time plans by its planner before arrival.
    pub fn with_planner_tie_break(mut self) -> Self {
        self.tie_break = true;
        self
    }

    pub fn time(&self) -> SimulationTime {
        self.time
    }
}

#[derive(Debug, Clone, Copy)]
struct PlanKey {
    time: SimulationTime,
    tie: Option<u64>,
    sequence: u64,
}

impl PartialEq for PlanKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PlanKey {}

impl PartialOrd for PlanKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PlanKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .total_cmp(&other.time)
            .then(self.tie.cmp(&other.tie))
            .then(self.sequence.cmp(&other.sequence))
    }
}

struct Slot<T> {
    key: PlanKey,
    planner: Planner,
    tie_break: bool,
    passive: bool,
    active: bool,
    payload: Option<T>,
}

/// A plan removed from the queue for execution.
#[derive(Debug)]
pub struct ScheduledPlan<T> {
    pub id: PlanId,
    pub time: SimulationTime,
    pub planner: Planner,
    pub tie_break: bool,
    pub passive: bool,
    pub payload: T,
}

/// A view of a plan still waiting in the queue.
#[derive(Debug)]
pub struct PendingPlan<'a, T> {
    pub id: PlanId,
    pub time: SimulationTime,
    pub planner: Planner,
    pub tie_break: bool,
    pub passive: bool,
    pub payload: &'a T,
}

/// Priority queue of plans plus the clock it drives.
pub struct PlanQueue<T> {
    clock: SimulationClock,
    heap: BinaryHeap<Reverse<PlanKey>>,
    slots: HashMap<u64, Slot<T>>,
    next_sequence: u64,
    /// Pending, not cancelled, not passive
    active_plans: usize,
    /// Pending, not cancelled
    pending_plans: usize,
}

impl<T> PlanQueue<T> {
    /// Creates an empty queue with the clock at `start_time`.
    pub fn new(start_time: SimulationTime) -> Result<Self, NucleusError> {
        Ok(Self {
            clock: SimulationClock::new(start_time)?,
            heap: BinaryHeap::new(),
            slots: HashMap::new(),
            next_sequence: 0,
            active_plans: 0,
            pending_plans: 0,
        })
    }

    /// Current simulation time.
    pub fn now(&self) -> SimulationTime {
        self.clock.now()
    }

    /// Adds a plan.
    ///
    /// Fails with `InvalidPlanTime` if `time` is before the clock.
    pub fn schedule(
        &mut self,
        time: SimulationTime,
        planner: Planner,
        tie_break: bool,
        passive: bool,
        payload: T,
    ) -> Result<PlanId, NucleusError> {
        let time = self.clock.check_schedulable(time)?;
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let key = PlanKey {
            time,
            tie: tie_break.then(|| planner.rank()),
            sequence,
        };
        self.heap.push(Reverse(key));
        self.slots.insert(
            sequence,
            Slot {
                key,
                planner,
                tie_break,
                passive,
                active: true,
                payload: Some(payload),
            },
        );

        self.pending_plans += 1;
        if !passive {
            self.active_plans += 1;
        }
        Ok(PlanId::from_sequence(sequence))
    }

    /// Cancels a pending plan.
    ///
    /// Returns false if the plan already ran, was already cancelled or never
    /// existed. Cancelling twice is not an error.
    pub fn cancel(&mut self, id: PlanId) -> bool {
        let Some(slot) = self.slots.get_mut(&id.sequence()) else {
            return false;
        };
        if !slot.active {
            return false;
        }
        slot.active = false;
        slot.payload = None;
        self.pending_plans -= 1;
        if !slot.passive {
            self.active_plans -= 1;
        }
        true
    }

    /// Cancels every pending plan owned by `planner`. Returns how many.
    pub fn cancel_owned_by(&mut self, planner: Planner) -> usize {
        let owned: Vec<u64> = self
            .slots
            .iter()
            .filter(|(_, slot)| slot.active && slot.planner == planner)
            .map(|(sequence, _)| *sequence)
            .collect();
        owned
            .into_iter()
            .filter(|sequence| self.cancel(PlanId::from_sequence(*sequence)))
            .count()
    }

    /// Owner of a pending plan.
    pub fn owner(&self, id: PlanId) -> Option<Planner> {
        self.slots
            .get(&id.sequence())
            .filter(|slot| slot.active)
            .map(|slot| slot.planner)
    }

    /// True if the plan is still waiting to run.
    pub fn contains(&self, id: PlanId) -> bool {
        self.slots
            .get(&id.sequence())
            .map(|slot| slot.active)
            .unwrap_or(false)
    }

    /// Number of pending plans, passive ones included.
    pub fn len(&self) -> usize {
        self.pending_plans
    }

    pub fn is_empty(&self) -> bool {
        self.pending_plans == 0
    }

    /// Number of pending non-passive plans.
    pub fn active_len(&self) -> usize {
        self.active_plans
    }

    fn purge_cancelled_head(&mut self) {
        while let Some(Reverse(key)) = self.heap.peek() {
            let sequence = key.sequence;
            match self.slots.get(&sequence) {
                Some(slot) if slot.active => break,
                _ => {
                    self.heap.pop();
                    self.slots.remove(&sequence);
                }
            }
        }
    }

    /// Time of the next plan that would be dequeued.
    ///
    /// `None` when no active plan remains, even if passive plans are queued.
    pub fn next_time(&mut self) -> Option<SimulationTime> {
        if self.active_plans == 0 {
            return None;
        }
        self.purge_cancelled_head();
        self.heap.peek().map(|Reverse(key)| key.time)
    }

    /// Removes the earliest plan and advances the clock to its time.
    ///
    /// Returns `None` once no active plan remains; passive plans left behind
    /// stay queued. If the clock refuses the plan's time, the plan stays
    /// queued and the error is returned.
    pub fn pop_next(&mut self) -> Result<Option<ScheduledPlan<T>>, NucleusError> {
        if self.active_plans == 0 {
            return Ok(None);
        }
        self.purge_cancelled_head();
        let Some(&Reverse(key)) = self.heap.peek() else {
            return Ok(None);
        };
        self.clock.advance_to(key.time)?;
        self.heap.pop();

        let Some(slot) = self.slots.remove(&key.sequence) else {
            return Ok(None);
        };
        let Some(payload) = slot.payload else {
            return Ok(None);
        };
        self.pending_plans -= 1;
        if !slot.passive {
            self.active_plans -= 1;
        }

        Ok(Some(ScheduledPlan {
            id: PlanId::from_sequence(key.sequence),
            time: key.time,
            planner: slot.planner,
            tie_break: slot.tie_break,
            passive: slot.passive,
            payload,
        }))
    }

    /// Moves the clock forward without dequeuing anything.
    pub fn advance_to(&mut self, time: SimulationTime) -> Result<(), NucleusError> {
        self.clock.advance_to(time)
    }

    /// Pending plans in the order they would be dequeued.
    pub fn pending_in_order(&self) -> Vec<PendingPlan<'_, T>> {
        let mut pending: Vec<(&PlanKey, &Slot<T>)> = self
            .slots
            .values()
            .filter(|slot| slot.active)
            .map(|slot| (&slot.key, slot))
            .collect();
        pending.sort_by(|a, b| a.0.cmp(b.0));

        pending
            .into_iter()
            .filter_map(|(key, slot)| {
                slot.payload.as_ref().map(|payload| PendingPlan {
                    id: PlanId::from_sequence(key.sequence),
                    time: key.time,
                    planner: slot.planner,
                    tie_break: slot.tie_break,
                    passive: slot.passive,
                    payload,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gcm_env::{ActorId, DataManagerId};
    use proptest::prelude::*;

    fn queue() -> PlanQueue<&'static str> {
        PlanQueue::new(0.0).unwrap()
    }

    fn drain<T>(queue: &mut PlanQueue<T>) -> Vec<T> {
        let mut out = Vec::new();
        while let Some(plan) = queue.pop_next().unwrap() {
            out.push(plan.payload);
        }
        out
    }

    #[test]
    fn test_mixed_times_scenario() {
        let mut q = queue();
        q.schedule(3.0, Planner::Nucleus, false, false, "seq1").unwrap();
        q.schedule(1.0, Planner::Nucleus, false, false, "seq2").unwrap();
        q.schedule(1.0, Planner::Nucleus, false, false, "seq3").unwrap();
        q.schedule(2.0, Planner::Nucleus, false, false, "seq4").unwrap();

        let mut order = Vec::new();
        while let Some(plan) = q.pop_next().unwrap() {
            assert_eq!(q.now(), plan.time);
            order.push((plan.time, plan.payload));
        }
        assert_eq!(
            order,
            vec![(1.0, "seq2"), (1.0, "seq3"), (2.0, "seq4"), (3.0, "seq1")]
        );
    }

    #[test]
    fn test_schedule_in_past_fails() {
        let mut q = queue();
        q.schedule(5.0, Planner::Nucleus, false, false, "later").unwrap();
        q.pop_next().unwrap().unwrap();
        assert_eq!(q.now(), 5.0);

        let err = q
            .schedule(4.0, Planner::Nucleus, false, false, "past")
            .unwrap_err();
        assert!(matches!(err, NucleusError::InvalidPlanTime { .. }));
        // Same time as the clock is fine
        q.schedule(5.0, Planner::Nucleus, false, false, "now").unwrap();
    }

    #[test]
    fn test_clock_refusal_keeps_plan_queued() {
        let mut q = queue();
        let a = q.schedule(1.0, Planner::Nucleus, false, false, "a").unwrap();
        q.advance_to(3.0).unwrap();

        let err = q.pop_next().unwrap_err();
        assert!(matches!(err, NucleusError::InvalidPlanTime { .. }));
        assert!(q.contains(a));
        assert_eq!(q.len(), 1);
        assert_eq!(q.active_len(), 1);
        assert_eq!(q.now(), 3.0);
    }

    #[test]
    fn test_owner_of_pending_plan() {
        let mut q = queue();
        let actor = Planner::Actor(ActorId::from_index(3));
        let a = q.schedule(1.0, actor, false, false, "a").unwrap();
        assert_eq!(q.owner(a), Some(actor));
        q.cancel(a);
        assert_eq!(q.owner(a), None);
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let mut q = queue();
        let a = q.schedule(1.0, Planner::Nucleus, false, false, "a").unwrap();
        q.schedule(2.0, Planner::Nucleus, false, false, "b").unwrap();

        assert!(q.contains(a));
        assert!(q.cancel(a));
        assert!(!q.cancel(a));
        assert!(!q.contains(a));
        assert_eq!(q.len(), 1);
        assert_eq!(drain(&mut q), vec!["b"]);
        assert!(!q.cancel(a));
    }

    #[test]
    fn test_cancel_after_execution_is_noop() {
        let mut q = queue();
        let a = q.schedule(1.0, Planner::Nucleus, false, false, "a").unwrap();
        assert_eq!(q.pop_next().unwrap().unwrap().id, a);
        assert!(!q.cancel(a));
    }

    #[test]
    fn test_planner_tie_break() {
        let actor = Planner::Actor(ActorId::from_index(0));
        let dm = Planner::DataManager(DataManagerId::from_index(0));
        let mut q = queue();
        q.schedule(1.0, actor, true, false, "actor").unwrap();
        q.schedule(1.0, dm, true, false, "data manager").unwrap();
        q.schedule(1.0, actor, false, false, "fifo").unwrap();

        assert_eq!(drain(&mut q), vec!["fifo", "data manager", "actor"]);
    }

    #[test]
    fn test_passive_plans_need_an_active_plan() {
        let mut q = queue();
        q.schedule(1.0, Planner::Nucleus, false, true, "passive early").unwrap();
        q.schedule(2.0, Planner::Nucleus, false, false, "active").unwrap();
        q.schedule(3.0, Planner::Nucleus, false, true, "passive late").unwrap();

        assert_eq!(q.active_len(), 1);
        assert_eq!(drain(&mut q), vec!["passive early", "active"]);
        assert_eq!(q.next_time(), None);
        assert_eq!(q.len(), 1);
        assert_eq!(q.pending_in_order()[0].payload, &"passive late");
    }

    #[test]
    fn test_cancel_owned_by() {
        let actor = Planner::Actor(ActorId::from_index(4));
        let mut q = queue();
        q.schedule(1.0, actor, false, false, "a1").unwrap();
        q.schedule(2.0, Planner::Nucleus, false, false, "n").unwrap();
        q.schedule(3.0, actor, false, false, "a2").unwrap();

        assert_eq!(q.cancel_owned_by(actor), 2);
        assert_eq!(q.cancel_owned_by(actor), 0);
        assert_eq!(drain(&mut q), vec!["n"]);
    }

    #[test]
    fn test_next_time_skips_cancelled_head() {
        let mut q = queue();
        let a = q.schedule(1.0, Planner::Nucleus, false, false, "a").unwrap();
        q.schedule(4.0, Planner::Nucleus, false, false, "b").unwrap();
        q.cancel(a);
        assert_eq!(q.next_time(), Some(4.0));
    }

    #[test]
    fn test_pending_in_order() {
        let mut q = queue();
        q.schedule(2.0, Planner::Nucleus, false, false, "x").unwrap();
        let y = q.schedule(1.0, Planner::Nucleus, false, false, "y").unwrap();
        q.schedule(1.0, Planner::Nucleus, false, false, "z").unwrap();
        q.cancel(y);

        let pending: Vec<&str> = q.pending_in_order().iter().map(|p| *p.payload).collect();
        assert_eq!(pending, vec!["z", "x"]);
    }

    proptest! {
        #[test]
        fn prop_drain_is_deterministic(times in prop::collection::vec(0u32..50, 0..64)) {
            let build = || {
                let mut q: PlanQueue<usize> = PlanQueue::new(0.0).unwrap();
                for (i, t) in times.iter().enumerate() {
                    q.schedule(*t as f64 * 0.5, Planner::Nucleus, false, false, i).unwrap();
                }
                q
            };
            let first = drain(&mut build());
            let second = drain(&mut build());
            prop_assert_eq!(first, second);
        }

        #[test]
        fn prop_dequeue_times_are_monotonic(times in prop::collection::vec(0u32..1000, 1..64)) {
            let mut q: PlanQueue<()> = PlanQueue::new(0.0).unwrap();
            for t in &times {
                q.schedule(*t as f64 / 10.0, Planner::Nucleus, false, false, ()).unwrap();
            }
            let mut last = 0.0;
            while let Some(plan) = q.pop_next().unwrap() {
                prop_assert!(plan.time >= last);
                last = plan.time;
            }
        }

        #[test]
        fn prop_same_time_is_fifo(n in 1usize..100) {
            let mut q: PlanQueue<usize> = PlanQueue::new(0.0).unwrap();
            for i in 0..n {
                q.schedule(7.0, Planner::Nucleus, false, false, i).unwrap();
            }
            prop_assert_eq!(drain(&mut q), (0..n).collect::<Vec<_>>());
        }

        #[test]
        fn prop_cancelled_plans_never_dispatch(
            times in prop::collection::vec(0u32..20, 1..40),
            cancel_mask in prop::collection::vec(any::<bool>(), 40),
        ) {
            let mut q: PlanQueue<usize> = PlanQueue::new(0.0).unwrap();
            let ids: Vec<PlanId> = times
                .iter()
                .enumerate()
                .map(|(i, t)| q.schedule(*t as f64, Planner::Nucleus, false, false, i).unwrap())
                .collect();
            for (i, id) in ids.iter().enumerate() {
                if cancel_mask[i] {
                    q.cancel(*id);
                    q.cancel(*id);
                }
            }
            let dispatched = drain(&mut q);
            for i in dispatched {
                prop_assert!(!cancel_mask[i]);
            }
        }
    }
}
