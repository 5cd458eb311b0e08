//! The simulation clock.

use gcm_env::{validate_time, NucleusError, SimulationTime};

/// Current simulation time. Never moves backwards.
///
/// Owned by the plan queue; only dequeuing a plan or reaching a halt time
/// advances it.
#[derive(Debug, Clone)]
pub struct SimulationClock {
    now: SimulationTime,
}

impl SimulationClock {
    /// Creates a clock starting at `start`.
    pub fn new(start: SimulationTime) -> Result<Self, NucleusError> {
        Ok(Self {
            now: validate_time(start)?,
        })
    }

    /// Returns the current time.
    pub fn now(&self) -> SimulationTime {
        self.now
    }

    /// Checks that a plan may be scheduled at `time`.
    pub fn check_schedulable(&self, time: SimulationTime) -> Result<SimulationTime, NucleusError> {
        let time = validate_time(time)?;
        if time < self.now {
            return Err(NucleusError::InvalidPlanTime {
                requested: time,
                current: self.now,
            });
        }
        Ok(time)
    }

    /// Moves the clock forward to `time`.
    pub fn advance_to(&mut self, time: SimulationTime) -> Result<(), NucleusError> {
        self.now = self.check_schedulable(time)?;
        Ok(())
    }
}
