//! Simulation time.

use crate::error::NucleusError;

/// Simulation time in model units. Non-negative and finite.
pub type SimulationTime = f64;

/// Rejects negative, NaN and infinite times.
pub fn validate_time(time: SimulationTime) -> Result<SimulationTime, NucleusError> {
    if time.is_finite() && time >= 0.0 {
        Ok(time)
    } else {
        Err(NucleusError::InvalidTime(time))
    }
}
