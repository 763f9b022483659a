//! Cooldown Tracker: per-unit availability bookkeeping.
//!
//! A unit is available when its stored `available_at` is absent or at/past
//! `now`. Reserving an unavailable unit is an invariant violation; callers
//! check availability immediately before reserving, under the profile lock.

use chrono::{DateTime, Duration, Utc};
use contracts::{MissionDef, UnitInstance};

use crate::EngineError;

pub fn is_available(unit: &UnitInstance, now: DateTime<Utc>) -> bool {
    unit.is_available(now)
}

/// Mission-specific cooldown: the mission's base duration scaled by the
/// unit type's multiplier, never below one minute.
pub fn mission_cooldown(mission: &MissionDef, cooldown_multiplier: f64) -> Duration {
    let minutes = f64::from(mission.base_duration_minutes) * cooldown_multiplier.max(0.0);
    let seconds = (minutes * 60.0).round().max(60.0) as i64;
    Duration::seconds(seconds)
}

/// Commit a unit to a mission window. Returns the timestamp at which the
/// unit becomes available again.
pub fn reserve(
    unit: &mut UnitInstance,
    now: DateTime<Utc>,
    duration: Duration,
) -> Result<DateTime<Utc>, EngineError> {
    if duration < Duration::zero() {
        return Err(EngineError::InvalidState(format!(
            "negative cooldown for unit {}",
            unit.unit_id
        )));
    }
    if !unit.is_available(now) {
        return Err(EngineError::InvalidState(format!(
            "unit {} is already reserved",
            unit.unit_id
        )));
    }

    let available_at = now + duration;
    unit.available_at = Some(available_at);
    Ok(available_at)
}

/// Manual early-clear. Admin operations only; normal expiry is implicit in
/// `is_available`.
pub fn release(unit: &mut UnitInstance) {
    unit.available_at = None;
}
