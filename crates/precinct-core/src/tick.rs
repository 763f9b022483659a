//! Tick arithmetic: converting elapsed wall-clock time into a bounded
//! catch-up window, and applying one simulated tick to a profile.
//!
//! Tick timestamps are anchored at the profile's previous last-processed
//! mark, so re-running an interrupted window reproduces the same simulated
//! clock, the same RNG streams, and the same ledger idempotency keys no
//! matter when the retry happens.

use chrono::{DateTime, Duration, Utc};
use contracts::{EngineConfig, MissionDef, OutcomeRecord, Profile, ProfileId, UnitKind};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::catalog::Catalog;
use crate::cooldown;
use crate::outcome::{self, ProfileModifiers};
use crate::selector::{select_dispatches, BalanceView};
use crate::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatchUpWindow {
    /// Whole intervals to process; already capped.
    pub ticks: u64,
    /// True when the cap truncated the elapsed window.
    pub capped: bool,
    /// The previous last-processed mark; tick i lands at
    /// `run_started + i * interval`.
    pub run_started: DateTime<Utc>,
    /// The last-processed mark to persist after the run. Leaves the
    /// sub-interval remainder pending; on capped runs this lands within one
    /// interval of `now`, forfeiting time beyond the cap.
    pub next_mark: DateTime<Utc>,
    pub interval: Duration,
}

impl CatchUpWindow {
    /// Simulated clock for tick `index` (1-based).
    pub fn tick_timestamp(&self, index: u64) -> DateTime<Utc> {
        self.run_started + self.interval * index as i32
    }
}

/// elapsed_ticks = floor((now - last) / interval), capped at
/// floor(max_catch_up / interval). Clock skew (now before last) yields an
/// empty window; the last-processed mark never moves backwards.
pub fn catch_up_window(
    last: DateTime<Utc>,
    now: DateTime<Utc>,
    config: &EngineConfig,
) -> CatchUpWindow {
    let interval = config.tick_interval();
    let interval_secs = interval.num_seconds();
    let elapsed_secs = (now - last).num_seconds();

    if elapsed_secs < interval_secs {
        return CatchUpWindow {
            ticks: 0,
            capped: false,
            run_started: last,
            next_mark: last,
            interval,
        };
    }

    let raw_ticks = (elapsed_secs / interval_secs) as u64;
    let cap = config.max_catch_up_ticks();
    CatchUpWindow {
        ticks: raw_ticks.min(cap),
        capped: raw_ticks > cap,
        run_started: last,
        next_mark: now - Duration::seconds(elapsed_secs % interval_secs),
        interval,
    }
}

fn mix_seed(seed: u64, salt: u64) -> u64 {
    let mut value = seed ^ salt.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    value ^= value.rotate_left(23);
    value = value.wrapping_mul(0xBF58_476D_1CE4_E5B9);
    value ^ (value >> 29)
}

/// Deterministic per-tick seed: one independent stream per (engine seed,
/// profile, simulated timestamp) triple.
pub fn tick_seed(seed: u64, profile_id: ProfileId, at: DateTime<Utc>) -> u64 {
    mix_seed(mix_seed(seed, profile_id), at.timestamp() as u64)
}

pub fn tick_rng(seed: u64, profile_id: ProfileId, at: DateTime<Utc>) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(tick_seed(seed, profile_id, at))
}

/// Stream for manual dispatches, independent of the automation stream at
/// the same timestamp.
pub fn manual_rng(seed: u64, profile_id: ProfileId, at: DateTime<Utc>) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(mix_seed(tick_seed(seed, profile_id, at), 0x4D41_4E55))
}

#[derive(Debug, Clone, Default)]
pub struct RecurringCosts {
    pub total: i64,
    pub warnings: Vec<String>,
}

/// Staff salaries plus vehicle maintenance for one tick. Paid whether or
/// not the unit is on cooldown, and never gated on balance.
pub fn recurring_costs(profile: &Profile, catalog: &Catalog) -> RecurringCosts {
    let mut costs = RecurringCosts::default();
    for unit in &profile.vehicles {
        match catalog.vehicle_type(&unit.type_id) {
            Some(vehicle) => costs.total += vehicle.maintenance_per_tick,
            None => costs.warnings.push(format!(
                "unit {} references unknown vehicle type {}",
                unit.unit_id, unit.type_id
            )),
        }
    }
    for unit in &profile.staff {
        match catalog.staff_type(&unit.type_id) {
            Some(staff) => costs.total += staff.salary_per_tick,
            None => costs.warnings.push(format!(
                "unit {} references unknown staff type {}",
                unit.unit_id, unit.type_id
            )),
        }
    }
    costs
}

/// Result of applying one tick in memory. `net_change` is the signed ledger
/// delta the tick produced (rewards minus fuel minus upkeep).
#[derive(Debug, Clone, Default)]
pub struct TickStep {
    pub outcomes: Vec<OutcomeRecord>,
    pub upkeep: i64,
    pub net_change: i64,
    pub warnings: Vec<String>,
}

/// Apply one simulated tick: recurring costs unconditionally, then, if
/// automation is enabled, one selection pass resolved dispatch by
/// dispatch. `ledger_balance` is the projected balance entering the tick.
pub fn apply_tick(
    profile: &mut Profile,
    catalog: &Catalog,
    minimum_balance: i64,
    ledger_balance: i64,
    at: DateTime<Utc>,
    tick_index: u64,
    rng: &mut impl Rng,
) -> Result<TickStep, EngineError> {
    let costs = recurring_costs(profile, catalog);
    let upkeep = costs.total;
    let mut step = TickStep {
        outcomes: Vec::new(),
        upkeep,
        net_change: -upkeep,
        warnings: costs.warnings,
    };
    profile.stats.expenses_paid += upkeep;

    if !profile.automation_enabled {
        return Ok(step);
    }

    let policy = match profile.automation_policy.as_deref() {
        Some(policy_id) => match catalog.policy(policy_id) {
            Some(policy) => policy.clone(),
            None => {
                step.warnings
                    .push(format!("automation policy {policy_id} missing from catalog"));
                return Ok(step);
            }
        },
        None => {
            step.warnings
                .push("automation enabled without a policy".to_string());
            return Ok(step);
        }
    };

    let balance = BalanceView {
        balance: ledger_balance - upkeep,
        minimum_balance,
    };
    let selection = select_dispatches(profile, catalog, &policy, balance, at);
    step.warnings.extend(selection.warnings);

    for plan in selection.dispatches {
        let Some(mission) = catalog.mission(&plan.mission_id).cloned() else {
            step.warnings
                .push(format!("mission {} vanished mid-pass", plan.mission_id));
            continue;
        };

        reserve_plan_units(profile, catalog, &mission, &plan.unit_ids(), at)?;

        let modifiers = ProfileModifiers::gather(profile, &mission, &plan.staff_type_ids, catalog);
        let outcome = outcome::resolve(&mission, &modifiers, catalog.tuning(), rng);
        outcome.apply_to(profile);
        step.net_change += outcome.reward - outcome.fuel_spent;

        step.outcomes.push(OutcomeRecord {
            mission_id: mission.id.clone(),
            tick_index,
            success: outcome.success,
            probability: outcome.probability,
            reward: outcome.reward,
            fuel_spent: outcome.fuel_spent,
            reputation_delta: outcome.reputation_delta,
            heat_delta: outcome.heat_delta,
            unit_ids: plan.unit_ids(),
            resolved_at: at,
        });
    }

    Ok(step)
}

/// Reserve every unit a plan names. The selector guarantees distinct,
/// available units; anything else here is an invariant violation.
pub fn reserve_plan_units(
    profile: &mut Profile,
    catalog: &Catalog,
    mission: &MissionDef,
    unit_ids: &[String],
    at: DateTime<Utc>,
) -> Result<(), EngineError> {
    for unit_id in unit_ids {
        let multiplier = profile
            .unit(unit_id)
            .and_then(|unit| match unit.kind {
                UnitKind::Vehicle => catalog
                    .vehicle_type(&unit.type_id)
                    .map(|t| t.cooldown_multiplier),
                UnitKind::Staff => catalog
                    .staff_type(&unit.type_id)
                    .map(|t| t.cooldown_multiplier),
            })
            .unwrap_or(1.0);
        let duration = cooldown::mission_cooldown(mission, multiplier);

        let unit = profile.unit_mut(unit_id).ok_or_else(|| {
            EngineError::InvalidState(format!("plan names unit {unit_id} the profile does not own"))
        })?;
        cooldown::reserve(unit, at, duration)?;
    }
    Ok(())
}
