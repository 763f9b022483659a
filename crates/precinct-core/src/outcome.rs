//! Outcome Resolver: success probability combination and the resolved
//! outcome of a single dispatch.
//!
//! The resolver has no side effects: it returns the outcome and callers
//! apply the deltas. The combination weights (heat penalty slope,
//! reputation term, reward-per-level) come from catalog tuning, not from
//! constants compiled in here.

use contracts::{MissionDef, Profile, ResolutionTuning, UpgradeEffect};
use rand::Rng;

use crate::catalog::Catalog;

/// Modifier inputs gathered from the profile, the assigned staff, and the
/// owned upgrades for one dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileModifiers {
    pub heat: i64,
    pub reputation: i64,
    /// Additive percentage points from the staff types assigned.
    pub staff_quality_bonus: i64,
    /// Additive percentage points from SuccessBoost upgrades.
    pub upgrade_bonus: i64,
    /// District modifier subtracted from the chance (positive = harder).
    pub district_difficulty: i64,
    /// district reward multiplier x income boosts x station level scaling.
    pub reward_multiplier: f64,
    /// Product of (1 - fraction) over CostReduction upgrades.
    pub cost_multiplier: f64,
}

impl ProfileModifiers {
    pub fn gather(
        profile: &Profile,
        mission: &MissionDef,
        staff_type_ids: &[String],
        catalog: &Catalog,
    ) -> Self {
        let staff_quality_bonus = staff_type_ids
            .iter()
            .filter_map(|id| catalog.staff_type(id))
            .map(|staff| staff.quality_bonus)
            .sum();

        let mut upgrade_bonus = 0_i64;
        let mut income_multiplier = 1.0_f64;
        let mut cost_multiplier = 1.0_f64;
        for effect in catalog.upgrade_effects(profile) {
            match effect {
                UpgradeEffect::SuccessBoost { points } => upgrade_bonus += points,
                UpgradeEffect::IncomeBoost { fraction } => income_multiplier *= 1.0 + fraction,
                UpgradeEffect::CostReduction { fraction } => {
                    cost_multiplier *= (1.0 - fraction).max(0.0)
                }
                UpgradeEffect::Automation | UpgradeEffect::DispatchCapacity { .. } => {}
            }
        }

        let (district_difficulty, district_reward) = catalog
            .district(&mission.district)
            .map(|district| (district.difficulty_modifier, district.reward_multiplier))
            .unwrap_or((0, 1.0));

        let level_scaling = 1.0
            + f64::from(profile.station_level.saturating_sub(1))
                * catalog.tuning().reward_per_level;

        Self {
            heat: profile.heat,
            reputation: profile.reputation,
            staff_quality_bonus,
            upgrade_bonus,
            district_difficulty,
            reward_multiplier: district_reward * income_multiplier * level_scaling,
            cost_multiplier,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub success: bool,
    /// The probability the draw was compared against, 0-100.
    pub probability: i64,
    /// Credits earned; zero on failure.
    pub reward: i64,
    /// Fuel is spent whether or not the mission succeeds.
    pub fuel_spent: i64,
    pub reputation_delta: i64,
    pub heat_delta: i64,
}

impl Outcome {
    /// Apply this outcome's deltas and statistics to a profile, clamping
    /// bounded fields. The resolver itself never mutates anything.
    pub fn apply_to(&self, profile: &mut Profile) {
        profile.apply_reputation_delta(self.reputation_delta);
        profile.apply_heat_delta(self.heat_delta);
        profile.stats.expenses_paid += self.fuel_spent;
        if self.success {
            profile.stats.missions_completed += 1;
            profile.stats.income_earned += self.reward;
        } else {
            profile.stats.missions_failed += 1;
        }
    }
}

/// clamp(base + staff + upgrades - heat penalty - district difficulty +
/// reputation term), where the heat penalty grows monotonically with heat.
pub fn success_probability(
    mission: &MissionDef,
    modifiers: &ProfileModifiers,
    tuning: &ResolutionTuning,
) -> i64 {
    let heat_penalty = modifiers.heat as f64 * tuning.heat_penalty_per_point;
    let reputation_term = tuning.reputation_weight * (modifiers.reputation - 50) as f64 / 50.0;
    let raw = mission.base_success_chance as f64
        + modifiers.staff_quality_bonus as f64
        + modifiers.upgrade_bonus as f64
        - heat_penalty
        - modifiers.district_difficulty as f64
        + reputation_term;

    let floor = tuning.probability_floor.clamp(0, 100);
    let ceiling = tuning.probability_ceiling.clamp(floor, 100);
    (raw.round() as i64).clamp(floor, ceiling)
}

/// Upfront cost of one dispatch (fuel after cost-reduction upgrades).
/// Free missions stay free; anything with a fuel cost never drops below 1.
pub fn dispatch_cost(mission: &MissionDef, modifiers: &ProfileModifiers) -> i64 {
    if mission.fuel_cost <= 0 {
        return 0;
    }
    ((mission.fuel_cost as f64 * modifiers.cost_multiplier).round() as i64).max(1)
}

/// Resolve one dispatch with a single uniform draw in [0, 100); the draw
/// must be strictly below the probability to succeed, so 0 never succeeds
/// and 100 always does.
pub fn resolve(
    mission: &MissionDef,
    modifiers: &ProfileModifiers,
    tuning: &ResolutionTuning,
    rng: &mut impl Rng,
) -> Outcome {
    let probability = success_probability(mission, modifiers, tuning);
    let draw = i64::from(rng.gen_range(0..100_u32));
    let success = draw < probability;
    let fuel_spent = dispatch_cost(mission, modifiers);

    if success {
        let reward =
            ((mission.base_reward as f64 * modifiers.reward_multiplier).round() as i64).max(0);
        Outcome {
            success: true,
            probability,
            reward,
            fuel_spent,
            reputation_delta: mission.reputation_success,
            heat_delta: mission.heat_success,
        }
    } else {
        Outcome {
            success: false,
            probability,
            reward: 0,
            fuel_spent,
            reputation_delta: mission.reputation_failure,
            heat_delta: mission.heat_failure,
        }
    }
}
