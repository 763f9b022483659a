//! Dispatch Selector: given available units and an automation policy,
//! choose zero or more missions to dispatch in one tick.
//!
//! Skips are silent by design: a mission whose units are busy or whose
//! cost would breach the minimum balance simply does not appear in the
//! selection. Only stale catalog references produce warnings.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use contracts::{MissionDef, PolicyDef, Profile, SelectionRule, UnitKind, UpgradeEffect};

use crate::catalog::Catalog;
use crate::outcome::{self, ProfileModifiers};

/// Ledger-derived view the selector gates voluntary dispatches on. The
/// balance is the projected balance at this point of the tick; recurring
/// costs are never gated.
#[derive(Debug, Clone, Copy)]
pub struct BalanceView {
    pub balance: i64,
    pub minimum_balance: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DispatchPlan {
    pub mission_id: String,
    pub vehicle_units: Vec<String>,
    pub staff_units: Vec<String>,
    /// Catalog staff type ids backing the assignment, for modifier
    /// gathering downstream.
    pub staff_type_ids: Vec<String>,
    pub upfront_cost: i64,
}

impl DispatchPlan {
    pub fn unit_ids(&self) -> Vec<String> {
        self.vehicle_units
            .iter()
            .chain(self.staff_units.iter())
            .cloned()
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct Selection {
    pub dispatches: Vec<DispatchPlan>,
    pub warnings: Vec<String>,
}

struct PoolUnit {
    unit_id: String,
    type_id: String,
    tag: String,
    taken: bool,
}

/// One selection pass. Units consumed by an earlier mission in the pass are
/// gone for later missions; each unit appears in at most one assignment.
pub fn select_dispatches(
    profile: &Profile,
    catalog: &Catalog,
    policy: &PolicyDef,
    balance: BalanceView,
    now: DateTime<Utc>,
) -> Selection {
    let mut selection = Selection::default();

    let mut vehicle_pool = build_pool(
        profile,
        UnitKind::Vehicle,
        catalog,
        now,
        &mut selection.warnings,
    );
    let mut staff_pool = build_pool(
        profile,
        UnitKind::Staff,
        catalog,
        now,
        &mut selection.warnings,
    );

    let candidates = candidate_missions(profile, catalog, policy, &mut selection.warnings);
    let ranked = rank_missions(candidates, policy.rule, catalog);

    let mut budget = dispatch_budget(profile, catalog, policy);
    let mut available_balance = balance.balance;

    for mission in ranked {
        if budget == Some(0) {
            break;
        }

        // Probe the pools without consuming; commitment happens only after
        // the funds gate passes.
        let Some(assignment) = probe_assignment(mission, &vehicle_pool, &staff_pool) else {
            continue;
        };

        let staff_type_ids: Vec<String> = assignment
            .staff_indices
            .iter()
            .map(|&i| staff_pool[i].type_id.clone())
            .collect();
        let modifiers = ProfileModifiers::gather(profile, mission, &staff_type_ids, catalog);
        let cost = outcome::dispatch_cost(mission, &modifiers);
        if cost > 0 && available_balance - cost < balance.minimum_balance {
            continue;
        }

        for &i in &assignment.vehicle_indices {
            vehicle_pool[i].taken = true;
        }
        for &i in &assignment.staff_indices {
            staff_pool[i].taken = true;
        }
        available_balance -= cost;
        if let Some(remaining) = budget.as_mut() {
            *remaining -= 1;
        }

        selection.dispatches.push(DispatchPlan {
            mission_id: mission.id.clone(),
            vehicle_units: assignment
                .vehicle_indices
                .iter()
                .map(|&i| vehicle_pool[i].unit_id.clone())
                .collect(),
            staff_units: assignment
                .staff_indices
                .iter()
                .map(|&i| staff_pool[i].unit_id.clone())
                .collect(),
            staff_type_ids,
            upfront_cost: cost,
        });
    }

    selection
}

/// Assignment for a single, explicitly chosen mission: the
/// manual-dispatch counterpart of a selection pass. None when the required
/// unit types cannot be covered by currently available units.
pub fn plan_mission(
    profile: &Profile,
    catalog: &Catalog,
    mission: &MissionDef,
    now: DateTime<Utc>,
) -> Option<DispatchPlan> {
    let mut warnings = Vec::new();
    let vehicle_pool = build_pool(profile, UnitKind::Vehicle, catalog, now, &mut warnings);
    let staff_pool = build_pool(profile, UnitKind::Staff, catalog, now, &mut warnings);
    let assignment = probe_assignment(mission, &vehicle_pool, &staff_pool)?;

    let staff_type_ids: Vec<String> = assignment
        .staff_indices
        .iter()
        .map(|&i| staff_pool[i].type_id.clone())
        .collect();
    let modifiers = ProfileModifiers::gather(profile, mission, &staff_type_ids, catalog);

    Some(DispatchPlan {
        mission_id: mission.id.clone(),
        vehicle_units: assignment
            .vehicle_indices
            .iter()
            .map(|&i| vehicle_pool[i].unit_id.clone())
            .collect(),
        staff_units: assignment
            .staff_indices
            .iter()
            .map(|&i| staff_pool[i].unit_id.clone())
            .collect(),
        staff_type_ids,
        upfront_cost: outcome::dispatch_cost(mission, &modifiers),
    })
}

fn build_pool(
    profile: &Profile,
    kind: UnitKind,
    catalog: &Catalog,
    now: DateTime<Utc>,
    warnings: &mut Vec<String>,
) -> Vec<PoolUnit> {
    let units = match kind {
        UnitKind::Vehicle => &profile.vehicles,
        UnitKind::Staff => &profile.staff,
    };

    let mut pool = Vec::new();
    for unit in units {
        if !unit.is_available(now) {
            continue;
        }
        let tag = match kind {
            UnitKind::Vehicle => catalog.vehicle_type(&unit.type_id).map(|t| t.tag.clone()),
            UnitKind::Staff => catalog.staff_type(&unit.type_id).map(|t| t.tag.clone()),
        };
        match tag {
            Some(tag) => pool.push(PoolUnit {
                unit_id: unit.unit_id.clone(),
                type_id: unit.type_id.clone(),
                tag,
                taken: false,
            }),
            None => warnings.push(format!(
                "unit {} references unknown {} type {}",
                unit.unit_id, kind, unit.type_id
            )),
        }
    }
    pool
}

fn candidate_missions<'a>(
    profile: &Profile,
    catalog: &'a Catalog,
    policy: &PolicyDef,
    warnings: &mut Vec<String>,
) -> Vec<&'a MissionDef> {
    catalog
        .missions_in_order()
        .filter(|mission| {
            if !profile.has_district(&mission.district) {
                return false;
            }
            if catalog.district(&mission.district).is_none() {
                warnings.push(format!(
                    "mission {} references unknown district {}",
                    mission.id, mission.district
                ));
                return false;
            }
            profile.station_level >= mission.min_station_level && policy.filters.matches(mission)
        })
        .collect()
}

/// Rank eligible missions by the policy rule. Stable sorts keep catalog
/// insertion order as the tie-break.
fn rank_missions<'a>(
    mut candidates: Vec<&'a MissionDef>,
    rule: SelectionRule,
    catalog: &Catalog,
) -> Vec<&'a MissionDef> {
    match rule {
        SelectionRule::HighestRewardFirst => {
            candidates.sort_by(|a, b| b.base_reward.cmp(&a.base_reward));
            candidates
        }
        SelectionRule::RoundRobinDistricts => {
            let mut buckets: Vec<VecDeque<&MissionDef>> = Vec::new();
            for district in catalog.districts_in_order() {
                let bucket: VecDeque<&MissionDef> = candidates
                    .iter()
                    .copied()
                    .filter(|mission| mission.district == district.id)
                    .collect();
                if !bucket.is_empty() {
                    buckets.push(bucket);
                }
            }

            let mut ranked = Vec::new();
            while buckets.iter().any(|bucket| !bucket.is_empty()) {
                for bucket in &mut buckets {
                    if let Some(mission) = bucket.pop_front() {
                        ranked.push(mission);
                    }
                }
            }
            ranked
        }
    }
}

/// None = unbounded. A policy cap is widened by DispatchCapacity upgrades.
fn dispatch_budget(profile: &Profile, catalog: &Catalog, policy: &PolicyDef) -> Option<u64> {
    let mut budget = policy.max_dispatches_per_tick.map(u64::from)?;
    for effect in catalog.upgrade_effects(profile) {
        if let UpgradeEffect::DispatchCapacity { slots } = effect {
            budget += u64::from(*slots);
        }
    }
    Some(budget)
}

struct Assignment {
    vehicle_indices: Vec<usize>,
    staff_indices: Vec<usize>,
}

/// Match every required tag to a distinct free unit, earliest-acquired
/// first. Returns None if any requirement cannot be met.
fn probe_assignment(
    mission: &MissionDef,
    vehicle_pool: &[PoolUnit],
    staff_pool: &[PoolUnit],
) -> Option<Assignment> {
    let vehicle_indices = match_tags(&mission.required_vehicle_tags, vehicle_pool)?;
    let staff_indices = match_tags(&mission.required_staff_tags, staff_pool)?;
    Some(Assignment {
        vehicle_indices,
        staff_indices,
    })
}

fn match_tags(required: &[String], pool: &[PoolUnit]) -> Option<Vec<usize>> {
    let mut chosen: Vec<usize> = Vec::with_capacity(required.len());
    for tag in required {
        let found = pool.iter().enumerate().position(|(i, unit)| {
            !unit.taken && unit.tag == *tag && !chosen.contains(&i)
        })?;
        chosen.push(found);
    }
    Some(chosen)
}
