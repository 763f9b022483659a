//! v1 cross-boundary contracts for the precinct engine, API, and persistence.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub mod serde_u64_string;

pub const SCHEMA_VERSION_V1: &str = "1.0";

/// Stable player identity. Credits for a profile live in the external
/// ledger and are referenced by this id only.
pub type ProfileId = u64;

pub const REPUTATION_MIN: i64 = 0;
pub const REPUTATION_MAX: i64 = 100;
pub const HEAT_MIN: i64 = 0;
pub const HEAT_MAX: i64 = 100;

// ---------------------------------------------------------------------------
// Engine configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    pub schema_version: String,
    /// Simulated interval length. One tick of automation and recurring
    /// costs per interval.
    pub tick_interval_minutes: u32,
    /// Upper bound on how much wall-clock absence a single catch-up run
    /// converts into ticks. Time beyond the cap is forfeited.
    pub max_catch_up_hours: u32,
    /// Credits granted once when a profile is first created.
    pub starting_credits: i64,
    /// Fraction of the purchase price refunded on sale/dismissal.
    pub resale_factor: f64,
    #[serde(with = "serde_u64_string")]
    pub seed: u64,
}

impl EngineConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::minutes(i64::from(self.tick_interval_minutes.max(1)))
    }

    pub fn max_catch_up(&self) -> Duration {
        Duration::hours(i64::from(self.max_catch_up_hours))
    }

    /// floor(max_catch_up_hours * 60 / tick_interval_minutes)
    pub fn max_catch_up_ticks(&self) -> u64 {
        let interval = u64::from(self.tick_interval_minutes.max(1));
        u64::from(self.max_catch_up_hours) * 60 / interval
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            tick_interval_minutes: 5,
            max_catch_up_hours: 24,
            starting_credits: 500,
            resale_factor: 0.5,
            seed: 1337,
        }
    }
}

// ---------------------------------------------------------------------------
// Catalog definitions (immutable per snapshot)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MissionDef {
    pub id: String,
    pub name: String,
    pub district: String,
    /// Vehicle type tags required, with multiplicity (one entry per unit).
    #[serde(default)]
    pub required_vehicle_tags: Vec<String>,
    /// Staff type tags required, with multiplicity.
    #[serde(default)]
    pub required_staff_tags: Vec<String>,
    pub base_reward: i64,
    pub base_duration_minutes: u32,
    /// 0-100 before modifiers.
    pub base_success_chance: i64,
    #[serde(default)]
    pub fuel_cost: i64,
    #[serde(default)]
    pub heat_success: i64,
    #[serde(default)]
    pub heat_failure: i64,
    #[serde(default)]
    pub reputation_success: i64,
    #[serde(default)]
    pub reputation_failure: i64,
    #[serde(default = "default_min_station_level")]
    pub min_station_level: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VehicleTypeDef {
    pub id: String,
    pub name: String,
    /// Tag matched against mission vehicle requirements.
    pub tag: String,
    pub purchase_cost: i64,
    #[serde(default)]
    pub maintenance_per_tick: i64,
    /// Scales mission duration into this type's cooldown.
    #[serde(default = "default_cooldown_multiplier")]
    pub cooldown_multiplier: f64,
    #[serde(default = "default_min_station_level")]
    pub min_station_level: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StaffTypeDef {
    pub id: String,
    pub name: String,
    /// Tag matched against mission staff requirements.
    pub tag: String,
    pub hire_cost: i64,
    #[serde(default)]
    pub salary_per_tick: i64,
    /// Additive percentage points toward mission success.
    #[serde(default)]
    pub quality_bonus: i64,
    #[serde(default = "default_cooldown_multiplier")]
    pub cooldown_multiplier: f64,
    #[serde(default = "default_min_station_level")]
    pub min_station_level: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DistrictDef {
    pub id: String,
    pub name: String,
    pub unlock_cost: i64,
    #[serde(default = "default_multiplier")]
    pub reward_multiplier: f64,
    /// Added against the base success chance (positive = harder).
    #[serde(default)]
    pub difficulty_modifier: i64,
    #[serde(default = "default_min_station_level")]
    pub min_station_level: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UpgradeEffect {
    /// Unlocks the automation toggle.
    Automation,
    /// Additive percentage points toward mission success.
    SuccessBoost { points: i64 },
    /// Multiplies mission rewards by (1 + fraction).
    IncomeBoost { fraction: f64 },
    /// Multiplies upfront dispatch costs by (1 - fraction).
    CostReduction { fraction: f64 },
    /// Raises the automation dispatch budget when a policy caps it.
    DispatchCapacity { slots: u32 },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpgradeDef {
    pub id: String,
    pub name: String,
    pub cost: i64,
    pub effect: UpgradeEffect,
    #[serde(default = "default_min_station_level")]
    pub min_station_level: u32,
    /// Upgrade that must already be owned.
    #[serde(default)]
    pub requires: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SelectionRule {
    /// Rank eligible missions by base reward, descending.
    HighestRewardFirst,
    /// Cycle districts in catalog order, taking one mission per district
    /// per round.
    RoundRobinDistricts,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MissionFilters {
    #[serde(default)]
    pub min_reward: Option<i64>,
    #[serde(default)]
    pub max_reward: Option<i64>,
    #[serde(default)]
    pub districts: Option<Vec<String>>,
}

impl MissionFilters {
    pub fn matches(&self, mission: &MissionDef) -> bool {
        if let Some(min) = self.min_reward {
            if mission.base_reward < min {
                return false;
            }
        }
        if let Some(max) = self.max_reward {
            if mission.base_reward > max {
                return false;
            }
        }
        if let Some(districts) = &self.districts {
            if !districts.iter().any(|d| d == &mission.district) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PolicyDef {
    pub id: String,
    pub name: String,
    pub rule: SelectionRule,
    #[serde(default)]
    pub filters: MissionFilters,
    /// Absent means the selector dispatches until units or funds run out.
    #[serde(default)]
    pub max_dispatches_per_tick: Option<u32>,
}

/// Content-configured combination parameters for the outcome resolver.
/// The probability formula is a policy point of content data, not a
/// compiled-in constant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResolutionTuning {
    /// Percentage points of success chance lost per point of heat.
    pub heat_penalty_per_point: f64,
    /// Scales the (reputation - 50) / 50 term, in percentage points.
    pub reputation_weight: f64,
    /// Extra reward fraction per station level above 1.
    pub reward_per_level: f64,
    pub probability_floor: i64,
    pub probability_ceiling: i64,
}

impl Default for ResolutionTuning {
    fn default() -> Self {
        Self {
            heat_penalty_per_point: 0.25,
            reputation_weight: 10.0,
            reward_per_level: 0.015,
            probability_floor: 0,
            probability_ceiling: 100,
        }
    }
}

fn default_min_station_level() -> u32 {
    1
}

fn default_cooldown_multiplier() -> f64 {
    1.0
}

fn default_multiplier() -> f64 {
    1.0
}

// ---------------------------------------------------------------------------
// Profile state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Vehicle,
    Staff,
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vehicle => write!(f, "vehicle"),
            Self::Staff => write!(f, "staff"),
        }
    }
}

/// One owned vehicle or staff member. Available when `available_at` is
/// absent or in the past; otherwise committed to a mission until then.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnitInstance {
    pub unit_id: String,
    pub type_id: String,
    pub kind: UnitKind,
    #[serde(default)]
    pub available_at: Option<DateTime<Utc>>,
}

impl UnitInstance {
    pub fn is_available(&self, now: DateTime<Utc>) -> bool {
        match self.available_at {
            None => true,
            Some(at) => at <= now,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProfileStats {
    pub missions_completed: u64,
    pub missions_failed: u64,
    pub income_earned: i64,
    pub expenses_paid: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Profile {
    pub schema_version: String,
    #[serde(with = "serde_u64_string")]
    pub profile_id: ProfileId,
    pub station_name: String,
    pub station_level: u32,
    pub home_district: String,
    pub unlocked_districts: Vec<String>,
    pub vehicles: Vec<UnitInstance>,
    pub staff: Vec<UnitInstance>,
    pub owned_upgrades: Vec<String>,
    /// 0-100, starts at 50.
    pub reputation: i64,
    /// 0-100, starts at 0.
    pub heat: i64,
    pub automation_enabled: bool,
    #[serde(default)]
    pub automation_policy: Option<String>,
    /// Monotonically non-decreasing; None until the first tick run
    /// initializes it.
    #[serde(default)]
    pub last_tick_at: Option<DateTime<Utc>>,
    pub next_unit_sequence: u64,
    #[serde(default)]
    pub stats: ProfileStats,
}

impl Profile {
    pub fn new(profile_id: ProfileId, home_district: impl Into<String>) -> Self {
        let home_district = home_district.into();
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            profile_id,
            station_name: "Metro Precinct".to_string(),
            station_level: 1,
            unlocked_districts: vec![home_district.clone()],
            home_district,
            vehicles: Vec::new(),
            staff: Vec::new(),
            owned_upgrades: Vec::new(),
            reputation: 50,
            heat: 0,
            automation_enabled: false,
            automation_policy: None,
            last_tick_at: None,
            next_unit_sequence: 1,
            stats: ProfileStats::default(),
        }
    }

    pub fn has_upgrade(&self, upgrade_id: &str) -> bool {
        self.owned_upgrades.iter().any(|id| id == upgrade_id)
    }

    pub fn has_district(&self, district_id: &str) -> bool {
        self.unlocked_districts.iter().any(|id| id == district_id)
    }

    /// Clamped to [0, 100] after every application.
    pub fn apply_reputation_delta(&mut self, delta: i64) {
        self.reputation = (self.reputation + delta).clamp(REPUTATION_MIN, REPUTATION_MAX);
    }

    /// Clamped to [0, 100] after every application.
    pub fn apply_heat_delta(&mut self, delta: i64) {
        self.heat = (self.heat + delta).clamp(HEAT_MIN, HEAT_MAX);
    }

    pub fn mint_unit_id(&mut self, kind: UnitKind) -> String {
        let sequence = self.next_unit_sequence;
        self.next_unit_sequence = self.next_unit_sequence.saturating_add(1);
        match kind {
            UnitKind::Vehicle => format!("veh-{sequence:04}"),
            UnitKind::Staff => format!("stf-{sequence:04}"),
        }
    }

    pub fn units(&self) -> impl Iterator<Item = &UnitInstance> {
        self.vehicles.iter().chain(self.staff.iter())
    }

    pub fn unit(&self, unit_id: &str) -> Option<&UnitInstance> {
        self.units().find(|unit| unit.unit_id == unit_id)
    }

    pub fn unit_mut(&mut self, unit_id: &str) -> Option<&mut UnitInstance> {
        self.vehicles
            .iter_mut()
            .chain(self.staff.iter_mut())
            .find(|unit| unit.unit_id == unit_id)
    }
}

// ---------------------------------------------------------------------------
// Engine outputs
// ---------------------------------------------------------------------------

/// One resolved dispatch. Ephemeral: produced per tick run or manual
/// dispatch and returned to the caller, never required to persist.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutcomeRecord {
    pub mission_id: String,
    /// 1-based index within the catch-up run; 0 for manual dispatches.
    pub tick_index: u64,
    pub success: bool,
    /// The probability the draw was compared against, 0-100.
    pub probability: i64,
    pub reward: i64,
    pub fuel_spent: i64,
    pub reputation_delta: i64,
    pub heat_delta: i64,
    pub unit_ids: Vec<String>,
    pub resolved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceSnapshot {
    pub balance: i64,
    pub reputation: i64,
    pub heat: i64,
    pub available_vehicles: usize,
    pub total_vehicles: usize,
    pub available_staff: usize,
    pub total_staff: usize,
}

impl ResourceSnapshot {
    pub fn capture(profile: &Profile, balance: i64, now: DateTime<Utc>) -> Self {
        Self {
            balance,
            reputation: profile.reputation,
            heat: profile.heat,
            available_vehicles: profile
                .vehicles
                .iter()
                .filter(|unit| unit.is_available(now))
                .count(),
            total_vehicles: profile.vehicles.len(),
            available_staff: profile
                .staff
                .iter()
                .filter(|unit| unit.is_available(now))
                .count(),
            total_staff: profile.staff.len(),
        }
    }
}

/// Report for one catch-up invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TickReport {
    #[serde(with = "serde_u64_string")]
    pub profile_id: ProfileId,
    pub ticks_processed: u64,
    /// True when the catch-up cap truncated the elapsed window.
    pub capped: bool,
    pub outcomes: Vec<OutcomeRecord>,
    pub upkeep_paid: i64,
    pub net_ledger_change: i64,
    pub snapshot: ResourceSnapshot,
}

impl TickReport {
    pub fn empty(profile_id: ProfileId, snapshot: ResourceSnapshot) -> Self {
        Self {
            profile_id,
            ticks_processed: 0,
            capped: false,
            outcomes: Vec::new(),
            upkeep_paid: 0,
            net_ledger_change: 0,
            snapshot,
        }
    }
}

impl fmt::Display for TickReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "profile={} ticks={} dispatches={} upkeep={} net={} balance={}",
            self.profile_id,
            self.ticks_processed,
            self.outcomes.len(),
            self.upkeep_paid,
            self.net_ledger_change,
            self.snapshot.balance
        )
    }
}

/// Read-only view served to the presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProfileReport {
    pub profile: Profile,
    pub snapshot: ResourceSnapshot,
}

// ---------------------------------------------------------------------------
// API error envelope
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    ProfileNotFound,
    UnknownId,
    InvalidCommand,
    InsufficientFunds,
    InvalidState,
    CollaboratorFailure,
    InternalError,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default)]
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reputation_and_heat_stay_clamped() {
        let mut profile = Profile::new(1, "downtown");
        profile.apply_reputation_delta(500);
        assert_eq!(profile.reputation, 100);
        profile.apply_reputation_delta(-500);
        assert_eq!(profile.reputation, 0);
        profile.apply_heat_delta(-10);
        assert_eq!(profile.heat, 0);
        profile.apply_heat_delta(250);
        assert_eq!(profile.heat, 100);
    }

    #[test]
    fn max_catch_up_ticks_matches_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_catch_up_ticks(), 288);
    }

    #[test]
    fn unit_ids_are_unique_and_kinded() {
        let mut profile = Profile::new(1, "downtown");
        let first = profile.mint_unit_id(UnitKind::Vehicle);
        let second = profile.mint_unit_id(UnitKind::Staff);
        assert_eq!(first, "veh-0001");
        assert_eq!(second, "stf-0002");
        assert_ne!(first, second);
    }

    #[test]
    fn profile_round_trips_through_json() {
        let mut profile = Profile::new(42, "harbor");
        let vehicle_unit_id = profile.mint_unit_id(UnitKind::Vehicle);
        profile.vehicles.push(UnitInstance {
            unit_id: vehicle_unit_id,
            type_id: "patrol_car".to_string(),
            kind: UnitKind::Vehicle,
            available_at: None,
        });
        let raw = serde_json::to_string(&profile).expect("serialize");
        let decoded: Profile = serde_json::from_str(&raw).expect("deserialize");
        assert_eq!(profile, decoded);
    }

    #[test]
    fn mission_filters_respect_bounds_and_districts() {
        let mission = MissionDef {
            id: "m1".to_string(),
            name: "Noise Complaint".to_string(),
            district: "downtown".to_string(),
            required_vehicle_tags: vec!["patrol".to_string()],
            required_staff_tags: vec!["officer".to_string()],
            base_reward: 120,
            base_duration_minutes: 10,
            base_success_chance: 80,
            fuel_cost: 5,
            heat_success: 0,
            heat_failure: 2,
            reputation_success: 1,
            reputation_failure: -1,
            min_station_level: 1,
        };

        let mut filters = MissionFilters::default();
        assert!(filters.matches(&mission));
        filters.min_reward = Some(200);
        assert!(!filters.matches(&mission));
        filters.min_reward = None;
        filters.districts = Some(vec!["harbor".to_string()]);
        assert!(!filters.matches(&mission));
    }
}
