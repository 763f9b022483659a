//! Immutable content catalog snapshot.
//!
//! Lookups are pure; insertion order is preserved for missions and
//! districts because ranking ties and round-robin cycling break on it.
//! A snapshot never changes after loading; reloads build a fresh catalog
//! and swap the shared handle, so in-flight operations keep the snapshot
//! they started with.

use std::collections::BTreeMap;

use contracts::{
    DistrictDef, MissionDef, PolicyDef, Profile, ResolutionTuning, StaffTypeDef, UpgradeDef,
    UpgradeEffect, VehicleTypeDef,
};

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    missions: BTreeMap<String, MissionDef>,
    mission_order: Vec<String>,
    vehicle_types: BTreeMap<String, VehicleTypeDef>,
    staff_types: BTreeMap<String, StaffTypeDef>,
    districts: BTreeMap<String, DistrictDef>,
    district_order: Vec<String>,
    upgrades: BTreeMap<String, UpgradeDef>,
    policies: BTreeMap<String, PolicyDef>,
    tuning: ResolutionTuning,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_mission(&mut self, def: MissionDef) {
        if !self.missions.contains_key(&def.id) {
            self.mission_order.push(def.id.clone());
        }
        self.missions.insert(def.id.clone(), def);
    }

    pub fn insert_vehicle_type(&mut self, def: VehicleTypeDef) {
        self.vehicle_types.insert(def.id.clone(), def);
    }

    pub fn insert_staff_type(&mut self, def: StaffTypeDef) {
        self.staff_types.insert(def.id.clone(), def);
    }

    pub fn insert_district(&mut self, def: DistrictDef) {
        if !self.districts.contains_key(&def.id) {
            self.district_order.push(def.id.clone());
        }
        self.districts.insert(def.id.clone(), def);
    }

    pub fn insert_upgrade(&mut self, def: UpgradeDef) {
        self.upgrades.insert(def.id.clone(), def);
    }

    pub fn insert_policy(&mut self, def: PolicyDef) {
        self.policies.insert(def.id.clone(), def);
    }

    pub fn set_tuning(&mut self, tuning: ResolutionTuning) {
        self.tuning = tuning;
    }

    pub fn mission(&self, id: &str) -> Option<&MissionDef> {
        self.missions.get(id)
    }

    pub fn vehicle_type(&self, id: &str) -> Option<&VehicleTypeDef> {
        self.vehicle_types.get(id)
    }

    pub fn staff_type(&self, id: &str) -> Option<&StaffTypeDef> {
        self.staff_types.get(id)
    }

    pub fn district(&self, id: &str) -> Option<&DistrictDef> {
        self.districts.get(id)
    }

    pub fn upgrade(&self, id: &str) -> Option<&UpgradeDef> {
        self.upgrades.get(id)
    }

    pub fn policy(&self, id: &str) -> Option<&PolicyDef> {
        self.policies.get(id)
    }

    pub fn tuning(&self) -> &ResolutionTuning {
        &self.tuning
    }

    /// Missions in pack insertion order, the deterministic tie-break for
    /// selection ranking.
    pub fn missions_in_order(&self) -> impl Iterator<Item = &MissionDef> {
        self.mission_order
            .iter()
            .filter_map(|id| self.missions.get(id))
    }

    pub fn districts_in_order(&self) -> impl Iterator<Item = &DistrictDef> {
        self.district_order
            .iter()
            .filter_map(|id| self.districts.get(id))
    }

    pub fn vehicle_types(&self) -> impl Iterator<Item = &VehicleTypeDef> {
        self.vehicle_types.values()
    }

    pub fn staff_types(&self) -> impl Iterator<Item = &StaffTypeDef> {
        self.staff_types.values()
    }

    pub fn upgrades(&self) -> impl Iterator<Item = &UpgradeDef> {
        self.upgrades.values()
    }

    pub fn policies(&self) -> impl Iterator<Item = &PolicyDef> {
        self.policies.values()
    }

    pub fn mission_count(&self) -> usize {
        self.missions.len()
    }

    pub fn district_count(&self) -> usize {
        self.districts.len()
    }

    /// Effects of the upgrades a profile owns. Upgrade ids that no longer
    /// resolve are skipped; stale content references are a skip condition,
    /// not a failure.
    pub fn upgrade_effects<'a>(
        &'a self,
        profile: &'a Profile,
    ) -> impl Iterator<Item = &'a UpgradeEffect> {
        profile
            .owned_upgrades
            .iter()
            .filter_map(|id| self.upgrades.get(id))
            .map(|upgrade| &upgrade.effect)
    }

    /// Referential integrity issues, reported as warnings by the loader.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();

        for mission in self.missions_in_order() {
            if !self.districts.contains_key(&mission.district) {
                issues.push(format!(
                    "mission {} references unknown district {}",
                    mission.id, mission.district
                ));
            }
            for tag in &mission.required_vehicle_tags {
                if !self.vehicle_types.values().any(|v| &v.tag == tag) {
                    issues.push(format!(
                        "mission {} requires vehicle tag {} no type provides",
                        mission.id, tag
                    ));
                }
            }
            for tag in &mission.required_staff_tags {
                if !self.staff_types.values().any(|s| &s.tag == tag) {
                    issues.push(format!(
                        "mission {} requires staff tag {} no type provides",
                        mission.id, tag
                    ));
                }
            }
        }

        for upgrade in self.upgrades.values() {
            if let Some(required) = &upgrade.requires {
                if !self.upgrades.contains_key(required) {
                    issues.push(format!(
                        "upgrade {} requires unknown upgrade {}",
                        upgrade.id, required
                    ));
                }
            }
        }

        for policy in self.policies.values() {
            if let Some(districts) = &policy.filters.districts {
                for district in districts {
                    if !self.districts.contains_key(district) {
                        issues.push(format!(
                            "policy {} filters on unknown district {}",
                            policy.id, district
                        ));
                    }
                }
            }
        }

        issues
    }
}
