//! Content pack loading and the shared catalog handle.
//!
//! Packs are JSON files in one directory, merged per kind by filename
//! prefix (`missions_*.json`, `vehicles_*.json`, ...). A malformed entry is
//! skipped with a warning so one bad record cannot take down a reload.
//! Reload is atomic: the handle swaps an Arc, and in-flight operations keep
//! using the snapshot they started with.

use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use contracts::{
    DistrictDef, MissionDef, PolicyDef, ResolutionTuning, StaffTypeDef, UpgradeDef, VehicleTypeDef,
};
use precinct_core::Catalog;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Atomic-swap holder for the current catalog snapshot.
#[derive(Debug)]
pub struct CatalogHandle {
    current: RwLock<Arc<Catalog>>,
}

impl CatalogHandle {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            current: RwLock::new(Arc::new(catalog)),
        }
    }

    /// Clone the current snapshot reference. Callers keep this snapshot for
    /// the whole operation; a concurrent swap never shows them a partially
    /// updated catalog.
    pub fn snapshot(&self) -> Arc<Catalog> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn swap(&self, catalog: Catalog) {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *current = Arc::new(catalog);
    }
}

/// Load every pack in `dir` into a fresh catalog snapshot.
pub fn load_catalog(dir: &Path) -> Result<Catalog, ContentError> {
    let mut catalog = Catalog::new();

    // Districts first so later referential warnings are meaningful.
    load_pack::<DistrictDef>(dir, "districts_", "districts", |def| {
        catalog.insert_district(def)
    })?;
    load_pack::<VehicleTypeDef>(dir, "vehicles_", "vehicles", |def| {
        catalog.insert_vehicle_type(def)
    })?;
    load_pack::<StaffTypeDef>(dir, "staff_", "staff", |def| catalog.insert_staff_type(def))?;
    load_pack::<MissionDef>(dir, "missions_", "missions", |def| {
        catalog.insert_mission(def)
    })?;
    load_pack::<UpgradeDef>(dir, "upgrades_", "upgrades", |def| {
        catalog.insert_upgrade(def)
    })?;
    load_pack::<PolicyDef>(dir, "policies_", "policies", |def| {
        catalog.insert_policy(def)
    })?;

    let tuning_path = dir.join("tuning.json");
    if tuning_path.is_file() {
        let raw = std::fs::read_to_string(&tuning_path)?;
        match serde_json::from_str::<ResolutionTuning>(&raw) {
            Ok(tuning) => catalog.set_tuning(tuning),
            Err(err) => warn!("tuning.json ignored: {err}"),
        }
    }

    for issue in catalog.validate() {
        warn!("content issue: {issue}");
    }
    info!(
        missions = catalog.mission_count(),
        districts = catalog.district_count(),
        "content packs loaded"
    );

    Ok(catalog)
}

/// Read every `<prefix>*.json` file in lexical order and feed the entries
/// under `top_key` through `insert`, skipping malformed entries.
fn load_pack<T: DeserializeOwned>(
    dir: &Path,
    prefix: &str,
    top_key: &str,
    mut insert: impl FnMut(T),
) -> Result<(), ContentError> {
    let mut pack_files: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .map(|name| name.starts_with(prefix) && name.ends_with(".json"))
                .unwrap_or(false)
        })
        .collect();
    pack_files.sort();

    for path in pack_files {
        let raw = std::fs::read_to_string(&path)?;
        let document: Value = match serde_json::from_str(&raw) {
            Ok(document) => document,
            Err(err) => {
                warn!("pack {} skipped: {err}", path.display());
                continue;
            }
        };

        let Some(entries) = document.get(top_key).and_then(Value::as_array) else {
            warn!("pack {} has no {top_key} array", path.display());
            continue;
        };

        let mut loaded = 0_usize;
        for entry in entries {
            match serde_json::from_value::<T>(entry.clone()) {
                Ok(def) => {
                    insert(def);
                    loaded += 1;
                }
                Err(err) => warn!("entry in {} skipped: {err}", path.display()),
            }
        }
        info!("loaded {}: {loaded} {top_key}", path.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &Path, name: &str, contents: &str) {
        fs::write(dir.join(name), contents).expect("write pack");
    }

    fn temp_dir(tag: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("precinct-content-{tag}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).expect("create temp dir");
        dir
    }

    #[test]
    fn packs_merge_and_bad_entries_are_skipped() {
        let dir = temp_dir("merge");
        write(
            &dir,
            "districts_core.json",
            r#"{"districts":[{"id":"downtown","name":"Downtown","unlock_cost":0}]}"#,
        );
        write(
            &dir,
            "missions_core.json",
            r#"{"missions":[
                {"id":"m1","name":"Patrol","district":"downtown",
                 "base_reward":100,"base_duration_minutes":10,"base_success_chance":80},
                {"id":"broken","name":"Missing Fields"}
            ]}"#,
        );
        write(
            &dir,
            "missions_extra.json",
            r#"{"missions":[
                {"id":"m2","name":"Checkpoint","district":"downtown",
                 "base_reward":60,"base_duration_minutes":5,"base_success_chance":90}
            ]}"#,
        );

        let catalog = load_catalog(&dir).expect("load");
        assert_eq!(catalog.mission_count(), 2);
        assert!(catalog.mission("m1").is_some());
        assert!(catalog.mission("m2").is_some());
        assert!(catalog.mission("broken").is_none());
        assert_eq!(catalog.district_count(), 1);
    }

    #[test]
    fn tuning_overrides_defaults_when_present() {
        let dir = temp_dir("tuning");
        write(
            &dir,
            "tuning.json",
            r#"{"heat_penalty_per_point":0.5,"reputation_weight":5.0,
                "reward_per_level":0.02,"probability_floor":5,"probability_ceiling":95}"#,
        );

        let catalog = load_catalog(&dir).expect("load");
        assert_eq!(catalog.tuning().probability_floor, 5);
        assert_eq!(catalog.tuning().probability_ceiling, 95);
    }

    #[test]
    fn snapshot_survives_a_swap() {
        let handle = CatalogHandle::new(Catalog::new());
        let before = handle.snapshot();

        let mut next = Catalog::new();
        next.insert_district(DistrictDef {
            id: "harbor".to_string(),
            name: "Harbor".to_string(),
            unlock_cost: 100,
            reward_multiplier: 1.0,
            difficulty_modifier: 0,
            min_station_level: 1,
        });
        handle.swap(next);

        // The old snapshot is unchanged; new snapshots see the reload.
        assert_eq!(before.district_count(), 0);
        assert_eq!(handle.snapshot().district_count(), 1);
    }
}
