//! Service facade for the precinct engine: every mutating operation runs
//! under the per-profile Concurrency Guard, suspends only at collaborator
//! boundaries (ledger, profile store), and commits through them with
//! idempotency keys so interrupted runs resume instead of double-applying.

mod content;
mod guard;
mod ledger;
mod persistence;
mod scheduler;
mod server;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use contracts::{
    EngineConfig, OutcomeRecord, Profile, ProfileId, ProfileReport, ResourceSnapshot, TickReport,
    UnitInstance, UnitKind, UpgradeEffect,
};
use precinct_core::selector::plan_mission;
use precinct_core::tick::{apply_tick, catch_up_window, manual_rng, reserve_plan_units, tick_rng};
use precinct_core::{cooldown, outcome, Catalog, EngineError, ProfileModifiers};
use thiserror::Error;
use tracing::{debug, error, info, warn};

pub use content::{load_catalog, CatalogHandle, ContentError};
pub use guard::ProfileLocks;
pub use ledger::{CreditLedger, LedgerError, MemoryLedger, SqliteLedger, DEFAULT_MINIMUM_BALANCE};
pub use persistence::{MemoryProfileStore, ProfileStore, SqliteProfileStore, StoreError};
pub use scheduler::TickTrigger;
pub use server::{serve, ServerError};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("profile {0} not found")]
    ProfileNotFound(ProfileId),
    #[error("unknown {kind} id {id}")]
    UnknownId { kind: &'static str, id: String },
    /// User-facing validation failure on an explicit command (locked
    /// district, busy unit, missing prerequisite, ...).
    #[error("{0}")]
    Ineligible(String),
    #[error("insufficient funds: balance {balance}, required {required}")]
    InsufficientFunds { balance: i64, required: i64 },
    /// Invariant violation; fatal to the operation, never retryable.
    #[error(transparent)]
    InvalidState(#[from] EngineError),
    #[error("profile store failure: {0}")]
    Store(#[from] StoreError),
    #[error("ledger failure: {0}")]
    Ledger(#[from] LedgerError),
}

impl ServiceError {
    /// Collaborator failures abort at a tick boundary and may simply be
    /// retried; everything else is a definitive answer.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store(_) | Self::Ledger(_))
    }
}

/// Summary of one background automation sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub profiles_processed: usize,
    pub profiles_failed: usize,
    pub ticks_processed: u64,
}

pub struct GameService {
    config: EngineConfig,
    catalog: CatalogHandle,
    store: Arc<dyn ProfileStore>,
    ledger: Arc<dyn CreditLedger>,
    locks: ProfileLocks,
}

impl GameService {
    pub fn new(
        config: EngineConfig,
        catalog: Catalog,
        store: Arc<dyn ProfileStore>,
        ledger: Arc<dyn CreditLedger>,
    ) -> Self {
        Self {
            config,
            catalog: CatalogHandle::new(catalog),
            store,
            ledger,
            locks: ProfileLocks::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn catalog(&self) -> Arc<Catalog> {
        self.catalog.snapshot()
    }

    pub fn swap_catalog(&self, catalog: Catalog) {
        self.catalog.swap(catalog);
    }

    fn load_required(&self, profile_id: ProfileId) -> Result<Profile, ServiceError> {
        self.store
            .load(profile_id)?
            .ok_or(ServiceError::ProfileNotFound(profile_id))
    }

    // -----------------------------------------------------------------
    // Profile lifecycle
    // -----------------------------------------------------------------

    pub async fn get_or_create_profile(
        &self,
        profile_id: ProfileId,
    ) -> Result<Profile, ServiceError> {
        let _guard = self.locks.acquire(profile_id).await;
        if let Some(profile) = self.store.load(profile_id)? {
            return Ok(profile);
        }

        let catalog = self.catalog.snapshot();
        let home_district = catalog
            .districts_in_order()
            .next()
            .map(|district| district.id.clone())
            .ok_or_else(|| ServiceError::Ineligible("catalog has no districts".to_string()))?;

        let profile = Profile::new(profile_id, home_district);
        if self.config.starting_credits > 0 {
            // The init key is consumed exactly once per profile id, so a
            // reset never re-grants the starting balance.
            self.ledger.adjust(
                profile_id,
                self.config.starting_credits,
                &format!("init:{profile_id}"),
            )?;
        }
        self.store.save(&profile)?;
        info!(profile_id, "created profile");
        Ok(profile)
    }

    pub async fn profile_report(
        &self,
        profile_id: ProfileId,
        now: DateTime<Utc>,
    ) -> Result<ProfileReport, ServiceError> {
        let _guard = self.locks.acquire(profile_id).await;
        let profile = self.load_required(profile_id)?;
        let balance = self.ledger.balance(profile_id)?;
        Ok(ProfileReport {
            snapshot: ResourceSnapshot::capture(&profile, balance, now),
            profile,
        })
    }

    // -----------------------------------------------------------------
    // Tick Engine
    // -----------------------------------------------------------------

    /// Process pending ticks for one profile: Idle -> CatchingUp ->
    /// Committing. Collaborator failures abort at the current tick
    /// boundary; the committed prefix is retained and the error is
    /// retryable.
    pub async fn process_pending_ticks(
        &self,
        profile_id: ProfileId,
        now: DateTime<Utc>,
    ) -> Result<TickReport, ServiceError> {
        let _guard = self.locks.acquire(profile_id).await;
        let catalog = self.catalog.snapshot();
        let mut profile = self.load_required(profile_id)?;

        let Some(last) = profile.last_tick_at else {
            profile.last_tick_at = Some(now);
            self.store.save(&profile)?;
            let balance = self.ledger.balance(profile_id)?;
            return Ok(TickReport::empty(
                profile_id,
                ResourceSnapshot::capture(&profile, balance, now),
            ));
        };

        let window = catch_up_window(last, now, &self.config);
        if window.ticks == 0 {
            let balance = self.ledger.balance(profile_id)?;
            return Ok(TickReport::empty(
                profile_id,
                ResourceSnapshot::capture(&profile, balance, now),
            ));
        }

        debug!(
            profile_id,
            ticks = window.ticks,
            capped = window.capped,
            "starting catch-up run"
        );

        let mut outcomes = Vec::new();
        let mut upkeep_paid = 0_i64;
        let mut net_total = 0_i64;
        let mut aborted: Option<LedgerError> = None;

        for index in 1..=window.ticks {
            let at = window.tick_timestamp(index);

            let balance = match self.ledger.balance(profile_id) {
                Ok(balance) => balance,
                Err(err) => {
                    aborted = Some(err);
                    break;
                }
            };

            // Checkpoint so a failed ledger adjustment can drop this
            // tick's in-memory mutations before the prefix commits.
            let checkpoint = profile.clone();
            let mut rng = tick_rng(self.config.seed, profile_id, at);
            let step = match apply_tick(
                &mut profile,
                &catalog,
                self.ledger.minimum_balance(),
                balance,
                at,
                index,
                &mut rng,
            ) {
                Ok(step) => step,
                Err(invariant) => {
                    profile = checkpoint;
                    self.store.save(&profile)?;
                    error!(profile_id, tick = index, %invariant, "invariant violation during catch-up");
                    return Err(invariant.into());
                }
            };
            for warning in &step.warnings {
                warn!(profile_id, tick = index, "{warning}");
            }

            if step.net_change != 0 {
                let key = format!("tick:{profile_id}:{}", at.timestamp());
                if let Err(err) = self.ledger.adjust(profile_id, step.net_change, &key) {
                    profile = checkpoint;
                    aborted = Some(err);
                    break;
                }
            }

            profile.last_tick_at = Some(at);
            upkeep_paid += step.upkeep;
            net_total += step.net_change;
            outcomes.extend(step.outcomes);
        }

        if aborted.is_none() {
            // Absorb the sub-interval remainder (and, on capped runs, the
            // forfeited excess) so an immediate re-invocation is a no-op.
            profile.last_tick_at = Some(window.next_mark);
        }
        self.store.save(&profile)?;

        if let Some(err) = aborted {
            warn!(profile_id, %err, "catch-up aborted at tick boundary; committed prefix retained");
            return Err(err.into());
        }

        let balance = self.ledger.balance(profile_id)?;
        let report = TickReport {
            profile_id,
            ticks_processed: window.ticks,
            capped: window.capped,
            outcomes,
            upkeep_paid,
            net_ledger_change: net_total,
            snapshot: ResourceSnapshot::capture(&profile, balance, now),
        };
        debug!(profile_id, %report, "catch-up run committed");
        Ok(report)
    }

    /// One sweep over every stored profile, used by the background
    /// trigger. Per-profile failures are logged and counted, never fatal to
    /// the sweep.
    pub async fn run_automation_pass(&self, now: DateTime<Utc>) -> PassSummary {
        let profile_ids = match self.store.list_profile_ids() {
            Ok(ids) => ids,
            Err(err) => {
                warn!(%err, "automation pass could not list profiles");
                return PassSummary::default();
            }
        };

        let mut summary = PassSummary::default();
        for profile_id in profile_ids {
            match self.process_pending_ticks(profile_id, now).await {
                Ok(report) => {
                    summary.profiles_processed += 1;
                    summary.ticks_processed += report.ticks_processed;
                }
                Err(err) if err.is_retryable() => {
                    summary.profiles_failed += 1;
                    warn!(profile_id, %err, "automation pass: retryable failure");
                }
                Err(err) => {
                    summary.profiles_failed += 1;
                    error!(profile_id, %err, "automation pass: fatal failure");
                }
            }
        }
        summary
    }

    // -----------------------------------------------------------------
    // Manual dispatch
    // -----------------------------------------------------------------

    /// Validate, reserve, resolve, and commit a single player-chosen
    /// dispatch. The minimum-balance gate applies to this voluntary
    /// dispatch exactly as it does to automation.
    pub async fn dispatch_mission(
        &self,
        profile_id: ProfileId,
        mission_id: &str,
        now: DateTime<Utc>,
    ) -> Result<OutcomeRecord, ServiceError> {
        let _guard = self.locks.acquire(profile_id).await;
        let catalog = self.catalog.snapshot();
        let mut profile = self.load_required(profile_id)?;

        let mission = catalog
            .mission(mission_id)
            .cloned()
            .ok_or_else(|| ServiceError::UnknownId {
                kind: "mission",
                id: mission_id.to_string(),
            })?;

        if !profile.has_district(&mission.district) {
            return Err(ServiceError::Ineligible(format!(
                "district {} is locked",
                mission.district
            )));
        }
        if profile.station_level < mission.min_station_level {
            return Err(ServiceError::Ineligible(format!(
                "requires station level {}",
                mission.min_station_level
            )));
        }

        let plan = plan_mission(&profile, &catalog, &mission, now).ok_or_else(|| {
            ServiceError::Ineligible("required units are unavailable".to_string())
        })?;

        let balance = self.ledger.balance(profile_id)?;
        let minimum = self.ledger.minimum_balance();
        if plan.upfront_cost > 0 && balance - plan.upfront_cost < minimum {
            return Err(ServiceError::InsufficientFunds {
                balance,
                required: plan.upfront_cost + minimum,
            });
        }

        // Lifetime dispatch count disambiguates same-instant manual
        // dispatches in the ledger.
        let dispatch_sequence = profile.stats.missions_completed + profile.stats.missions_failed;

        reserve_plan_units(&mut profile, &catalog, &mission, &plan.unit_ids(), now)?;
        let modifiers = ProfileModifiers::gather(&profile, &mission, &plan.staff_type_ids, &catalog);
        let mut rng = manual_rng(self.config.seed, profile_id, now);
        let outcome = outcome::resolve(&mission, &modifiers, catalog.tuning(), &mut rng);
        outcome.apply_to(&mut profile);

        let net = outcome.reward - outcome.fuel_spent;
        if net != 0 {
            self.ledger.adjust(
                profile_id,
                net,
                &format!(
                    "manual:{profile_id}:{}:{dispatch_sequence}",
                    now.timestamp_millis()
                ),
            )?;
        }
        self.store.save(&profile)?;

        info!(
            profile_id,
            mission = %mission.id,
            success = outcome.success,
            "manual dispatch resolved"
        );
        Ok(OutcomeRecord {
            mission_id: mission.id,
            tick_index: 0,
            success: outcome.success,
            probability: outcome.probability,
            reward: outcome.reward,
            fuel_spent: outcome.fuel_spent,
            reputation_delta: outcome.reputation_delta,
            heat_delta: outcome.heat_delta,
            unit_ids: plan.unit_ids(),
            resolved_at: now,
        })
    }

    // -----------------------------------------------------------------
    // Units, upgrades, districts
    // -----------------------------------------------------------------

    pub async fn purchase_vehicle(
        &self,
        profile_id: ProfileId,
        type_id: &str,
    ) -> Result<Profile, ServiceError> {
        let _guard = self.locks.acquire(profile_id).await;
        let catalog = self.catalog.snapshot();
        let mut profile = self.load_required(profile_id)?;

        let def = catalog
            .vehicle_type(type_id)
            .ok_or_else(|| ServiceError::UnknownId {
                kind: "vehicle type",
                id: type_id.to_string(),
            })?;
        if profile.station_level < def.min_station_level {
            return Err(ServiceError::Ineligible(format!(
                "requires station level {}",
                def.min_station_level
            )));
        }
        self.require_balance(profile_id, def.purchase_cost)?;

        let unit_id = profile.mint_unit_id(UnitKind::Vehicle);
        self.ledger.adjust(
            profile_id,
            -def.purchase_cost,
            &format!("purchase:{profile_id}:{unit_id}"),
        )?;
        profile.vehicles.push(UnitInstance {
            unit_id,
            type_id: type_id.to_string(),
            kind: UnitKind::Vehicle,
            available_at: None,
        });
        self.store.save(&profile)?;
        Ok(profile)
    }

    pub async fn hire_staff(
        &self,
        profile_id: ProfileId,
        type_id: &str,
    ) -> Result<Profile, ServiceError> {
        let _guard = self.locks.acquire(profile_id).await;
        let catalog = self.catalog.snapshot();
        let mut profile = self.load_required(profile_id)?;

        let def = catalog
            .staff_type(type_id)
            .ok_or_else(|| ServiceError::UnknownId {
                kind: "staff type",
                id: type_id.to_string(),
            })?;
        if profile.station_level < def.min_station_level {
            return Err(ServiceError::Ineligible(format!(
                "requires station level {}",
                def.min_station_level
            )));
        }
        self.require_balance(profile_id, def.hire_cost)?;

        let unit_id = profile.mint_unit_id(UnitKind::Staff);
        self.ledger.adjust(
            profile_id,
            -def.hire_cost,
            &format!("hire:{profile_id}:{unit_id}"),
        )?;
        profile.staff.push(UnitInstance {
            unit_id,
            type_id: type_id.to_string(),
            kind: UnitKind::Staff,
            available_at: None,
        });
        self.store.save(&profile)?;
        Ok(profile)
    }

    /// Sell a vehicle or dismiss a staff member. Refuses while the unit is
    /// committed to a mission; refunds `purchase cost x resale_factor`.
    pub async fn sell_unit(
        &self,
        profile_id: ProfileId,
        unit_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Profile, ServiceError> {
        let _guard = self.locks.acquire(profile_id).await;
        let catalog = self.catalog.snapshot();
        let mut profile = self.load_required(profile_id)?;

        let unit = profile
            .unit(unit_id)
            .cloned()
            .ok_or_else(|| ServiceError::UnknownId {
                kind: "unit",
                id: unit_id.to_string(),
            })?;
        if !unit.is_available(now) {
            return Err(ServiceError::Ineligible(format!(
                "unit {unit_id} is committed to a mission"
            )));
        }

        let base_cost = match unit.kind {
            UnitKind::Vehicle => catalog
                .vehicle_type(&unit.type_id)
                .map(|def| def.purchase_cost),
            UnitKind::Staff => catalog.staff_type(&unit.type_id).map(|def| def.hire_cost),
        };
        let refund = match base_cost {
            Some(cost) => ((cost as f64) * self.config.resale_factor).round() as i64,
            None => {
                warn!(profile_id, unit_id, "selling unit with stale type; no refund");
                0
            }
        };

        match unit.kind {
            UnitKind::Vehicle => profile.vehicles.retain(|u| u.unit_id != unit_id),
            UnitKind::Staff => profile.staff.retain(|u| u.unit_id != unit_id),
        }
        if refund > 0 {
            self.ledger
                .adjust(profile_id, refund, &format!("sale:{profile_id}:{unit_id}"))?;
        }
        self.store.save(&profile)?;
        Ok(profile)
    }

    pub async fn purchase_upgrade(
        &self,
        profile_id: ProfileId,
        upgrade_id: &str,
    ) -> Result<Profile, ServiceError> {
        let _guard = self.locks.acquire(profile_id).await;
        let catalog = self.catalog.snapshot();
        let mut profile = self.load_required(profile_id)?;

        let def = catalog
            .upgrade(upgrade_id)
            .ok_or_else(|| ServiceError::UnknownId {
                kind: "upgrade",
                id: upgrade_id.to_string(),
            })?;
        if profile.has_upgrade(upgrade_id) {
            return Err(ServiceError::Ineligible(format!(
                "upgrade {upgrade_id} already owned"
            )));
        }
        if profile.station_level < def.min_station_level {
            return Err(ServiceError::Ineligible(format!(
                "requires station level {}",
                def.min_station_level
            )));
        }
        if let Some(required) = &def.requires {
            if !profile.has_upgrade(required) {
                return Err(ServiceError::Ineligible(format!(
                    "requires upgrade {required}"
                )));
            }
        }
        self.require_balance(profile_id, def.cost)?;

        self.ledger.adjust(
            profile_id,
            -def.cost,
            &format!("upgrade:{profile_id}:{upgrade_id}"),
        )?;
        profile.owned_upgrades.push(upgrade_id.to_string());
        self.store.save(&profile)?;
        Ok(profile)
    }

    pub async fn unlock_district(
        &self,
        profile_id: ProfileId,
        district_id: &str,
    ) -> Result<Profile, ServiceError> {
        let _guard = self.locks.acquire(profile_id).await;
        let catalog = self.catalog.snapshot();
        let mut profile = self.load_required(profile_id)?;

        let def = catalog
            .district(district_id)
            .ok_or_else(|| ServiceError::UnknownId {
                kind: "district",
                id: district_id.to_string(),
            })?;
        if profile.has_district(district_id) {
            return Err(ServiceError::Ineligible(format!(
                "district {district_id} already unlocked"
            )));
        }
        if profile.station_level < def.min_station_level {
            return Err(ServiceError::Ineligible(format!(
                "requires station level {}",
                def.min_station_level
            )));
        }
        self.require_balance(profile_id, def.unlock_cost)?;

        self.ledger.adjust(
            profile_id,
            -def.unlock_cost,
            &format!("district:{profile_id}:{district_id}"),
        )?;
        profile.unlocked_districts.push(district_id.to_string());
        self.store.save(&profile)?;
        Ok(profile)
    }

    /// Enabling automation requires an owned upgrade with the Automation
    /// effect and a policy to run.
    pub async fn set_automation(
        &self,
        profile_id: ProfileId,
        enabled: bool,
        policy_id: Option<&str>,
    ) -> Result<Profile, ServiceError> {
        let _guard = self.locks.acquire(profile_id).await;
        let catalog = self.catalog.snapshot();
        let mut profile = self.load_required(profile_id)?;

        if let Some(policy_id) = policy_id {
            if catalog.policy(policy_id).is_none() {
                return Err(ServiceError::UnknownId {
                    kind: "policy",
                    id: policy_id.to_string(),
                });
            }
            profile.automation_policy = Some(policy_id.to_string());
        }

        if enabled {
            let has_automation_access = catalog
                .upgrade_effects(&profile)
                .any(|effect| matches!(effect, UpgradeEffect::Automation));
            if !has_automation_access {
                return Err(ServiceError::Ineligible(
                    "automation requires a dispatch-center upgrade".to_string(),
                ));
            }
            if profile.automation_policy.is_none() {
                return Err(ServiceError::Ineligible(
                    "select an automation policy first".to_string(),
                ));
            }
        }

        profile.automation_enabled = enabled;
        self.store.save(&profile)?;
        Ok(profile)
    }

    // -----------------------------------------------------------------
    // Admin operations
    // -----------------------------------------------------------------

    async fn with_profile(
        &self,
        profile_id: ProfileId,
        mutate: impl FnOnce(&mut Profile) -> Result<(), ServiceError>,
    ) -> Result<Profile, ServiceError> {
        let _guard = self.locks.acquire(profile_id).await;
        let mut profile = self.load_required(profile_id)?;
        mutate(&mut profile)?;
        self.store.save(&profile)?;
        Ok(profile)
    }

    pub async fn admin_set_station_level(
        &self,
        profile_id: ProfileId,
        level: u32,
    ) -> Result<Profile, ServiceError> {
        self.with_profile(profile_id, |profile| {
            if level < 1 {
                return Err(ServiceError::Ineligible(
                    "station level must be at least 1".to_string(),
                ));
            }
            profile.station_level = level;
            Ok(())
        })
        .await
    }

    pub async fn admin_set_station_name(
        &self,
        profile_id: ProfileId,
        name: &str,
    ) -> Result<Profile, ServiceError> {
        let name = name.trim().to_string();
        self.with_profile(profile_id, move |profile| {
            if !(3..=50).contains(&name.chars().count()) {
                return Err(ServiceError::Ineligible(
                    "station name must be between 3 and 50 characters".to_string(),
                ));
            }
            profile.station_name = name;
            Ok(())
        })
        .await
    }

    pub async fn admin_set_reputation(
        &self,
        profile_id: ProfileId,
        reputation: i64,
    ) -> Result<Profile, ServiceError> {
        self.with_profile(profile_id, |profile| {
            if !(0..=100).contains(&reputation) {
                return Err(ServiceError::Ineligible(
                    "reputation must be between 0 and 100".to_string(),
                ));
            }
            profile.reputation = reputation;
            Ok(())
        })
        .await
    }

    pub async fn admin_set_heat(
        &self,
        profile_id: ProfileId,
        heat: i64,
    ) -> Result<Profile, ServiceError> {
        self.with_profile(profile_id, |profile| {
            if !(0..=100).contains(&heat) {
                return Err(ServiceError::Ineligible(
                    "heat must be between 0 and 100".to_string(),
                ));
            }
            profile.heat = heat;
            Ok(())
        })
        .await
    }

    pub async fn admin_set_home_district(
        &self,
        profile_id: ProfileId,
        district_id: &str,
    ) -> Result<Profile, ServiceError> {
        let catalog = self.catalog.snapshot();
        if catalog.district(district_id).is_none() {
            return Err(ServiceError::UnknownId {
                kind: "district",
                id: district_id.to_string(),
            });
        }
        let district_id = district_id.to_string();
        self.with_profile(profile_id, move |profile| {
            if !profile.has_district(&district_id) {
                profile.unlocked_districts.push(district_id.clone());
            }
            profile.home_district = district_id;
            Ok(())
        })
        .await
    }

    /// Manual early-clear of a unit's cooldown.
    pub async fn admin_release_unit(
        &self,
        profile_id: ProfileId,
        unit_id: &str,
    ) -> Result<Profile, ServiceError> {
        let unit_id = unit_id.to_string();
        self.with_profile(profile_id, move |profile| {
            let unit = profile
                .unit_mut(&unit_id)
                .ok_or_else(|| ServiceError::UnknownId {
                    kind: "unit",
                    id: unit_id.clone(),
                })?;
            cooldown::release(unit);
            Ok(())
        })
        .await
    }

    pub async fn admin_grant_credits(
        &self,
        profile_id: ProfileId,
        amount: i64,
        now: DateTime<Utc>,
    ) -> Result<i64, ServiceError> {
        let _guard = self.locks.acquire(profile_id).await;
        let balance = self.ledger.adjust(
            profile_id,
            amount,
            &format!("grant:{profile_id}:{}", now.timestamp_millis()),
        )?;
        info!(profile_id, amount, balance, "credits granted");
        Ok(balance)
    }

    /// Recreate the profile with defaults. Ledger credits are owned by the
    /// ledger and left untouched.
    pub async fn admin_reset_profile(
        &self,
        profile_id: ProfileId,
    ) -> Result<Profile, ServiceError> {
        let _guard = self.locks.acquire(profile_id).await;
        let catalog = self.catalog.snapshot();
        let home_district = catalog
            .districts_in_order()
            .next()
            .map(|district| district.id.clone())
            .ok_or_else(|| ServiceError::Ineligible("catalog has no districts".to_string()))?;

        self.store.delete(profile_id)?;
        let profile = Profile::new(profile_id, home_district);
        self.store.save(&profile)?;
        info!(profile_id, "profile reset");
        Ok(profile)
    }

    fn require_balance(&self, profile_id: ProfileId, cost: i64) -> Result<(), ServiceError> {
        let balance = self.ledger.balance(profile_id)?;
        if balance < cost {
            return Err(ServiceError::InsufficientFunds {
                balance,
                required: cost,
            });
        }
        Ok(())
    }
}
