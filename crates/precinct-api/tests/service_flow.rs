use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use contracts::{
    DistrictDef, EngineConfig, MissionDef, MissionFilters, PolicyDef, SelectionRule, StaffTypeDef,
    UpgradeDef, UpgradeEffect, VehicleTypeDef,
};
use precinct_api::{
    CreditLedger, GameService, MemoryLedger, MemoryProfileStore, ProfileStore, ServiceError,
};
use precinct_core::Catalog;

const PLAYER: u64 = 7001;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 8, 7, 8, 0, 0).unwrap()
}

fn fixture_catalog() -> Catalog {
    let mut catalog = Catalog::new();
    catalog.insert_district(DistrictDef {
        id: "downtown".to_string(),
        name: "Downtown".to_string(),
        unlock_cost: 0,
        reward_multiplier: 1.0,
        difficulty_modifier: 0,
        min_station_level: 1,
    });
    catalog.insert_district(DistrictDef {
        id: "harbor".to_string(),
        name: "Harbor".to_string(),
        unlock_cost: 400,
        reward_multiplier: 1.3,
        difficulty_modifier: 5,
        min_station_level: 2,
    });
    catalog.insert_vehicle_type(VehicleTypeDef {
        id: "patrol_car".to_string(),
        name: "Standard Patrol Car".to_string(),
        tag: "patrol".to_string(),
        purchase_cost: 500,
        maintenance_per_tick: 1,
        cooldown_multiplier: 1.0,
        min_station_level: 1,
    });
    catalog.insert_staff_type(StaffTypeDef {
        id: "officer".to_string(),
        name: "Patrol Officer".to_string(),
        tag: "officer".to_string(),
        hire_cost: 200,
        salary_per_tick: 1,
        quality_bonus: 0,
        cooldown_multiplier: 1.0,
        min_station_level: 1,
    });
    catalog.insert_mission(MissionDef {
        id: "patrol_downtown".to_string(),
        name: "Downtown Patrol".to_string(),
        district: "downtown".to_string(),
        required_vehicle_tags: vec!["patrol".to_string()],
        required_staff_tags: vec!["officer".to_string()],
        base_reward: 80,
        base_duration_minutes: 20,
        base_success_chance: 100,
        fuel_cost: 5,
        heat_success: 1,
        heat_failure: 2,
        reputation_success: 1,
        reputation_failure: -1,
        min_station_level: 1,
    });
    catalog.insert_mission(MissionDef {
        id: "patrol_sweep".to_string(),
        name: "Vehicle Sweep".to_string(),
        district: "downtown".to_string(),
        required_vehicle_tags: vec!["patrol".to_string()],
        required_staff_tags: Vec::new(),
        base_reward: 60,
        base_duration_minutes: 10,
        base_success_chance: 100,
        fuel_cost: 5,
        heat_success: 0,
        heat_failure: 1,
        reputation_success: 1,
        reputation_failure: -1,
        min_station_level: 1,
    });
    catalog.insert_mission(MissionDef {
        id: "foot_beat".to_string(),
        name: "Foot Beat".to_string(),
        district: "downtown".to_string(),
        required_vehicle_tags: Vec::new(),
        required_staff_tags: vec!["officer".to_string()],
        base_reward: 30,
        base_duration_minutes: 10,
        base_success_chance: 100,
        fuel_cost: 0,
        heat_success: 0,
        heat_failure: 0,
        reputation_success: 1,
        reputation_failure: 0,
        min_station_level: 1,
    });
    catalog.insert_upgrade(UpgradeDef {
        id: "dispatch_center".to_string(),
        name: "Dispatch Center".to_string(),
        cost: 300,
        effect: UpgradeEffect::Automation,
        min_station_level: 1,
        requires: None,
    });
    catalog.insert_policy(PolicyDef {
        id: "greedy".to_string(),
        name: "Highest Reward First".to_string(),
        rule: SelectionRule::HighestRewardFirst,
        filters: MissionFilters::default(),
        max_dispatches_per_tick: None,
    });
    catalog
}

struct Harness {
    service: GameService,
    store: Arc<MemoryProfileStore>,
    ledger: Arc<MemoryLedger>,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryProfileStore::new());
    let ledger = Arc::new(MemoryLedger::new());
    let service = GameService::new(
        EngineConfig::default(),
        fixture_catalog(),
        store.clone(),
        ledger.clone(),
    );
    Harness {
        service,
        store,
        ledger,
    }
}

/// Grant funds, buy a car and an officer, unlock automation. Leaves the
/// profile with a known last-tick mark of t0.
async fn automation_ready(h: &Harness) {
    h.service
        .get_or_create_profile(PLAYER)
        .await
        .expect("create profile");
    h.service
        .admin_grant_credits(PLAYER, 2_000, t0())
        .await
        .expect("grant");
    h.service
        .purchase_vehicle(PLAYER, "patrol_car")
        .await
        .expect("buy car");
    h.service
        .hire_staff(PLAYER, "officer")
        .await
        .expect("hire officer");
    h.service
        .purchase_upgrade(PLAYER, "dispatch_center")
        .await
        .expect("buy dispatch center");
    h.service
        .set_automation(PLAYER, true, Some("greedy"))
        .await
        .expect("enable automation");

    // First invocation initializes the last-processed mark.
    let report = h
        .service
        .process_pending_ticks(PLAYER, t0())
        .await
        .expect("initializing run");
    assert_eq!(report.ticks_processed, 0);
}

#[tokio::test]
async fn thirty_seven_minutes_processes_seven_ticks_and_leaves_the_remainder() {
    let h = harness();
    automation_ready(&h).await;

    let now = t0() + Duration::minutes(37);
    let report = h
        .service
        .process_pending_ticks(PLAYER, now)
        .await
        .expect("catch-up");

    assert_eq!(report.ticks_processed, 7);
    assert!(!report.capped);
    // One car + one officer on a 20-minute mission: dispatches land on
    // ticks 1 and 5 only.
    assert_eq!(report.outcomes.len(), 2);
    // 7 ticks x (1 maintenance + 1 salary).
    assert_eq!(report.upkeep_paid, 14);

    let profile = h.store.load(PLAYER).expect("load").expect("present");
    assert_eq!(profile.last_tick_at, Some(t0() + Duration::minutes(35)));

    // Idempotence: same now again processes nothing further.
    let again = h
        .service
        .process_pending_ticks(PLAYER, now)
        .await
        .expect("repeat");
    assert_eq!(again.ticks_processed, 0);
    assert_eq!(again.snapshot.balance, report.snapshot.balance);
}

#[tokio::test]
async fn two_days_offline_caps_at_288_ticks() {
    let h = harness();
    automation_ready(&h).await;

    // Pull the mark two days into the past directly through the store.
    let mut profile = h.store.load(PLAYER).expect("load").expect("present");
    profile.last_tick_at = Some(t0() - Duration::hours(48));
    h.store.save(&profile).expect("save");

    let report = h
        .service
        .process_pending_ticks(PLAYER, t0())
        .await
        .expect("capped catch-up");
    assert_eq!(report.ticks_processed, 288);
    assert!(report.capped);

    let follow_up = h
        .service
        .process_pending_ticks(PLAYER, t0())
        .await
        .expect("follow-up");
    assert_eq!(follow_up.ticks_processed, 0);
}

#[tokio::test]
async fn buying_the_car_leaves_dispatch_gated_on_minimum_balance() {
    let h = harness();
    h.service
        .get_or_create_profile(PLAYER)
        .await
        .expect("create profile");

    // Starting credits are exactly the car's price.
    h.service
        .purchase_vehicle(PLAYER, "patrol_car")
        .await
        .expect("buy car at exactly 500");
    assert_eq!(h.ledger.balance(PLAYER).expect("balance"), 0);

    // The fueled mission is gated: 0 - 5 < 100.
    let err = h
        .service
        .dispatch_mission(PLAYER, "patrol_sweep", t0())
        .await
        .expect_err("gated below minimum balance");
    assert!(matches!(err, ServiceError::InsufficientFunds { .. }));

    // A mission with no upfront cost is not gated by the spent balance.
    let h2 = harness();
    h2.service
        .get_or_create_profile(PLAYER)
        .await
        .expect("create");
    h2.service
        .hire_staff(PLAYER, "officer")
        .await
        .expect("hire officer from starting credits");
    h2.service
        .admin_grant_credits(PLAYER, -300, t0())
        .await
        .expect("drain to zero");
    assert_eq!(h2.ledger.balance(PLAYER).expect("balance"), 0);
    let record = h2
        .service
        .dispatch_mission(PLAYER, "foot_beat", t0())
        .await
        .expect("free mission proceeds at zero balance");
    assert!(record.success);
}

#[tokio::test]
async fn ledger_outage_commits_the_prefix_and_resumes_exactly_once() {
    let interrupted = harness();
    automation_ready(&interrupted).await;
    let clean = harness();
    automation_ready(&clean).await;

    let now = t0() + Duration::minutes(37);

    // Per tick the engine makes one balance call and one adjustment.
    // Allowing five more calls fails tick 3 on its adjustment.
    interrupted.ledger.fail_after(5);
    let err = interrupted
        .service
        .process_pending_ticks(PLAYER, now)
        .await
        .expect_err("outage aborts the run");
    assert!(err.is_retryable());

    // The committed prefix is exactly two ticks.
    let profile = interrupted
        .store
        .load(PLAYER)
        .expect("load")
        .expect("present");
    assert_eq!(profile.last_tick_at, Some(t0() + Duration::minutes(10)));

    // Retry after the outage clears; the run completes the remaining five.
    interrupted.ledger.clear_failures();
    let resumed = interrupted
        .service
        .process_pending_ticks(PLAYER, now)
        .await
        .expect("resumed run");
    assert_eq!(resumed.ticks_processed, 5);

    // The interrupted-then-resumed world matches an uninterrupted one.
    let reference = clean
        .service
        .process_pending_ticks(PLAYER, now)
        .await
        .expect("clean run");
    assert_eq!(reference.ticks_processed, 7);

    let interrupted_profile = interrupted
        .store
        .load(PLAYER)
        .expect("load")
        .expect("present");
    let clean_profile = clean.store.load(PLAYER).expect("load").expect("present");
    assert_eq!(interrupted_profile, clean_profile);
    assert_eq!(
        interrupted.ledger.balance(PLAYER).expect("balance"),
        clean.ledger.balance(PLAYER).expect("balance")
    );
}

#[tokio::test]
async fn concurrent_manual_dispatches_never_double_book_a_unit() {
    let h = harness();
    h.service
        .get_or_create_profile(PLAYER)
        .await
        .expect("create");
    h.service
        .admin_grant_credits(PLAYER, 5_000, t0())
        .await
        .expect("grant");
    h.service
        .purchase_vehicle(PLAYER, "patrol_car")
        .await
        .expect("buy car");

    let service = Arc::new(h.service);
    let mut handles = Vec::new();
    for _ in 0..6 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            service
                .dispatch_mission(PLAYER, "patrol_sweep", t0())
                .await
        }));
    }

    let mut successes = 0;
    let mut rejections = 0;
    for handle in handles {
        match handle.await.expect("task completes") {
            Ok(_) => successes += 1,
            Err(ServiceError::Ineligible(_)) => rejections += 1,
            Err(other) => panic!("unexpected error under contention: {other}"),
        }
    }

    // The single car serves exactly one dispatch; the rest see it busy.
    assert_eq!(successes, 1);
    assert_eq!(rejections, 5);
}

#[tokio::test]
async fn automation_requires_the_upgrade_and_a_policy() {
    let h = harness();
    h.service
        .get_or_create_profile(PLAYER)
        .await
        .expect("create");

    let err = h
        .service
        .set_automation(PLAYER, true, Some("greedy"))
        .await
        .expect_err("no dispatch-center upgrade yet");
    assert!(matches!(err, ServiceError::Ineligible(_)));

    h.service
        .admin_grant_credits(PLAYER, 1_000, t0())
        .await
        .expect("grant");
    h.service
        .purchase_upgrade(PLAYER, "dispatch_center")
        .await
        .expect("buy upgrade");

    let err = h
        .service
        .set_automation(PLAYER, true, None)
        .await
        .expect_err("no policy selected");
    assert!(matches!(err, ServiceError::Ineligible(_)));

    let profile = h
        .service
        .set_automation(PLAYER, true, Some("greedy"))
        .await
        .expect("enable");
    assert!(profile.automation_enabled);
    assert_eq!(profile.automation_policy.as_deref(), Some("greedy"));
}

#[tokio::test]
async fn units_cannot_be_sold_while_committed() {
    let h = harness();
    h.service
        .get_or_create_profile(PLAYER)
        .await
        .expect("create");
    h.service
        .admin_grant_credits(PLAYER, 5_000, t0())
        .await
        .expect("grant");
    let profile = h
        .service
        .purchase_vehicle(PLAYER, "patrol_car")
        .await
        .expect("buy car");
    let unit_id = profile.vehicles[0].unit_id.clone();

    h.service
        .dispatch_mission(PLAYER, "patrol_sweep", t0())
        .await
        .expect("dispatch");

    let err = h
        .service
        .sell_unit(PLAYER, &unit_id, t0())
        .await
        .expect_err("busy unit cannot be sold");
    assert!(matches!(err, ServiceError::Ineligible(_)));

    // After the 10-minute window the sale succeeds and refunds half.
    let before = h.ledger.balance(PLAYER).expect("balance");
    let profile = h
        .service
        .sell_unit(PLAYER, &unit_id, t0() + Duration::minutes(10))
        .await
        .expect("sell free unit");
    assert!(profile.vehicles.is_empty());
    assert_eq!(h.ledger.balance(PLAYER).expect("balance"), before + 250);

    // The admin early-clear also frees a committed unit.
    let profile = h
        .service
        .purchase_vehicle(PLAYER, "patrol_car")
        .await
        .expect("buy another car");
    let unit_id = profile.vehicles[0].unit_id.clone();
    h.service
        .dispatch_mission(PLAYER, "patrol_sweep", t0())
        .await
        .expect("dispatch");
    h.service
        .admin_release_unit(PLAYER, &unit_id)
        .await
        .expect("release");
    h.service
        .sell_unit(PLAYER, &unit_id, t0())
        .await
        .expect("sell released unit");
}

#[tokio::test]
async fn catalog_reload_does_not_disturb_running_state() {
    let h = harness();
    automation_ready(&h).await;

    // Swap in a catalog without the missions or policies the profile has
    // been running: automation warns and skips, ticks still process.
    let full = fixture_catalog();
    let mut fresh = Catalog::new();
    for district in full.districts_in_order() {
        fresh.insert_district(district.clone());
    }
    for vehicle in full.vehicle_types() {
        fresh.insert_vehicle_type(vehicle.clone());
    }
    for staff in full.staff_types() {
        fresh.insert_staff_type(staff.clone());
    }
    for upgrade in full.upgrades() {
        fresh.insert_upgrade(upgrade.clone());
    }
    h.service.swap_catalog(fresh);

    let report = h
        .service
        .process_pending_ticks(PLAYER, t0() + Duration::minutes(10))
        .await
        .expect("ticks survive a content change");
    assert_eq!(report.ticks_processed, 2);
    assert!(report.outcomes.is_empty());
}
