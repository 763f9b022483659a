use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, TimeZone, Utc};
use contracts::{EngineConfig, ProfileId};
use precinct_api::{
    load_catalog, serve, GameService, MemoryLedger, MemoryProfileStore, SqliteLedger,
    SqliteProfileStore, TickTrigger,
};

fn print_usage() {
    println!("precinct-cli <command>");
    println!("commands:");
    println!("  serve [addr]");
    println!("    default addr: 127.0.0.1:8080");
    println!("  init <profile_id>");
    println!("  status <profile_id>");
    println!("  tick <profile_id>");
    println!("  dispatch <profile_id> <mission_id>");
    println!("  simulate <profile_id> <seed> [offline_minutes]");
    println!("    deterministic offline catch-up against in-memory collaborators");
    println!("environment:");
    println!("  PRECINCT_CONTENT_DIR  content pack directory (default: content)");
    println!("  PRECINCT_DB_PATH      profile store sqlite path (default: precinct.db)");
    println!("  PRECINCT_LEDGER_PATH  ledger sqlite path (default: precinct_ledger.db)");
}

fn parse_profile_id(value: Option<&String>) -> Result<ProfileId, String> {
    let raw = value.ok_or_else(|| "missing profile_id".to_string())?;
    raw.parse::<ProfileId>()
        .map_err(|_| format!("invalid profile_id: {raw}"))
}

fn parse_socket_addr(value: Option<&String>) -> Result<SocketAddr, String> {
    let raw = value.map(String::as_str).unwrap_or("127.0.0.1:8080");
    raw.parse::<SocketAddr>()
        .map_err(|_| format!("invalid addr: {raw}"))
}

fn content_dir() -> PathBuf {
    env::var("PRECINCT_CONTENT_DIR")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("content"))
}

fn db_path() -> PathBuf {
    env::var("PRECINCT_DB_PATH")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("precinct.db"))
}

fn ledger_path() -> PathBuf {
    env::var("PRECINCT_LEDGER_PATH")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("precinct_ledger.db"))
}

fn open_service() -> Result<Arc<GameService>, String> {
    let dir = content_dir();
    let catalog =
        load_catalog(&dir).map_err(|err| format!("failed to load content packs: {err}"))?;
    let store = SqliteProfileStore::open(db_path())
        .map_err(|err| format!("failed to open profile store: {err}"))?;
    let ledger = SqliteLedger::open(ledger_path())
        .map_err(|err| format!("failed to open ledger: {err}"))?;
    Ok(Arc::new(GameService::new(
        EngineConfig::default(),
        catalog,
        Arc::new(store),
        Arc::new(ledger),
    )))
}

async fn run_serve(args: &[String]) -> Result<(), String> {
    let addr = parse_socket_addr(args.get(2))?;
    let service = open_service()?;

    let period = StdDuration::from_secs(
        u64::from(service.config().tick_interval_minutes) * 60,
    );
    let trigger = TickTrigger::start(service.clone(), period);

    println!("serving api on http://{addr}");
    let result = serve(addr, service, Some(content_dir()))
        .await
        .map_err(|err| format!("server error: {err}"));
    trigger.stop();
    result
}

/// Deterministic offline catch-up against in-memory collaborators: a fresh
/// profile is funded, equipped, automated, then processed across the
/// offline window from a fixed epoch.
async fn run_simulation(args: &[String]) -> Result<(), String> {
    let profile_id = parse_profile_id(args.get(2))?;
    let seed = args
        .get(3)
        .ok_or_else(|| "missing seed".to_string())?
        .parse::<u64>()
        .map_err(|_| "invalid seed".to_string())?;
    let offline_minutes = args
        .get(4)
        .map(|value| {
            value
                .parse::<i64>()
                .map_err(|_| format!("invalid offline_minutes: {value}"))
        })
        .transpose()?
        .unwrap_or(120);

    let catalog = load_catalog(&content_dir())
        .map_err(|err| format!("failed to load content packs: {err}"))?;

    let first_vehicle = catalog.vehicle_types().next().map(|def| def.id.clone());
    let first_staff = catalog.staff_types().next().map(|def| def.id.clone());
    let automation_upgrade = catalog
        .upgrades()
        .find(|def| matches!(def.effect, contracts::UpgradeEffect::Automation))
        .map(|def| def.id.clone());
    let first_policy = catalog.policies().next().map(|def| def.id.clone());

    let config = EngineConfig {
        seed,
        ..EngineConfig::default()
    };
    let service = GameService::new(
        config,
        catalog,
        Arc::new(MemoryProfileStore::new()),
        Arc::new(MemoryLedger::new()),
    );

    let start = Utc
        .with_ymd_and_hms(2026, 1, 1, 0, 0, 0)
        .single()
        .ok_or_else(|| "bad epoch".to_string())?;
    let err_text = |err: precinct_api::ServiceError| err.to_string();

    service
        .get_or_create_profile(profile_id)
        .await
        .map_err(err_text)?;
    service
        .admin_grant_credits(profile_id, 10_000, start)
        .await
        .map_err(err_text)?;

    if let Some(type_id) = &first_vehicle {
        for _ in 0..2 {
            service
                .purchase_vehicle(profile_id, type_id)
                .await
                .map_err(err_text)?;
        }
    }
    if let Some(type_id) = &first_staff {
        for _ in 0..2 {
            service
                .hire_staff(profile_id, type_id)
                .await
                .map_err(err_text)?;
        }
    }
    if let (Some(upgrade_id), Some(policy_id)) = (&automation_upgrade, &first_policy) {
        service
            .purchase_upgrade(profile_id, upgrade_id)
            .await
            .map_err(err_text)?;
        service
            .set_automation(profile_id, true, Some(policy_id))
            .await
            .map_err(err_text)?;
    } else {
        println!("note: no automation upgrade or policy in content; ticks will only charge upkeep");
    }

    // Initialize the last-processed mark at the epoch, then catch up.
    service
        .process_pending_ticks(profile_id, start)
        .await
        .map_err(err_text)?;
    let report = service
        .process_pending_ticks(profile_id, start + Duration::minutes(offline_minutes))
        .await
        .map_err(err_text)?;

    println!(
        "simulated profile={} seed={} offline_minutes={} -> {}",
        profile_id, seed, offline_minutes, report
    );
    for outcome in report.outcomes.iter().take(10) {
        println!(
            "  tick {:>3} {} {} p={} reward={} fuel={}",
            outcome.tick_index,
            outcome.mission_id,
            if outcome.success { "ok" } else { "failed" },
            outcome.probability,
            outcome.reward,
            outcome.fuel_spent,
        );
    }
    if report.outcomes.len() > 10 {
        println!("  ... {} more", report.outcomes.len() - 10);
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(String::as_str);

    let result = match command {
        Some("serve") => run_serve(&args).await,
        Some("init") => match parse_profile_id(args.get(2)) {
            Ok(profile_id) => match open_service() {
                Ok(service) => service
                    .get_or_create_profile(profile_id)
                    .await
                    .map(|profile| {
                        println!(
                            "profile {} \"{}\" level={} district={}",
                            profile.profile_id,
                            profile.station_name,
                            profile.station_level,
                            profile.home_district
                        )
                    })
                    .map_err(|err| err.to_string()),
                Err(err) => Err(err),
            },
            Err(err) => Err(err),
        },
        Some("status") => match parse_profile_id(args.get(2)) {
            Ok(profile_id) => match open_service() {
                Ok(service) => service
                    .profile_report(profile_id, Utc::now())
                    .await
                    .map(|report| {
                        println!(
                            "{}",
                            serde_json::to_string_pretty(&report)
                                .unwrap_or_else(|_| "<unprintable report>".to_string())
                        )
                    })
                    .map_err(|err| err.to_string()),
                Err(err) => Err(err),
            },
            Err(err) => Err(err),
        },
        Some("tick") => match parse_profile_id(args.get(2)) {
            Ok(profile_id) => match open_service() {
                Ok(service) => service
                    .process_pending_ticks(profile_id, Utc::now())
                    .await
                    .map(|report| println!("{report}"))
                    .map_err(|err| err.to_string()),
                Err(err) => Err(err),
            },
            Err(err) => Err(err),
        },
        Some("dispatch") => match (parse_profile_id(args.get(2)), args.get(3)) {
            (Ok(profile_id), Some(mission_id)) => match open_service() {
                Ok(service) => service
                    .dispatch_mission(profile_id, mission_id, Utc::now())
                    .await
                    .map(|record| {
                        println!(
                            "{} {} p={} reward={} fuel={}",
                            record.mission_id,
                            if record.success { "ok" } else { "failed" },
                            record.probability,
                            record.reward,
                            record.fuel_spent
                        )
                    })
                    .map_err(|err| err.to_string()),
                Err(err) => Err(err),
            },
            (Err(err), _) => Err(err),
            (_, None) => Err("missing mission_id".to_string()),
        },
        Some("simulate") => run_simulation(&args).await,
        _ => {
            print_usage();
            Ok(())
        }
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        print_usage();
        std::process::exit(2);
    }
}
