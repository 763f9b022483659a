//! Background trigger: a recurring task that invokes the tick engine's
//! public entry point for every stored profile.
//!
//! The trigger itself carries no game logic: catch-up is a no-op for
//! profiles with nothing pending, and per-profile failures stay inside the
//! sweep.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::GameService;

#[derive(Debug)]
pub struct TickTrigger {
    handle: JoinHandle<()>,
}

impl TickTrigger {
    /// Spawn the recurring sweep. The first firing happens one period in,
    /// not immediately, so startup never races content loading.
    pub fn start(service: Arc<GameService>, period: Duration) -> Self {
        info!(period_secs = period.as_secs(), "tick trigger started");
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let summary = service.run_automation_pass(Utc::now()).await;
                debug!(
                    processed = summary.profiles_processed,
                    failed = summary.profiles_failed,
                    ticks = summary.ticks_processed,
                    "automation sweep finished"
                );
            }
        });
        Self { handle }
    }

    pub fn stop(self) {
        self.handle.abort();
        info!("tick trigger stopped");
    }
}
