//! Deterministic core of the precinct idle engine: catalog snapshots,
//! cooldown tracking, outcome resolution, dispatch selection, and catch-up
//! tick arithmetic.
//!
//! Nothing in this crate reads the wall clock, seeds randomness from
//! ambient entropy, or performs I/O. Callers inject `now`, ledger balances,
//! and seeded draw sources, which makes every path replayable.

pub mod catalog;
pub mod cooldown;
pub mod outcome;
pub mod selector;
pub mod tick;

use thiserror::Error;

pub use catalog::Catalog;
pub use outcome::{Outcome, ProfileModifiers};
pub use selector::{select_dispatches, BalanceView, DispatchPlan, Selection};
pub use tick::{apply_tick, catch_up_window, tick_rng, CatchUpWindow, TickStep};

/// Programmer-error conditions: reserving an already-reserved unit,
/// negative cooldowns, a selector plan naming a unit the profile does not
/// own. These should not occur under correct per-profile locking; they are
/// fatal to the current operation and never retryable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("invalid state: {0}")]
    InvalidState(String),
}
