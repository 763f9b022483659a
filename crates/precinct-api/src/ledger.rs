//! Credit Ledger: the external currency collaborator.
//!
//! Every adjustment carries an idempotency key; a key that was already
//! applied is a no-op returning the current balance. That makes each ledger
//! call a single all-or-nothing step the tick engine can retry safely.
//! Balances may go negative; only the minimum-balance gate on voluntary
//! dispatches consults `minimum_balance`.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use chrono::Utc;
use contracts::ProfileId;
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

pub const DEFAULT_MINIMUM_BALANCE: i64 = 100;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

pub trait CreditLedger: Send + Sync {
    fn balance(&self, profile_id: ProfileId) -> Result<i64, LedgerError>;

    /// Apply a signed delta. A repeated `key` is deduplicated and returns
    /// the current balance unchanged. Negative resulting balances are
    /// permitted.
    fn adjust(&self, profile_id: ProfileId, delta: i64, key: &str) -> Result<i64, LedgerError>;

    /// Smallest balance a profile must retain to voluntarily dispatch a
    /// costed mission.
    fn minimum_balance(&self) -> i64 {
        DEFAULT_MINIMUM_BALANCE
    }
}

#[derive(Debug)]
pub struct SqliteLedger {
    conn: Mutex<Connection>,
    minimum_balance: i64,
}

impl SqliteLedger {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, LedgerError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, LedgerError> {
        let ledger = Self {
            conn: Mutex::new(conn),
            minimum_balance: DEFAULT_MINIMUM_BALANCE,
        };
        ledger.migrate()?;
        Ok(ledger)
    }

    pub fn with_minimum_balance(mut self, minimum_balance: i64) -> Self {
        self.minimum_balance = minimum_balance;
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn migrate(&self) -> Result<(), LedgerError> {
        let conn = self.lock();
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS accounts (
                profile_id INTEGER PRIMARY KEY,
                balance INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS ledger_entries (
                profile_id INTEGER NOT NULL,
                entry_key TEXT NOT NULL,
                delta INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (profile_id, entry_key)
            );
            ",
        )?;
        Ok(())
    }
}

impl CreditLedger for SqliteLedger {
    fn balance(&self, profile_id: ProfileId) -> Result<i64, LedgerError> {
        let conn = self.lock();
        let balance: Option<i64> = conn
            .query_row(
                "SELECT balance FROM accounts WHERE profile_id = ?1",
                params![profile_id as i64],
                |row| row.get(0),
            )
            .optional()?;
        Ok(balance.unwrap_or(0))
    }

    fn adjust(&self, profile_id: ProfileId, delta: i64, key: &str) -> Result<i64, LedgerError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;

        let inserted = tx.execute(
            "INSERT OR IGNORE INTO ledger_entries (profile_id, entry_key, delta, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![profile_id as i64, key, delta, Utc::now().to_rfc3339()],
        )?;
        if inserted > 0 {
            tx.execute(
                "INSERT INTO accounts (profile_id, balance) VALUES (?1, ?2)
                 ON CONFLICT(profile_id) DO UPDATE SET balance = balance + excluded.balance",
                params![profile_id as i64, delta],
            )?;
        }

        let balance: i64 = tx
            .query_row(
                "SELECT balance FROM accounts WHERE profile_id = ?1",
                params![profile_id as i64],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or(0);

        tx.commit()?;
        Ok(balance)
    }

    fn minimum_balance(&self) -> i64 {
        self.minimum_balance
    }
}

#[derive(Debug, Default)]
struct FailurePlan {
    /// Successful calls remaining before every call starts erroring.
    calls_until_failure: Option<u32>,
}

/// In-memory ledger for tests and the simulation harness, with injectable
/// collaborator failures.
#[derive(Debug)]
pub struct MemoryLedger {
    accounts: Mutex<BTreeMap<ProfileId, i64>>,
    applied_keys: Mutex<BTreeSet<(ProfileId, String)>>,
    failure: Mutex<FailurePlan>,
    minimum_balance: i64,
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self {
            accounts: Mutex::new(BTreeMap::new()),
            applied_keys: Mutex::new(BTreeSet::new()),
            failure: Mutex::new(FailurePlan::default()),
            minimum_balance: DEFAULT_MINIMUM_BALANCE,
        }
    }
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_minimum_balance(mut self, minimum_balance: i64) -> Self {
        self.minimum_balance = minimum_balance;
        self
    }

    /// Let `calls` more ledger calls succeed, then fail every call until
    /// `clear_failures`.
    pub fn fail_after(&self, calls: u32) {
        let mut failure = self.failure.lock().unwrap_or_else(PoisonError::into_inner);
        failure.calls_until_failure = Some(calls);
    }

    pub fn clear_failures(&self) {
        let mut failure = self.failure.lock().unwrap_or_else(PoisonError::into_inner);
        failure.calls_until_failure = None;
    }

    fn check_failure(&self) -> Result<(), LedgerError> {
        let mut failure = self.failure.lock().unwrap_or_else(PoisonError::into_inner);
        match failure.calls_until_failure.as_mut() {
            None => Ok(()),
            Some(0) => Err(LedgerError::Unavailable(
                "injected ledger outage".to_string(),
            )),
            Some(remaining) => {
                *remaining -= 1;
                Ok(())
            }
        }
    }
}

impl CreditLedger for MemoryLedger {
    fn balance(&self, profile_id: ProfileId) -> Result<i64, LedgerError> {
        self.check_failure()?;
        let accounts = self.accounts.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(accounts.get(&profile_id).copied().unwrap_or(0))
    }

    fn adjust(&self, profile_id: ProfileId, delta: i64, key: &str) -> Result<i64, LedgerError> {
        self.check_failure()?;
        let mut applied = self
            .applied_keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut accounts = self.accounts.lock().unwrap_or_else(PoisonError::into_inner);

        let entry = accounts.entry(profile_id).or_insert(0);
        if applied.insert((profile_id, key.to_string())) {
            *entry += delta;
        }
        Ok(*entry)
    }

    fn minimum_balance(&self) -> i64 {
        self.minimum_balance
    }
}
