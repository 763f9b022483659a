//! Profile Store: durable per-player state with load/save semantics.
//!
//! The SQLite store keeps one JSON payload row per profile and migrates its
//! schema on open. Both implementations are usable under the Concurrency
//! Guard without locking of their own beyond an internal connection mutex.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use chrono::Utc;
use contracts::{Profile, ProfileId};
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("profile store unavailable: {0}")]
    Unavailable(String),
}

pub trait ProfileStore: Send + Sync {
    fn load(&self, profile_id: ProfileId) -> Result<Option<Profile>, StoreError>;
    fn save(&self, profile: &Profile) -> Result<(), StoreError>;
    fn delete(&self, profile_id: ProfileId) -> Result<(), StoreError>;
    /// All known profiles, for the background trigger's sweep.
    fn list_profile_ids(&self) -> Result<Vec<ProfileId>, StoreError>;
}

#[derive(Debug)]
pub struct SqliteProfileStore {
    conn: Mutex<Connection>,
}

impl SqliteProfileStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.configure()?;
        store.migrate()?;
        Ok(store)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn configure(&self) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(())
    }

    fn migrate(&self) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS profiles (
                profile_id INTEGER PRIMARY KEY,
                schema_version TEXT NOT NULL,
                payload_json TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            ",
        )?;
        conn.execute(
            "INSERT OR IGNORE INTO schema_migrations(version, name, applied_at)
             VALUES(1, 'initial_v1', ?1)",
            params![Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

impl ProfileStore for SqliteProfileStore {
    fn load(&self, profile_id: ProfileId) -> Result<Option<Profile>, StoreError> {
        let conn = self.lock();
        let payload: Option<String> = conn
            .query_row(
                "SELECT payload_json FROM profiles WHERE profile_id = ?1",
                params![profile_id as i64],
                |row| row.get(0),
            )
            .optional()?;

        match payload {
            Some(raw) => Ok(Some(serde_json::from_str::<Profile>(&raw)?)),
            None => Ok(None),
        }
    }

    fn save(&self, profile: &Profile) -> Result<(), StoreError> {
        let payload = serde_json::to_string(profile)?;
        let conn = self.lock();
        conn.execute(
            "INSERT INTO profiles (profile_id, schema_version, payload_json, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(profile_id) DO UPDATE SET
                schema_version = excluded.schema_version,
                payload_json = excluded.payload_json,
                updated_at = excluded.updated_at",
            params![
                profile.profile_id as i64,
                profile.schema_version.as_str(),
                payload,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn delete(&self, profile_id: ProfileId) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.execute(
            "DELETE FROM profiles WHERE profile_id = ?1",
            params![profile_id as i64],
        )?;
        Ok(())
    }

    fn list_profile_ids(&self) -> Result<Vec<ProfileId>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT profile_id FROM profiles ORDER BY profile_id")?;
        let rows = stmt.query_map([], |row| row.get::<_, i64>(0))?;

        let mut ids = Vec::new();
        for row in rows {
            ids.push(row? as ProfileId);
        }
        Ok(ids)
    }
}

/// In-memory store for tests and the deterministic simulation harness.
/// `fail_saves` injects collaborator failures.
#[derive(Debug, Default)]
pub struct MemoryProfileStore {
    profiles: Mutex<BTreeMap<ProfileId, Profile>>,
    fail_saves: AtomicBool,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_saves(&self, failing: bool) {
        self.fail_saves.store(failing, Ordering::SeqCst);
    }
}

impl ProfileStore for MemoryProfileStore {
    fn load(&self, profile_id: ProfileId) -> Result<Option<Profile>, StoreError> {
        let profiles = self.profiles.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(profiles.get(&profile_id).cloned())
    }

    fn save(&self, profile: &Profile) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected save failure".to_string()));
        }
        let mut profiles = self.profiles.lock().unwrap_or_else(PoisonError::into_inner);
        profiles.insert(profile.profile_id, profile.clone());
        Ok(())
    }

    fn delete(&self, profile_id: ProfileId) -> Result<(), StoreError> {
        let mut profiles = self.profiles.lock().unwrap_or_else(PoisonError::into_inner);
        profiles.remove(&profile_id);
        Ok(())
    }

    fn list_profile_ids(&self) -> Result<Vec<ProfileId>, StoreError> {
        let profiles = self.profiles.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(profiles.keys().copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_round_trips_profiles() {
        let store = SqliteProfileStore::open_in_memory().expect("open store");
        assert!(store.load(1).expect("load").is_none());

        let mut profile = Profile::new(1, "downtown");
        profile.reputation = 61;
        store.save(&profile).expect("save");

        let loaded = store.load(1).expect("load").expect("present");
        assert_eq!(loaded, profile);

        profile.heat = 12;
        store.save(&profile).expect("upsert");
        let reloaded = store.load(1).expect("load").expect("present");
        assert_eq!(reloaded.heat, 12);
    }

    #[test]
    fn sqlite_lists_and_deletes() {
        let store = SqliteProfileStore::open_in_memory().expect("open store");
        store.save(&Profile::new(2, "downtown")).expect("save");
        store.save(&Profile::new(1, "downtown")).expect("save");
        assert_eq!(store.list_profile_ids().expect("list"), vec![1, 2]);

        store.delete(1).expect("delete");
        assert_eq!(store.list_profile_ids().expect("list"), vec![2]);
    }

    #[test]
    fn memory_store_injects_save_failures() {
        let store = MemoryProfileStore::new();
        let profile = Profile::new(5, "downtown");
        store.save(&profile).expect("save works");

        store.fail_saves(true);
        assert!(store.save(&profile).is_err());

        store.fail_saves(false);
        store.save(&profile).expect("save restored");
    }
}
