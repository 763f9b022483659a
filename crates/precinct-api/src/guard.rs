//! Concurrency Guard: a registry of per-profile exclusive locks.
//!
//! Entries are created on first access and kept for the process lifetime,
//! so the same profile id always resolves to the same mutex. Operations on
//! different profile ids never contend with each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use contracts::ProfileId;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Debug, Default)]
pub struct ProfileLocks {
    locks: Mutex<HashMap<ProfileId, Arc<AsyncMutex<()>>>>,
}

impl ProfileLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, profile_id: ProfileId) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(profile_id).or_default().clone()
    }

    /// Acquire the exclusive lock for one profile. The guard releases on
    /// drop on every exit path, including failures.
    pub async fn acquire(&self, profile_id: ProfileId) -> OwnedMutexGuard<()> {
        self.entry(profile_id).lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn same_profile_operations_serialize() {
        let locks = Arc::new(ProfileLocks::new());
        let in_flight = Arc::new(AtomicU64::new(0));
        let peak = Arc::new(AtomicU64::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire(7).await;
                let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(current, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.expect("task completes");
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_profiles_do_not_contend() {
        let locks = Arc::new(ProfileLocks::new());
        let _held = locks.acquire(1).await;

        // A second profile's lock must be immediately available even while
        // the first is held.
        let other = tokio::time::timeout(Duration::from_millis(50), locks.acquire(2))
            .await
            .expect("no contention across profiles");
        drop(other);
    }

    #[tokio::test]
    async fn lock_is_released_on_failure_paths() {
        let locks = Arc::new(ProfileLocks::new());

        let failing = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(3).await;
                panic!("operation failed while holding the lock");
            })
        };
        assert!(failing.await.is_err());

        // The panicked task dropped its guard; the lock must be free.
        let reacquired = tokio::time::timeout(Duration::from_millis(50), locks.acquire(3))
            .await
            .expect("lock released after panic");
        drop(reacquired);
    }
}
