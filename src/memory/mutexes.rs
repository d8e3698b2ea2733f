use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex, RwLock};

use crate::mutexes::{LockOutcome, Mutexes};

/// Tuning knobs for [`MemoryMutexes`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MutexesConfig {
    /// Upper bound on how long `lock` spins waiting for a contended id.
    /// `None` means wait indefinitely.
    pub lock_acquire_timeout: Option<Duration>,
}

/// An in-memory `Mutexes` implementation, one `parking_lot::Mutex` per id
/// that has ever been registered.
///
/// Acquiring a contended lock is a cooperative spin-poll rather than a true
/// blocking wait, since `parking_lot`'s guards don't expose an async-aware
/// wait path; this is adequate for an in-memory reference backend, not a
/// fairness guarantee.
pub struct MemoryMutexes<Id>
where
    Id: Eq + Hash + Clone + Send + Sync + 'static,
{
    locks: RwLock<HashMap<Id, Arc<Mutex<()>>>>,
    held: Mutex<HashMap<Id, ArcMutexGuard<RawMutex, ()>>>,
    config: MutexesConfig,
}

impl<Id> MemoryMutexes<Id>
where
    Id: Eq + Hash + Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::with_config(MutexesConfig::default())
    }

    pub fn with_config(config: MutexesConfig) -> Self {
        Self {
            locks: RwLock::new(HashMap::new()),
            held: Mutex::new(HashMap::new()),
            config,
        }
    }

}

impl<Id> Default for MemoryMutexes<Id>
where
    Id: Eq + Hash + Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<Id> Mutexes<Id> for MemoryMutexes<Id>
where
    Id: Eq + Hash + Clone + Send + Sync + 'static,
{
    type Error = std::convert::Infallible;

    async fn lock(&self, id: &Id) -> Result<LockOutcome, Self::Error> {
        let maybe_mutex = self.locks.read().get(id).cloned();
        let Some(mutex) = maybe_mutex else {
            return Ok(LockOutcome::Absent);
        };

        let deadline = self.config.lock_acquire_timeout.map(|d| tokio::time::Instant::now() + d);
        loop {
            if let Some(guard) = mutex.clone().try_lock_arc() {
                self.held.lock().insert(id.clone(), guard);
                return Ok(LockOutcome::Acquired);
            }
            if let Some(deadline) = deadline {
                if tokio::time::Instant::now() >= deadline {
                    return Ok(LockOutcome::Contended);
                }
            }
            tokio::task::yield_now().await;
        }
    }

    async fn new_and_lock(&self, id: &Id) -> Result<bool, Self::Error> {
        let mut locks = self.locks.write();
        if locks.contains_key(id) {
            return Ok(false);
        }
        let mutex = Arc::new(Mutex::new(()));
        let guard = mutex.clone().lock_arc();
        locks.insert(id.clone(), mutex);
        drop(locks);
        self.held.lock().insert(id.clone(), guard);
        Ok(true)
    }

    async fn unlock_all(&self, ids: &[Id]) {
        let mut held = self.held.lock();
        for id in ids {
            held.remove(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lock_on_an_unregistered_id_is_absent() {
        let mutexes: MemoryMutexes<u32> = MemoryMutexes::new();
        assert_eq!(mutexes.lock(&1).await.unwrap(), LockOutcome::Absent);
    }

    #[tokio::test]
    async fn new_and_lock_then_lock_again_loses() {
        let mutexes: MemoryMutexes<u32> = MemoryMutexes::with_config(MutexesConfig {
            lock_acquire_timeout: Some(Duration::from_millis(20)),
        });
        assert!(mutexes.new_and_lock(&1).await.unwrap());
        assert_eq!(mutexes.lock(&1).await.unwrap(), LockOutcome::Contended);
    }

    #[tokio::test]
    async fn unlock_all_frees_the_id_for_the_next_caller() {
        let mutexes: MemoryMutexes<u32> = MemoryMutexes::new();
        assert!(mutexes.new_and_lock(&1).await.unwrap());
        mutexes.unlock_all(&[1]).await;
        assert_eq!(mutexes.lock(&1).await.unwrap(), LockOutcome::Acquired);
    }

    #[tokio::test]
    async fn new_and_lock_twice_the_second_caller_loses_the_race() {
        let mutexes: MemoryMutexes<u32> = MemoryMutexes::new();
        assert!(mutexes.new_and_lock(&1).await.unwrap());
        assert!(!mutexes.new_and_lock(&1).await.unwrap());
    }
}
