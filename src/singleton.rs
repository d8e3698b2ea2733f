//! A repository for the degenerate case of exactly one value per type —
//! configuration, counters, anything that doesn't need an id.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::error::RegistryError;
use crate::process::Process;
use crate::registry::TypeRegistry;
use crate::snapshot::Snapshot;

/// Holds exactly one value of `T`, shared across every process.
///
/// `get` never blocks and never enrolls anything in a process; `take`
/// acquires the repository's sole mutex so that only one process can hold
/// it for mutation at a time, releasing it when that process finishes or
/// aborts.
#[derive(Debug)]
pub struct SingletonRepository<T> {
    value: Arc<RwLock<T>>,
    sole_mutex: Arc<Mutex<()>>,
}

impl<T: Snapshot + 'static> SingletonRepository<T> {
    /// Builds a singleton repository for `T`, claiming `T` against
    /// `registry` just like [`crate::repository::Repository::new`] does —
    /// a singleton is still one aggregate type competing for the same
    /// namespace as every other `Repository`, and must not be able to
    /// silently share a bucket with one.
    pub fn new(registry: &TypeRegistry, initial: T) -> Result<Self, RegistryError> {
        registry.register::<T>()?;
        Ok(Self {
            value: Arc::new(RwLock::new(initial)),
            sole_mutex: Arc::new(Mutex::new(())),
        })
    }

    /// Returns a process-local clone of the current value.
    pub fn get(&self) -> T {
        self.value.read().snapshot()
    }

    /// Overwrites the current value without requiring the sole mutex.
    pub fn put(&self, value: T) {
        *self.value.write() = value;
    }

    /// Acquires the sole mutex, registering its release with `process`, and
    /// returns a handle for mutating the value in place.
    pub fn take(&self, process: &Process) -> SingletonHandle<T> {
        let guard = self.sole_mutex.clone().lock_arc();
        process.with_context(|ctx| ctx.singleton_guards.push(guard));
        SingletonHandle { value: self.value.clone() }
    }
}

/// A live reference to a singleton's value, held for the duration of one
/// process.
pub struct SingletonHandle<T> {
    value: Arc<RwLock<T>>,
}

impl<T> SingletonHandle<T> {
    pub fn read(&self) -> parking_lot::RwLockReadGuard<'_, T> {
        self.value.read()
    }

    pub fn write(&self) -> parking_lot::RwLockWriteGuard<'_, T> {
        self.value.write()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, PartialEq, Debug)]
    struct Settings {
        max_retries: u32,
    }

    #[tokio::test]
    async fn get_reads_without_taking() {
        let registry = TypeRegistry::new();
        let repo = SingletonRepository::new(&registry, Settings { max_retries: 3 }).unwrap();
        assert_eq!(repo.get(), Settings { max_retries: 3 });
    }

    #[tokio::test]
    async fn take_mutate_finish_persists() {
        let registry = TypeRegistry::new();
        let repo = SingletonRepository::new(&registry, Settings { max_retries: 3 }).unwrap();
        let process = Process::start();
        {
            let handle = repo.take(&process);
            handle.write().max_retries = 5;
        }
        process.finish().await.unwrap();
        assert_eq!(repo.get().max_retries, 5);
    }

    #[tokio::test]
    async fn cannot_collide_with_a_repository_claiming_the_same_type() {
        let registry = TypeRegistry::new();
        registry.register::<Settings>().unwrap();
        let err = SingletonRepository::new(&registry, Settings { max_retries: 3 }).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateAggregateType(_)));
    }
}
