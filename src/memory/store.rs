use std::collections::HashMap;
use std::hash::Hash;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::entity::Aggregate;
use crate::query::QueryStore;
use crate::snapshot::Snapshot;
use crate::store::Store;

/// An in-memory `Store`, backed by a single `RwLock`-guarded map.
///
/// Grounded on the same shape as a read-through cache over a shared
/// collection: every value handed out is a fresh [`Snapshot`], so callers
/// can never observe or corrupt what's sitting in the map.
pub struct MemoryStore<T: Aggregate> {
    data: RwLock<HashMap<T::Id, T>>,
}

impl<T: Aggregate> Default for MemoryStore<T> {
    fn default() -> Self {
        Self { data: RwLock::new(HashMap::new()) }
    }
}

impl<T: Aggregate> MemoryStore<T> {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MemoryStoreError<Id: Eq + Hash + std::fmt::Debug> {
    #[error("an entity already exists for id {0:?}")]
    AlreadyExists(Id),
}

#[async_trait]
impl<T: Aggregate> Store<T> for MemoryStore<T>
where
    T::Id: std::fmt::Debug,
{
    type Error = MemoryStoreError<T::Id>;

    async fn load(&self, id: &T::Id) -> Result<Option<T>, Self::Error> {
        Ok(self.data.read().get(id).map(Snapshot::snapshot))
    }

    async fn save(&self, id: &T::Id, entity: &T) -> Result<(), Self::Error> {
        let mut data = self.data.write();
        if data.contains_key(id) {
            return Err(MemoryStoreError::AlreadyExists(id.clone()));
        }
        data.insert(id.clone(), entity.snapshot());
        Ok(())
    }

    async fn save_all(
        &self,
        inserts: HashMap<T::Id, T>,
        updates: HashMap<T::Id, T>,
    ) -> Result<(), Self::Error> {
        let mut data = self.data.write();
        for id in inserts.keys() {
            if data.contains_key(id) {
                return Err(MemoryStoreError::AlreadyExists(id.clone()));
            }
        }
        for (id, entity) in inserts {
            data.insert(id, entity);
        }
        for (id, entity) in updates {
            data.insert(id, entity);
        }
        Ok(())
    }

    async fn remove_all(&self, ids: &[T::Id]) -> Result<(), Self::Error> {
        let mut data = self.data.write();
        for id in ids {
            data.remove(id);
        }
        Ok(())
    }
}

#[async_trait]
impl<T: Aggregate> QueryStore<T> for MemoryStore<T>
where
    T::Id: std::fmt::Debug,
{
    async fn list_ids(&self) -> Result<Vec<T::Id>, Self::Error> {
        Ok(self.data.read().keys().cloned().collect())
    }

    async fn count(&self) -> Result<u64, Self::Error> {
        Ok(self.data.read().len() as u64)
    }
}
