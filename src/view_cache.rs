//! A read-through cache in front of a [`Repository`], for call sites that
//! read far more often than they write and can tolerate briefly stale
//! values between a write and the next read.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::entity::{Aggregate, EntityHandle};
use crate::error::RepositoryError;
use crate::mutexes::Mutexes;
use crate::process::Process;
use crate::repository::Repository;
use crate::store::Store;

/// Wraps a [`Repository`] with a process-independent cache of the last
/// value `find` returned for each id.
///
/// `put`, `put_if_absent`, `remove`, and `take_or_put_if_absent` all update
/// or invalidate the cache entry for the affected id as soon as they call
/// through to the wrapped repository, the same way the wrapped operations
/// already enroll the change in `process`. A bare `take` (reached through
/// the `Deref` to the inner `Repository`) is the one gap: a mutation made
/// through the handle it returns is invisible to the cache until the owning
/// process finishes and something calls `invalidate` or `find` again past
/// that point misses and reloads.
pub struct ViewCachedRepository<T, S, M>
where
    T: Aggregate,
    S: Store<T> + 'static,
    M: Mutexes<T::Id> + 'static,
{
    inner: Repository<T, S, M>,
    cache: RwLock<HashMap<T::Id, T>>,
}

impl<T, S, M> ViewCachedRepository<T, S, M>
where
    T: Aggregate,
    S: Store<T> + 'static,
    M: Mutexes<T::Id> + 'static,
{
    pub fn new(inner: Repository<T, S, M>) -> Self {
        Self {
            inner,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the cached value for `id` if present, otherwise delegates to
    /// the wrapped repository and caches the result.
    pub async fn find(&self, process: &Process, id: &T::Id) -> Result<Option<T>, RepositoryError> {
        if let Some(hit) = self.cache.read().get(id) {
            return Ok(Some(hit.snapshot()));
        }
        let found = self.inner.find(process, id).await?;
        if let Some(entity) = &found {
            self.cache.write().insert(id.clone(), entity.snapshot());
        }
        Ok(found)
    }

    pub fn invalidate(&self, id: &T::Id) {
        self.cache.write().remove(id);
    }

    /// `Put`s `entity`, then caches it under its id.
    pub fn put(&self, process: &Process, entity: T) -> Result<(), RepositoryError> {
        let id = self.inner.id_of(&entity);
        let cached = entity.snapshot();
        self.inner.put(process, entity)?;
        self.cache.write().insert(id, cached);
        Ok(())
    }

    /// `PutIfAbsent`s `entity`, then caches whichever value ended up
    /// enrolled (the caller's, or the one that was already there).
    pub async fn put_if_absent(&self, process: &Process, entity: T) -> Result<(EntityHandle<T>, bool), RepositoryError> {
        let id = self.inner.id_of(&entity);
        let (handle, won) = self.inner.put_if_absent(process, entity).await?;
        self.cache.write().insert(id, handle.lock().snapshot());
        Ok((handle, won))
    }

    /// Removes `id`, invalidating the cache entry if there was one to
    /// remove.
    pub async fn remove(&self, process: &Process, id: &T::Id) -> Result<Option<EntityHandle<T>>, RepositoryError> {
        let removed = self.inner.remove(process, id).await?;
        if removed.is_some() {
            self.cache.write().remove(id);
        }
        Ok(removed)
    }

    /// `TakeOrPutIfAbsent`s `new_entity`, then caches whichever value ended
    /// up enrolled.
    pub async fn take_or_put_if_absent(&self, process: &Process, new_entity: T) -> Result<EntityHandle<T>, RepositoryError> {
        let id = self.inner.id_of(&new_entity);
        let handle = self.inner.take_or_put_if_absent(process, new_entity).await?;
        self.cache.write().insert(id, handle.lock().snapshot());
        Ok(handle)
    }

    /// Access to every operation the cache doesn't shadow.
    pub fn inner(&self) -> &Repository<T, S, M> {
        &self.inner
    }
}

impl<T, S, M> std::ops::Deref for ViewCachedRepository<T, S, M>
where
    T: Aggregate,
    S: Store<T> + 'static,
    M: Mutexes<T::Id> + 'static,
{
    type Target = Repository<T, S, M>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
