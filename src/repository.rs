//! The repository engine: `Find`/`Take`/`Put`/`PutIfAbsent`/`Remove`/
//! `TakeOrPutIfAbsent`, plus the per-type bucket that backs a `Process`'s
//! bookkeeping for a given `Repository`.

use std::any::{type_name, Any};
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::entity::{Aggregate, EntityHandle, ProcessEntity};
use crate::error::{BoxError, ContentionError, MisuseError, RegistryError, RepositoryError};
use crate::mutexes::{LockOutcome, Mutexes};
use crate::process::{EntityBucket, Process, ProcessContext};
use crate::registry::TypeRegistry;
use crate::state::EntityState;
use crate::store::Store;

/// One aggregate type's process-local entities, plus the collaborators
/// needed to flush and release them.
struct TypedBucket<T, S, M>
where
    T: Aggregate,
    S: Store<T> + 'static,
    M: Mutexes<T::Id> + 'static,
{
    store: Arc<S>,
    mutexes: Arc<M>,
    entities: HashMap<T::Id, ProcessEntity<T>>,
}

impl<T, S, M> TypedBucket<T, S, M>
where
    T: Aggregate,
    S: Store<T> + 'static,
    M: Mutexes<T::Id> + 'static,
{
    fn new(store: Arc<S>, mutexes: Arc<M>) -> Self {
        Self {
            store,
            mutexes,
            entities: HashMap::new(),
        }
    }
}

#[async_trait]
impl<T, S, M> EntityBucket for TypedBucket<T, S, M>
where
    T: Aggregate,
    S: Store<T> + 'static,
    M: Mutexes<T::Id> + 'static,
{
    fn has_misuse(&self) -> bool {
        self.entities.values().any(|pe| pe.state == EntityState::Error)
    }

    async fn flush(&mut self) -> Result<(), BoxError> {
        let mut inserts = HashMap::new();
        let mut updates = HashMap::new();
        let mut removals = Vec::new();

        for (id, pe) in self.entities.iter() {
            match pe.state {
                EntityState::CreatedInProc => {
                    inserts.insert(id.clone(), pe.current.lock().snapshot());
                }
                EntityState::TakenFromRepo => {
                    if pe.is_dirty() {
                        updates.insert(id.clone(), pe.current.lock().snapshot());
                    }
                }
                EntityState::ToRemove => removals.push(id.clone()),
                EntityState::Transient | EntityState::Error => {}
            }
        }

        if !inserts.is_empty() || !updates.is_empty() {
            self.store
                .save_all(inserts, updates)
                .await
                .map_err(|e| Box::new(e) as BoxError)?;
        }
        if !removals.is_empty() {
            self.store
                .remove_all(&removals)
                .await
                .map_err(|e| Box::new(e) as BoxError)?;
        }
        Ok(())
    }

    async fn release(&mut self) {
        let held: Vec<T::Id> = self
            .entities
            .iter()
            .filter(|(_, pe)| pe.holds_lock)
            .map(|(id, _)| id.clone())
            .collect();
        if !held.is_empty() {
            self.mutexes.unlock_all(&held).await;
        }
        self.entities.clear();
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Manages one aggregate type's lifecycle across processes.
///
/// A `Repository` is a long-lived value: it is constructed once per
/// aggregate type (registering that type against a [`TypeRegistry`]) and
/// then shared across every [`Process`] that needs to read or write that
/// type.
pub struct Repository<T, S, M>
where
    T: Aggregate,
    S: Store<T> + 'static,
    M: Mutexes<T::Id> + 'static,
{
    type_tag: &'static str,
    store: Arc<S>,
    mutexes: Arc<M>,
    id_of: fn(&T) -> T::Id,
}

impl<T, S, M> Repository<T, S, M>
where
    T: Aggregate,
    S: Store<T> + 'static,
    M: Mutexes<T::Id> + 'static,
{
    /// Builds a repository for `T`, claiming `T` against `registry`.
    ///
    /// `id_of` replaces the reflection-based "identity is always field
    /// zero" convention with an explicit extractor supplied by the caller.
    pub fn new(
        registry: &TypeRegistry,
        store: S,
        mutexes: M,
        id_of: fn(&T) -> T::Id,
    ) -> Result<Self, RegistryError> {
        let type_tag = registry.register::<T>()?;
        Ok(Self {
            type_tag,
            store: Arc::new(store),
            mutexes: Arc::new(mutexes),
            id_of,
        })
    }

    /// Derives `entity`'s id via the extractor passed to [`Repository::new`].
    ///
    /// Exposed so wrappers like [`crate::view_cache::ViewCachedRepository`]
    /// can key their own bookkeeping by the same id the engine uses,
    /// without duplicating or guessing at the extractor.
    pub(crate) fn id_of(&self, entity: &T) -> T::Id {
        (self.id_of)(entity)
    }

    fn bucket_mut<'p>(&self, ctx: &'p mut ProcessContext) -> &'p mut TypedBucket<T, S, M> {
        let entry = ctx
            .buckets
            .entry(self.type_tag)
            .or_insert_with(|| Box::new(TypedBucket::<T, S, M>::new(self.store.clone(), self.mutexes.clone())));
        entry
            .as_any_mut()
            .downcast_mut::<TypedBucket<T, S, M>>()
            .unwrap_or_else(|| {
                panic!(
                    "bucket for `{}` was created by a different Repository instance than the one reading it",
                    type_name::<T>()
                )
            })
    }

    /// Returns a process-local clone of the entity for `id`, reading from
    /// the process first and falling back to the store. Never enrolls
    /// anything and never locks.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all))]
    pub async fn find(&self, process: &Process, id: &T::Id) -> Result<Option<T>, RepositoryError> {
        let local = process.with_context(|ctx| {
            let bucket = self.bucket_mut(ctx);
            bucket
                .entities
                .get(id)
                .filter(|pe| pe.state.is_available())
                .map(|pe| pe.current.lock().snapshot())
        });
        if local.is_some() {
            return Ok(local);
        }
        self.store
            .load(id)
            .await
            .map_err(|e| RepositoryError::Store(Box::new(e)))
    }

    /// Takes `id` with intent to mutate, enrolling it in `process` and
    /// locking it against other processes if it hasn't been seen before.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all))]
    pub async fn take(&self, process: &Process, id: &T::Id) -> Result<Option<EntityHandle<T>>, RepositoryError> {
        enum LocalOutcome<T> {
            Available(EntityHandle<T>),
            Unavailable,
            NotTracked,
        }

        let local = process.with_context(|ctx| {
            let bucket = self.bucket_mut(ctx);
            match bucket.entities.get_mut(id) {
                Some(pe) if pe.state.is_available() => {
                    pe.state = pe.state.on_take();
                    LocalOutcome::Available(pe.handle())
                }
                Some(pe) => {
                    pe.state = pe.state.on_take();
                    LocalOutcome::Unavailable
                }
                None => LocalOutcome::NotTracked,
            }
        });

        match local {
            LocalOutcome::Available(handle) => return Ok(Some(handle)),
            LocalOutcome::Unavailable => return Ok(None),
            LocalOutcome::NotTracked => {}
        }

        match self
            .mutexes
            .lock(id)
            .await
            .map_err(|e| RepositoryError::Mutexes(Box::new(e)))?
        {
            LockOutcome::Contended => Err(RepositoryError::Contention(ContentionError::LockHeld)),
            LockOutcome::Acquired => match self.load_after_lock(id).await? {
                Some(entity) => Ok(Some(self.enroll(process, id, entity, true))),
                None => {
                    self.mutexes.unlock_all(std::slice::from_ref(id)).await;
                    Ok(None)
                }
            },
            LockOutcome::Absent => match self
                .store
                .load(id)
                .await
                .map_err(|e| RepositoryError::Store(Box::new(e)))?
            {
                None => Ok(None),
                Some(entity) => {
                    if self
                        .mutexes
                        .new_and_lock(id)
                        .await
                        .map_err(|e| RepositoryError::Mutexes(Box::new(e)))?
                    {
                        Ok(Some(self.enroll(process, id, entity, true)))
                    } else {
                        // Another process registered the lock between our
                        // load and our attempt to create it; fall back to
                        // the ordinary acquire path.
                        match self
                            .mutexes
                            .lock(id)
                            .await
                            .map_err(|e| RepositoryError::Mutexes(Box::new(e)))?
                        {
                            LockOutcome::Acquired => match self.load_after_lock(id).await? {
                                Some(entity) => Ok(Some(self.enroll(process, id, entity, true))),
                                None => {
                                    self.mutexes.unlock_all(std::slice::from_ref(id)).await;
                                    Ok(None)
                                }
                            },
                            _ => Err(RepositoryError::Contention(ContentionError::LockHeld)),
                        }
                    }
                }
            },
        }
    }

    async fn load_after_lock(&self, id: &T::Id) -> Result<Option<T>, RepositoryError> {
        self.store
            .load(id)
            .await
            .map_err(|e| RepositoryError::Store(Box::new(e)))
    }

    fn enroll(&self, process: &Process, id: &T::Id, entity: T, holds_lock: bool) -> EntityHandle<T> {
        process.with_context(|ctx| {
            let bucket = self.bucket_mut(ctx);
            let pe = ProcessEntity::new(entity, EntityState::TakenFromRepo, holds_lock);
            let handle = pe.handle();
            bucket.entities.insert(id.clone(), pe);
            handle
        })
    }

    /// Introduces a new value, identified by the extractor passed to
    /// [`Repository::new`]. Does not touch the store or the mutexes: the
    /// value is only persisted when the process flushes.
    ///
    /// Fails with [`MisuseError::AlreadyAvailable`] if the process already
    /// has a readable entity for this id (callers should `Take` and mutate
    /// instead).
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all))]
    pub fn put(&self, process: &Process, entity: T) -> Result<(), RepositoryError> {
        let id = (self.id_of)(&entity);
        let id = &id;
        process.with_context(|ctx| {
            let bucket = self.bucket_mut(ctx);
            match bucket.entities.get_mut(id) {
                Some(pe) if pe.state.is_available() => {
                    Err(RepositoryError::Misuse(MisuseError::AlreadyAvailable))
                }
                Some(pe) => {
                    let new_state = pe.state.on_put();
                    // A `Transient` entity never had a store identity, so
                    // the snapshot it carried (if any) is meaningless for
                    // the resulting `CreatedInProc`; a `ToRemove` entity's
                    // snapshot is still a valid baseline for the `Update`
                    // vs. no-op decision once it lands back on
                    // `TakenFromRepo`, so it is kept as-is.
                    if new_state == EntityState::CreatedInProc {
                        pe.snapshot = None;
                    }
                    pe.state = new_state;
                    pe.current = Arc::new(parking_lot::Mutex::new(entity));
                    Ok(())
                }
                None => {
                    bucket
                        .entities
                        .insert(id.clone(), ProcessEntity::new(entity, EntityState::CreatedInProc, false));
                    Ok(())
                }
            }
        })
    }

    /// Returns the entity already tracked for this id if one is available,
    /// otherwise persists `entity` immediately and enrolls it. The id is
    /// derived from `entity` via the extractor passed to [`Repository::new`].
    ///
    /// The boolean in the result is `true` when `entity` was the one
    /// actually stored (i.e. nothing was there first).
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all))]
    pub async fn put_if_absent(
        &self,
        process: &Process,
        entity: T,
    ) -> Result<(EntityHandle<T>, bool), RepositoryError> {
        let id = (self.id_of)(&entity);
        let id = &id;

        enum LocalOutcome<T> {
            Resolved(EntityHandle<T>, bool),
            NotTracked(T),
        }

        let local = process.with_context(move |ctx| {
            let bucket = self.bucket_mut(ctx);
            match bucket.entities.get_mut(id) {
                Some(pe) => {
                    let available = pe.state.is_available();
                    if !available {
                        pe.current = Arc::new(parking_lot::Mutex::new(entity));
                    }
                    pe.state = pe.state.on_put_if_absent();
                    LocalOutcome::Resolved(pe.handle(), !available)
                }
                None => LocalOutcome::NotTracked(entity),
            }
        });

        let entity = match local {
            LocalOutcome::Resolved(handle, put) => return Ok((handle, put)),
            LocalOutcome::NotTracked(entity) => entity,
        };

        if self
            .mutexes
            .new_and_lock(id)
            .await
            .map_err(|e| RepositoryError::Mutexes(Box::new(e)))?
        {
            self.store
                .save(id, &entity)
                .await
                .map_err(|e| RepositoryError::Store(Box::new(e)))?;
            let handle = self.enroll(process, id, entity, true);
            Ok((handle, true))
        } else {
            match self.take(process, id).await? {
                Some(handle) => Ok((handle, false)),
                None => Err(RepositoryError::Contention(ContentionError::LostRaceEntityMissing)),
            }
        }
    }

    /// Marks `id` for removal at the next flush. Takes `id` first, so the
    /// same read-then-write rules apply.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all))]
    pub async fn remove(&self, process: &Process, id: &T::Id) -> Result<Option<EntityHandle<T>>, RepositoryError> {
        let handle = match self.take(process, id).await? {
            Some(handle) => handle,
            None => return Ok(None),
        };
        process.with_context(|ctx| {
            let bucket = self.bucket_mut(ctx);
            if let Some(pe) = bucket.entities.get_mut(id) {
                pe.state = pe.state.on_remove();
            }
        });
        Ok(Some(handle))
    }

    /// `Take`, falling back to `PutIfAbsent(new_entity)` when nothing was
    /// there to take. The id is derived from `new_entity` via the extractor
    /// passed to [`Repository::new`].
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all))]
    pub async fn take_or_put_if_absent(&self, process: &Process, new_entity: T) -> Result<EntityHandle<T>, RepositoryError> {
        let id = (self.id_of)(&new_entity);
        if let Some(handle) = self.take(process, &id).await? {
            return Ok(handle);
        }
        let (handle, _) = self.put_if_absent(process, new_entity).await?;
        Ok(handle)
    }
}
