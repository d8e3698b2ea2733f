//! The persistence contract a [`crate::repository::Repository`] is built
//! against. Nothing in this crate's engine knows or cares whether an
//! implementation is backed by memory, a database, or a remote service.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::entity::Aggregate;

/// Durable storage for one aggregate type.
///
/// Implementations own identity uniqueness: `save`/`save_all` must reject
/// an id that already exists rather than silently overwriting it, since the
/// repository engine relies on that distinction to tell inserts from
/// updates.
#[async_trait]
pub trait Store<T: Aggregate>: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Loads the current value for `id`, or `None` if it doesn't exist.
    async fn load(&self, id: &T::Id) -> Result<Option<T>, Self::Error>;

    /// Persists a brand-new `entity` under `id`.
    async fn save(&self, id: &T::Id, entity: &T) -> Result<(), Self::Error>;

    /// Persists a batch of inserts and updates produced by one process
    /// flush. Implementations should apply both sides atomically where the
    /// backing store allows it.
    async fn save_all(
        &self,
        inserts: HashMap<T::Id, T>,
        updates: HashMap<T::Id, T>,
    ) -> Result<(), Self::Error>;

    /// Removes every id in `ids`. Removing an id that doesn't exist is not
    /// an error.
    async fn remove_all(&self, ids: &[T::Id]) -> Result<(), Self::Error>;
}
