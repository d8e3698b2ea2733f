//! The per-id exclusion contract a [`crate::repository::Repository`] uses
//! to make sure two processes never hold the same aggregate at once.

use async_trait::async_trait;

/// Result of attempting to lock an id that may or may not already have a
/// lock registered for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    /// A lock existed and this call acquired it.
    Acquired,
    /// No lock is registered for this id yet.
    Absent,
    /// A lock exists but is currently held elsewhere.
    Contended,
}

/// Per-id mutual exclusion, independent of whatever storage backs the
/// aggregate itself.
#[async_trait]
pub trait Mutexes<Id>: Send + Sync
where
    Id: Eq + std::hash::Hash + Clone + Send + Sync + 'static,
{
    type Error: std::error::Error + Send + Sync + 'static;

    /// Attempts to lock an id that is expected to already have a lock
    /// registered (i.e. the aggregate has been seen before).
    async fn lock(&self, id: &Id) -> Result<LockOutcome, Self::Error>;

    /// Registers a lock for an id that has never been locked before and
    /// immediately acquires it. Returns `false` if another caller won the
    /// race to register it first.
    async fn new_and_lock(&self, id: &Id) -> Result<bool, Self::Error>;

    /// Releases every lock this caller holds among `ids`. Releasing an id
    /// that isn't held is not an error.
    async fn unlock_all(&self, ids: &[Id]);
}
