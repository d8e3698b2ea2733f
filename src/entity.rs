//! The aggregate contract and the per-process bookkeeping wrapped around
//! each enrolled value.

use std::hash::Hash;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::snapshot::Snapshot;
use crate::state::EntityState;

/// A value a [`crate::repository::Repository`] can manage.
///
/// Identity is deliberately not part of this trait: deriving an entity's id
/// by convention (e.g. "always the first struct field") silently breaks the
/// moment a field is reordered. This crate instead asks for an explicit
/// `fn(&T) -> T::Id` extractor at repository construction time.
pub trait Aggregate: Snapshot + PartialEq + Send + Sync + 'static {
    /// The type used to look an instance up in a [`crate::store::Store`].
    type Id: Eq + Hash + Clone + Send + Sync + 'static;
}

/// Per-process bookkeeping for one `(aggregate type, id)` pair.
///
/// `snapshot` is the value as it was when the process first saw it (`None`
/// for entities created in-process, which have nothing to diff against).
/// `current` is shared with every [`EntityHandle`] the process has handed
/// out, so that a mutation made through one handle is visible to any later
/// `Find`/`Take` on the same id within the same process.
pub(crate) struct ProcessEntity<T> {
    pub snapshot: Option<T>,
    pub current: Arc<Mutex<T>>,
    pub state: EntityState,
    pub holds_lock: bool,
}

impl<T: Aggregate> ProcessEntity<T> {
    pub fn new(current: T, state: EntityState, holds_lock: bool) -> Self {
        let snapshot = if state == EntityState::TakenFromRepo {
            Some(current.snapshot())
        } else {
            None
        };
        Self {
            snapshot,
            current: Arc::new(Mutex::new(current)),
            state,
            holds_lock,
        }
    }

    pub fn handle(&self) -> EntityHandle<T> {
        EntityHandle {
            current: self.current.clone(),
        }
    }

    /// Whether `current` differs from the value the store last saw.
    pub fn is_dirty(&self) -> bool {
        match &self.snapshot {
            Some(snapshot) => &*self.current.lock() != snapshot,
            None => true,
        }
    }
}

/// A live reference to an entity a process has taken.
///
/// Mutations made through [`EntityHandle::lock`] are visible to the process
/// that took the entity (and to anyone else holding a clone of the same
/// handle) without needing an explicit write-back call; the repository
/// engine detects the change by comparing against the snapshot it took at
/// enrollment time.
pub struct EntityHandle<T> {
    current: Arc<Mutex<T>>,
}

impl<T> EntityHandle<T> {
    /// Locks the underlying value for reading or writing.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.current.lock()
    }
}

impl<T> Clone for EntityHandle<T> {
    fn clone(&self) -> Self {
        Self {
            current: self.current.clone(),
        }
    }
}
