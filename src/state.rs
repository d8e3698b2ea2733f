//! The finite set of states a process-local entity moves through between
//! being enrolled (by `Find`/`Take`/`Put`/`PutIfAbsent`) and being flushed
//! or released at the end of a process.

/// Lifecycle state of a single `(aggregate type, id)` pair inside one
/// process.
///
/// A sealed-hierarchy-with-no-payload shape, expressed directly as a plain
/// enum with match-based transitions instead of one type per state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityState {
    /// Loaded from the store during this process; flushed as an update if
    /// it was mutated, left alone otherwise.
    TakenFromRepo,
    /// Created by `Put`/`PutIfAbsent` with no prior store-backed value;
    /// flushed as an insert.
    CreatedInProc,
    /// Marked for removal while it had no store-backed identity yet;
    /// flushed as nothing (never existed as far as the store is concerned).
    Transient,
    /// Marked for removal after being taken from the store; flushed as a
    /// delete.
    ToRemove,
    /// Reached by an operation applied out of order. Absorbing: once an
    /// entity is in this state the whole process is refused at flush time.
    Error,
}

impl EntityState {
    /// `Take` only makes sense against an entity the process can still
    /// read-modify; applying it elsewhere poisons the entry.
    pub fn on_take(self) -> Self {
        use EntityState::*;
        match self {
            TakenFromRepo => TakenFromRepo,
            CreatedInProc => CreatedInProc,
            Transient | ToRemove | Error => Error,
        }
    }

    /// `Put` introduces a brand-new value; only meaningful when the slot
    /// isn't already holding a readable entity.
    pub fn on_put(self) -> Self {
        use EntityState::*;
        match self {
            Transient => CreatedInProc,
            ToRemove => TakenFromRepo,
            TakenFromRepo | CreatedInProc | Error => Error,
        }
    }

    /// `PutIfAbsent` is a no-op on an available entity and otherwise behaves
    /// like `Put`.
    pub fn on_put_if_absent(self) -> Self {
        use EntityState::*;
        match self {
            TakenFromRepo => TakenFromRepo,
            CreatedInProc => CreatedInProc,
            Transient => CreatedInProc,
            ToRemove => TakenFromRepo,
            Error => Error,
        }
    }

    /// `Remove` schedules a delete for store-backed entities and simply
    /// discards ones that never left the process.
    pub fn on_remove(self) -> Self {
        use EntityState::*;
        match self {
            TakenFromRepo => ToRemove,
            CreatedInProc | Transient => Transient,
            ToRemove => ToRemove,
            Error => Error,
        }
    }

    /// Whether `Find`/`Take` may currently hand this entity to the caller.
    pub fn is_available(self) -> bool {
        matches!(self, EntityState::TakenFromRepo | EntityState::CreatedInProc)
    }
}
