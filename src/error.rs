//! Error taxonomy shared by every layer of the crate.
//!
//! Store and Mutexes implementations are generic collaborators supplied by
//! the caller, so their error types are boxed at the point they cross into
//! the engine rather than threaded through as extra generic parameters on
//! every public type — the same trade the bucket-selection layer in
//! [`crate::process`] already makes for the sake of letting one `Process`
//! host arbitrarily many aggregate types.

/// A boxed collaborator error, used wherever a `Store` or `Mutexes`
/// implementation's associated error type would otherwise have to be
/// threaded through as a generic parameter.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A repository operation was asked to do something the state machine
/// forbids.
#[derive(Debug, thiserror::Error)]
pub enum MisuseError {
    #[error("entity is already available in this process and cannot be Put again")]
    AlreadyAvailable,
    #[error("entity reached an error state earlier in this process")]
    Poisoned,
}

/// A lock on an aggregate could not be obtained.
#[derive(Debug, thiserror::Error)]
pub enum ContentionError {
    #[error("lock is held by another process and could not be acquired in time")]
    LockHeld,
    #[error("lost a PutIfAbsent race and the winning entity could not be found afterwards")]
    LostRaceEntityMissing,
}

/// Two repositories attempted to claim the same aggregate type.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("aggregate type `{0}` is already registered")]
    DuplicateAggregateType(&'static str),
}

/// Failure of a single [`crate::repository::Repository`] operation.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error(transparent)]
    Contention(#[from] ContentionError),
    #[error(transparent)]
    Misuse(#[from] MisuseError),
    #[error("store operation failed: {0}")]
    Store(#[source] BoxError),
    #[error("mutexes operation failed: {0}")]
    Mutexes(#[source] BoxError),
}

/// Failure of `Process::finish`.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("one or more entities reached an error state; nothing was flushed for them")]
    Misuse,
    #[error("store operation failed while flushing the process: {0}")]
    Store(#[source] BoxError),
}

/// Outcome of [`crate::process::Process::run`].
#[derive(Debug, thiserror::Error)]
pub enum RunError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error("process body returned an error: {0}")]
    Inner(E),
    #[error("process body panicked: {0}")]
    Panic(String),
    #[error("process task was cancelled before it could finish")]
    Cancelled,
}

/// Renders a `tokio::task::JoinError`'s panic payload as a message, falling
/// back to a generic description when the payload isn't a string.
pub(crate) fn panic_message(join_error: tokio::task::JoinError) -> String {
    match join_error.try_into_panic() {
        Ok(payload) => {
            if let Some(s) = payload.downcast_ref::<&str>() {
                (*s).to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "process panicked with a non-string payload".to_string()
            }
        }
        Err(_) => "process task was cancelled".to_string(),
    }
}
