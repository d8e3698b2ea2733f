//! The process-scoped boundary every repository operation runs inside.
//!
//! A [`Process`] is carried as an explicit argument rather than stitched
//! into an ambient context value. Repository methods take `&Process`
//! directly, so a `Process`'s lifetime and ownership are visible at every
//! call site.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};

use crate::error::{panic_message, BoxError, ProcessError, RunError};

/// Object-safe face of a type-erased, per-aggregate-type bucket of
/// [`crate::entity::ProcessEntity`] values.
///
/// `ProcessContext` cannot hold `HashMap<&'static str, TypedBucket<T, S, M>>`
/// for every `T`, `S`, `M` a process might ever touch, since those type
/// parameters aren't known until a `Repository<T, S, M>` method is called.
/// Each concrete bucket is boxed behind this trait instead, and the
/// `Repository` that owns a given aggregate type downcasts back to its own
/// concrete bucket type via [`EntityBucket::as_any_mut`]. Erasure stops at
/// the bucket: individual entities inside a bucket stay strongly typed.
#[async_trait]
pub(crate) trait EntityBucket: Send + Sync {
    /// Whether any entity in this bucket reached [`crate::state::EntityState::Error`].
    fn has_misuse(&self) -> bool;

    /// Persists every insert/update/delete accumulated in this bucket.
    async fn flush(&mut self) -> Result<(), BoxError>;

    /// Releases every lock this bucket is holding.
    async fn release(&mut self);

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Process-local state: one bucket per aggregate type that has been
/// touched, plus the guards held by any singleton repositories taken during
/// the process.
#[derive(Default)]
pub(crate) struct ProcessContext {
    pub(crate) buckets: HashMap<&'static str, Box<dyn EntityBucket>>,
    pub(crate) singleton_guards: Vec<ArcMutexGuard<RawMutex, ()>>,
}

/// A single unit-of-work boundary.
///
/// Repository operations enroll entities into a `Process`; `finish` flushes
/// every change to the backing stores and releases every lock, `abort`
/// discards the changes but still releases every lock.
pub struct Process {
    inner: Mutex<ProcessContext>,
}

impl Process {
    /// Starts a new, empty process.
    pub fn start() -> Self {
        Self {
            inner: Mutex::new(ProcessContext::default()),
        }
    }

    /// Runs a synchronous closure against this process's context under its
    /// lock. Used by repository operations that don't need to cross an
    /// `await` point while the context is locked.
    pub(crate) fn with_context<R>(&self, f: impl FnOnce(&mut ProcessContext) -> R) -> R {
        let mut guard = self.inner.lock();
        f(&mut guard)
    }

    fn take_context(&self) -> ProcessContext {
        let mut guard = self.inner.lock();
        std::mem::take(&mut *guard)
    }

    /// Flushes every enrolled change to its backing store, then releases
    /// every lock regardless of whether the flush succeeded.
    ///
    /// If any bucket contains an entity in [`crate::state::EntityState::Error`],
    /// nothing is flushed and [`ProcessError::Misuse`] is returned; locks
    /// are still released.
    pub async fn finish(&self) -> Result<(), ProcessError> {
        let mut ctx = self.take_context();
        let result = flush_all(&mut ctx).await;
        release_all(&mut ctx).await;
        result
    }

    /// Discards every enrolled change and releases every lock.
    pub async fn abort(&self) {
        let mut ctx = self.take_context();
        release_all(&mut ctx).await;
    }

    /// Runs `body` as the sole work of a fresh process, finishing it on
    /// success and aborting it on error or panic.
    ///
    /// Rust has no `recover()`, so a panicking body is caught by running it
    /// on a `tokio::spawn`ed task and inspecting the resulting `JoinError`
    /// instead.
    pub async fn run<F, Fut, E>(body: F) -> Result<(), RunError<E>>
    where
        F: FnOnce(Arc<Process>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        let process = Arc::new(Process::start());
        let fut = body(process.clone());

        match tokio::spawn(fut).await {
            Ok(Ok(())) => process.finish().await.map_err(RunError::Process),
            Ok(Err(err)) => {
                process.abort().await;
                Err(RunError::Inner(err))
            }
            Err(join_err) if join_err.is_panic() => {
                process.abort().await;
                Err(RunError::Panic(panic_message(join_err)))
            }
            Err(_cancelled) => {
                process.abort().await;
                Err(RunError::Cancelled)
            }
        }
    }
}

async fn flush_all(ctx: &mut ProcessContext) -> Result<(), ProcessError> {
    for bucket in ctx.buckets.values_mut() {
        if bucket.has_misuse() {
            return Err(ProcessError::Misuse);
        }
        bucket.flush().await.map_err(ProcessError::Store)?;
    }
    Ok(())
}

async fn release_all(ctx: &mut ProcessContext) {
    for bucket in ctx.buckets.values_mut() {
        bucket.release().await;
    }
    ctx.singleton_guards.clear();
}
