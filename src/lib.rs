//! `procrepo` is a process-scoped, aggregate-oriented repository framework.
//!
//! A [`process::Process`] is a short-lived unit of work: business code
//! reads and writes aggregates through a [`repository::Repository`] bound
//! to that process, and the process's `finish`/`abort` decide, in one
//! place, whether those changes reach the backing [`store::Store`] at all.
//! Every entity a process touches is deep-copied on the way in, so mutating
//! a value handed out by `Take` can never be observed by another process
//! before the owning process commits.
//!
//! ```ignore
//! use procrepo::{Process, Repository, TypeRegistry};
//! use procrepo::memory::{MemoryMutexes, MemoryStore};
//!
//! #[derive(Clone, PartialEq)]
//! struct Product { id: u64, stock: u32 }
//! impl procrepo::entity::Aggregate for Product { type Id = u64; }
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = TypeRegistry::new();
//! let products = Repository::new(&registry, MemoryStore::new(), MemoryMutexes::new(), |p: &Product| p.id)?;
//!
//! let process = Process::start();
//! products.put(&process, Product { id: 1, stock: 10 })?;
//! process.finish().await?;
//! # Ok(())
//! # }
//! ```

pub mod entity;
pub mod error;
pub mod memory;
pub mod mutexes;
pub mod process;
pub mod query;
pub mod registry;
pub mod repository;
pub mod singleton;
pub mod snapshot;
pub mod state;
pub mod store;
pub mod view_cache;

pub use entity::{Aggregate, EntityHandle};
pub use error::{ContentionError, MisuseError, ProcessError, RegistryError, RepositoryError, RunError};
pub use mutexes::{LockOutcome, Mutexes};
pub use process::Process;
pub use registry::TypeRegistry;
pub use repository::Repository;
pub use singleton::{SingletonHandle, SingletonRepository};
pub use snapshot::Snapshot;
pub use state::EntityState;
pub use store::Store;
