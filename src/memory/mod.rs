//! In-memory `Store`/`Mutexes` implementations, useful for tests and for
//! small processes that don't need durability.

mod mutexes;
mod store;

pub use mutexes::{MemoryMutexes, MutexesConfig};
pub use store::{MemoryStore, MemoryStoreError};
