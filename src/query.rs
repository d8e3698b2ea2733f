//! Read-only listing support layered on top of a [`crate::store::Store`].
//!
//! This is deliberately thin: anything beyond "what ids exist" and "how
//! many are there" belongs in application code built on top of a
//! repository's `find`, not in the framework itself.

use async_trait::async_trait;

use crate::entity::Aggregate;
use crate::store::Store;

/// Read-only enumeration support for backends that can answer "what ids
/// exist" cheaply, without having to load every value.
#[async_trait]
pub trait QueryStore<T: Aggregate>: Store<T> {
    async fn list_ids(&self) -> Result<Vec<T::Id>, Self::Error>;
    async fn count(&self) -> Result<u64, Self::Error>;
}
