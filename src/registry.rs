//! An explicit, non-global tracker of which aggregate types are in use.
//! Every `Repository` is required to register its aggregate type against
//! one of these before it can be used, so two repositories can never
//! silently share a bucket.

use std::any::type_name;
use std::collections::HashSet;

use parking_lot::Mutex;

use crate::error::RegistryError;

/// Tracks which aggregate types have already been claimed by a `Repository`.
///
/// A `TypeRegistry` is a plain value owned by whoever wires up the
/// application's repositories; nothing in this crate reaches for a global
/// instance.
#[derive(Default)]
pub struct TypeRegistry {
    claimed: Mutex<HashSet<&'static str>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `T` for the calling repository.
    ///
    /// Returns [`RegistryError::DuplicateAggregateType`] if another
    /// repository already claimed the same type on this registry.
    pub fn register<T: 'static>(&self) -> Result<&'static str, RegistryError> {
        let name = type_name::<T>();
        let mut claimed = self.claimed.lock();
        if !claimed.insert(name) {
            return Err(RegistryError::DuplicateAggregateType(name));
        }
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Widget;
    struct Gadget;

    #[test]
    fn same_type_cannot_register_twice() {
        let registry = TypeRegistry::new();
        registry.register::<Widget>().unwrap();
        let err = registry.register::<Widget>().unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateAggregateType(_)));
    }

    #[test]
    fn distinct_types_register_independently() {
        let registry = TypeRegistry::new();
        registry.register::<Widget>().unwrap();
        registry.register::<Gadget>().unwrap();
    }
}
