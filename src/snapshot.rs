//! Deep-copy contract used to isolate a process's working value from the
//! value the store holds and from the value other processes are working on.

/// Produces an independent copy of `self`.
///
/// A per-field copy plan covering structs, pointers, slices, maps, and
/// combinations thereof is exactly what `derive(Clone)` already generates
/// at compile time, so `Snapshot` is blanket-implemented for every `Clone`
/// type rather than hand-rolled per aggregate.
pub trait Snapshot {
    /// Returns a value that shares no mutable state with `self`.
    fn snapshot(&self) -> Self;
}

impl<T: Clone> Snapshot for T {
    fn snapshot(&self) -> Self {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, PartialEq, Debug)]
    struct Nested {
        items: Vec<String>,
        tag: Option<Box<u32>>,
    }

    #[test]
    fn snapshot_is_independent_of_the_source() {
        let original = Nested {
            items: vec!["a".into()],
            tag: Some(Box::new(1)),
        };
        let mut copy = original.snapshot();
        copy.items.push("b".into());
        *copy.tag.as_mut().unwrap() = Box::new(2);

        assert_eq!(original.items.len(), 1);
        assert_eq!(*original.tag.unwrap(), 1);
        assert_eq!(copy.items.len(), 2);
    }

    #[test]
    fn snapshot_of_empty_collections_stays_empty() {
        let original = Nested {
            items: Vec::new(),
            tag: None,
        };
        let copy = original.snapshot();
        assert!(copy.items.is_empty());
        assert!(copy.tag.is_none());
    }
}
