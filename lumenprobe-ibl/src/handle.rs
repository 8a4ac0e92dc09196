//! Opaque handle store. Backends own the resources, callers hold `u64` handles.

use std::collections::BTreeMap;

/// Arena of live resources keyed by monotonically increasing handles.
///
/// Handle 0 is never issued, so callers can use it as a "none" sentinel.
/// Handles are not reused after removal, which keeps stale handles from
/// aliasing a newer resource.
pub struct HandleStore<T> {
    items: BTreeMap<u64, T>,
    next_handle: u64,
}

impl<T> HandleStore<T> {
    pub fn new() -> Self {
        Self {
            items: BTreeMap::new(),
            next_handle: 1,
        }
    }

    /// Insert a resource and return its handle (> 0).
    pub fn insert(&mut self, item: T) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        self.items.insert(handle, item);
        handle
    }

    pub fn get(&self, handle: u64) -> Option<&T> {
        self.items.get(&handle)
    }

    pub fn get_mut(&mut self, handle: u64) -> Option<&mut T> {
        self.items.get_mut(&handle)
    }

    pub fn remove(&mut self, handle: u64) -> Option<T> {
        self.items.remove(&handle)
    }

    pub fn contains(&self, handle: u64) -> bool {
        self.items.contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Live handles in ascending order.
    pub fn handles(&self) -> impl Iterator<Item = u64> + '_ {
        self.items.keys().copied()
    }
}

impl<T> Default for HandleStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_start_at_one() {
        let mut store = HandleStore::new();
        assert_eq!(store.insert("a"), 1);
        assert_eq!(store.insert("b"), 2);
        assert_eq!(store.get(1), Some(&"a"));
        assert!(store.get(0).is_none());
    }

    #[test]
    fn test_removed_handles_are_not_reused() {
        let mut store = HandleStore::new();
        let a = store.insert(10);
        assert_eq!(store.remove(a), Some(10));
        let b = store.insert(20);
        assert_ne!(a, b);
        assert!(!store.contains(a));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_handles_iterate_in_order() {
        let mut store = HandleStore::new();
        for i in 0..4 {
            store.insert(i);
        }
        store.remove(2);
        assert_eq!(store.handles().collect::<Vec<_>>(), vec![1, 3, 4]);
    }
}
