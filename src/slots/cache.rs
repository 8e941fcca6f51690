//! This module contains the cache of slot values read from a state provider.

use std::collections::HashMap;

use itertools::Itertools;

use crate::utility::U256Wrapper;

/// A memo of slot values keyed by the exact slot key.
///
/// A cache is only valid for the storage of one contract as of one block, so
/// it must never be shared between reads of different blocks or contracts.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SlotValueCache {
    values: HashMap<U256Wrapper, U256Wrapper>,
}

impl SlotValueCache {
    /// Constructs a new, empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets the cached value of the slot at `key`.
    #[must_use]
    pub fn get(&self, key: &U256Wrapper) -> Option<U256Wrapper> {
        self.values.get(key).copied()
    }

    /// Checks if the value of the slot at `key` is cached.
    #[must_use]
    pub fn contains(&self, key: &U256Wrapper) -> bool {
        self.values.contains_key(key)
    }

    /// Caches `value` as the value of the slot at `key`.
    pub fn insert(&mut self, key: U256Wrapper, value: U256Wrapper) {
        self.values.insert(key, value);
    }

    /// Gets the keys among `keys` that are not cached, without duplicates and
    /// in the order they first appear.
    #[must_use]
    pub fn misses(&self, keys: &[U256Wrapper]) -> Vec<U256Wrapper> {
        keys.iter()
            .unique()
            .filter(|key| !self.contains(key))
            .copied()
            .collect()
    }

    /// Gets the number of cached slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Checks if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Forgets every cached value.
    pub fn clear(&mut self) {
        self.values.clear();
    }
}

impl Extend<(U256Wrapper, U256Wrapper)> for SlotValueCache {
    fn extend<I: IntoIterator<Item = (U256Wrapper, U256Wrapper)>>(&mut self, iter: I) {
        self.values.extend(iter);
    }
}

#[cfg(test)]
mod tests {
    use crate::{slots::cache::SlotValueCache, utility::U256Wrapper};

    fn keys(slots: &[u64]) -> Vec<U256Wrapper> {
        slots.iter().map(|s| U256Wrapper::from(*s)).collect()
    }

    #[test]
    fn finds_unique_misses_in_order() {
        let mut cache = SlotValueCache::new();
        cache.insert(U256Wrapper::from(1u64), U256Wrapper::from(10u64));

        assert_eq!(cache.misses(&keys(&[3, 1, 3, 0, 1])), keys(&[3, 0]));
        assert_eq!(cache.get(&U256Wrapper::from(1u64)), Some(U256Wrapper::from(10u64)));
        assert!(cache.get(&U256Wrapper::from(3u64)).is_none());
    }

    #[test]
    fn can_be_cleared() {
        let mut cache = SlotValueCache::new();
        cache.extend(keys(&[0, 1]).into_iter().zip(keys(&[5, 6])));
        assert_eq!(cache.len(), 2);

        cache.clear();
        assert!(cache.is_empty());
    }
}
