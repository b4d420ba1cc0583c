//! Dense-key maps over a [`SpineStore`].
//!
//! Keys are non-negative dense sequences. Every write marks the owning spine
//! dirty so the next [`SpineStore::sync`] persists it.

use std::sync::Arc;

use crate::error::Result;
use crate::segment::SpineDirectory;
use crate::spine::{ArraySpine, IntSpine, PackedInts};
use crate::store::SpineStore;

// ============================================================================
// SpinedIntMap
// ============================================================================

/// `usize → i32` map with a configurable default for absent keys.
#[derive(Debug)]
pub struct SpinedIntMap {
    store: SpineStore<IntSpine>,
    default: i32,
}

impl SpinedIntMap {
    pub fn new(spine_size: usize, increment: usize, default: i32) -> Self {
        Self {
            store: SpineStore::new(
                spine_size,
                increment,
                Arc::new(move |slots| IntSpine::new(slots, default)),
            ),
            default,
        }
    }

    pub fn store(&self) -> &SpineStore<IntSpine> {
        &self.store
    }

    pub fn get(&self, key: usize) -> i32 {
        let (index, slot) = self.store.locate(key);
        match self.store.existing_spine(index) {
            Some(spine) => spine.get(slot),
            None => self.default,
        }
    }

    pub fn put(&self, key: usize, value: i32) {
        let (index, slot) = self.store.locate(key);
        self.store.spine(index).set(slot, value);
        self.store.mark_dirty(index);
    }

    pub fn compare_and_set(&self, key: usize, expected: i32, new: i32) -> bool {
        let (index, slot) = self.store.locate(key);
        let swapped = self.store.spine(index).compare_and_set(slot, expected, new);
        if swapped {
            self.store.mark_dirty(index);
        }
        swapped
    }

    /// Atomically replace the value with `f(current, x)` and return it.
    pub fn accumulate_and_get(&self, key: usize, x: i32, f: impl Fn(i32, i32) -> i32) -> i32 {
        let (index, slot) = self.store.locate(key);
        let result = self.store.spine(index).accumulate_and_get(slot, x, f);
        self.store.mark_dirty(index);
        result
    }

    pub fn load(&self, dir: &SpineDirectory) -> Result<usize> {
        self.store.load(dir)
    }

    pub fn sync(&self, dir: &SpineDirectory) -> Result<usize> {
        self.store.sync(dir)
    }
}

// ============================================================================
// SpinedArrayMap
// ============================================================================

/// `usize → Arc<T>` map of packed values.
#[derive(Debug)]
pub struct SpinedArrayMap<T: PackedInts> {
    store: SpineStore<ArraySpine<T>>,
}

impl<T: PackedInts> SpinedArrayMap<T> {
    pub fn new(spine_size: usize, increment: usize) -> Self {
        Self {
            store: SpineStore::new(spine_size, increment, Arc::new(ArraySpine::new)),
        }
    }

    pub fn store(&self) -> &SpineStore<ArraySpine<T>> {
        &self.store
    }

    /// Value at `key`. Never allocates a spine.
    pub fn get(&self, key: usize) -> Option<Arc<T>> {
        let (index, slot) = self.store.locate(key);
        self.store.existing_spine(index)?.get(slot)
    }

    pub fn contains_key(&self, key: usize) -> bool {
        self.get(key).is_some()
    }

    pub fn put(&self, key: usize, value: T) {
        let (index, slot) = self.store.locate(key);
        self.store.spine(index).set(slot, Some(Arc::new(value)));
        self.store.mark_dirty(index);
    }

    /// Read-modify-write of one key.
    ///
    /// `merge(current, &value)` computes the replacement; it is retried until
    /// the replacement lands on an unchanged slot, so no concurrent update of
    /// the same key is lost. An error from `merge` leaves the slot untouched.
    pub fn accumulate_and_get<V, E>(
        &self,
        key: usize,
        value: V,
        merge: impl Fn(Option<&T>, &V) -> std::result::Result<T, E>,
    ) -> std::result::Result<Arc<T>, E> {
        let (index, slot) = self.store.locate(key);
        let spine = self.store.spine(index);
        let result = spine.accumulate_and_get(slot, |current| merge(current, &value))?;
        self.store.mark_dirty(index);
        Ok(result)
    }

    /// Occupied keys, ascending.
    pub fn keys(&self) -> Vec<usize> {
        let mut keys = Vec::new();
        self.for_each(|key, _| keys.push(key));
        keys
    }

    /// Number of occupied keys.
    pub fn len(&self) -> usize {
        let mut count = 0;
        self.store.for_each_spine(|_, spine| count += spine.occupied());
        count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Visit every occupied key in ascending order.
    pub fn for_each(&self, mut f: impl FnMut(usize, Arc<T>)) {
        let size = self.store.spine_size();
        self.store.for_each_spine(|index, spine| {
            for (slot, value) in spine.iter() {
                f(index * size + slot, value);
            }
        });
    }

    pub fn clear(&self) {
        self.store.clear();
    }

    pub fn load(&self, dir: &SpineDirectory) -> Result<usize> {
        self.store.load(dir)
    }

    pub fn sync(&self, dir: &SpineDirectory) -> Result<usize> {
        self.store.sync(dir)
    }
}
